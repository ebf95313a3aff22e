//! Market catalog and registry.
//!
//! A market is a yes/no question whose probability drifts each tick. The
//! registry owns the live set and publishes immutable snapshots to readers.

use crate::position::Position;
use crate::pricing::{PricingEngine, RandomSource};
use crate::types::{MarketId, Probability};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One probability market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: MarketId,
    pub title: String,
    pub category: String,
    /// Seed probability, reference point for the displayed change
    pub base_probability: Probability,
    pub current_probability: Probability,
}

impl Market {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        probability: Probability,
    ) -> Self {
        Self {
            id: MarketId::new(id),
            title: title.into(),
            category: category.into(),
            base_probability: probability,
            current_probability: probability,
        }
    }

    /// Percentage points moved since the seed value
    pub fn change(&self) -> Decimal {
        self.current_probability.value() - self.base_probability.value()
    }
}

// id, title, category, seed probability
const CATALOG: &[(&str, &str, &str, u32)] = &[
    ("btc-100k", "BTC reaches $100k by end of 2025", "Crypto", 63),
    ("eth-etf", "Ethereum ETF approved in 2025", "Crypto", 72),
    ("crypto-boom", "Crypto market booms in 2025", "Crypto", 66),
    ("crypto-crash", "Crypto market crashes in 2025", "Crypto", 55),
    ("trump-2028", "Trump wins 2028 election", "Politics", 41),
    ("eu-unity", "EU passes major integration treaty by 2026", "Politics", 38),
    ("china-taiwan", "China-Taiwan conflict escalates in 2025", "Politics", 32),
    ("uk-election", "UK general election results in hung parliament", "Politics", 45),
    ("climate-treaty", "New global climate treaty signed by 2026", "Politics", 58),
    ("ai-agi", "AGI achieved by 2026", "AI & Tech", 28),
    ("ai-regulation", "Major AI regulation passed in US/EU by 2025", "AI & Tech", 65),
    ("quantum-breakthrough", "Quantum computer solves practical problem by 2026", "AI & Tech", 42),
    ("self-driving-cars", "Fully autonomous cars legalized in 5+ countries by 2026", "AI & Tech", 52),
    ("ai-jobs", "AI replaces 20% of knowledge worker jobs by 2026", "AI & Tech", 48),
    ("recession-2025", "Global recession in 2025", "Economics", 44),
    ("fed-rate-cut", "Fed cuts rates by 1%+ in 2025", "Economics", 55),
    ("inflation-target", "US inflation falls below 2% by end of 2025", "Economics", 62),
    ("dollar-decline", "US Dollar index drops 10%+ in 2025", "Economics", 35),
    ("housing-crash", "Major housing market correction in 2025", "Economics", 41),
    ("world-cup-2026", "Brazil wins 2026 FIFA World Cup", "Sports", 18),
    ("olympics-2028", "USA tops medal count at 2028 Olympics", "Sports", 35),
    ("super-bowl-2025", "Kansas City Chiefs win Super Bowl 2025", "Sports", 12),
    ("nba-champion-2025", "Denver Nuggets win NBA championship 2025", "Sports", 15),
    ("f1-champion-2025", "Max Verstappen wins F1 championship 2025", "Sports", 38),
    ("tennis-grand-slam", "Novak Djokovic wins 3+ Grand Slams in 2025", "Sports", 28),
    ("elon-mars", "SpaceX lands humans on Mars by 2030", "Space", 35),
];

/// The seed markets every run starts from
pub fn default_catalog() -> Vec<Market> {
    CATALOG
        .iter()
        .map(|(id, title, category, p)| {
            Market::new(*id, *title, *category, Probability::new_unchecked(Decimal::from(*p)))
        })
        .collect()
}

/// Read-only view of every market at one instant
pub type MarketSnapshot = Arc<Vec<Market>>;

/// Owns the live markets. Only `tick` and `set_probability` write; readers
/// take a snapshot and keep it as long as they like.
#[derive(Debug, Clone)]
pub struct MarketRegistry {
    markets: MarketSnapshot,
}

impl MarketRegistry {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            markets: Arc::new(markets),
        }
    }

    pub fn with_default_catalog() -> Self {
        Self::new(default_catalog())
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        Arc::clone(&self.markets)
    }

    pub fn get(&self, market_id: &MarketId) -> Option<&Market> {
        self.markets.iter().find(|m| &m.id == market_id)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Step every market once. Each market draws independently.
    pub fn tick(
        &mut self,
        pricing: &PricingEngine,
        positions: &[Position],
        rng: &mut dyn RandomSource,
    ) -> MarketSnapshot {
        let next: Vec<Market> = self
            .markets
            .iter()
            .map(|market| Market {
                current_probability: pricing.next_probability(
                    market.current_probability,
                    &market.id,
                    positions,
                    rng,
                ),
                ..market.clone()
            })
            .collect();

        self.markets = Arc::new(next);
        self.snapshot()
    }

    /// Override one market's probability. Returns false for an unknown id.
    pub fn set_probability(&mut self, market_id: &MarketId, probability: Probability) -> bool {
        if self.get(market_id).is_none() {
            return false;
        }

        let next: Vec<Market> = self
            .markets
            .iter()
            .map(|m| {
                if &m.id == market_id {
                    Market {
                        current_probability: probability,
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect();

        self.markets = Arc::new(next);
        true
    }

    /// Bulk form of `set_probability`. Unknown ids are skipped; returns how many applied.
    pub fn set_probabilities<'a>(
        &mut self,
        updates: impl IntoIterator<Item = (&'a MarketId, Probability)>,
    ) -> usize {
        updates
            .into_iter()
            .filter(|(id, p)| self.set_probability(id, *p))
            .count()
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::with_default_catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::SequenceRandom;
    use rust_decimal_macros::dec;

    #[test]
    fn catalog_contents() {
        let markets = default_catalog();
        assert_eq!(markets.len(), 26);
        assert!(markets.iter().all(|m| m.change().is_zero()));

        let btc = markets.iter().find(|m| m.id.as_str() == "btc-100k").unwrap();
        assert_eq!(btc.base_probability.value(), dec!(63));
        assert_eq!(btc.category, "Crypto");
    }

    #[test]
    fn tick_publishes_new_snapshot() {
        let mut registry = MarketRegistry::with_default_catalog();
        let before = registry.snapshot();

        let mut rng = SequenceRandom::new([dec!(1)]);
        let after = registry.tick(&PricingEngine::default(), &[], &mut rng);

        // old snapshot untouched
        assert_eq!(before[0].current_probability.value(), dec!(63));
        assert_eq!(after[0].current_probability.value(), dec!(64.25));
        assert_eq!(after[0].base_probability.value(), dec!(63));
        assert_eq!(after[0].change(), dec!(1.25));
    }

    #[test]
    fn override_probability() {
        let mut registry = MarketRegistry::with_default_catalog();
        let id = MarketId::new("ai-agi");

        assert!(registry.set_probability(&id, Probability::new(dec!(30.5)).unwrap()));
        assert_eq!(registry.get(&id).unwrap().current_probability.value(), dec!(30.5));

        let missing = MarketId::new("does-not-exist");
        assert!(!registry.set_probability(&missing, Probability::new(dec!(10)).unwrap()));
    }

    #[test]
    fn bulk_override_skips_unknown() {
        let mut registry = MarketRegistry::with_default_catalog();
        let a = MarketId::new("eth-etf");
        let b = MarketId::new("nope");
        let p = Probability::new(dec!(70)).unwrap();

        let applied = registry.set_probabilities([(&a, p), (&b, p)]);
        assert_eq!(applied, 1);
    }
}
