//! Price updates.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult, TickReport};
use crate::market::Market;
use crate::types::{MarketId, Probability};
use std::sync::atomic::Ordering;
use tracing::{debug, info};

impl Engine {
    /// Step every market, sync positions to the new prices, then liquidate.
    /// The whole sequence runs under the registry write lock.
    pub fn tick(&self) -> Result<TickReport, EngineError> {
        let mut registry = self.registry.write();

        let positions = self.ledger.positions();
        let markets = {
            let mut rng = self.rng.lock();
            registry.tick(&self.pricing, &positions, rng.as_mut())
        };

        let (positions_synced, liquidations) = self.settle(&markets)?;
        drop(registry);

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let report = TickReport {
            tick,
            markets_updated: markets.len(),
            positions_synced,
            liquidations,
        };

        if report.liquidations.is_empty() {
            debug!(tick, synced = positions_synced, "Tick");
        } else {
            info!(
                tick,
                synced = positions_synced,
                liquidated = report.liquidations.len(),
                "Tick with liquidations"
            );
        }

        Ok(report)
    }

    /// Override one market's probability (e.g. a detail view pushing its own
    /// value), then run the same sync and liquidation pass a tick does.
    /// The value is clamped to the pricing range like any tick result.
    pub fn set_market_probability(
        &self,
        market_id: &MarketId,
        probability: Probability,
    ) -> Result<Vec<LiquidationResult>, EngineError> {
        let mut registry = self.registry.write();
        if !registry.set_probability(market_id, self.clamp_override(probability)) {
            return Err(EngineError::MarketNotFound(market_id.clone()));
        }
        let markets = registry.snapshot();
        let (_, liquidations) = self.settle(&markets)?;
        Ok(liquidations)
    }

    /// Bulk override. Unknown ids are skipped; one sync and liquidation pass
    /// covers the whole batch. Returns how many markets were updated.
    pub fn set_market_probabilities<'a>(
        &self,
        updates: impl IntoIterator<Item = (&'a MarketId, Probability)>,
    ) -> Result<(usize, Vec<LiquidationResult>), EngineError> {
        let mut registry = self.registry.write();
        let applied = registry.set_probabilities(
            updates
                .into_iter()
                .map(|(id, p)| (id, self.clamp_override(p))),
        );
        if applied == 0 {
            return Ok((0, Vec::new()));
        }

        let markets = registry.snapshot();
        let (_, liquidations) = self.settle(&markets)?;
        debug!(applied, liquidated = liquidations.len(), "Bulk probability override");
        Ok((applied, liquidations))
    }

    fn clamp_override(&self, probability: Probability) -> Probability {
        let params = self.pricing.params();
        Probability::clamped(probability.value(), params.floor, params.ceiling)
    }

    // caller holds the registry write lock
    fn settle(&self, markets: &[Market]) -> Result<(usize, Vec<LiquidationResult>), EngineError> {
        let positions = self.ledger.positions();

        let mut synced = 0;
        for market in markets {
            if positions.iter().any(|p| p.market_id == market.id) {
                synced += self
                    .ledger
                    .update_current_prob(&market.id, market.current_probability)?;
            }
        }

        let liquidations = self.monitor.run(&self.ledger, markets)?;
        Ok((synced, liquidations))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SimConfig;
    use crate::engine::Engine;
    use crate::events::NullNotifier;
    use crate::pricing::SequenceRandom;
    use crate::types::{Direction, MarketId, Probability};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine(draws: Vec<rust_decimal::Decimal>) -> Engine {
        Engine::in_memory(
            SimConfig::default(),
            Box::new(SequenceRandom::new(draws)),
            Arc::new(NullNotifier),
        )
        .unwrap()
    }

    #[test]
    fn tick_moves_every_market_and_counts() {
        let engine = engine(vec![dec!(1)]);
        let report = engine.tick().unwrap();

        assert_eq!(report.tick, 1);
        assert_eq!(report.markets_updated, 26);
        assert_eq!(report.positions_synced, 0);
        assert!(engine.markets().iter().all(|m| m.change() == dec!(1.25)));
        assert_eq!(engine.tick_count(), 1);
    }

    #[test]
    fn tick_syncs_position_probabilities() {
        let engine = engine(vec![dec!(0.5)]);
        let id = MarketId::new("ai-agi");
        let pos = engine.open_trade(&id, "2", 2, Direction::Long).unwrap();

        let report = engine.tick().unwrap();
        assert_eq!(report.positions_synced, 1);

        // one long: 0.65 * 0.3 = 0.195 above 28
        let view = engine.view();
        let synced = view.ledger.position(&pos.id).unwrap();
        assert_eq!(synced.current_prob.value(), dec!(28.195));
        assert_eq!(
            view.markets.iter().find(|m| m.id == id).unwrap().current_probability,
            synced.current_prob
        );
    }

    #[test]
    fn override_triggers_liquidation() {
        let engine = engine(vec![dec!(0.5)]);
        let id = MarketId::new("eth-etf");
        engine.open_trade(&id, "5", 10, Direction::Long).unwrap();

        // entry 72, -8% underlying at 66.24
        let liqs = engine
            .set_market_probability(&id, Probability::new(dec!(66.24)).unwrap())
            .unwrap();
        assert_eq!(liqs.len(), 1);
        assert!(engine.ledger().positions().is_empty());
    }

    #[test]
    fn override_is_clamped_to_market_range() {
        let engine = engine(vec![dec!(0.5)]);
        let id = MarketId::new("ai-agi");
        engine
            .set_market_probability(&id, Probability::new(dec!(0.0001)).unwrap())
            .unwrap();
        assert_eq!(engine.market(&id).unwrap().current_probability.value(), dec!(1));

        engine
            .set_market_probability(&id, Probability::new(dec!(100)).unwrap())
            .unwrap();
        assert_eq!(engine.market(&id).unwrap().current_probability.value(), dec!(99));
    }

    #[test]
    fn bulk_override_syncs_and_liquidates() {
        let engine = engine(vec![dec!(0.5)]);
        let eth = MarketId::new("eth-etf");
        let agi = MarketId::new("ai-agi");
        let doomed = engine.open_trade(&eth, "3", 10, Direction::Long).unwrap();
        let kept = engine.open_trade(&agi, "3", 2, Direction::Short).unwrap();

        let unknown = MarketId::new("nope");
        let (applied, liqs) = engine
            .set_market_probabilities([
                (&eth, Probability::new(dec!(60)).unwrap()),
                (&agi, Probability::new(dec!(21)).unwrap()),
                (&unknown, Probability::new(dec!(50)).unwrap()),
            ])
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(liqs.len(), 1);
        assert_eq!(liqs[0].position_id, doomed.id);

        let view = engine.view();
        assert!(view.ledger.position(&doomed.id).is_none());
        assert_eq!(view.ledger.position(&kept.id).unwrap().current_prob.value(), dec!(21));
    }

    #[test]
    fn bulk_override_with_no_known_markets_is_a_noop() {
        let engine = engine(vec![dec!(0.5)]);
        let unknown = MarketId::new("nope");
        let (applied, liqs) = engine
            .set_market_probabilities([(&unknown, Probability::new(dec!(50)).unwrap())])
            .unwrap();
        assert_eq!(applied, 0);
        assert!(liqs.is_empty());
    }

    #[test]
    fn override_unknown_market() {
        let engine = engine(vec![dec!(0.5)]);
        let err = engine
            .set_market_probability(&MarketId::new("nope"), Probability::new(dec!(5)).unwrap())
            .unwrap_err();
        assert!(matches!(err, crate::engine::EngineError::MarketNotFound(_)));
    }
}
