// Probability random walk
//
// Each tick every market takes one uniform step. Open positions on a market
// lean the step toward the crowd: +bias_factor per long, -bias_factor per
// short, scaled by bias_weight. Markets with no positions walk unbiased.
// Randomness comes through RandomSource so tests can script the draws.

use crate::position::Position;
use crate::types::{MarketId, Probability};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Parameters of the biased walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingParams {
    /// Pressure contributed by one open position
    pub bias_factor: Decimal,
    /// Scale applied to the summed bias before it joins the move
    pub bias_weight: Decimal,
    /// Half-width of the uniform step, a draw lands in [-max_step, +max_step]
    pub max_step: Decimal,
    pub floor: Decimal,
    pub ceiling: Decimal,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            bias_factor: dec!(0.65),
            bias_weight: dec!(0.3),
            max_step: dec!(1.25),
            floor: Probability::FLOOR,
            ceiling: Probability::CEILING,
        }
    }
}

/// Source of uniform draws in [0, 1)
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> Decimal;
}

// draws have 6 decimal places, plenty for a 2.5 point wide step
const UNIT_RESOLUTION: u32 = 1_000_000;

/// Production source backed by a seedable std rng
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> Decimal {
        let ticks = self.rng.gen_range(0..UNIT_RESOLUTION);
        Decimal::new(ticks as i64, 6)
    }
}

/// Replays a fixed list of draws, cycling when exhausted
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    draws: VecDeque<Decimal>,
}

impl SequenceRandom {
    pub fn new(draws: impl IntoIterator<Item = Decimal>) -> Self {
        let draws: VecDeque<Decimal> = draws.into_iter().collect();
        assert!(!draws.is_empty(), "sequence needs at least one draw");
        Self { draws }
    }

    /// Always returns 0.5, a zero base move
    pub fn neutral() -> Self {
        Self::new([dec!(0.5)])
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&mut self) -> Decimal {
        // new() guarantees non-empty and we rotate rather than drain
        let draw = self.draws.pop_front().unwrap_or(dec!(0.5));
        self.draws.push_back(draw);
        draw
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    params: PricingParams,
}

impl PricingEngine {
    pub fn new(params: PricingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PricingParams {
        &self.params
    }

    /// Net crowd pressure on a market: +factor per long, -factor per short.
    /// Returns None when nobody is positioned there.
    pub fn bias(&self, market_id: &MarketId, positions: &[Position]) -> Option<Decimal> {
        let mut count = 0usize;
        let mut bias = Decimal::ZERO;

        for pos in positions.iter().filter(|p| &p.market_id == market_id) {
            count += 1;
            bias += self.params.bias_factor * pos.direction.sign();
        }

        (count > 0).then_some(bias)
    }

    pub fn next_probability(
        &self,
        current: Probability,
        market_id: &MarketId,
        positions: &[Position],
        rng: &mut dyn RandomSource,
    ) -> Probability {
        let unit = rng.next_unit();
        let base_move = (unit - dec!(0.5)) * self.params.max_step * dec!(2);

        let step = match self.bias(market_id, positions) {
            Some(bias) => base_move + bias * self.params.bias_weight,
            None => base_move,
        };

        Probability::clamped(current.value() + step, self.params.floor, self.params.ceiling)
    }
}
