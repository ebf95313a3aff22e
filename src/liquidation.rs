//! Liquidation conditions.
//!
//! A position is liquidated when its leveraged PnL percent falls to the
//! negative threshold. The boundary is inclusive: exactly -80% liquidates.

use crate::types::{Direction, Leverage, Probability};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::position::calculate_leveraged_pnl_percent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidationParams {
    /// Leveraged loss in percent that forces a close.
    pub threshold: Decimal,
    /// Leveraged loss in percent that flags a position as at risk.
    pub warning_threshold: Decimal,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            threshold: dec!(80),
            warning_threshold: dec!(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiquidationStatus {
    Safe {
        leveraged_pnl_percent: Decimal,
    },
    AtRisk {
        leveraged_pnl_percent: Decimal,
        // percentage points left before the threshold
        buffer: Decimal,
    },
    Liquidatable {
        leveraged_pnl_percent: Decimal,
    },
}

pub fn evaluate_liquidation(leveraged_pnl_percent: Decimal, params: &LiquidationParams) -> LiquidationStatus {
    if leveraged_pnl_percent <= -params.threshold {
        LiquidationStatus::Liquidatable {
            leveraged_pnl_percent,
        }
    } else if leveraged_pnl_percent <= -params.warning_threshold {
        LiquidationStatus::AtRisk {
            leveraged_pnl_percent,
            buffer: leveraged_pnl_percent + params.threshold,
        }
    } else {
        LiquidationStatus::Safe {
            leveraged_pnl_percent,
        }
    }
}

pub fn should_liquidate(
    entry_prob: Probability,
    current_prob: Probability,
    direction: Direction,
    leverage: Leverage,
    threshold: Decimal,
) -> bool {
    let leveraged = calculate_leveraged_pnl_percent(entry_prob, current_prob, direction, leverage);
    is_liquidatable(leveraged, threshold)
}

pub fn is_liquidatable(leveraged_pnl_percent: Decimal, threshold: Decimal) -> bool {
    leveraged_pnl_percent <= -threshold
}

// probability at which a position hits the threshold. None when it cannot be reached inside (0, 100]
pub fn liquidation_probability(
    entry_prob: Probability,
    direction: Direction,
    leverage: Leverage,
    threshold: Decimal,
) -> Option<Decimal> {
    let move_fraction = threshold / dec!(100) / leverage.as_decimal();
    let entry = entry_prob.value();

    let liq = match direction {
        Direction::Long => entry * (Decimal::ONE - move_fraction),
        Direction::Short => entry * (Decimal::ONE + move_fraction),
    };

    if liq > Decimal::ZERO && liq <= dec!(100) {
        Some(liq)
    } else {
        None
    }
}
