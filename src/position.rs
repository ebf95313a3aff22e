// 4.0: open position tracking. pnl% = (current - entry) / entry * 100, sign flipped for shorts.
// 4.3+ has the pure pnl functions and the read model shown next to each position.

use crate::liquidation::{evaluate_liquidation, LiquidationParams, LiquidationStatus};
use crate::types::{Direction, Leverage, MarketId, PositionId, Probability, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A leveraged bet on a market's probability.
///
/// Field names follow the persisted record layout (`marketId`, `entryProb`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub market_id: MarketId,
    pub market_title: String,
    pub direction: Direction,
    pub leverage: Leverage,
    /// Margin escrowed from the balance at open.
    pub amount: Quote,
    pub entry_prob: Probability,
    /// Last probability observed on the market.
    pub current_prob: Probability,
}

impl Position {
    pub fn new(
        id: PositionId,
        market_id: MarketId,
        market_title: impl Into<String>,
        direction: Direction,
        leverage: Leverage,
        amount: Quote,
        entry_prob: Probability,
    ) -> Self {
        Self {
            id,
            market_id,
            market_title: market_title.into(),
            direction,
            leverage,
            amount,
            entry_prob,
            current_prob: entry_prob,
        }
    }

    // 4.1: pnl at the last observed probability
    pub fn unrealized_pnl(&self) -> Quote {
        self.pnl_at(self.current_prob)
    }

    pub fn pnl_at(&self, current_prob: Probability) -> Quote {
        calculate_pnl(
            self.amount,
            self.entry_prob,
            current_prob,
            self.direction,
            self.leverage,
        )
    }

    pub fn leveraged_pnl_percent_at(&self, current_prob: Probability) -> Decimal {
        calculate_leveraged_pnl_percent(self.entry_prob, current_prob, self.direction, self.leverage)
    }

    // notional exposure, margin * leverage
    pub fn size(&self) -> Quote {
        self.amount.mul(self.leverage.as_decimal())
    }

    // 4.2: what closing now would put back in the balance
    pub fn total_value(&self) -> Quote {
        self.amount.add(self.unrealized_pnl())
    }

    pub fn with_current_prob(&self, current_prob: Probability) -> Self {
        Self {
            current_prob,
            ..self.clone()
        }
    }
}

// 4.3: unleveraged move relative to entry, in percent
pub fn calculate_pnl_percent(
    entry_prob: Probability,
    current_prob: Probability,
    direction: Direction,
) -> Decimal {
    let entry = entry_prob.value();
    assert!(!entry.is_zero(), "entry probability must be non-zero");

    let delta = (current_prob.value() - entry) * direction.sign();
    delta / entry * dec!(100)
}

pub fn calculate_leveraged_pnl_percent(
    entry_prob: Probability,
    current_prob: Probability,
    direction: Direction,
    leverage: Leverage,
) -> Decimal {
    calculate_pnl_percent(entry_prob, current_prob, direction) * leverage.as_decimal()
}

// 4.4: amount * leverage * pnl% / 100
pub fn calculate_pnl(
    amount: Quote,
    entry_prob: Probability,
    current_prob: Probability,
    direction: Direction,
    leverage: Leverage,
) -> Quote {
    let pnl_percent = calculate_pnl_percent(entry_prob, current_prob, direction);
    Quote::new(amount.value() * leverage.as_decimal() * pnl_percent / dec!(100))
}

/// Everything the position list displays for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionMetrics {
    pub pnl_percent: Decimal,
    pub leveraged_pnl_percent: Decimal,
    pub pnl: Quote,
    pub size: Quote,
    pub total_value: Quote,
    pub near_liquidation: bool,
    pub status: LiquidationStatus,
}

pub fn position_metrics(position: &Position, params: &LiquidationParams) -> PositionMetrics {
    let pnl_percent =
        calculate_pnl_percent(position.entry_prob, position.current_prob, position.direction);
    let leveraged_pnl_percent = pnl_percent * position.leverage.as_decimal();
    let status = evaluate_liquidation(leveraged_pnl_percent, params);

    PositionMetrics {
        pnl_percent,
        leveraged_pnl_percent,
        pnl: position.unrealized_pnl(),
        size: position.size(),
        total_value: position.total_value(),
        near_liquidation: !matches!(status, LiquidationStatus::Safe { .. }),
        status,
    }
}
