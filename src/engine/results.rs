// 8.0.2: result types and errors for engine operations.

use crate::ledger::LedgerError;
use crate::types::{Direction, MarketId, PositionId, Probability, Quote};

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub direction: Direction,
    pub liquidation_prob: Probability,
    pub realized_pnl: Quote,
    // margin + pnl, may be negative past 100% leveraged loss
    pub returned: Quote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub markets_updated: usize,
    pub positions_synced: usize,
    pub liquidations: Vec<LiquidationResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Leverage {0}x is not offered")]
    InvalidLeverage(u32),

    #[error("Market {0} not found")]
    MarketNotFound(MarketId),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ticker task failed: {0}")]
    Ticker(String),
}
