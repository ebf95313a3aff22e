// 8.0: core simulation engine. owns the market registry and the ledger, steps prices,
// keeps positions in sync, runs liquidation after every price change.
// every price change takes the same path: price, sync, scan.

mod core;
mod liquidations;
mod results;
mod runner;
mod ticks;
mod trading;

pub use core::{Engine, EngineView, PositionRow};
pub use liquidations::{LiquidationCandidate, LiquidationMonitor};
pub use results::{EngineError, LiquidationResult, TickReport};
pub use runner::{run_ticker, spawn_ticker, TickerHandle};
pub use trading::parse_amount;
