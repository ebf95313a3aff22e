// prob-perps: leveraged long/short positions on prediction market probabilities.
// synthetic markets drift every tick, open positions lean on their market,
// positions that lose 80% after leverage are force closed.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, PositionId, Direction, Probability, Quote, Leverage
//   2.x  pricing.rs: random walk step, position bias, random sources
//   3.x  market.rs: market catalog + registry
//   4.x  position.rs: position struct, PnL math, display metrics
//   5.x  storage.rs: key value store, memory + file backends
//   6.x  liquidation.rs: thresholds and status
//   7.x  config.rs: tick timing, wallet, risk params, logging, presets
//   8.x  engine/: core engine: ticks, trading, liquidations, ticker
//   10.x ledger.rs: balance, escrow, open/close, persistence
//   11.x events.rs: user-facing notifications

pub mod config;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod liquidation;
pub mod market;
pub mod position;
pub mod pricing;
pub mod storage;
pub mod types;

// re exports for convenience
pub use config::{ConfigError, LoggingConfig, Preset, SimConfig};
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use liquidation::*;
pub use market::*;
pub use position::*;
pub use pricing::*;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use types::*;
