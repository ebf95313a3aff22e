// 8.0 engine/core.rs: main engine. holds the markets, ledger, pricing, and liquidation monitor.

use super::liquidations::LiquidationMonitor;
use super::results::EngineError;
use crate::config::SimConfig;
use crate::events::Notifier;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::market::{Market, MarketRegistry, MarketSnapshot};
use crate::position::{position_metrics, Position, PositionMetrics};
use crate::pricing::{PricingEngine, RandomSource};
use crate::storage::{KeyValueStore, MemoryStore};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/** 8.1: main engine struct. shared behind an Arc; all writes go through its methods */
pub struct Engine {
    pub(super) config: SimConfig,
    pub(super) ledger: Arc<Ledger>,
    // write lock is held for a whole tick so readers never see half a tick
    pub(super) registry: RwLock<MarketRegistry>,
    pub(super) pricing: PricingEngine,
    pub(super) monitor: LiquidationMonitor,
    pub(super) rng: Mutex<Box<dyn RandomSource>>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) ticks: AtomicU64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("markets", &self.registry.read().len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: SimConfig,
        ledger: Arc<Ledger>,
        registry: MarketRegistry,
        rng: Box<dyn RandomSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let monitor = LiquidationMonitor::new(config.liquidation.clone(), Arc::clone(&notifier));
        Self {
            pricing: PricingEngine::new(config.pricing.clone()),
            config,
            ledger,
            registry: RwLock::new(registry),
            monitor,
            rng: Mutex::new(rng),
            notifier,
            ticks: AtomicU64::new(0),
        }
    }

    /// Load the ledger from `store` and start from the default catalog.
    pub fn open(
        config: SimConfig,
        store: Arc<dyn KeyValueStore>,
        rng: Box<dyn RandomSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let ledger = Ledger::load(store, Arc::clone(&notifier), config.ledger_params())?;
        Ok(Self::new(
            config,
            Arc::new(ledger),
            MarketRegistry::with_default_catalog(),
            rng,
            notifier,
        ))
    }

    /// Fresh wallet, nothing persisted past the process.
    pub fn in_memory(
        config: SimConfig,
        rng: Box<dyn RandomSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        Self::open(config, Arc::new(MemoryStore::new()), rng, notifier)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn monitor(&self) -> &LiquidationMonitor {
        &self.monitor
    }

    pub fn markets(&self) -> MarketSnapshot {
        self.registry.read().snapshot()
    }

    pub fn market(&self, market_id: &crate::types::MarketId) -> Option<Market> {
        self.registry.read().get(market_id).cloned()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Markets and ledger from the same instant. Waits for an in-flight tick
    /// to finish, so liquidations from that tick are already applied.
    pub fn view(&self) -> EngineView {
        let registry = self.registry.read();
        let ledger = self.ledger.snapshot();
        EngineView {
            markets: registry.snapshot(),
            ledger,
        }
    }
}

/// Consistent read model for the presentation layer
#[derive(Debug, Clone)]
pub struct EngineView {
    pub markets: MarketSnapshot,
    pub ledger: LedgerSnapshot,
}

#[derive(Debug, Clone)]
pub struct PositionRow {
    pub position: Position,
    pub metrics: PositionMetrics,
}

impl EngineView {
    pub fn position_rows(&self, config: &SimConfig) -> Vec<PositionRow> {
        self.ledger
            .positions
            .iter()
            .map(|p| PositionRow {
                position: p.clone(),
                metrics: position_metrics(p, &config.liquidation),
            })
            .collect()
    }
}
