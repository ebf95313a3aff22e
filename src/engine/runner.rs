// 8.5 engine/runner.rs: periodic ticker. one tick per interval until shutdown or a tick budget runs out.

use super::core::Engine;
use super::results::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Drive `engine.tick()` every `period`. Returns the number of ticks run.
/// The first tick fires one period after start, not immediately.
pub async fn run_ticker(
    engine: Arc<Engine>,
    period: Duration,
    max_ticks: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64, EngineError> {
    let mut interval = interval_at(Instant::now() + period, period);
    // a slow tick does not trigger a burst of catch-up ticks
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_ms = period.as_millis() as u64, ?max_ticks, "Ticker started");

    let mut count = 0u64;
    loop {
        if max_ticks.is_some_and(|max| count >= max) {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = engine.tick() {
                    error!(error = %e, "Tick failed, stopping ticker");
                    return Err(e);
                }
                count += 1;
            }
            changed = shutdown.changed() => {
                // sender dropped counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    info!(ticks = count, "Ticker stopped");
    Ok(count)
}

/// A ticker running on the current tokio runtime.
pub struct TickerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<u64, EngineError>>,
}

impl TickerHandle {
    /// Signal the ticker and wait for it. An in-flight tick completes first.
    pub async fn shutdown(self) -> Result<u64, EngineError> {
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Wait without signalling, for tickers with a tick budget.
    pub async fn join(self) -> Result<u64, EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Ticker(e.to_string()))?
    }
}

/// Spawn a ticker at the engine's configured interval.
pub fn spawn_ticker(engine: Arc<Engine>, max_ticks: Option<u64>) -> TickerHandle {
    let (tx, rx) = watch::channel(false);
    let period = engine.config().tick_interval();
    let task = tokio::spawn(run_ticker(engine, period, max_ticks, rx));
    TickerHandle { shutdown: tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::events::NullNotifier;
    use crate::pricing::SequenceRandom;
    use rust_decimal_macros::dec;

    fn engine() -> Arc<Engine> {
        Arc::new(
            Engine::in_memory(
                SimConfig::default(),
                Box::new(SequenceRandom::new([dec!(1)])),
                Arc::new(NullNotifier),
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_tick_budget() {
        let engine = engine();
        let handle = spawn_ticker(Arc::clone(&engine), Some(3));

        let ticks = handle.join().await.unwrap();
        assert_eq!(ticks, 3);
        assert_eq!(engine.tick_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let engine = engine();
        let handle = spawn_ticker(Arc::clone(&engine), None);

        tokio::time::sleep(Duration::from_millis(2_999)).await;
        assert_eq!(engine.tick_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(engine.tick_count(), 1);

        let ticks = handle.shutdown().await.unwrap();
        assert_eq!(ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_ticking() {
        let engine = engine();
        let handle = spawn_ticker(Arc::clone(&engine), None);

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        let ticks = handle.shutdown().await.unwrap();
        assert_eq!(ticks, 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(engine.tick_count(), 3);
    }
}
