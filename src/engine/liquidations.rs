//! Liquidation detection and execution.

use super::results::LiquidationResult;
use crate::events::{Notification, Notifier};
use crate::ledger::{CloseReason, Ledger, LedgerError};
use crate::liquidation::{is_liquidatable, LiquidationParams};
use crate::market::Market;
use crate::position::{calculate_leveraged_pnl_percent, Position};
use crate::types::{MarketId, PositionId, Probability};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationCandidate {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub market_prob: Probability,
    pub leveraged_pnl_percent: Decimal,
}

/// Scans positions against market prices and force-closes the ones past the threshold.
pub struct LiquidationMonitor {
    params: LiquidationParams,
    notifier: Arc<dyn Notifier>,
}

impl LiquidationMonitor {
    pub fn new(params: LiquidationParams, notifier: Arc<dyn Notifier>) -> Self {
        Self { params, notifier }
    }

    pub fn params(&self) -> &LiquidationParams {
        &self.params
    }

    /// Pure evaluation over one snapshot. A position whose market is unknown is skipped.
    pub fn find_liquidatable(&self, positions: &[Position], markets: &[Market]) -> Vec<LiquidationCandidate> {
        let mut candidates = Vec::new();

        for position in positions {
            let Some(market) = markets.iter().find(|m| m.id == position.market_id) else {
                debug!(id = %position.id, market = %position.market_id, "market not found, skipping");
                continue;
            };

            let leveraged = calculate_leveraged_pnl_percent(
                position.entry_prob,
                market.current_probability,
                position.direction,
                position.leverage,
            );

            if is_liquidatable(leveraged, self.params.threshold) {
                candidates.push(LiquidationCandidate {
                    position_id: position.id.clone(),
                    market_id: position.market_id.clone(),
                    market_prob: market.current_probability,
                    leveraged_pnl_percent: leveraged,
                });
            }
        }

        candidates
    }

    /// Evaluate every open position against `markets` and close the breaches.
    /// Eligibility is decided on one snapshot taken before the first close.
    pub fn run(&self, ledger: &Ledger, markets: &[Market]) -> Result<Vec<LiquidationResult>, LedgerError> {
        let snapshot = ledger.positions();
        let candidates = self.find_liquidatable(&snapshot, markets);

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // close realises at the position's stored prob, so make sure it is the one we judged on
            ledger.update_current_prob(&candidate.market_id, candidate.market_prob)?;

            let Some(closed) = ledger.close_position(&candidate.position_id, CloseReason::Liquidation)? else {
                // closed manually between snapshot and now
                continue;
            };

            warn!(
                id = %closed.position.id,
                market = %closed.position.market_id,
                leveraged_pnl_pct = %candidate.leveraged_pnl_percent.round_dp(2),
                pnl = %closed.realized_pnl,
                "Position liquidated"
            );
            self.notifier.notify(Notification::liquidated(
                closed.position.direction,
                &closed.position.market_title,
                &closed.position.id,
            ));

            results.push(LiquidationResult {
                position_id: closed.position.id.clone(),
                market_id: closed.position.market_id.clone(),
                direction: closed.position.direction,
                liquidation_prob: closed.exit_prob,
                realized_pnl: closed.realized_pnl,
                returned: closed.credited,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NotificationCollector, NotificationKind};
    use crate::ledger::{LedgerParams, OpenRequest};
    use crate::storage::MemoryStore;
    use crate::types::{Direction, Leverage, Quote};
    use rust_decimal_macros::dec;

    fn setup() -> (Ledger, LiquidationMonitor, Arc<NotificationCollector>) {
        let notes = Arc::new(NotificationCollector::new());
        let ledger = Ledger::load(Arc::new(MemoryStore::new()), notes.clone(), LedgerParams::default()).unwrap();
        let monitor = LiquidationMonitor::new(LiquidationParams::default(), notes.clone());
        (ledger, monitor, notes)
    }

    fn open(ledger: &Ledger, market: &str, amount: Decimal, leverage: u32, direction: Direction, entry: Decimal) -> Position {
        ledger
            .open_position(OpenRequest {
                market_id: MarketId::new(market),
                market_title: market.to_string(),
                amount: Quote::new(amount),
                leverage: Leverage::new(leverage).unwrap(),
                direction,
                entry_prob: Probability::new(entry).unwrap(),
            })
            .unwrap()
    }

    fn market_at(id: &str, p: Decimal) -> Market {
        let mut m = Market::new(id, id, "Test", Probability::new(dec!(50)).unwrap());
        m.current_probability = Probability::new(p).unwrap();
        m
    }

    #[test]
    fn liquidates_at_threshold_using_market_price() {
        let (ledger, monitor, notes) = setup();
        let pos = open(&ledger, "m", dec!(5), 10, Direction::Long, dec!(50));

        // position's stored prob is still 50; the scan must use the market's 45
        let results = monitor.run(&ledger, &[market_at("m", dec!(45))]).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].position_id, pos.id);
        assert_eq!(results[0].realized_pnl.value(), dec!(-5));
        assert_eq!(results[0].returned.value(), dec!(0));
        assert_eq!(ledger.balance().value(), dec!(5));
        assert!(ledger.positions().is_empty());
        assert!(notes.kinds().contains(&NotificationKind::Liquidated));
    }

    #[test]
    fn safe_positions_untouched() {
        let (ledger, monitor, _) = setup();
        open(&ledger, "m", dec!(2), 3, Direction::Short, dec!(50));

        let results = monitor.run(&ledger, &[market_at("m", dec!(55))]).unwrap();
        assert!(results.is_empty());
        assert_eq!(ledger.positions().len(), 1);
    }

    #[test]
    fn unknown_market_is_ignored() {
        let (ledger, monitor, _) = setup();
        open(&ledger, "gone", dec!(2), 10, Direction::Long, dec!(50));

        let results = monitor.run(&ledger, &[market_at("other", dec!(1))]).unwrap();
        assert!(results.is_empty());
        assert_eq!(ledger.positions().len(), 1);
    }

    #[test]
    fn one_pass_decides_on_one_snapshot() {
        let (ledger, monitor, _) = setup();
        open(&ledger, "a", dec!(2), 10, Direction::Long, dec!(50));
        open(&ledger, "a", dec!(2), 10, Direction::Short, dec!(50));
        open(&ledger, "b", dec!(2), 5, Direction::Short, dec!(40));

        let markets = [market_at("a", dec!(44)), market_at("b", dec!(47))];
        let candidates = monitor.find_liquidatable(&ledger.positions(), &markets);
        // long on a (-120%) and short on b (-87.5%)
        assert_eq!(candidates.len(), 2);

        let results = monitor.run(&ledger, &markets).unwrap();
        assert_eq!(results.len(), 2);
        let left = ledger.positions();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].direction, Direction::Short);
        assert_eq!(left[0].market_id, MarketId::new("a"));
    }
}
