//! Trader-facing operations: open, close, recharge.

use super::core::Engine;
use super::results::EngineError;
use crate::events::Notification;
use crate::ledger::{CloseReason, ClosedPosition, OpenRequest};
use crate::position::Position;
use crate::types::{Direction, Leverage, MarketId, PositionId, Quote};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

/// Parse a trade amount as typed by a user. Empty, unparsable and
/// non-positive amounts are all `InvalidAmount`.
pub fn parse_amount(input: &str) -> Result<Quote, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount("amount is required".to_string()));
    }

    let value = Decimal::from_str(trimmed)
        .map_err(|_| EngineError::InvalidAmount(format!("'{trimmed}' is not a number")))?;

    validate_amount(Quote::new(value))
}

fn validate_amount(amount: Quote) -> Result<Quote, EngineError> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(format!("{amount} must be greater than zero")));
    }
    Ok(amount)
}

impl Engine {
    /// Open a position from raw user input at the market's current probability.
    pub fn open_trade(
        &self,
        market_id: &MarketId,
        amount_input: &str,
        leverage: u32,
        direction: Direction,
    ) -> Result<Position, EngineError> {
        let amount = parse_amount(amount_input).inspect_err(|_| {
            self.notifier.notify(Notification::amount_required());
        })?;
        self.open_trade_amount(market_id, amount, leverage, direction)
    }

    pub fn open_trade_amount(
        &self,
        market_id: &MarketId,
        amount: Quote,
        leverage: u32,
        direction: Direction,
    ) -> Result<Position, EngineError> {
        let amount = validate_amount(amount).inspect_err(|_| {
            self.notifier.notify(Notification::amount_required());
        })?;

        let leverage = Leverage::new(leverage)
            .filter(|l| self.config.allows_leverage(*l))
            .ok_or(EngineError::InvalidLeverage(leverage))?;

        // entry is read under the registry lock so it cannot straddle a tick
        let registry = self.registry.read();
        let Some(market) = registry.get(market_id) else {
            debug!(market = %market_id, "open ignored, market not found");
            return Err(EngineError::MarketNotFound(market_id.clone()));
        };

        let position = self.ledger.open_position(OpenRequest {
            market_id: market.id.clone(),
            market_title: market.title.clone(),
            amount,
            leverage,
            direction,
            entry_prob: market.current_probability,
        })?;

        Ok(position)
    }

    /// Manual close. Ok(None) if the position is already gone.
    pub fn close_trade(&self, position_id: &PositionId) -> Result<Option<ClosedPosition>, EngineError> {
        Ok(self.ledger.close_position(position_id, CloseReason::Manual)?)
    }

    pub fn recharge(&self) -> Result<Quote, EngineError> {
        Ok(self.ledger.recharge()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::events::{NotificationCollector, NotificationKind};
    use crate::ledger::LedgerError;
    use crate::pricing::SequenceRandom;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> (Engine, Arc<NotificationCollector>) {
        let notes = Arc::new(NotificationCollector::new());
        let engine = Engine::in_memory(
            SimConfig::default(),
            Box::new(SequenceRandom::neutral()),
            notes.clone(),
        )
        .unwrap();
        (engine, notes)
    }

    #[test]
    fn parse_amount_cases() {
        assert_eq!(parse_amount(" 2.5 ").unwrap().value(), dec!(2.5));
        assert!(matches!(parse_amount(""), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(parse_amount("abc"), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(parse_amount("0"), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(parse_amount("-1"), Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn open_uses_current_probability() {
        let (engine, notes) = engine();
        let pos = engine
            .open_trade(&MarketId::new("btc-100k"), "3", 5, Direction::Short)
            .unwrap();

        assert_eq!(pos.entry_prob.value(), dec!(63));
        assert_eq!(pos.market_title, "BTC reaches $100k by end of 2025");
        assert_eq!(engine.ledger().balance().value(), dec!(7));
        assert_eq!(notes.kinds(), vec![NotificationKind::TradeOpened]);
    }

    #[test]
    fn invalid_amount_notifies_and_leaves_ledger_alone() {
        let (engine, notes) = engine();
        let err = engine
            .open_trade(&MarketId::new("btc-100k"), "", 5, Direction::Long)
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidAmount(_)));
        assert_eq!(notes.kinds(), vec![NotificationKind::AmountRequired]);
        assert_eq!(engine.ledger().balance().value(), dec!(10));
    }

    #[test]
    fn leverage_must_be_offered() {
        let (engine, _) = engine();
        let err = engine
            .open_trade(&MarketId::new("btc-100k"), "1", 4, Direction::Long)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLeverage(4)));
    }

    #[test]
    fn unknown_market_is_silent() {
        let (engine, notes) = engine();
        let err = engine
            .open_trade(&MarketId::new("moon-landing"), "1", 2, Direction::Long)
            .unwrap_err();
        assert!(matches!(err, EngineError::MarketNotFound(_)));
        assert!(notes.notifications().is_empty());
        assert!(engine.ledger().positions().is_empty());
    }

    #[test]
    fn insufficient_balance_propagates() {
        let (engine, notes) = engine();
        let err = engine
            .open_trade(&MarketId::new("btc-100k"), "11", 2, Direction::Long)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(notes.kinds(), vec![NotificationKind::InsufficientBalance]);
    }

    #[test]
    fn close_and_recharge() {
        let (engine, _) = engine();
        let pos = engine
            .open_trade(&MarketId::new("ai-agi"), "4", 1, Direction::Long)
            .unwrap();

        let closed = engine.close_trade(&pos.id).unwrap().unwrap();
        assert_eq!(closed.realized_pnl.value(), dec!(0));
        assert!(engine.close_trade(&pos.id).unwrap().is_none());

        assert_eq!(engine.recharge().unwrap().value(), dec!(20));
    }
}
