// 11.0: user-facing notifications. the ledger and liquidation monitor raise these on every
// state change a trader should hear about. delivery is fire and forget: a notifier can never fail a mutation.

use crate::types::{Direction, Leverage, PositionId, Quote};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Recharged,
    InsufficientBalance,
    AmountRequired,
    TradeOpened,
    PositionClosed,
    Liquidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn recharged(amount: Quote) -> Self {
        Self {
            kind: NotificationKind::Recharged,
            title: "Balance Recharged".to_string(),
            description: format!("+{} added to your virtual wallet", amount),
            severity: Severity::Info,
        }
    }

    pub fn insufficient_balance(available: Quote) -> Self {
        Self {
            kind: NotificationKind::InsufficientBalance,
            title: "Insufficient Balance".to_string(),
            description: format!("You only have {:.2} available", available.value()),
            severity: Severity::Destructive,
        }
    }

    pub fn amount_required() -> Self {
        Self {
            kind: NotificationKind::AmountRequired,
            title: "Amount Required".to_string(),
            description: "Please enter an amount to place a trade".to_string(),
            severity: Severity::Destructive,
        }
    }

    pub fn trade_opened(direction: Direction, leverage: Leverage, market_title: &str) -> Self {
        Self {
            kind: NotificationKind::TradeOpened,
            title: "Trade Opened".to_string(),
            description: format!("{} {} on \"{}\"", direction, leverage, market_title),
            severity: Severity::Info,
        }
    }

    // profit and loss share a kind; severity tells them apart
    pub fn position_closed(pnl: Quote) -> Self {
        let pnl = pnl.value().round_dp(2);
        let (label, sign, severity) = if pnl >= Decimal::ZERO {
            ("Profit", "+", Severity::Info)
        } else {
            ("Loss", "", Severity::Destructive)
        };
        Self {
            kind: NotificationKind::PositionClosed,
            title: "Position Closed".to_string(),
            description: format!("{}: {}{:.2}", label, sign, pnl),
            severity,
        }
    }

    pub fn liquidated(direction: Direction, market_title: &str, position_id: &PositionId) -> Self {
        Self {
            kind: NotificationKind::Liquidated,
            title: "Position Liquidated".to_string(),
            description: format!(
                "Your {} position on \"{}\" was liquidated ({})",
                direction, market_title, position_id
            ),
            severity: Severity::Destructive,
        }
    }
}

/// Receives notifications. Implementations must return quickly and must not panic;
/// anything slow belongs on a channel.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Drops everything
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Writes each notification to the tracing log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Info => tracing::info!(kind = ?n.kind, title = %n.title, "{}", n.description),
            Severity::Destructive => {
                tracing::warn!(kind = ?n.kind, title = %n.title, "{}", n.description)
            }
        }
    }
}

/// Forwards to an async consumer. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification receiver gone, dropping");
        }
    }
}

/// Keeps everything in memory. Handy for tests and replay.
#[derive(Debug, Default)]
pub struct NotificationCollector {
    notifications: Mutex<Vec<Notification>>,
}

impl NotificationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications.lock().iter().map(|n| n.kind.clone()).collect()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

impl Notifier for NotificationCollector {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

/// Fans out to every registered notifier
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for NotifierRegistry {
    fn notify(&self, notification: Notification) {
        for notifier in &self.notifiers {
            notifier.notify(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn notification_collector() {
        let collector = NotificationCollector::new();
        collector.notify(Notification::recharged(Quote::new(dec!(10))));
        assert_eq!(collector.kinds(), vec![NotificationKind::Recharged]);

        collector.clear();
        assert!(collector.notifications().is_empty());
    }

    #[test]
    fn close_profit_and_loss_wording() {
        let win = Notification::position_closed(Quote::new(dec!(1.234)));
        assert_eq!(win.description, "Profit: +1.23");
        assert_eq!(win.severity, Severity::Info);

        let loss = Notification::position_closed(Quote::new(dec!(-5)));
        assert_eq!(loss.description, "Loss: -5.00");
        assert_eq!(loss.severity, Severity::Destructive);
    }

    #[test]
    fn trade_opened_wording() {
        let n = Notification::trade_opened(Direction::Long, Leverage::new(10).unwrap(), "AGI achieved by 2026");
        assert_eq!(n.description, "LONG 10x on \"AGI achieved by 2026\"");
    }

    #[test]
    fn registry_fans_out() {
        let a = Arc::new(NotificationCollector::new());
        let b = Arc::new(NotificationCollector::new());
        let mut registry = NotifierRegistry::new();
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(Arc::new(NullNotifier));

        registry.notify(Notification::amount_required());
        assert_eq!(a.notifications().len(), 1);
        assert_eq!(b.notifications().len(), 1);
    }

    #[test]
    fn channel_notifier_survives_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notification::amount_required());
    }
}
