//! Balance and position bookkeeping.
//!
//! The ledger is the single writer of the trader's virtual balance and open
//! positions. Every mutator takes the write lock, builds the next state from
//! the current one, persists it, and only then swaps it in. Positions are an
//! immutable `Arc<Vec<_>>` replaced wholesale and addressed by id, so a close
//! racing another close (manual vs. liquidation) can never drop an update.
//!
//! Margin conservation: opening moves `amount` from the balance into the
//! position; closing removes the position and credits `amount + pnl`.

use crate::events::{Notification, Notifier};
use crate::position::{calculate_pnl, Position};
use crate::storage::{KeyValueStore, StoreError, BALANCE_KEY, POSITIONS_KEY};
use crate::types::{Direction, Leverage, MarketId, PositionId, Probability, Quote, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Failed to persist ledger state: {0}")]
    Persistence(#[from] StoreError),

    #[error("Stored {key} is corrupt: {reason}")]
    CorruptState { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct LedgerParams {
    pub starting_balance: Quote,
    pub recharge_amount: Quote,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            starting_balance: Quote::new(Decimal::TEN),
            recharge_amount: Quote::new(Decimal::TEN),
        }
    }
}

/// Everything a reader needs, taken at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub balance: Quote,
    pub positions: Arc<Vec<Position>>,
}

impl LedgerSnapshot {
    pub fn locked_margin(&self) -> Quote {
        self.positions.iter().map(|p| p.amount).sum()
    }

    pub fn unrealized_pnl(&self) -> Quote {
        self.positions.iter().map(|p| p.unrealized_pnl()).sum()
    }

    /// balance + margin, the conserved quantity
    pub fn capital(&self) -> Quote {
        self.balance.add(self.locked_margin())
    }

    pub fn equity(&self) -> Quote {
        self.capital().add(self.unrealized_pnl())
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| &p.id == id)
    }

    pub fn positions_on<'a>(&'a self, market_id: &'a MarketId) -> impl Iterator<Item = &'a Position> {
        self.positions.iter().filter(move |p| &p.market_id == market_id)
    }
}

/// What a close realised
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_prob: Probability,
    pub realized_pnl: Quote,
    pub credited: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Manual,
    Liquidation,
}

/// Open request, all fields validated by the caller
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub market_id: MarketId,
    pub market_title: String,
    pub amount: Quote,
    pub leverage: Leverage,
    pub direction: Direction,
    pub entry_prob: Probability,
}

pub struct Ledger {
    state: RwLock<LedgerSnapshot>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    params: LedgerParams,
    next_sequence: AtomicU64,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("state", &*self.state.read())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Restore from the store. Missing keys start a fresh wallet.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        params: LedgerParams,
    ) -> Result<Self, LedgerError> {
        let balance = match store.get(BALANCE_KEY)? {
            Some(text) => parse_balance(&text)?,
            None => params.starting_balance,
        };

        let positions: Vec<Position> = match store.get(POSITIONS_KEY)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| LedgerError::CorruptState {
                key: POSITIONS_KEY,
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };
        // markets never leave [1, 99]; anything lower would blow up the pnl division
        if let Some(bad) = positions
            .iter()
            .find(|p| p.entry_prob.value() < Probability::FLOOR || p.current_prob.value() < Probability::FLOOR)
        {
            return Err(LedgerError::CorruptState {
                key: POSITIONS_KEY,
                reason: format!("position {} has a probability below {}", bad.id, Probability::FLOOR),
            });
        }

        info!(
            balance = %balance,
            positions = positions.len(),
            "Ledger loaded"
        );

        Ok(Self {
            state: RwLock::new(LedgerSnapshot {
                balance,
                positions: Arc::new(positions),
            }),
            store,
            notifier,
            params,
            next_sequence: AtomicU64::new(1),
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().clone()
    }

    pub fn balance(&self) -> Quote {
        self.state.read().balance
    }

    pub fn positions(&self) -> Arc<Vec<Position>> {
        Arc::clone(&self.state.read().positions)
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn recharge(&self) -> Result<Quote, LedgerError> {
        let amount = self.params.recharge_amount;
        let new_balance = {
            let mut state = self.state.write();
            let new_balance = state.balance.add(amount);
            self.persist_balance(new_balance)?;
            state.balance = new_balance;
            new_balance
        };

        info!(amount = %amount, balance = %new_balance, "Recharged");
        self.notifier.notify(Notification::recharged(amount));
        Ok(new_balance)
    }

    pub fn open_position(&self, request: OpenRequest) -> Result<Position, LedgerError> {
        let position = {
            let mut state = self.state.write();

            if request.amount > state.balance {
                let available = state.balance;
                drop(state);
                self.notifier.notify(Notification::insufficient_balance(available));
                return Err(LedgerError::InsufficientBalance {
                    requested: request.amount,
                    available,
                });
            }

            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            let id = PositionId::generate(&request.market_id, Timestamp::now(), sequence);
            let position = Position::new(
                id,
                request.market_id,
                request.market_title,
                request.direction,
                request.leverage,
                request.amount,
                request.entry_prob,
            );

            let mut positions = Vec::with_capacity(state.positions.len() + 1);
            positions.extend(state.positions.iter().cloned());
            positions.push(position.clone());

            let next = LedgerSnapshot {
                balance: state.balance.sub(request.amount),
                positions: Arc::new(positions),
            };
            self.persist(&state, &next)?;
            *state = next;
            position
        };

        info!(
            id = %position.id,
            market = %position.market_id,
            direction = %position.direction,
            leverage = %position.leverage,
            amount = %position.amount,
            entry = %position.entry_prob,
            "Position opened"
        );
        self.notifier.notify(Notification::trade_opened(
            position.direction,
            position.leverage,
            &position.market_title,
        ));
        Ok(position)
    }

    /// Close by id at the position's last observed probability.
    /// Returns Ok(None) when the id is already gone.
    pub fn close_position(
        &self,
        position_id: &PositionId,
        reason: CloseReason,
    ) -> Result<Option<ClosedPosition>, LedgerError> {
        let closed = {
            let mut state = self.state.write();

            let Some(position) = state.position(position_id).cloned() else {
                debug!(id = %position_id, "close ignored, position not found");
                return Ok(None);
            };

            let pnl = calculate_pnl(
                position.amount,
                position.entry_prob,
                position.current_prob,
                position.direction,
                position.leverage,
            );
            let credited = position.amount.add(pnl);

            let remaining: Vec<Position> = state
                .positions
                .iter()
                .filter(|p| &p.id != position_id)
                .cloned()
                .collect();

            let next = LedgerSnapshot {
                balance: state.balance.add(credited),
                positions: Arc::new(remaining),
            };
            self.persist(&state, &next)?;
            let new_balance = next.balance;
            *state = next;

            ClosedPosition {
                exit_prob: position.current_prob,
                position,
                realized_pnl: pnl,
                credited,
                new_balance,
            }
        };

        info!(
            id = %closed.position.id,
            reason = ?reason,
            exit = %closed.exit_prob,
            pnl = %closed.realized_pnl,
            balance = %closed.new_balance,
            "Position closed"
        );
        if reason == CloseReason::Manual {
            self.notifier.notify(Notification::position_closed(closed.realized_pnl));
        }
        Ok(Some(closed))
    }

    /// Sync every position on `market_id` to `probability`. Returns how many changed.
    /// Writes nothing when nothing changes.
    pub fn update_current_prob(
        &self,
        market_id: &MarketId,
        probability: Probability,
    ) -> Result<usize, LedgerError> {
        let mut state = self.state.write();

        let changed = state
            .positions
            .iter()
            .filter(|p| &p.market_id == market_id && p.current_prob != probability)
            .count();
        if changed == 0 {
            return Ok(0);
        }

        let updated: Vec<Position> = state
            .positions
            .iter()
            .map(|p| {
                if &p.market_id == market_id {
                    p.with_current_prob(probability)
                } else {
                    p.clone()
                }
            })
            .collect();
        let updated = Arc::new(updated);

        self.persist_positions(&updated)?;
        state.positions = updated;
        Ok(changed)
    }

    // positions go first; a failed balance write puts the previous positions back
    // so the store never holds a new list next to an old balance
    fn persist(&self, prev: &LedgerSnapshot, next: &LedgerSnapshot) -> Result<(), LedgerError> {
        self.persist_positions(&next.positions)?;
        if let Err(e) = self.persist_balance(next.balance) {
            if let Err(rollback) = self.persist_positions(&prev.positions) {
                error!(error = %rollback, "positions rollback failed, stored ledger is torn");
            }
            return Err(e);
        }
        Ok(())
    }

    fn persist_balance(&self, balance: Quote) -> Result<(), LedgerError> {
        self.store
            .set(BALANCE_KEY, &balance.value().to_string())
            .map_err(|e| {
                error!(error = %e, "balance write failed, ledger state not committed");
                LedgerError::Persistence(e)
            })
    }

    fn persist_positions(&self, positions: &[Position]) -> Result<(), LedgerError> {
        let json = serde_json::to_string(positions).map_err(|e| LedgerError::CorruptState {
            key: POSITIONS_KEY,
            reason: e.to_string(),
        })?;
        self.store.set(POSITIONS_KEY, &json).map_err(|e| {
            error!(error = %e, "positions write failed, ledger state not committed");
            LedgerError::Persistence(e)
        })
    }
}

fn parse_balance(text: &str) -> Result<Quote, LedgerError> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map(Quote::new)
        .map_err(|e| LedgerError::CorruptState {
            key: BALANCE_KEY,
            reason: e.to_string(),
        })
}
