//! Session state machine
//!
//! Owns the lifecycle `NONE -> ACTIVE -> RESOLVED` shared by every stateful
//! game. Controllers decide payouts; this module decides ordering:
//!
//! * `start` validates, persists the record, then debits the stake. A failed
//!   debit deletes the record again.
//! * `resolve` deletes the record, then credits the payout. A failed credit
//!   restores the record.
//!
//! If a compensation step fails too, the operation returns
//! [`WagerError::Inconsistent`]. Stores that hold the ledger themselves
//! commit record and balance in one write, and no compensation is needed.

use crate::clock::Clock;
use crate::config::StakeLimits;
use crate::errors::{StateError, ValidationError, WagerError, WagerResult};
use crate::games::types::{ActionEffect, GameKind, GameSession, SessionAction, SessionKey, SessionState};
use crate::ledger::Ledger;
use crate::session_store::{GameStats, SessionStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a resolved session ended, relative to its stake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Paid more than the stake.
    Won,
    /// Paid something, but no more than the stake.
    PartialReturn,
    Lost,
    /// Forfeited on expiry.
    Withered,
}

impl Outcome {
    fn of(stake: u64, payout: u64) -> Self {
        if payout > stake {
            Outcome::Won
        } else if payout > 0 {
            Outcome::PartialReturn
        } else {
            Outcome::Lost
        }
    }
}

/// Settlement receipt for a resolved session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub session_id: Uuid,
    pub user_id: String,
    pub kind: GameKind,
    pub stake: u64,
    pub payout: u64,
    /// Ledger balance after the credit.
    pub balance: u64,
    pub outcome: Outcome,
}

pub struct SessionMachine {
    store: Arc<dyn SessionStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    limits: StakeLimits,
}

impl SessionMachine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        limits: StakeLimits,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            limits,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Escrow `stake` and open a session with `state`.
    pub fn start(&self, user_id: &str, stake: u64, state: SessionState) -> WagerResult<GameSession> {
        if !self.limits.allows(stake) {
            return Err(ValidationError::InvalidStake {
                stake,
                min: self.limits.min_stake,
                max: self.limits.max_stake,
            }
            .into());
        }

        let kind = state.kind();
        let key = SessionKey::new(user_id, kind);
        if let Some(existing) = self.store.load(&key)? {
            let elapsed = existing.elapsed_secs(self.now());
            if !existing.state.is_expired(elapsed) {
                return Err(StateError::AlreadyActive(kind).into());
            }
            self.force_expire(existing)?;
        }

        let balance = self.ledger.balance(user_id)?;
        if balance < stake {
            return Err(ValidationError::InsufficientBalance { balance, stake }.into());
        }

        let session = GameSession::new(user_id, stake, state, self.now());
        if self.store.save_with_balance(&session, balance - stake)? {
            return Ok(self.started(session));
        }
        self.store.save(&session)?;

        if let Err(debit_err) = self.ledger.set_balance(user_id, balance - stake) {
            warn!(user = user_id, %kind, session_id = %session.session_id, error = %debit_err, "debit failed, removing session");
            if let Err(delete_err) = self.store.delete(&key) {
                error!(user = user_id, %kind, session_id = %session.session_id, error = %delete_err, "could not remove unpaid session");
                return Err(WagerError::Inconsistent(format!(
                    "session {} persisted without its stake being debited: {}",
                    session.session_id, delete_err
                )));
            }
            return Err(debit_err);
        }

        Ok(self.started(session))
    }

    fn started(&self, session: GameSession) -> GameSession {
        let (kind, stake) = (session.kind(), session.stake);
        self.update_stats(kind, |stats| stats.record_start(stake));
        info!(user = %session.user_id, %kind, stake, session_id = %session.session_id, "session started");
        session
    }

    /// Load the active session, forfeiting it first if it has expired.
    pub fn load(&self, user_id: &str, kind: GameKind) -> WagerResult<GameSession> {
        let key = SessionKey::new(user_id, kind);
        let session = match self.store.load(&key)? {
            Some(session) if session.active => session,
            _ => return Err(StateError::NoActiveSession(kind).into()),
        };

        let elapsed = session.elapsed_secs(self.now());
        if session.state.is_expired(elapsed) {
            let stake = session.stake;
            self.force_expire(session)?;
            return Err(StateError::Withered { kind, stake }.into());
        }

        Ok(session)
    }

    /// Apply a player action. Never touches the ledger.
    ///
    /// The record is rewritten only when the action changed it and did not
    /// end the game; terminal effects are left for the caller to `resolve`.
    pub fn mutate(&self, session: &mut GameSession, action: &SessionAction) -> WagerResult<ActionEffect> {
        if !session.active {
            return Err(StateError::NoActiveSession(session.kind()).into());
        }

        let mut next = session.state.clone();
        let effect = next.apply(action)?;
        session.state = next;

        if effect.changed_state() && !effect.is_terminal() {
            self.store.save(session)?;
        }
        debug!(user = %session.user_id, kind = %session.kind(), ?effect, "session mutated");
        Ok(effect)
    }

    /// Close the session and credit `payout` (0 for a loss).
    pub fn resolve(&self, session: GameSession, payout: u64) -> WagerResult<Resolution> {
        let outcome = Outcome::of(session.stake, payout);
        self.settle(session, payout, outcome)
    }

    /// Forfeit the session: payout 0, record removed.
    pub fn force_expire(&self, session: GameSession) -> WagerResult<Resolution> {
        info!(user = %session.user_id, kind = %session.kind(), stake = session.stake, session_id = %session.session_id, "session expired");
        self.settle(session, 0, Outcome::Withered)
    }

    fn settle(&self, mut session: GameSession, payout: u64, outcome: Outcome) -> WagerResult<Resolution> {
        if !session.active {
            return Err(StateError::NoActiveSession(session.kind()).into());
        }
        let key = session.key();
        // A stale handle must not pay out a second time.
        match self.store.load(&key)? {
            Some(stored) if stored.session_id == session.session_id => {}
            _ => return Err(StateError::NoActiveSession(key.kind).into()),
        }
        let balance = self.ledger.balance(&session.user_id)?.saturating_add(payout);

        if !self.store.delete_with_balance(&key, balance)? {
            self.store.delete(&key)?;
            // The restored record keeps any terminal state the caller applied,
            // so a retry settles the same outcome.
            if let Err(credit_err) = self.ledger.set_balance(&session.user_id, balance) {
                warn!(user = %session.user_id, kind = %key.kind, payout, error = %credit_err, "credit failed, restoring session");
                if let Err(restore_err) = self.store.save(&session) {
                    error!(user = %session.user_id, kind = %key.kind, session_id = %session.session_id, payout, error = %restore_err, "session lost without payout");
                    return Err(WagerError::Inconsistent(format!(
                        "session {} deleted but payout {} not credited: {}",
                        session.session_id, payout, restore_err
                    )));
                }
                return Err(credit_err);
            }
        }

        session.active = false;
        self.update_stats(key.kind, |stats| stats.record_finish(session.stake, payout));
        info!(user = %session.user_id, kind = %key.kind, stake = session.stake, payout, ?outcome, session_id = %session.session_id, "session resolved");

        Ok(Resolution {
            session_id: session.session_id,
            user_id: session.user_id,
            kind: key.kind,
            stake: session.stake,
            payout,
            balance,
            outcome,
        })
    }

    pub fn active_sessions(&self, kind: GameKind) -> WagerResult<Vec<GameSession>> {
        Ok(self.store.list(kind)?.into_iter().filter(|s| s.active).collect())
    }

    /// Forfeit the user's session of `kind` if it has expired.
    pub fn expire_if_due(&self, user_id: &str, kind: GameKind) -> WagerResult<Option<Resolution>> {
        match self.store.load(&SessionKey::new(user_id, kind))? {
            Some(session) if session.active && session.state.is_expired(session.elapsed_secs(self.now())) => {
                self.force_expire(session).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Forfeit every expired session of `kind`.
    pub fn sweep_expired(&self, kind: GameKind) -> WagerResult<Vec<Resolution>> {
        let mut swept = Vec::new();
        for session in self.active_sessions(kind)? {
            if let Some(resolution) = self.expire_if_due(&session.user_id, kind)? {
                swept.push(resolution);
            }
        }
        if !swept.is_empty() {
            info!(%kind, count = swept.len(), "expired sessions swept");
        }
        Ok(swept)
    }

    pub fn stats(&self, kind: GameKind) -> WagerResult<GameStats> {
        self.store.stats(kind)
    }

    fn update_stats(&self, kind: GameKind, apply: impl FnOnce(&mut GameStats)) {
        let result = self.store.stats(kind).and_then(|mut stats| {
            apply(&mut stats);
            self.store.put_stats(kind, &stats)
        });
        if let Err(e) = result {
            warn!(%kind, error = %e, "stats update failed");
        }
    }
}
