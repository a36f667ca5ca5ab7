//! Durable session records keyed by (user, game kind).

use crate::errors::{StorageError, WagerError, WagerResult};
use crate::games::types::{GameKind, GameSession, SessionKey};
use crate::ledger::balance_key;
use crate::storage::{BatchOp, OptimizedStorage};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

const SESSION_PREFIX: &str = "session:";
const STATS_PREFIX: &str = "stats:";

/// Running totals per game kind
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub total_staked: u64,
    pub total_paid: u64,
    pub wins: u64,
    pub losses: u64,
}

impl GameStats {
    pub fn record_start(&mut self, stake: u64) {
        self.sessions_started += 1;
        self.total_staked = self.total_staked.saturating_add(stake);
    }

    pub fn record_finish(&mut self, stake: u64, payout: u64) {
        self.sessions_finished += 1;
        self.total_paid = self.total_paid.saturating_add(payout);
        if payout > stake {
            self.wins += 1;
        } else if payout == 0 {
            self.losses += 1;
        }
    }

    /// Paid out over staked, for finished and unfinished sessions alike.
    pub fn return_ratio(&self) -> f64 {
        if self.total_staked == 0 {
            return 0.0;
        }
        self.total_paid as f64 / self.total_staked as f64
    }
}

pub trait SessionStore: Send + Sync {
    fn save(&self, session: &GameSession) -> WagerResult<()>;
    fn load(&self, key: &SessionKey) -> WagerResult<Option<GameSession>>;
    fn delete(&self, key: &SessionKey) -> WagerResult<()>;
    /// Every stored session of one kind.
    fn list(&self, kind: GameKind) -> WagerResult<Vec<GameSession>>;
    fn stats(&self, kind: GameKind) -> WagerResult<GameStats>;
    fn put_stats(&self, kind: GameKind, stats: &GameStats) -> WagerResult<()>;

    /// Save `session` and set its owner's balance in one atomic write.
    ///
    /// Returns `false` without writing anything when the store does not hold
    /// the ledger; the caller then writes both sides separately.
    fn save_with_balance(&self, _session: &GameSession, _balance: u64) -> WagerResult<bool> {
        Ok(false)
    }

    /// Delete the session at `key` and set its owner's balance in one atomic
    /// write. Same contract as [`SessionStore::save_with_balance`].
    fn delete_with_balance(&self, _key: &SessionKey, _balance: u64) -> WagerResult<bool> {
        Ok(false)
    }
}

fn session_prefix(kind: GameKind) -> String {
    format!("{}{}:", SESSION_PREFIX, kind)
}

fn session_key(key: &SessionKey) -> Vec<u8> {
    format!("{}{}", session_prefix(key.kind), key.user_id).into_bytes()
}

fn stats_key(kind: GameKind) -> Vec<u8> {
    format!("{}{}", STATS_PREFIX, kind).into_bytes()
}

fn decode_session(bytes: &[u8]) -> WagerResult<GameSession> {
    serde_json::from_slice(bytes).map_err(|e| {
        WagerError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode session record: {}",
            e
        )))
    })
}

fn encode_session(session: &GameSession) -> WagerResult<Vec<u8>> {
    serde_json::to_vec(session).map_err(|e| {
        StorageError::WriteFailed(format!("Failed to encode session {}: {}", session.session_id, e)).into()
    })
}

/// RocksDB-backed store. All access goes through one gate, with a short fixed
/// pause before each acquisition.
pub struct RocksSessionStore {
    storage: Arc<OptimizedStorage>,
    gate: Mutex<()>,
    acquire_delay: Duration,
    /// Balances live in `storage` too (a `StorageLedger` on the same handle).
    holds_ledger: bool,
}

impl RocksSessionStore {
    pub fn new(storage: Arc<OptimizedStorage>, acquire_delay: Duration) -> Self {
        Self {
            storage,
            gate: Mutex::new(()),
            acquire_delay,
            holds_ledger: false,
        }
    }

    /// Declare that a `StorageLedger` shares this store's handle, so escrow
    /// and settlement commit session and balance in one batch.
    pub fn with_shared_ledger(mut self) -> Self {
        self.holds_ledger = true;
        self
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        if !self.acquire_delay.is_zero() {
            std::thread::sleep(self.acquire_delay);
        }
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for RocksSessionStore {
    fn save(&self, session: &GameSession) -> WagerResult<()> {
        let bytes = encode_session(session)?;
        let _gate = self.acquire();
        self.storage.put(&session_key(&session.key()), &bytes)?;
        trace!(key = %session.key(), bytes = bytes.len(), "session saved");
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> WagerResult<Option<GameSession>> {
        let bytes = {
            let _gate = self.acquire();
            self.storage.get(&session_key(key))?
        };
        bytes.map(|b| decode_session(&b)).transpose()
    }

    fn delete(&self, key: &SessionKey) -> WagerResult<()> {
        let _gate = self.acquire();
        self.storage.delete(&session_key(key))
    }

    fn list(&self, kind: GameKind) -> WagerResult<Vec<GameSession>> {
        let rows = {
            let _gate = self.acquire();
            self.storage.scan_prefix(session_prefix(kind).as_bytes())?
        };
        rows.iter().map(|(_, value)| decode_session(value)).collect()
    }

    fn stats(&self, kind: GameKind) -> WagerResult<GameStats> {
        let bytes = {
            let _gate = self.acquire();
            self.storage.get(&stats_key(kind))?
        };
        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::CorruptedData(format!("Failed to decode {} stats: {}", kind, e)).into()
            }),
            None => Ok(GameStats::default()),
        }
    }

    fn put_stats(&self, kind: GameKind, stats: &GameStats) -> WagerResult<()> {
        let bytes = serde_json::to_vec(stats)
            .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {} stats: {}", kind, e)))?;
        let _gate = self.acquire();
        self.storage.put(&stats_key(kind), &bytes)
    }

    fn save_with_balance(&self, session: &GameSession, balance: u64) -> WagerResult<bool> {
        if !self.holds_ledger {
            return Ok(false);
        }
        let bytes = encode_session(session)?;
        let _gate = self.acquire();
        self.storage.batch_write(&[
            BatchOp::Put(session_key(&session.key()), bytes),
            BatchOp::Put(balance_key(&session.user_id), balance.to_le_bytes().to_vec()),
        ])?;
        trace!(key = %session.key(), balance, "session saved with balance");
        Ok(true)
    }

    fn delete_with_balance(&self, key: &SessionKey, balance: u64) -> WagerResult<bool> {
        if !self.holds_ledger {
            return Ok(false);
        }
        let _gate = self.acquire();
        self.storage.batch_write(&[
            BatchOp::Delete(session_key(key)),
            BatchOp::Put(balance_key(&key.user_id), balance.to_le_bytes().to_vec()),
        ])?;
        trace!(%key, balance, "session deleted with balance");
        Ok(true)
    }
}

/// In-process store with the same semantics, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionKey, GameSession>,
    stats: DashMap<GameKind, GameStats>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &GameSession) -> WagerResult<()> {
        self.sessions.insert(session.key(), session.clone());
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> WagerResult<Option<GameSession>> {
        Ok(self.sessions.get(key).map(|s| s.clone()))
    }

    fn delete(&self, key: &SessionKey) -> WagerResult<()> {
        self.sessions.remove(key);
        Ok(())
    }

    fn list(&self, kind: GameKind) -> WagerResult<Vec<GameSession>> {
        let mut sessions: Vec<GameSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(sessions)
    }

    fn stats(&self, kind: GameKind) -> WagerResult<GameStats> {
        Ok(self.stats.get(&kind).map(|s| s.clone()).unwrap_or_default())
    }

    fn put_stats(&self, kind: GameKind, stats: &GameStats) -> WagerResult<()> {
        self.stats.insert(kind, stats.clone());
        Ok(())
    }
}
