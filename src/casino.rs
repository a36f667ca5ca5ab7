//! Service container wiring the engine together
//!
//! Everything shared (store, ledger, clock, rng, controllers) is built once
//! here and handed out by reference. Player commands go through [`Player`],
//! which holds that user's lock for as long as it lives.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::errors::{StateError, WagerError, WagerResult};
use crate::games::decay::{DecayState, Harvest, Progress, TimedDecayController, TreeView};
use crate::games::dice::{DiceRerollController, DiceSettlement, DiceView};
use crate::games::grid::{GridRevealController, GridView, RevealOutcome};
use crate::games::rng::GameRng;
use crate::games::types::GameKind;
use crate::ledger::{Ledger, MemoryLedger, StorageLedger};
use crate::machine::{Resolution, SessionMachine};
use crate::session_store::{GameStats, MemorySessionStore, RocksSessionStore, SessionStore};
use crate::storage::OptimizedStorage;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, info};

/// Per-user mutual exclusion for player commands
#[derive(Debug, Default)]
pub struct UserLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other command holds `user_id`, then hold it.
    pub fn acquire(&self, user_id: &str) -> UserGuard<'_> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while busy.contains(user_id) {
            busy = self.released.wait(busy).unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(user_id.to_string());
        UserGuard {
            locks: self,
            user_id: user_id.to_string(),
        }
    }

    /// Hold `user_id` if nobody else does, without waiting.
    pub fn try_acquire(&self, user_id: &str) -> Option<UserGuard<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(user_id.to_string()) {
            return None;
        }
        Some(UserGuard {
            locks: self,
            user_id: user_id.to_string(),
        })
    }

    pub fn is_held(&self, user_id: &str) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id)
    }
}

pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.locks.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.user_id);
        self.locks.released.notify_all();
    }
}

pub struct Casino {
    config: EngineConfig,
    ledger: Arc<dyn Ledger>,
    machine: Arc<SessionMachine>,
    grid: GridRevealController,
    dice: DiceRerollController,
    tree: TimedDecayController,
    locks: UserLocks,
}

impl Casino {
    /// RocksDB-backed casino under `config.storage.data_directory`.
    pub fn open(config: EngineConfig) -> WagerResult<Self> {
        CasinoBuilder::new(config).build()
    }

    pub fn in_memory(config: EngineConfig) -> WagerResult<Self> {
        CasinoBuilder::new(config)
            .with_store(Arc::new(MemorySessionStore::new()))
            .with_ledger(Arc::new(MemoryLedger::new()))
            .build()
    }

    pub fn builder(config: EngineConfig) -> CasinoBuilder {
        CasinoBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Take `user_id`'s lock for a sequence of commands.
    ///
    /// The lock is not re-entrant: asking for the same user again on a thread
    /// that still holds their `Player` blocks forever.
    pub fn player(&self, user_id: &str) -> Player<'_> {
        let guard = self.locks.acquire(user_id);
        Player {
            casino: self,
            user_id: user_id.to_string(),
            _guard: guard,
        }
    }

    /// Forfeit expired sessions of `kind`, one user lock at a time.
    ///
    /// Users busy with a command are skipped; their next load forfeits the
    /// session anyway.
    pub fn sweep(&self, kind: GameKind) -> WagerResult<Vec<Resolution>> {
        let mut swept = Vec::new();
        let mut skipped = 0usize;
        for session in self.machine.active_sessions(kind)? {
            let Some(_guard) = self.locks.try_acquire(&session.user_id) else {
                skipped += 1;
                continue;
            };
            if let Some(resolution) = self.machine.expire_if_due(&session.user_id, kind)? {
                swept.push(resolution);
            }
        }
        info!(%kind, count = swept.len(), skipped, "sweep finished");
        Ok(swept)
    }

    pub fn stats(&self) -> WagerResult<Vec<(GameKind, GameStats)>> {
        let mut all = Vec::with_capacity(GameKind::ALL.len());
        for kind in GameKind::ALL {
            all.push((kind, self.machine.stats(kind)?));
        }
        Ok(all)
    }
}

/// Commands for one user, serialized against every other `Player` for them
pub struct Player<'a> {
    casino: &'a Casino,
    user_id: String,
    _guard: UserGuard<'a>,
}

impl Player<'_> {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn balance(&self) -> WagerResult<u64> {
        self.casino.ledger.balance(&self.user_id)
    }

    pub fn set_balance(&self, amount: u64) -> WagerResult<()> {
        debug!(user = %self.user_id, amount, "balance set");
        self.casino.ledger.set_balance(&self.user_id, amount)
    }

    pub fn grid_start(&self, stake: u64, size: Option<usize>, bombs: usize) -> WagerResult<GridView> {
        self.casino.grid.start(&self.user_id, stake, size, bombs)
    }

    pub fn grid_reveal(&self, row: usize, col: usize) -> WagerResult<RevealOutcome> {
        self.casino.grid.reveal(&self.user_id, row, col)
    }

    pub fn grid_cash_out(&self) -> WagerResult<Resolution> {
        self.casino.grid.cash_out(&self.user_id)
    }

    pub fn grid_peek(&self) -> WagerResult<GridView> {
        self.casino.grid.peek(&self.user_id)
    }

    pub fn dice_start(&self, stake: u64) -> WagerResult<DiceView> {
        self.casino.dice.start(&self.user_id, stake)
    }

    pub fn dice_start_with_roll(&self, stake: u64, faces: [u8; 6]) -> WagerResult<DiceView> {
        self.casino.dice.start_with_roll(&self.user_id, stake, faces)
    }

    pub fn dice_reroll(&self, indices: &[usize]) -> WagerResult<DiceView> {
        self.casino.dice.reroll(&self.user_id, indices)
    }

    pub fn dice_stand(&self) -> WagerResult<DiceSettlement> {
        self.casino.dice.stand(&self.user_id)
    }

    pub fn dice_peek(&self) -> WagerResult<DiceView> {
        self.casino.dice.peek(&self.user_id)
    }

    pub fn tree_start(&self, stake: u64) -> WagerResult<TreeView> {
        self.casino.tree.start(&self.user_id, stake)
    }

    pub fn tree_start_with(&self, stake: u64, tree: DecayState) -> WagerResult<TreeView> {
        self.casino.tree.start_with(&self.user_id, stake, tree)
    }

    pub fn tree_check(&self) -> WagerResult<Progress> {
        self.casino.tree.check_progress(&self.user_id)
    }

    pub fn tree_cash_out(&self) -> WagerResult<Harvest> {
        self.casino.tree.cash_out(&self.user_id)
    }

    /// Whether the user has a live session of `kind`. Loading may forfeit
    /// an expired one.
    pub fn has_active(&self, kind: GameKind) -> WagerResult<bool> {
        match self.casino.machine.load(&self.user_id, kind) {
            Ok(_) => Ok(true),
            Err(WagerError::State(StateError::NoActiveSession(_) | StateError::Withered { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Builder for [`Casino`]; unset collaborators fall back to RocksDB and the
/// system clock.
pub struct CasinoBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn SessionStore>>,
    ledger: Option<Arc<dyn Ledger>>,
    clock: Option<Arc<dyn Clock>>,
    rng: Option<Arc<GameRng>>,
}

impl CasinoBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            ledger: None,
            clock: None,
            rng: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Override the clock (useful for testing)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the random source (useful for testing)
    pub fn with_rng(mut self, rng: Arc<GameRng>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> WagerResult<Casino> {
        let config = self.config;
        config.validate()?;

        let (store, ledger): (Arc<dyn SessionStore>, Arc<dyn Ledger>) = match (self.store, self.ledger) {
            (Some(store), Some(ledger)) => (store, ledger),
            (None, None) => {
                let storage = Arc::new(OptimizedStorage::new_with_config(&config.storage)?);
                let store: Arc<dyn SessionStore> =
                    Arc::new(RocksSessionStore::new(storage.clone(), config.storage.acquire_delay()).with_shared_ledger());
                let ledger: Arc<dyn Ledger> = Arc::new(StorageLedger::new(storage));
                (store, ledger)
            }
            (store, ledger) => {
                let storage = Arc::new(OptimizedStorage::new_with_config(&config.storage)?);
                let store: Arc<dyn SessionStore> = match store {
                    Some(store) => store,
                    None => Arc::new(RocksSessionStore::new(storage.clone(), config.storage.acquire_delay())),
                };
                let ledger: Arc<dyn Ledger> = match ledger {
                    Some(ledger) => ledger,
                    None => Arc::new(StorageLedger::new(storage)),
                };
                (store, ledger)
            }
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let rng = self.rng.unwrap_or_else(|| Arc::new(GameRng::from_entropy()));

        let machine = Arc::new(SessionMachine::new(store, ledger.clone(), clock, config.limits));

        Ok(Casino {
            grid: GridRevealController::new(machine.clone(), rng.clone(), config.grid.clone()),
            dice: DiceRerollController::new(machine.clone(), rng.clone()),
            tree: TimedDecayController::new(machine.clone(), rng, config.decay.clone()),
            config,
            ledger,
            machine,
            locks: UserLocks::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_user_locks_release_on_drop() {
        let locks = UserLocks::new();
        {
            let _guard = locks.acquire("alice");
            assert!(locks.is_held("alice"));
            assert!(!locks.is_held("bob"));
        }
        assert!(!locks.is_held("alice"));
    }

    #[test]
    fn test_user_locks_serialize_same_user() {
        let locks = Arc::new(UserLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (locks, inside, max_inside) = (locks.clone(), inside.clone(), max_inside.clone());
                thread::spawn(move || {
                    let _guard = locks.acquire("alice");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_try_acquire_does_not_wait() {
        let locks = UserLocks::new();
        let held = locks.acquire("alice");
        assert!(locks.try_acquire("alice").is_none());
        assert!(locks.try_acquire("bob").is_some());
        drop(held);
        assert!(locks.try_acquire("alice").is_some());
    }

    #[test]
    fn test_sweep_skips_busy_player() {
        use crate::clock::ManualClock;
        use crate::games::decay::Wither;

        let clock = Arc::new(ManualClock::default());
        let casino = Casino::builder(EngineConfig::testing())
            .with_store(Arc::new(MemorySessionStore::new()))
            .with_ledger(Arc::new(MemoryLedger::new()))
            .with_clock(clock.clone())
            .build()
            .unwrap();

        let player = casino.player("alice");
        player.set_balance(100).unwrap();
        player
            .tree_start_with(10, DecayState::new(vec![10; 6], Wither::AfterDeadline { deadline_secs: 100 }))
            .unwrap();
        clock.advance_secs(200);

        // the held player is skipped instead of deadlocking this thread
        assert!(casino.sweep(GameKind::TimedDecay).unwrap().is_empty());
        drop(player);

        let swept = casino.sweep(GameKind::TimedDecay).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].user_id, "alice");
    }

    #[test]
    fn test_in_memory_casino() {
        let casino = Casino::in_memory(EngineConfig::testing()).unwrap();
        let player = casino.player("alice");
        player.set_balance(100).unwrap();
        player.dice_start_with_roll(10, [2, 2, 2, 2, 2, 2]).unwrap();
        assert!(player.has_active(GameKind::DiceReroll).unwrap());

        let settlement = player.dice_stand().unwrap();
        assert_eq!(settlement.resolution.payout, 70);
        assert_eq!(player.balance().unwrap(), 160);
        assert!(!player.has_active(GameKind::DiceReroll).unwrap());

        let stats = casino.stats().unwrap();
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::testing();
        config.limits.min_stake = 0;
        assert!(matches!(
            Casino::in_memory(config),
            Err(WagerError::Configuration(_))
        ));
    }
}
