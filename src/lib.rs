//! Wager Engine - persistent sessions for multi-step wagering games
//!
//! Players escrow a stake, play a grid-reveal, dice-reroll or timed-decay
//! game across any number of separate commands, and are paid out exactly once
//! when the session resolves. Sessions survive restarts in RocksDB.

pub mod casino;
pub mod clock;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod machine;
pub mod session_store;
pub mod storage;

pub use casino::{Casino, CasinoBuilder, Player, UserLocks};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigLoader, EngineConfig};
pub use errors::{WagerError, WagerResult};
pub use games::types::{GameKind, GameSession, SessionKey, SessionState};
pub use ledger::{Ledger, MemoryLedger, StorageLedger};
pub use machine::{Outcome, Resolution, SessionMachine};
pub use session_store::{GameStats, MemorySessionStore, RocksSessionStore, SessionStore};
pub use storage::OptimizedStorage;
