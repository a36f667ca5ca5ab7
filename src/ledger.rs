//! Player balances
//!
//! The engine only needs single-key get and set. Neither implementation offers
//! compare-and-swap, so callers serialize per user (see `casino::UserLocks`).

use crate::errors::{StorageError, WagerResult};
use crate::storage::OptimizedStorage;
use dashmap::DashMap;
use std::sync::Arc;

const BALANCE_PREFIX: &str = "balance:";

pub trait Ledger: Send + Sync {
    /// Current balance; unknown users have 0.
    fn balance(&self, user_id: &str) -> WagerResult<u64>;
    fn set_balance(&self, user_id: &str, amount: u64) -> WagerResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: DashMap<String, u64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn balance(&self, user_id: &str) -> WagerResult<u64> {
        Ok(self.balances.get(user_id).map(|b| *b).unwrap_or(0))
    }

    fn set_balance(&self, user_id: &str, amount: u64) -> WagerResult<()> {
        self.balances.insert(user_id.to_string(), amount);
        Ok(())
    }
}

/// Balances as little-endian u64 under `balance:<user>`
pub struct StorageLedger {
    storage: Arc<OptimizedStorage>,
}

impl StorageLedger {
    pub fn new(storage: Arc<OptimizedStorage>) -> Self {
        Self { storage }
    }

}

/// Storage key of a balance; shared with stores that write balances in the
/// same batch as session records.
pub(crate) fn balance_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", BALANCE_PREFIX, user_id).into_bytes()
}

impl Ledger for StorageLedger {
    fn balance(&self, user_id: &str) -> WagerResult<u64> {
        let Some(bytes) = self.storage.get(&balance_key(user_id))? else {
            return Ok(0);
        };
        let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            StorageError::CorruptedData(format!(
                "balance for {} has {} bytes, expected 8",
                user_id,
                bytes.len()
            ))
        })?;
        Ok(u64::from_le_bytes(raw))
    }

    fn set_balance(&self, user_id: &str, amount: u64) -> WagerResult<()> {
        self.storage.put(&balance_key(user_id), &amount.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WagerError;
    use tempfile::TempDir;

    #[test]
    fn test_memory_ledger() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.balance("nobody").unwrap(), 0);
        ledger.set_balance("alice", 100).unwrap();
        assert_eq!(ledger.balance("alice").unwrap(), 100);
    }

    #[test]
    fn test_storage_ledger_persists() {
        let dir = TempDir::new().unwrap();
        {
            let storage = Arc::new(OptimizedStorage::new(dir.path()).unwrap());
            let ledger = StorageLedger::new(storage);
            assert_eq!(ledger.balance("alice").unwrap(), 0);
            ledger.set_balance("alice", u64::MAX - 1).unwrap();
        }

        let storage = Arc::new(OptimizedStorage::new(dir.path()).unwrap());
        let ledger = StorageLedger::new(storage);
        assert_eq!(ledger.balance("alice").unwrap(), u64::MAX - 1);
    }

    #[test]
    fn test_storage_ledger_rejects_bad_width() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(OptimizedStorage::new(dir.path()).unwrap());
        storage.put(b"balance:bob", b"123").unwrap();

        let err = StorageLedger::new(storage).balance("bob").unwrap_err();
        assert!(matches!(err, WagerError::Storage(StorageError::CorruptedData(_))));
    }
}
