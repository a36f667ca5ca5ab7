//! Error types for the wager engine
//!
//! Errors are grouped by how the caller should react: validation and state
//! errors are rejected before any mutation and can be shown to the player,
//! storage errors abort the current operation, and `Inconsistent` marks a
//! failed compensation that needs an operator.

use crate::games::board::DecodeError;
use crate::games::types::GameKind;

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum WagerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A partially applied escrow or settlement that could not be rolled back.
    #[error("Inconsistent session state: {0}")]
    Inconsistent(String),
}

/// Bad input, rejected before anything is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Stake must be between {min} and {max}, got {stake}")]
    InvalidStake { stake: u64, min: u64, max: u64 },

    #[error("Insufficient balance: have {balance}, need {stake}")]
    InsufficientBalance { balance: u64, stake: u64 },

    #[error("Cell ({row}, {col}) is outside a {size}x{size} grid")]
    InvalidIndex { row: usize, col: usize, size: usize },

    #[error("Die index {0} is outside 1..=6")]
    InvalidDieIndex(usize),

    #[error("No dice selected for reroll")]
    EmptyReroll,

    #[error("Grid size {size} is outside {min}..={max}")]
    InvalidGridSize { size: usize, min: usize, max: usize },

    #[error("Bomb count {bombs} must be between 1 and {max}")]
    InvalidBombCount { bombs: usize, max: usize },

    #[error("Die face {0} is outside 1..=6")]
    InvalidDieFace(u8),

    #[error("Action does not apply to a {0} session")]
    WrongGameKind(GameKind),

    #[error("Unknown game kind: {0}")]
    UnknownGameKind(String),
}

/// Request conflicts with the current session lifecycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("A {0} game is already in progress")]
    AlreadyActive(GameKind),

    #[error("No active {0} game")]
    NoActiveSession(GameKind),

    #[error("Dice have already been rerolled this game")]
    AlreadyRerolled,

    /// The session expired and was forfeited while being loaded.
    #[error("The {kind} game withered; stake of {stake} forfeited")]
    Withered { kind: GameKind, stake: u64 },
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl WagerError {
    /// Validation and state errors leave nothing half-done and can be retried
    /// by the player with a corrected command.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WagerError::Validation(_) | WagerError::State(_))
    }

    /// Short message suitable for echoing back into chat.
    pub fn user_message(&self) -> String {
        match self {
            WagerError::Validation(e) => e.to_string(),
            WagerError::State(e) => e.to_string(),
            WagerError::Storage(_) | WagerError::Configuration(_) | WagerError::Inconsistent(_) => {
                "Something went wrong on our side, please try again later".to_string()
            }
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for WagerError {
    fn from(e: rocksdb::Error) -> Self {
        WagerError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for WagerError {
    fn from(e: serde_json::Error) -> Self {
        WagerError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<std::io::Error> for WagerError {
    fn from(e: std::io::Error) -> Self {
        WagerError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<DecodeError> for WagerError {
    fn from(e: DecodeError) -> Self {
        WagerError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

pub type WagerResult<T> = Result<T, WagerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err: WagerError = ValidationError::InsufficientBalance { balance: 10, stake: 50 }.into();
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("have 10, need 50"));
    }

    #[test]
    fn test_recoverability() {
        let state: WagerError = StateError::AlreadyActive(GameKind::GridReveal).into();
        assert!(state.is_recoverable());

        let storage: WagerError = StorageError::WriteFailed("disk full".to_string()).into();
        assert!(!storage.is_recoverable());
        assert!(!WagerError::Inconsistent("paid twice".to_string()).is_recoverable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let storage: WagerError = StorageError::WriteFailed("/var/db/LOCK".to_string()).into();
        assert!(!storage.user_message().contains("LOCK"));

        let state: WagerError = StateError::NoActiveSession(GameKind::DiceReroll).into();
        assert_eq!(state.user_message(), "No active dice game");
    }

    #[test]
    fn test_error_source() {
        let err: WagerError = StateError::AlreadyRerolled.into();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_decode_error_is_corruption() {
        let err: WagerError = DecodeError::RowCount { expected: 5, found: 4 }.into();
        assert!(matches!(err, WagerError::Storage(StorageError::CorruptedData(_))));
    }
}
