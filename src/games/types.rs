use crate::errors::{ValidationError, WagerError};
use crate::games::{decay::DecayState, dice::DiceState, grid::GridState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stateful game kinds that keep a session between commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GameKind {
    #[serde(rename = "grid")]
    GridReveal,
    #[serde(rename = "dice")]
    DiceReroll,
    #[serde(rename = "tree")]
    TimedDecay,
}

impl GameKind {
    pub const ALL: [GameKind; 3] = [GameKind::GridReveal, GameKind::DiceReroll, GameKind::TimedDecay];

    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::GridReveal => "grid",
            GameKind::DiceReroll => "dice",
            GameKind::TimedDecay => "tree",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grid" | "mines" => Ok(GameKind::GridReveal),
            "dice" => Ok(GameKind::DiceReroll),
            "tree" | "decay" => Ok(GameKind::TimedDecay),
            other => Err(ValidationError::UnknownGameKind(other.to_string())),
        }
    }
}

/// Storage key: one session per user and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub kind: GameKind,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, kind: GameKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.user_id)
    }
}

/// Kind-specific session payload (discriminated union)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionState {
    Grid(GridState),
    Dice(DiceState),
    Tree(DecayState),
}

impl SessionState {
    pub fn kind(&self) -> GameKind {
        match self {
            SessionState::Grid(_) => GameKind::GridReveal,
            SessionState::Dice(_) => GameKind::DiceReroll,
            SessionState::Tree(_) => GameKind::TimedDecay,
        }
    }

    /// Apply a player action. Pure: no ledger or storage access.
    pub fn apply(&mut self, action: &SessionAction) -> Result<ActionEffect, WagerError> {
        match (self, action) {
            (SessionState::Grid(grid), SessionAction::Reveal { row, col }) => Ok(grid.reveal(*row, *col)?),
            (SessionState::Dice(dice), SessionAction::Reroll { replacements }) => dice.reroll(replacements),
            (state, _) => Err(ValidationError::WrongGameKind(state.kind()).into()),
        }
    }

    /// Whether the session must be forfeited once `elapsed_secs` have passed
    /// since creation. Only the timed-decay game expires.
    pub fn is_expired(&self, elapsed_secs: u64) -> bool {
        match self {
            SessionState::Tree(tree) => tree.is_withered(elapsed_secs),
            SessionState::Grid(_) | SessionState::Dice(_) => false,
        }
    }
}

/// A progress action against an active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Reveal the cell at zero-based `row`/`col`.
    Reveal { row: usize, col: usize },
    /// Replace dice: `(one-based index, new face)` pairs, rolled by the caller.
    Reroll { replacements: Vec<(usize, u8)> },
}

/// What an applied action did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEffect {
    /// Revealing an already revealed cell.
    Unchanged,
    SafeReveal { revealed: usize, cleared: bool },
    BombHit,
    Rerolled,
}

impl ActionEffect {
    /// The session must be resolved right away instead of persisted.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionEffect::BombHit | ActionEffect::SafeReveal { cleared: true, .. })
    }

    pub fn changed_state(self) -> bool {
        !matches!(self, ActionEffect::Unchanged)
    }
}

/// Durable record of one player's in-progress game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub stake: u64,
    pub state: SessionState,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub fn new(user_id: impl Into<String>, stake: u64, state: SessionState, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            stake,
            state,
            active: true,
            created_at,
        }
    }

    pub fn kind(&self) -> GameKind {
        self.state.kind()
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.user_id.clone(), self.kind())
    }

    /// Whole seconds since creation; clock skew backwards counts as zero.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    pub fn grid(&self) -> Result<&GridState, ValidationError> {
        match &self.state {
            SessionState::Grid(grid) => Ok(grid),
            other => Err(ValidationError::WrongGameKind(other.kind())),
        }
    }

    pub fn dice(&self) -> Result<&DiceState, ValidationError> {
        match &self.state {
            SessionState::Dice(dice) => Ok(dice),
            other => Err(ValidationError::WrongGameKind(other.kind())),
        }
    }

    pub fn tree(&self) -> Result<&DecayState, ValidationError> {
        match &self.state {
            SessionState::Tree(tree) => Ok(tree),
            other => Err(ValidationError::WrongGameKind(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::decay::Wither;

    #[test]
    fn test_game_kind_parsing() {
        assert_eq!("mines".parse::<GameKind>(), Ok(GameKind::GridReveal));
        assert_eq!("DICE".parse::<GameKind>(), Ok(GameKind::DiceReroll));
        assert_eq!("tree".parse::<GameKind>(), Ok(GameKind::TimedDecay));
        assert!(matches!(
            "slots".parse::<GameKind>(),
            Err(ValidationError::UnknownGameKind(_))
        ));
    }

    #[test]
    fn test_wrong_action_for_kind() {
        let mut state = SessionState::Dice(DiceState::new([1, 2, 3, 4, 5, 5]));
        let err = state.apply(&SessionAction::Reveal { row: 0, col: 0 }).unwrap_err();
        assert!(matches!(
            err,
            WagerError::Validation(ValidationError::WrongGameKind(GameKind::DiceReroll))
        ));
    }

    #[test]
    fn test_session_record_json() {
        let state = SessionState::Grid(GridState::new(3, &[0, 8]));
        let session = GameSession::new("alice", 25, state, Utc::now());

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains(r#""kind":"grid""#));
        assert!(json.contains(r#""bombs":"100\n000\n001""#));

        let back: GameSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.key(), SessionKey::new("alice", GameKind::GridReveal));
    }

    #[test]
    fn test_only_trees_expire() {
        let tree = SessionState::Tree(DecayState::new(vec![10; 6], Wither::AfterDeadline { deadline_secs: 100 }));
        assert!(!tree.is_expired(99));
        assert!(tree.is_expired(100));

        let dice = SessionState::Dice(DiceState::new([1, 1, 1, 1, 1, 1]));
        assert!(!dice.is_expired(u64::MAX));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let now = Utc::now();
        let session = GameSession::new("bob", 1, SessionState::Dice(DiceState::new([1; 6])), now);
        assert_eq!(session.elapsed_secs(now - chrono::Duration::seconds(30)), 0);
        assert_eq!(session.elapsed_secs(now + chrono::Duration::seconds(30)), 30);
    }
}
