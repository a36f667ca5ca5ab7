//! Grid-reveal (mines style) game
//!
//! Bombs are hidden on an N x N board. Every safe reveal raises the payout;
//! hitting a bomb loses the stake, clearing every safe cell wins outright.

use crate::config::GridConfig;
use crate::errors::{ValidationError, WagerResult};
use crate::games::board::{self, Board};
use crate::games::payout::{self, Multiplier};
use crate::games::rng::GameRng;
use crate::games::types::{ActionEffect, GameKind, GameSession, SessionAction, SessionState};
use crate::machine::{Resolution, SessionMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How a grid ended. Only persisted when settling it failed, so the next
/// command settles the same outcome instead of resuming play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridFinish {
    Exploded,
    Cleared,
}

/// Persisted grid payload. Bomb count is fixed at creation and
/// `revealed_count` only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    pub size: usize,
    pub bomb_count: usize,
    pub revealed_count: usize,
    #[serde(with = "board::text")]
    pub bombs: Board,
    #[serde(with = "board::text")]
    pub revealed: Board,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<GridFinish>,
}

impl GridState {
    /// Fresh grid with bombs at the given row-major indices.
    pub fn new(size: usize, bomb_cells: &[usize]) -> Self {
        let bombs = Board::with_cells(size, bomb_cells);
        Self {
            size,
            bomb_count: bombs.count(),
            revealed_count: 0,
            bombs,
            revealed: Board::new(size),
            finished: None,
        }
    }

    pub fn cells(&self) -> usize {
        self.size * self.size
    }

    pub fn safe_cells(&self) -> usize {
        self.cells().saturating_sub(self.bomb_count)
    }

    pub fn is_cleared(&self) -> bool {
        self.revealed_count == self.safe_cells()
    }

    pub fn reveal(&mut self, row: usize, col: usize) -> Result<ActionEffect, ValidationError> {
        let invalid = ValidationError::InvalidIndex {
            row,
            col,
            size: self.size,
        };
        let already = self.revealed.get(row, col).ok_or(invalid)?;
        if already || self.finished.is_some() {
            return Ok(ActionEffect::Unchanged);
        }

        self.revealed.set(row, col, true);
        if self.bombs.get(row, col) == Some(true) {
            self.finished = Some(GridFinish::Exploded);
            return Ok(ActionEffect::BombHit);
        }

        self.revealed_count += 1;
        let cleared = self.is_cleared();
        if cleared {
            self.finished = Some(GridFinish::Cleared);
        }
        Ok(ActionEffect::SafeReveal {
            revealed: self.revealed_count,
            cleared,
        })
    }
}

/// Player-visible snapshot of a grid session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridView {
    pub size: usize,
    pub bomb_count: usize,
    pub revealed_count: usize,
    pub revealed: Board,
    pub stake: u64,
    /// Set when the game is over but not yet paid out.
    pub finished: Option<GridFinish>,
    /// What `cash_out` would pay right now.
    pub cash_out_value: u64,
    /// What clearing the board would pay.
    pub win_value: u64,
}

/// Result of a reveal command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Safe(GridView),
    AlreadyRevealed(GridView),
    Bomb { bombs: Board, resolution: Resolution },
    Cleared { resolution: Resolution },
}

pub struct GridRevealController {
    machine: Arc<SessionMachine>,
    rng: Arc<GameRng>,
    config: GridConfig,
}

impl GridRevealController {
    pub fn new(machine: Arc<SessionMachine>, rng: Arc<GameRng>, config: GridConfig) -> Self {
        Self { machine, rng, config }
    }

    /// Open a game. `size` falls back to the configured default.
    pub fn start(&self, user_id: &str, stake: u64, size: Option<usize>, bomb_count: usize) -> WagerResult<GridView> {
        let size = size.unwrap_or(self.config.default_size);
        if size < self.config.min_size || size > self.config.max_size {
            return Err(ValidationError::InvalidGridSize {
                size,
                min: self.config.min_size,
                max: self.config.max_size,
            }
            .into());
        }
        let cells = size * size;
        if bomb_count == 0 || bomb_count >= cells {
            return Err(ValidationError::InvalidBombCount {
                bombs: bomb_count,
                max: cells - 1,
            }
            .into());
        }

        let layout = self.rng.sample_cells(cells, bomb_count);
        let session = self
            .machine
            .start(user_id, stake, SessionState::Grid(GridState::new(size, &layout)))?;
        debug!(user = user_id, size, bombs = bomb_count, "grid placed");

        Ok(self.view(session.stake, session.grid()?))
    }

    pub fn reveal(&self, user_id: &str, row: usize, col: usize) -> WagerResult<RevealOutcome> {
        let mut session = self.machine.load(user_id, GameKind::GridReveal)?;
        if let Some(finish) = session.grid()?.finished {
            debug!(user = user_id, ?finish, "settling finished grid");
            return self.conclude(session, finish);
        }

        let effect = self.machine.mutate(&mut session, &SessionAction::Reveal { row, col })?;
        match effect {
            ActionEffect::BombHit => self.conclude(session, GridFinish::Exploded),
            ActionEffect::SafeReveal { cleared: true, .. } => self.conclude(session, GridFinish::Cleared),
            ActionEffect::Unchanged => Ok(RevealOutcome::AlreadyRevealed(self.view(session.stake, session.grid()?))),
            _ => Ok(RevealOutcome::Safe(self.view(session.stake, session.grid()?))),
        }
    }

    /// Walk away with the current cash-out value. A finished grid pays what
    /// its outcome pays.
    pub fn cash_out(&self, user_id: &str) -> WagerResult<Resolution> {
        let session = self.machine.load(user_id, GameKind::GridReveal)?;
        let payout = self.settle_multiplier(session.grid()?).payout(session.stake);
        self.machine.resolve(session, payout)
    }

    pub fn peek(&self, user_id: &str) -> WagerResult<GridView> {
        let session = self.machine.load(user_id, GameKind::GridReveal)?;
        Ok(self.view(session.stake, session.grid()?))
    }

    pub fn win_multiplier(&self, grid: &GridState) -> Multiplier {
        payout::grid_win_multiplier(grid.cells(), grid.bomb_count, self.config.house_edge_bps)
    }

    pub fn cashout_multiplier(&self, grid: &GridState) -> Multiplier {
        payout::grid_cashout_multiplier(
            grid.cells(),
            grid.bomb_count,
            grid.revealed_count,
            self.config.house_edge_bps,
            self.config.cashout_penalty_bps,
        )
    }

    /// What settling the grid right now pays.
    fn settle_multiplier(&self, grid: &GridState) -> Multiplier {
        match grid.finished {
            Some(GridFinish::Exploded) => Multiplier::ZERO,
            Some(GridFinish::Cleared) => self.win_multiplier(grid),
            None => self.cashout_multiplier(grid),
        }
    }

    fn conclude(&self, session: GameSession, finish: GridFinish) -> WagerResult<RevealOutcome> {
        let grid = session.grid()?;
        let bombs = grid.bombs.clone();
        let payout = match finish {
            GridFinish::Exploded => 0,
            GridFinish::Cleared => self.win_multiplier(grid).payout(session.stake),
        };
        let resolution = self.machine.resolve(session, payout)?;
        Ok(match finish {
            GridFinish::Exploded => RevealOutcome::Bomb { bombs, resolution },
            GridFinish::Cleared => RevealOutcome::Cleared { resolution },
        })
    }

    fn view(&self, stake: u64, grid: &GridState) -> GridView {
        GridView {
            size: grid.size,
            bomb_count: grid.bomb_count,
            revealed_count: grid.revealed_count,
            revealed: grid.revealed.clone(),
            stake,
            finished: grid.finished,
            cash_out_value: self.settle_multiplier(grid).payout(stake),
            win_value: self.win_multiplier(grid).payout(stake),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_counts() {
        let grid = GridState::new(5, &[0, 6, 12, 18, 24]);
        assert_eq!(grid.bomb_count, 5);
        assert_eq!(grid.bombs.count(), 5);
        assert_eq!(grid.revealed_count, 0);
        assert_eq!(grid.revealed.count(), 0);
        assert_eq!(grid.safe_cells(), 20);
    }

    #[test]
    fn test_reveal_is_idempotent() {
        let mut grid = GridState::new(3, &[0]);
        assert_eq!(grid.reveal(1, 1), Ok(ActionEffect::SafeReveal { revealed: 1, cleared: false }));
        let before = grid.clone();
        assert_eq!(grid.reveal(1, 1), Ok(ActionEffect::Unchanged));
        assert_eq!(grid, before);
    }

    #[test]
    fn test_reveal_bomb_and_bounds() {
        let mut grid = GridState::new(3, &[4]);
        assert_eq!(grid.reveal(1, 1), Ok(ActionEffect::BombHit));
        assert_eq!(grid.revealed_count, 0);
        assert_eq!(grid.finished, Some(GridFinish::Exploded));
        // a finished grid takes no further reveals
        assert_eq!(grid.reveal(0, 0), Ok(ActionEffect::Unchanged));
        assert_eq!(grid.revealed_count, 0);
        assert_eq!(
            grid.reveal(3, 0),
            Err(ValidationError::InvalidIndex { row: 3, col: 0, size: 3 })
        );
    }

    #[test]
    fn test_clearing_flags_terminal() {
        let mut grid = GridState::new(2, &[0, 1, 2]);
        let effect = grid.reveal(1, 1).unwrap();
        assert_eq!(effect, ActionEffect::SafeReveal { revealed: 1, cleared: true });
        assert!(effect.is_terminal());
        assert_eq!(grid.finished, Some(GridFinish::Cleared));
    }

    #[test]
    fn test_corrupt_bomb_count_does_not_underflow() {
        let json = r#"{"size":2,"bomb_count":9,"revealed_count":0,"bombs":"11\n11","revealed":"00\n00"}"#;
        let grid: GridState = serde_json::from_str(json).unwrap();
        assert_eq!(grid.finished, None);
        assert_eq!(grid.safe_cells(), 0);
        assert!(grid.is_cleared());
    }
}
