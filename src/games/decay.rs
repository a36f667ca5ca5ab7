//! Timed-decay (tree growth) game
//!
//! The stake grows through six phases of random length. Cashing out pays the
//! profit multiplier of the current phase, but every tree eventually withers
//! and forfeits the stake: most after a grace period past the last phase, a
//! few early at a stage fixed when the tree was planted.

use crate::config::DecayConfig;
use crate::errors::{StateError, WagerError, WagerResult};
use crate::games::payout::{self, Multiplier, DECAY_PROFIT_TABLE};
use crate::games::rng::GameRng;
use crate::games::types::{GameKind, SessionState};
use crate::machine::{Resolution, SessionMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const PHASE_COUNT: usize = DECAY_PROFIT_TABLE.len();

/// When a tree forfeits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Wither {
    /// Once `stage` phases have fully elapsed.
    AtStage { stage: usize },
    /// Once `deadline_secs` have elapsed since planting.
    AfterDeadline { deadline_secs: u64 },
}

/// Persisted decay payload. Generated once at start and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayState {
    pub phase_secs: Vec<u64>,
    pub wither: Wither,
}

impl DecayState {
    pub fn new(phase_secs: Vec<u64>, wither: Wither) -> Self {
        Self { phase_secs, wither }
    }

    pub fn total_secs(&self) -> u64 {
        self.phase_secs.iter().fold(0u64, |acc, d| acc.saturating_add(*d))
    }

    /// Number of phases fully elapsed.
    pub fn stage_at(&self, elapsed_secs: u64) -> usize {
        let mut boundary = 0u64;
        let mut stage = 0;
        for duration in &self.phase_secs {
            boundary = boundary.saturating_add(*duration);
            if elapsed_secs < boundary {
                break;
            }
            stage += 1;
        }
        stage
    }

    /// Index into the profit table, capped at the last phase.
    pub fn phase_at(&self, elapsed_secs: u64) -> usize {
        self.stage_at(elapsed_secs).min(PHASE_COUNT - 1)
    }

    pub fn is_withered(&self, elapsed_secs: u64) -> bool {
        match self.wither {
            Wither::AtStage { stage } => self.stage_at(elapsed_secs) >= stage,
            Wither::AfterDeadline { deadline_secs } => elapsed_secs >= deadline_secs,
        }
    }

    /// Seconds until the next phase boundary, if any remain.
    pub fn next_stage_in(&self, elapsed_secs: u64) -> Option<u64> {
        let stage = self.stage_at(elapsed_secs);
        if stage >= self.phase_secs.len() {
            return None;
        }
        let boundary = self.phase_secs[..=stage]
            .iter()
            .fold(0u64, |acc, d| acc.saturating_add(*d));
        Some(boundary.saturating_sub(elapsed_secs))
    }
}

/// Player-visible snapshot of a growing tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeView {
    pub stake: u64,
    pub elapsed_secs: u64,
    pub stage: usize,
    pub phase: usize,
    pub multiplier: Multiplier,
    pub cash_out_value: u64,
    pub next_stage_in_secs: Option<u64>,
}

impl TreeView {
    fn of(stake: u64, tree: &DecayState, elapsed_secs: u64) -> Self {
        let phase = tree.phase_at(elapsed_secs);
        let multiplier = payout::decay_multiplier(phase);
        Self {
            stake,
            elapsed_secs,
            stage: tree.stage_at(elapsed_secs),
            phase,
            multiplier,
            cash_out_value: multiplier.payout(stake),
            next_stage_in_secs: tree.next_stage_in(elapsed_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Growing(TreeView),
    /// The tree withered during this check and the stake was forfeited.
    Withered { stake: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Harvest {
    Collected { phase: usize, multiplier: Multiplier, resolution: Resolution },
    Withered { stake: u64 },
}

pub struct TimedDecayController {
    machine: Arc<SessionMachine>,
    rng: Arc<GameRng>,
    config: DecayConfig,
}

impl TimedDecayController {
    pub fn new(machine: Arc<SessionMachine>, rng: Arc<GameRng>, config: DecayConfig) -> Self {
        Self { machine, rng, config }
    }

    /// Draw phase lengths and the wither trigger for a new tree.
    pub fn plant(&self) -> DecayState {
        let phase_secs: Vec<u64> = (0..PHASE_COUNT)
            .map(|_| self.rng.between(self.config.min_phase_secs, self.config.max_phase_secs))
            .collect();

        let mut tree = DecayState::new(phase_secs, Wither::AtStage { stage: PHASE_COUNT });
        tree.wither = if self.rng.chance(self.config.wither_probability) {
            Wither::AtStage {
                stage: self.rng.between(1, PHASE_COUNT as u64) as usize,
            }
        } else {
            Wither::AfterDeadline {
                deadline_secs: tree.total_secs().saturating_add(self.config.grace_secs),
            }
        };
        tree
    }

    pub fn start(&self, user_id: &str, stake: u64) -> WagerResult<TreeView> {
        self.start_with(user_id, stake, self.plant())
    }

    /// Plant a tree with a known schedule, for replays and tests.
    pub fn start_with(&self, user_id: &str, stake: u64, tree: DecayState) -> WagerResult<TreeView> {
        let session = self.machine.start(user_id, stake, SessionState::Tree(tree))?;
        let wither = session.tree()?.wither;
        debug!(user = user_id, ?wither, "tree planted");
        Ok(TreeView::of(session.stake, session.tree()?, 0))
    }

    /// Report growth without touching the session, unless it has withered.
    pub fn check_progress(&self, user_id: &str) -> WagerResult<Progress> {
        let session = match self.machine.load(user_id, GameKind::TimedDecay) {
            Ok(session) => session,
            Err(WagerError::State(StateError::Withered { stake, .. })) => return Ok(Progress::Withered { stake }),
            Err(e) => return Err(e),
        };
        let elapsed = session.elapsed_secs(self.machine.now());
        Ok(Progress::Growing(TreeView::of(session.stake, session.tree()?, elapsed)))
    }

    pub fn cash_out(&self, user_id: &str) -> WagerResult<Harvest> {
        let session = match self.machine.load(user_id, GameKind::TimedDecay) {
            Ok(session) => session,
            Err(WagerError::State(StateError::Withered { stake, .. })) => return Ok(Harvest::Withered { stake }),
            Err(e) => return Err(e),
        };
        let elapsed = session.elapsed_secs(self.machine.now());
        let phase = session.tree()?.phase_at(elapsed);
        let multiplier = payout::decay_multiplier(phase);
        let payout = multiplier.payout(session.stake);
        let resolution = self.machine.resolve(session, payout)?;

        Ok(Harvest::Collected {
            phase,
            multiplier,
            resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(wither: Wither) -> DecayState {
        DecayState::new(vec![100, 200, 300, 400, 500, 600], wither)
    }

    #[test]
    fn test_stage_walk() {
        let t = tree(Wither::AfterDeadline { deadline_secs: 10_000 });
        assert_eq!(t.total_secs(), 2_100);
        assert_eq!(t.stage_at(0), 0);
        assert_eq!(t.stage_at(99), 0);
        assert_eq!(t.stage_at(100), 1);
        assert_eq!(t.stage_at(299), 1);
        assert_eq!(t.stage_at(300), 2);
        assert_eq!(t.stage_at(2_100), 6);
        assert_eq!(t.phase_at(2_100), 5);
        assert_eq!(t.phase_at(9_999), 5);
    }

    #[test]
    fn test_next_stage_in() {
        let t = tree(Wither::AfterDeadline { deadline_secs: 10_000 });
        assert_eq!(t.next_stage_in(0), Some(100));
        assert_eq!(t.next_stage_in(250), Some(50));
        assert_eq!(t.next_stage_in(2_100), None);
    }

    #[test]
    fn test_wither_after_deadline() {
        let t = tree(Wither::AfterDeadline { deadline_secs: 5_700 });
        assert!(!t.is_withered(5_699));
        assert!(t.is_withered(5_700));
    }

    #[test]
    fn test_wither_at_stage() {
        let t = tree(Wither::AtStage { stage: 3 });
        assert!(!t.is_withered(599));
        assert!(t.is_withered(600));
        assert!(t.is_withered(600_000));
    }

    #[test]
    fn test_plant_saturates_huge_durations() {
        use crate::clock::ManualClock;
        use crate::config::StakeLimits;
        use crate::ledger::MemoryLedger;
        use crate::session_store::MemorySessionStore;

        let machine = Arc::new(SessionMachine::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryLedger::new()),
            Arc::new(ManualClock::default()),
            StakeLimits::default(),
        ));
        let config = DecayConfig {
            min_phase_secs: u64::MAX / 4,
            max_phase_secs: u64::MAX / 2,
            grace_secs: u64::MAX,
            wither_probability: 0.0,
        };
        let planted = TimedDecayController::new(machine, Arc::new(GameRng::seeded(5)), config).plant();

        assert_eq!(planted.total_secs(), u64::MAX);
        assert_eq!(planted.wither, Wither::AfterDeadline { deadline_secs: u64::MAX });
        assert_eq!(planted.stage_at(u64::MAX / 4 - 1), 0);
    }

    #[test]
    fn test_wither_json_shape() {
        let json = serde_json::to_string(&Wither::AtStage { stage: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"at_stage","stage":2}"#);
    }
}
