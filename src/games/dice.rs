//! Dice-reroll game
//!
//! Six dice are rolled on start. The player may reroll any subset once, then
//! stands on the best combination showing.

use crate::errors::{StateError, ValidationError, WagerError, WagerResult};
use crate::games::payout::{DiceCombo, Multiplier};
use crate::games::rng::GameRng;
use crate::games::types::{ActionEffect, GameKind, SessionAction, SessionState};
use crate::machine::{Resolution, SessionMachine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceState {
    pub faces: [u8; 6],
    pub rerolled: bool,
}

impl DiceState {
    pub fn new(faces: [u8; 6]) -> Self {
        Self { faces, rerolled: false }
    }

    pub fn combo(&self) -> DiceCombo {
        DiceCombo::classify(&self.faces)
    }

    pub fn multiplier(&self) -> Multiplier {
        self.combo().multiplier()
    }

    pub fn reroll(&mut self, replacements: &[(usize, u8)]) -> Result<ActionEffect, WagerError> {
        if self.rerolled {
            return Err(StateError::AlreadyRerolled.into());
        }
        if replacements.is_empty() {
            return Err(ValidationError::EmptyReroll.into());
        }
        for &(index, face) in replacements {
            if !(1..=6).contains(&index) {
                return Err(ValidationError::InvalidDieIndex(index).into());
            }
            if !(1..=6).contains(&face) {
                return Err(ValidationError::InvalidDieFace(face).into());
            }
        }

        for &(index, face) in replacements {
            self.faces[index - 1] = face;
        }
        self.rerolled = true;
        Ok(ActionEffect::Rerolled)
    }
}

fn check_faces(faces: &[u8; 6]) -> Result<(), ValidationError> {
    match faces.iter().find(|f| !(1..=6).contains(*f)) {
        Some(bad) => Err(ValidationError::InvalidDieFace(*bad)),
        None => Ok(()),
    }
}

/// Player-visible snapshot of a dice session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceView {
    pub faces: [u8; 6],
    pub combo: DiceCombo,
    pub multiplier: Multiplier,
    pub stake: u64,
    pub potential_payout: u64,
    pub rerolled: bool,
}

impl DiceView {
    fn of(stake: u64, dice: &DiceState) -> Self {
        let multiplier = dice.multiplier();
        Self {
            faces: dice.faces,
            combo: dice.combo(),
            multiplier,
            stake,
            potential_payout: multiplier.payout(stake),
            rerolled: dice.rerolled,
        }
    }
}

/// Final hand and settlement from `stand`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceSettlement {
    pub faces: [u8; 6],
    pub combo: DiceCombo,
    pub resolution: Resolution,
}

pub struct DiceRerollController {
    machine: Arc<SessionMachine>,
    rng: Arc<GameRng>,
}

impl DiceRerollController {
    pub fn new(machine: Arc<SessionMachine>, rng: Arc<GameRng>) -> Self {
        Self { machine, rng }
    }

    pub fn start(&self, user_id: &str, stake: u64) -> WagerResult<DiceView> {
        let faces = self.rng.roll_dice();
        self.start_with_roll(user_id, stake, faces)
    }

    /// Open a session on a known roll, for replays and tests.
    pub fn start_with_roll(&self, user_id: &str, stake: u64, faces: [u8; 6]) -> WagerResult<DiceView> {
        check_faces(&faces)?;
        let session = self
            .machine
            .start(user_id, stake, SessionState::Dice(DiceState::new(faces)))?;
        Ok(DiceView::of(session.stake, session.dice()?))
    }

    /// Reroll the dice at the given one-based positions. Duplicates count once.
    pub fn reroll(&self, user_id: &str, indices: &[usize]) -> WagerResult<DiceView> {
        if indices.is_empty() {
            return Err(ValidationError::EmptyReroll.into());
        }
        if let Some(bad) = indices.iter().find(|i| !(1..=6).contains(*i)) {
            return Err(ValidationError::InvalidDieIndex(*bad).into());
        }

        let mut session = self.machine.load(user_id, GameKind::DiceReroll)?;
        if session.dice()?.rerolled {
            return Err(StateError::AlreadyRerolled.into());
        }

        let selected: BTreeSet<usize> = indices.iter().copied().collect();
        let replacements = selected.into_iter().map(|i| (i, self.rng.roll_die())).collect();
        self.machine
            .mutate(&mut session, &SessionAction::Reroll { replacements })?;

        Ok(DiceView::of(session.stake, session.dice()?))
    }

    /// Settle on the current dice.
    pub fn stand(&self, user_id: &str) -> WagerResult<DiceSettlement> {
        let session = self.machine.load(user_id, GameKind::DiceReroll)?;
        let dice = session.dice()?.clone();
        let payout = dice.multiplier().payout(session.stake);
        let resolution = self.machine.resolve(session, payout)?;

        Ok(DiceSettlement {
            faces: dice.faces,
            combo: dice.combo(),
            resolution,
        })
    }

    pub fn peek(&self, user_id: &str) -> WagerResult<DiceView> {
        let session = self.machine.load(user_id, GameKind::DiceReroll)?;
        Ok(DiceView::of(session.stake, session.dice()?))
    }
}
