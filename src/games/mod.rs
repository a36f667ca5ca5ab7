pub mod board;
pub mod decay;
pub mod dice;
pub mod grid;
pub mod payout;
pub mod rng;
pub mod types;

pub use board::{Board, DecodeError};
pub use decay::{DecayState, Harvest, Progress, TimedDecayController, TreeView, Wither};
pub use dice::{DiceRerollController, DiceSettlement, DiceState, DiceView};
pub use grid::{GridFinish, GridRevealController, GridState, GridView, RevealOutcome};
pub use payout::{DiceCombo, Multiplier};
pub use rng::GameRng;
pub use types::*;
