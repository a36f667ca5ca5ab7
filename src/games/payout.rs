//! Payout calculators
//!
//! Pure functions from game state to a multiplier. Multipliers are fixed
//! point in basis points so payouts stay integral and deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BPS_SCALE: u64 = 10_000;

/// Stake multiplier in basis points (10_000 = 1x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Multiplier(u64);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(BPS_SCALE);

    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Total return for a stake, rounded down.
    pub fn payout(self, stake: u64) -> u64 {
        let raw = stake as u128 * self.0 as u128 / BPS_SCALE as u128;
        u64::try_from(raw).unwrap_or(u64::MAX)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / BPS_SCALE as f64
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

// ============================================================================
// Dice reroll
// ============================================================================

/// Ranked combinations of six dice, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceCombo {
    SixOfAKind,
    Straight,
    FiveOfAKind,
    ThreePairs,
    FourAndPair,
    TwoTriples,
    FourOfAKind,
    TripleAndPair,
    Triple,
    Nothing,
}

impl DiceCombo {
    /// Classify six faces by their multiset of counts.
    pub fn classify(faces: &[u8; 6]) -> Self {
        let mut counts = [0u8; 7];
        for &face in faces {
            counts[(face as usize).min(6)] += 1;
        }
        let mut groups: Vec<u8> = counts[1..].iter().copied().filter(|c| *c > 0).collect();
        groups.sort_unstable_by(|a, b| b.cmp(a));

        match groups.as_slice() {
            [6] => DiceCombo::SixOfAKind,
            [1, 1, 1, 1, 1, 1] => DiceCombo::Straight,
            [5, 1] => DiceCombo::FiveOfAKind,
            [2, 2, 2] => DiceCombo::ThreePairs,
            [4, 2] => DiceCombo::FourAndPair,
            [3, 3] => DiceCombo::TwoTriples,
            [4, 1, 1] => DiceCombo::FourOfAKind,
            [3, 2, 1] => DiceCombo::TripleAndPair,
            [3, 1, 1, 1] => DiceCombo::Triple,
            _ => DiceCombo::Nothing,
        }
    }

    pub fn multiplier(self) -> Multiplier {
        match self {
            DiceCombo::SixOfAKind | DiceCombo::Straight => Multiplier::from_bps(70_000),
            DiceCombo::FiveOfAKind | DiceCombo::ThreePairs => Multiplier::from_bps(30_000),
            DiceCombo::FourAndPair => Multiplier::from_bps(20_000),
            DiceCombo::TwoTriples | DiceCombo::FourOfAKind => Multiplier::from_bps(15_000),
            DiceCombo::TripleAndPair => Multiplier::from_bps(4_000),
            DiceCombo::Triple => Multiplier::from_bps(2_000),
            DiceCombo::Nothing => Multiplier::ZERO,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiceCombo::SixOfAKind => "six of a kind",
            DiceCombo::Straight => "straight",
            DiceCombo::FiveOfAKind => "five of a kind",
            DiceCombo::ThreePairs => "three pairs",
            DiceCombo::FourAndPair => "four of a kind and a pair",
            DiceCombo::TwoTriples => "two triples",
            DiceCombo::FourOfAKind => "four of a kind",
            DiceCombo::TripleAndPair => "triple and a pair",
            DiceCombo::Triple => "triple",
            DiceCombo::Nothing => "nothing",
        }
    }
}

pub fn dice_multiplier(faces: &[u8; 6]) -> Multiplier {
    DiceCombo::classify(faces).multiplier()
}

// ============================================================================
// Timed decay
// ============================================================================

/// Profit multiplier by current growth phase
pub const DECAY_PROFIT_TABLE: [Multiplier; 6] = [
    Multiplier::from_bps(5_000),
    Multiplier::from_bps(11_000),
    Multiplier::from_bps(12_000),
    Multiplier::from_bps(14_000),
    Multiplier::from_bps(17_000),
    Multiplier::from_bps(20_000),
];

/// Phases past the end of the table pay the last entry.
pub fn decay_multiplier(phase: usize) -> Multiplier {
    DECAY_PROFIT_TABLE[phase.min(DECAY_PROFIT_TABLE.len() - 1)]
}

// ============================================================================
// Grid reveal
// ============================================================================

fn binomial(n: u64, k: u64) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // Each intermediate value is itself a binomial coefficient, so the
        // division is exact.
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    acc
}

/// Odds-based multiplier after `revealed` safe picks, less the house edge.
///
/// The fair multiplier is `C(cells, revealed) / C(cells - bombs, revealed)`,
/// the inverse probability of surviving that many picks. It grows with both
/// `bombs` and `revealed`.
pub fn grid_progress_multiplier(cells: usize, bombs: usize, revealed: usize, house_edge_bps: u64) -> Multiplier {
    let safe = cells.saturating_sub(bombs);
    let revealed = revealed.min(safe);
    let numerator = binomial(cells as u64, revealed as u64);
    let denominator = binomial(safe as u64, revealed as u64).max(1);
    let keep = BPS_SCALE.saturating_sub(house_edge_bps) as u128;
    let bps = numerator.saturating_mul(keep) / denominator;
    Multiplier(u64::try_from(bps).unwrap_or(u64::MAX))
}

/// Multiplier paid when every safe cell has been revealed.
pub fn grid_win_multiplier(cells: usize, bombs: usize, house_edge_bps: u64) -> Multiplier {
    grid_progress_multiplier(cells, bombs, cells.saturating_sub(bombs), house_edge_bps)
}

/// Multiplier paid for walking away early: the progress multiplier reduced
/// by `cashout_penalty_bps`, so stopping always pays less than the same
/// progress would be worth on the way to a full clear.
pub fn grid_cashout_multiplier(
    cells: usize,
    bombs: usize,
    revealed: usize,
    house_edge_bps: u64,
    cashout_penalty_bps: u64,
) -> Multiplier {
    let progress = grid_progress_multiplier(cells, bombs, revealed, house_edge_bps);
    let keep = BPS_SCALE.saturating_sub(cashout_penalty_bps);
    Multiplier(progress.0 / BPS_SCALE * keep + progress.0 % BPS_SCALE * keep / BPS_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combo(faces: [u8; 6]) -> DiceCombo {
        DiceCombo::classify(&faces)
    }

    #[test]
    fn test_dice_table() {
        assert_eq!(combo([4, 4, 4, 4, 4, 4]), DiceCombo::SixOfAKind);
        assert_eq!(combo([6, 1, 5, 2, 4, 3]), DiceCombo::Straight);
        assert_eq!(combo([2, 2, 2, 2, 2, 5]), DiceCombo::FiveOfAKind);
        assert_eq!(combo([1, 1, 3, 3, 6, 6]), DiceCombo::ThreePairs);
        assert_eq!(combo([5, 5, 5, 5, 1, 1]), DiceCombo::FourAndPair);
        assert_eq!(combo([2, 2, 2, 6, 6, 6]), DiceCombo::TwoTriples);
        assert_eq!(combo([3, 3, 3, 3, 1, 2]), DiceCombo::FourOfAKind);
        assert_eq!(combo([1, 1, 1, 2, 2, 3]), DiceCombo::TripleAndPair);
        assert_eq!(combo([1, 1, 1, 2, 4, 3]), DiceCombo::Triple);
        assert_eq!(combo([1, 1, 2, 2, 3, 4]), DiceCombo::Nothing);
        assert_eq!(combo([1, 1, 2, 3, 4, 5]), DiceCombo::Nothing);
    }

    #[test]
    fn test_dice_multipliers() {
        assert_eq!(dice_multiplier(&[4, 4, 4, 4, 4, 4]).to_string(), "7x");
        assert_eq!(dice_multiplier(&[1, 2, 3, 4, 5, 6]).to_string(), "7x");
        assert_eq!(dice_multiplier(&[1, 1, 3, 3, 6, 6]).to_string(), "3x");
        assert_eq!(dice_multiplier(&[5, 5, 5, 5, 1, 1]).to_string(), "2x");
        assert_eq!(dice_multiplier(&[2, 2, 2, 6, 6, 6]).to_string(), "1.5x");
        assert_eq!(dice_multiplier(&[1, 1, 1, 2, 2, 3]).to_string(), "0.4x");
        assert_eq!(dice_multiplier(&[1, 1, 1, 2, 4, 3]).to_string(), "0.2x");
        assert_eq!(dice_multiplier(&[1, 1, 2, 2, 3, 4]), Multiplier::ZERO);
    }

    #[test]
    fn test_payout_rounds_down() {
        assert_eq!(Multiplier::from_bps(15_000).payout(10), 15);
        assert_eq!(Multiplier::from_bps(2_000).payout(7), 1);
        assert_eq!(Multiplier::ZERO.payout(1_000), 0);
        assert_eq!(Multiplier::from_bps(u64::MAX).payout(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_decay_table() {
        let table: Vec<String> = (0..6).map(|p| decay_multiplier(p).to_string()).collect();
        assert_eq!(table, ["0.5x", "1.1x", "1.2x", "1.4x", "1.7x", "2x"]);
        assert_eq!(decay_multiplier(9), decay_multiplier(5));
        assert!(DECAY_PROFIT_TABLE.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(25, 5), 53_130);
        assert_eq!(binomial(36, 18), 9_075_135_300);
        assert_eq!(binomial(4, 0), 1);
        assert_eq!(binomial(3, 4), 0);
    }

    #[test]
    fn test_grid_win_multiplier() {
        // C(25, 5) with a 3% edge
        assert_eq!(grid_win_multiplier(25, 5, 300).bps(), 53_130 * 9_700);
        // One bomb among four cells: survive three picks with odds 4x
        assert_eq!(grid_win_multiplier(4, 1, 0), Multiplier::from_bps(40_000));
    }

    #[test]
    fn test_grid_multiplier_grows_with_risk() {
        let low = grid_progress_multiplier(25, 1, 3, 300);
        let high = grid_progress_multiplier(25, 10, 3, 300);
        assert!(high > low);

        let progress: Vec<Multiplier> = (0..=20).map(|k| grid_progress_multiplier(25, 5, k, 300)).collect();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_grid_cashout_below_win() {
        let win = grid_win_multiplier(25, 5, 300);
        let mut previous = Multiplier::ZERO;
        for revealed in 0..20 {
            let cashout = grid_cashout_multiplier(25, 5, revealed, 300, 500);
            assert!(cashout < win);
            assert!(cashout < grid_progress_multiplier(25, 5, revealed, 300));
            assert!(cashout > previous);
            previous = cashout;
        }
    }
}
