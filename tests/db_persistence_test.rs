//! Sessions and balances must survive closing and reopening the database.

use tempfile::TempDir;
use wager_engine::errors::StateError;
use wager_engine::games::RevealOutcome;
use wager_engine::{Casino, EngineConfig, GameKind, WagerError};

fn config_for(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::testing();
    config.storage.data_directory = dir.path().join("wager_db").to_string_lossy().to_string();
    config.storage.clear_on_start = false;
    config.storage.acquire_delay_ms = 1;
    config
}

#[test]
fn test_grid_session_survives_restart() {
    let dir = TempDir::new().unwrap();

    let (row, col) = {
        let casino = Casino::open(config_for(&dir)).unwrap();
        let player = casino.player("alice");
        player.set_balance(100).unwrap();
        player.grid_start(25, Some(4), 3).unwrap();

        let session = casino.machine().load("alice", GameKind::GridReveal).unwrap();
        let bombs = &session.grid().unwrap().bombs;
        let cell = (0..16)
            .map(|i| (i / 4, i % 4))
            .find(|&(r, c)| bombs.get(r, c) == Some(false))
            .unwrap();

        assert!(matches!(player.grid_reveal(cell.0, cell.1).unwrap(), RevealOutcome::Safe(_)));
        cell
    };

    let casino = Casino::open(config_for(&dir)).unwrap();
    let player = casino.player("alice");
    assert_eq!(player.balance().unwrap(), 75);

    let view = player.grid_peek().unwrap();
    assert_eq!(view.revealed_count, 1);
    assert_eq!(view.revealed.get(row, col), Some(true));

    let err = player.grid_start(10, Some(4), 3).unwrap_err();
    assert!(matches!(err, WagerError::State(StateError::AlreadyActive(GameKind::GridReveal))));

    let resolution = player.grid_cash_out().unwrap();
    assert_eq!(resolution.payout, view.cash_out_value);
    assert_eq!(player.balance().unwrap(), 75 + view.cash_out_value);
}

#[test]
fn test_dice_and_stats_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let casino = Casino::open(config_for(&dir)).unwrap();
        let player = casino.player("bob");
        player.set_balance(50).unwrap();
        player.dice_start_with_roll(10, [3, 3, 3, 1, 2, 6]).unwrap();
    }

    let casino = Casino::open(config_for(&dir)).unwrap();
    {
        let player = casino.player("bob");
        let view = player.dice_peek().unwrap();
        assert_eq!(view.faces, [3, 3, 3, 1, 2, 6]);
        assert!(!view.rerolled);

        let settlement = player.dice_stand().unwrap();
        assert_eq!(settlement.resolution.payout, 2);
        assert_eq!(player.balance().unwrap(), 42);
    }

    let stats = casino.machine().stats(GameKind::DiceReroll).unwrap();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.sessions_finished, 1);
    assert_eq!(stats.total_staked, 10);
    assert_eq!(stats.total_paid, 2);
}

#[test]
fn test_clear_on_start_wipes_sessions() {
    let dir = TempDir::new().unwrap();
    {
        let casino = Casino::open(config_for(&dir)).unwrap();
        let player = casino.player("carol");
        player.set_balance(50).unwrap();
        player.tree_start(10).unwrap();
    }

    let mut config = config_for(&dir);
    config.storage.clear_on_start = true;
    let casino = Casino::open(config).unwrap();
    let player = casino.player("carol");
    assert_eq!(player.balance().unwrap(), 0);
    assert!(!player.has_active(GameKind::TimedDecay).unwrap());
}
