//! Wager command line
//!
//! Drives the engine against the local RocksDB store, one command per run.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;
use wager_engine::config::{generate_sample_config, ConfigLoader, EngineConfig};
use wager_engine::games::{Harvest, Progress, RevealOutcome};
use wager_engine::{Casino, GameKind, Resolution, WagerError, WagerResult};

#[derive(Parser, Debug)]
#[command(name = "wager")]
#[command(about = "Persistent wagering session engine", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database directory (overrides config and WAGER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Play(PlayCommand),
    /// Write a sample configuration file
    SampleConfig {
        #[arg(default_value = "wager.toml")]
        path: PathBuf,
    },
}

/// Commands that need an open casino
#[derive(Subcommand, Debug)]
enum PlayCommand {
    /// Read or set a player's balance
    #[command(subcommand)]
    Balance(BalanceCommand),
    /// Grid-reveal game
    #[command(subcommand)]
    Grid(GridCommand),
    /// Dice-reroll game
    #[command(subcommand)]
    Dice(DiceCommand),
    /// Timed-decay game
    #[command(subcommand)]
    Tree(TreeCommand),
    /// Forfeit every expired session
    Sweep,
    /// Per-game totals
    Stats,
}

#[derive(Subcommand, Debug)]
enum BalanceCommand {
    Get { user: String },
    Set { user: String, amount: u64 },
}

#[derive(Args, Debug)]
struct Stake {
    user: String,
    stake: u64,
}

#[derive(Subcommand, Debug)]
enum GridCommand {
    Start {
        #[command(flatten)]
        stake: Stake,
        /// Number of bombs
        #[arg(long, default_value = "5")]
        bombs: usize,
        /// Side length; defaults to the configured size
        #[arg(long)]
        size: Option<usize>,
    },
    Reveal { user: String, row: usize, col: usize },
    Cashout { user: String },
    Peek { user: String },
}

#[derive(Subcommand, Debug)]
enum DiceCommand {
    Start {
        #[command(flatten)]
        stake: Stake,
    },
    /// Reroll the dice at the given positions (1-6)
    Reroll {
        user: String,
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    Stand { user: String },
    Peek { user: String },
}

#[derive(Subcommand, Debug)]
enum TreeCommand {
    Start {
        #[command(flatten)]
        stake: Stake,
    },
    Check { user: String },
    Cashout { user: String },
}

fn init_logging(config: &EngineConfig) {
    if !config.monitoring.enable_logging {
        return;
    }
    let level = config.monitoring.log_level.as_filter();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("wager_engine={level},wager={level}"))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> WagerResult<EngineConfig> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_directory = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_resolution(resolution: &Resolution) {
    println!(
        "{} game over: staked {}, paid {} ({:?}); balance {}",
        resolution.kind, resolution.stake, resolution.payout, resolution.outcome, resolution.balance
    );
}

fn run(casino: &Casino, command: PlayCommand) -> WagerResult<()> {
    match command {
        PlayCommand::Balance(BalanceCommand::Get { user }) => {
            println!("{}: {}", user, casino.player(&user).balance()?);
        }
        PlayCommand::Balance(BalanceCommand::Set { user, amount }) => {
            casino.player(&user).set_balance(amount)?;
            println!("{}: {}", user, amount);
        }

        PlayCommand::Grid(GridCommand::Start { stake, bombs, size }) => {
            let view = casino.player(&stake.user).grid_start(stake.stake, size, bombs)?;
            println!(
                "{}x{} grid with {} bombs; clearing it pays {}",
                view.size, view.size, view.bomb_count, view.win_value
            );
        }
        PlayCommand::Grid(GridCommand::Reveal { user, row, col }) => match casino.player(&user).grid_reveal(row, col)? {
            RevealOutcome::Safe(view) => {
                println!("safe ({} revealed); cash out now for {}", view.revealed_count, view.cash_out_value)
            }
            RevealOutcome::AlreadyRevealed(view) => {
                println!("already revealed ({} revealed)", view.revealed_count)
            }
            RevealOutcome::Bomb { bombs, resolution } => {
                println!("bomb!\n{}", bombs);
                print_resolution(&resolution);
            }
            RevealOutcome::Cleared { resolution } => {
                println!("board cleared!");
                print_resolution(&resolution);
            }
        },
        PlayCommand::Grid(GridCommand::Cashout { user }) => {
            print_resolution(&casino.player(&user).grid_cash_out()?);
        }
        PlayCommand::Grid(GridCommand::Peek { user }) => {
            let view = casino.player(&user).grid_peek()?;
            if let Some(finish) = view.finished {
                println!("game over ({:?}), not yet paid; reveal or cash out to settle", finish);
            }
            println!(
                "{}\n{} revealed, {} bombs; cash out {}, clear {}",
                view.revealed, view.revealed_count, view.bomb_count, view.cash_out_value, view.win_value
            );
        }

        PlayCommand::Dice(DiceCommand::Start { stake }) => {
            let view = casino.player(&stake.user).dice_start(stake.stake)?;
            println!("{:?} {} -> {}", view.faces, view.combo.name(), view.potential_payout);
        }
        PlayCommand::Dice(DiceCommand::Reroll { user, indices }) => {
            let view = casino.player(&user).dice_reroll(&indices)?;
            println!("{:?} {} -> {}", view.faces, view.combo.name(), view.potential_payout);
        }
        PlayCommand::Dice(DiceCommand::Stand { user }) => {
            let settlement = casino.player(&user).dice_stand()?;
            println!("{:?} {}", settlement.faces, settlement.combo.name());
            print_resolution(&settlement.resolution);
        }
        PlayCommand::Dice(DiceCommand::Peek { user }) => {
            let view = casino.player(&user).dice_peek()?;
            println!(
                "{:?} {} ({}) -> {}{}",
                view.faces,
                view.combo.name(),
                view.multiplier,
                view.potential_payout,
                if view.rerolled { ", reroll used" } else { "" }
            );
        }

        PlayCommand::Tree(TreeCommand::Start { stake }) => {
            casino.player(&stake.user).tree_start(stake.stake)?;
            println!("tree planted for {}", stake.stake);
        }
        PlayCommand::Tree(TreeCommand::Check { user }) => match casino.player(&user).tree_check()? {
            Progress::Growing(view) => {
                let next = view
                    .next_stage_in_secs
                    .map(|s| format!(", next stage in {}s", s))
                    .unwrap_or_default();
                println!(
                    "phase {} ({}), worth {}{}",
                    view.phase, view.multiplier, view.cash_out_value, next
                );
            }
            Progress::Withered { stake } => println!("the tree withered; {} lost", stake),
        },
        PlayCommand::Tree(TreeCommand::Cashout { user }) => match casino.player(&user).tree_cash_out()? {
            Harvest::Collected { phase, multiplier, resolution } => {
                println!("harvested at phase {} ({})", phase, multiplier);
                print_resolution(&resolution);
            }
            Harvest::Withered { stake } => println!("the tree withered; {} lost", stake),
        },

        PlayCommand::Sweep => {
            for kind in GameKind::ALL {
                let swept = casino.sweep(kind)?;
                println!("{}: {} expired", kind, swept.len());
            }
        }
        PlayCommand::Stats => {
            for (kind, stats) in casino.stats()? {
                println!(
                    "{}: started {}, finished {}, staked {}, paid {}, wins {}, losses {}",
                    kind,
                    stats.sessions_started,
                    stats.sessions_finished,
                    stats.total_staked,
                    stats.total_paid,
                    stats.wins,
                    stats.losses
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Command::SampleConfig { path } => {
            generate_sample_config(&path).map(|()| println!("wrote {}", path.display()))
        }
        Command::Play(command) => Casino::open(config).and_then(|casino| run(&casino, command)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_recoverable() => {
            println!("{}", e.user_message());
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{}", e);
            report_inconsistency(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_inconsistency(e: &WagerError) {
    if let WagerError::Inconsistent(_) = e {
        eprintln!("the session store and ledger disagree; manual reconciliation needed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sample_config_needs_no_casino() {
        let cli = Cli::try_parse_from(["wager", "sample-config", "out.toml"]).unwrap();
        assert!(matches!(cli.command, Command::SampleConfig { ref path } if path == &PathBuf::from("out.toml")));
    }

    #[test]
    fn test_game_commands_route_to_play() {
        let cli = Cli::try_parse_from(["wager", "--data-dir", "/tmp/w", "grid", "reveal", "alice", "1", "2"]).unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/w"));
        assert!(matches!(
            cli.command,
            Command::Play(PlayCommand::Grid(GridCommand::Reveal { ref user, row: 1, col: 2 })) if user == "alice"
        ));

        let cli = Cli::try_parse_from(["wager", "sweep"]).unwrap();
        assert!(matches!(cli.command, Command::Play(PlayCommand::Sweep)));
    }
}
