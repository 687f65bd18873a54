//! CLI interface for momentum-radar
//!
//! Provides subcommands for:
//! - `run`: Start the scoring cycles and the broadcast server
//! - `score`: Score the top of the universe once and print it
//! - `backtest`: Run a momentum backtest
//! - `config`: Show the effective configuration

mod backtest;
mod run;
mod score;

pub use backtest::BacktestArgs;
pub use run::RunArgs;
pub use score::ScoreArgs;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "momentum-radar")]
#[command(about = "Explainable crypto momentum scoring, ranking and alerting")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scoring cycles and the broadcast server
    Run(RunArgs),
    /// Score the top of the universe once
    Score(ScoreArgs),
    /// Run a backtest
    Backtest(BacktestArgs),
    /// Show the effective configuration
    Config,
}

/// Output format for one-shot commands
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
