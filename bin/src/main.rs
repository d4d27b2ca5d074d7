//! cadence CLI - Plan and replay market-data sessions.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

use display::SnapshotMode;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Plan and replay market-data sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output and logs)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a session configuration
    Validate {
        /// Session configuration file (JSON)
        config: PathBuf,
    },

    /// Show how each symbol's intervals would be sourced
    Plan {
        /// Session configuration file (JSON)
        config: PathBuf,

        /// Directory of bar files named <SYMBOL>_<interval>.json or .ndjson
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Replay a backtest over the configured trading days
    Run {
        /// Session configuration file (JSON)
        config: PathBuf,

        /// Directory of bar files named <SYMBOL>_<interval>.json or .ndjson
        #[arg(short, long)]
        data: PathBuf,

        /// Write the final session snapshot to this file
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Snapshot contents
        #[arg(short, long, value_enum, default_value = "complete")]
        mode: SnapshotMode,
    },

    /// Aggregate a bar file into a larger interval
    Aggregate {
        /// Input bar file (JSON array or NDJSON)
        input: PathBuf,

        /// Interval of the input bars (e.g., 1s, 1m, 1d)
        #[arg(short, long)]
        source: String,

        /// Interval to produce (e.g., 5m, 1d, 1w)
        #[arg(short, long)]
        target: String,

        /// Output file path. Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the US equity calendar instead of an always-open market
        #[arg(long)]
        us_equity: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    display::init_logging(cli.verbose, cli.quiet)?;

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Validate { config } => commands::validate::validate(&config),
        Commands::Plan { config, data } => commands::plan::plan(&config, &data),
        Commands::Run {
            config,
            data,
            export,
            mode,
        } => commands::run::run(&config, &data, export.as_deref(), mode, cli.quiet),
        Commands::Aggregate {
            input,
            source,
            target,
            output,
            us_equity,
        } => commands::aggregate::aggregate(&input, &source, &target, output.as_deref(), us_equity),
    }
}
