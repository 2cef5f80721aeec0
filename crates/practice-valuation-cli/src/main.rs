mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::risk::{SafeguardArgs, ValidateArgs};
use commands::simulation::SimulateArgs;
use commands::valuation::{DcfArgs, EpvArgs, SynergyArgs, ValueArgs};

/// Practice valuation and risk adjustment
#[derive(Parser)]
#[command(
    name = "pvx",
    version,
    about = "Practice valuation and risk adjustment",
    long_about = "Values small service practices with a blend of earnings power value, \
                  decaying-growth DCF and benchmark multiples, cross-checks the methods, \
                  applies small-practice safeguards and runs Monte Carlo simulation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log filter when RUST_LOG is unset (e.g. warn, info, debug)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full valuation pipeline on a practice record
    Value(ValueArgs),
    /// Standalone Monte Carlo valuation
    Simulate(SimulateArgs),
    /// Earnings Power Value
    Epv(EpvArgs),
    /// Decaying-growth DCF with conservative terminal value
    Dcf(DcfArgs),
    /// Phased synergy uplift
    Synergy(SynergyArgs),
    /// Apply the practice-size safeguard to an enterprise value
    Safeguard(SafeguardArgs),
    /// Check a practice record against the input bounds table
    Validate(ValidateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Log to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Value(args) => commands::valuation::run_value(args),
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Epv(args) => commands::valuation::run_epv(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::Synergy(args) => commands::valuation::run_synergy(args),
        Commands::Safeguard(args) => commands::risk::run_safeguard(args),
        Commands::Validate(args) => commands::risk::run_validate(args),
        Commands::Version => {
            println!("pvx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
