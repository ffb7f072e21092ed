mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::black_litterman::BlackLittermanArgs;
use commands::estimation::{CovarianceArgs, RiskAversionArgs};
use commands::optimize::OptimizeArgs;
use commands::pipeline::PipelineArgs;
use commands::schedule::ScheduleArgs;
use commands::universe::UniverseArgs;

/// Black-Litterman portfolio construction
#[derive(Parser)]
#[command(
    name = "litterman",
    version,
    about = "Black-Litterman portfolio construction",
    long_about = "Estimate shrunk covariances and market risk aversion, blend prior \
                  returns with views, solve the regularized max-Sharpe portfolio and \
                  check calendar rebalancing, one stage at a time or end to end."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (.json, .yaml or .yml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log debug detail to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Shrunk, annualized covariance from a price CSV
    Covariance(CovarianceArgs),
    /// Market-implied risk aversion of a benchmark
    RiskAversion(RiskAversionArgs),
    /// Black-Litterman posterior returns from prior, covariance and views
    BlackLitterman(BlackLittermanArgs),
    /// Regularized max-Sharpe weights and execution targets
    Optimize(OptimizeArgs),
    /// Select the most liquid symbols with fundamental data
    Universe(UniverseArgs),
    /// Run the full construction cycle on a price CSV
    Pipeline(PipelineArgs),
    /// Decide whether pending targets would be applied on a date
    Schedule(ScheduleArgs),
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

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match input::config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Covariance(args) => commands::estimation::run_covariance(args, &config),
        Commands::RiskAversion(args) => commands::estimation::run_risk_aversion(args, &config),
        Commands::BlackLitterman(args) => commands::black_litterman::run_black_litterman(args, &config),
        Commands::Optimize(args) => commands::optimize::run_optimize(args, &config),
        Commands::Universe(args) => commands::universe::run_universe(args, &config),
        Commands::Pipeline(args) => commands::pipeline::run_pipeline(args, &config),
        Commands::Schedule(args) => commands::schedule::run_schedule(args, &config),
        Commands::Version => {
            println!("litterman {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
