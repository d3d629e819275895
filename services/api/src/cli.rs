use crate::infra::load_rate_table;
use crate::server;
use clap::{Args, Parser, Subcommand};
use credit_policy::analysis::{calculate_pmt, STANDARD_THRESHOLDS};
use credit_policy::config::RateModelConfig;
use credit_policy::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Policy API",
    about = "Run the loan analysis service or inspect its pricing from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Compute the fixed monthly installment for a loan
    Pmt(PmtArgs),
    /// Show the rates offered to a score from the given term upwards
    Rates(RatesArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct PmtArgs {
    /// Principal borrowed
    #[arg(long)]
    pub(crate) amount: f64,
    /// Monthly interest rate as a fraction (0.05 for 5%)
    #[arg(long)]
    pub(crate) rate: f64,
    /// Number of monthly installments
    #[arg(long)]
    pub(crate) terms: u32,
}

#[derive(Args, Debug)]
pub(crate) struct RatesArgs {
    /// Borrower credit score
    #[arg(long)]
    pub(crate) score: u32,
    /// Shortest term to include
    #[arg(long, default_value_t = 6)]
    pub(crate) min_term: u32,
    /// Rate model CSV to read instead of the bundled one
    #[arg(long)]
    pub(crate) rate_model: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Pmt(args) => {
            println!("{:.2}", calculate_pmt(args.amount, args.rate, args.terms));
            Ok(())
        }
        Command::Rates(args) => run_rates(args),
    }
}

fn run_rates(args: RatesArgs) -> Result<(), AppError> {
    let table = load_rate_table(&RateModelConfig {
        path: args.rate_model,
    })?;
    let rates = table.lookup(args.score, args.min_term, STANDARD_THRESHOLDS.valid_terms);

    if rates.is_empty() {
        println!("No rates available for score {}", args.score);
        return Ok(());
    }

    println!(
        "Rates for score {} (bracket {}):",
        args.score,
        table
            .bracket_for(args.score)
            .map(|bracket| bracket.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    for (term, rate) in rates {
        println!("  {term:>2} months: {:.2}%", rate * 100.0);
    }
    Ok(())
}
