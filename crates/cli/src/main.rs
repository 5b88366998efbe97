//! Shelfwalk CLI - Main Entry Point
//!
//! Runs browser scenarios against the library management application and
//! reports the results.
//!
//! Exit status: 0 when every scenario passed, 1 when any failed, 2 when the
//! run could not be carried out (config, browser, server, scenario files).

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{list, run};

const EXIT_FAILURES: i32 = 1;
const EXIT_INFRASTRUCTURE: i32 = 2;

/// Shelfwalk - E2E workflows for the library management app
#[derive(Parser, Debug)]
#[command(name = "shelfwalk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios against the application
    Run(run::RunArgs),

    /// List the selected scenarios without running them
    List(list::ListArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries only the report
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run(args) => run::execute(args, cli.format).await.map(|r| r.all_passed()),
        Commands::List(args) => list::execute(args, cli.format).await.map(|_| true),
    };

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(EXIT_FAILURES),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(EXIT_INFRASTRUCTURE);
        }
    }
}
