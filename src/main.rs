use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use stockloader::load_execution;
use stockloader::plan::LoadPlan;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a load plan: CSV in, historical events and products out
    Run {
        #[clap(short, long)]
        plan: Option<String>,
    },
    /// Write a default load plan to disk
    Init {
        #[clap(short, long)]
        plan: String,
    },
    /// Print the storage summary without loading anything
    Report {
        #[clap(short, long)]
        plan: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Run { plan } => {
            let plan = read_plan(plan.as_deref())?;
            info!("Loading {} into database {}", plan.input, plan.database);
            load_execution::execute_load(&plan).await?;
        }
        Commands::Init { plan } => {
            info!("Initializing plan: {}", plan);
            let serialized_plan = serde_yaml::to_string(&LoadPlan::default())?;
            std::fs::write(&plan, serialized_plan)?;
        }
        Commands::Report { plan } => {
            let plan = read_plan(plan.as_deref())?;
            load_execution::execute_report(&plan).await?;
        }
    }

    Ok(())
}

/// Reads a plan file, or falls back to the built-in defaults when no plan
/// was given.
fn read_plan(path: Option<&str>) -> Result<LoadPlan> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        }
        None => Ok(LoadPlan::default()),
    }
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .without_time()
        .init();
}
