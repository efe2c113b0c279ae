//! Rasaayan CLI: terminal front end for the in-silico reaction lab.
//!
//! Provides one-shot subcommands and an interactive REPL.

mod commands;
mod render;
mod repl;
mod slash;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Rasaayan: simulate reactions from PubChem-resolved reactants
#[derive(Parser, Debug)]
#[command(name = "rasaayan", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.rasaayan/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Model used for reaction simulation
    #[arg(short, long)]
    model: Option<String>,

    /// Use placeholder replies and the built-in library instead of the network
    #[arg(long)]
    offline: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand (starts the REPL if omitted)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve comma-separated identifiers (names, SMILES or CIDs)
    Resolve {
        /// e.g. "Ethanol, 176, CC(=O)O"
        query: String,
    },
    /// Resolve reactants and simulate the reaction
    Simulate {
        /// Comma-separated reactant identifiers
        #[arg(short, long)]
        reactants: String,
        /// Catalysts or reagents, free text
        #[arg(short, long, default_value = "")]
        catalysts: String,
        /// Temperature in °C
        #[arg(short, long, default_value_t = 25.0, allow_negative_numbers = true)]
        temp: f64,
        /// Pressure in atm
        #[arg(short, long, default_value_t = 1.0)]
        pressure: f64,
        /// Research objective, free text
        #[arg(short, long, default_value = "")]
        objective: String,
    },
    /// Turn a research goal into reactants and conditions
    Plan {
        /// e.g. "synthesize aspirin"
        goal: String,
        /// Simulate the suggested setup right away
        #[arg(long)]
        run: bool,
    },
    /// Past simulations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Built-in chemical library and discovered molecules
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },
    /// Download a 3-D structure (SDF) from PubChem
    Structure {
        /// Name, SMILES or CID
        identifier: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum HistoryAction {
    /// List past simulations, newest first
    List,
    /// Show the full report of one simulation
    Show {
        /// History id (9 characters)
        id: String,
        /// Print the stored JSON instead of a report
        #[arg(long)]
        json: bool,
    },
    /// Delete all history entries
    Clear,
}

#[derive(clap::Subcommand, Debug)]
enum InventoryAction {
    /// List the library, optionally one category
    List {
        /// solvents, inorganic, precursors, catalysts or synthesized
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Add a predicted product of a past simulation to the synthesized shelf
    Discover {
        /// History id
        history_id: String,
        /// Product number as shown in the report (1-based)
        product: usize,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the current merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "rasaayan", "rasaayan")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from(".rasaayan/logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "rasaayan.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // `config init` must work even when the existing file does not parse.
    if let Some(Commands::Config {
        action: ConfigAction::Init,
    }) = &cli.command
    {
        return commands::init_config(&workspace);
    }

    let mut config = rasaayan_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Some(command) => commands::handle_command(command, &workspace, &config, cli.offline).await,
        None => {
            let lab = commands::open_lab(&config, cli.offline)?;
            repl::run_interactive(lab, &config, &workspace, cli.offline).await
        }
    }
}
