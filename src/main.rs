//! Branch Cleaner - reconcile local branches with pull-request history
//!
//! Run with `branch-cleaner analyze` or `branch-cleaner --help` for usage.
//! Events and results go to stdout as JSON lines; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use branch_cleaner::{
    APP_NAME, AnalysisSession, BranchAnalyzer, Event, Inbound, VERSION,
    analysis::SessionState, config::Config,
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Decide which local git branches are safe to delete")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Repository to analyze (overrides configuration)
    #[arg(short, long)]
    repo: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every local branch, streaming events as JSON lines
    Analyze {
        /// Read pause/resume control messages from stdin as JSON lines
        #[arg(long)]
        control: bool,
    },

    /// Show repository metadata
    Info,

    /// Delete a branch
    Delete {
        branch: String,

        /// Also delete the branch on the remote
        #[arg(long)]
        remote: bool,
    },

    /// Show the reviewer diff for a branch
    Diff {
        branch: String,

        /// Pull request to compare against; 0 diffs against trunk
        #[arg(long, default_value_t = 0)]
        pr: u64,
    },

    /// Check out a branch
    Checkout { branch: String },

    /// Show configuration
    Config {
        /// Initialize config file with defaults
        #[arg(long)]
        init: bool,
    },
}

fn setup_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        // Use info level for our crate, warn for dependencies
        EnvFilter::new("info")
            .add_directive("gix=warn".parse()?)
            .add_directive("tokio=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_target(false))
            .with(filter)
            .init();
    } else {
        // stdout carries events, so logs must stay on stderr
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Config {
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    if let Some(repo) = &cli.repo {
        config.repo_path = repo.clone();
    }
    config.debug |= cli.debug;
    config
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Forward stdin lines to the session; EOF drops the sender, which the
/// session treats as a disconnect
fn spawn_control_reader(tx: mpsc::Sender<Inbound>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Control message: {}", line);
            if tx.send(Inbound::from_json(&line)).await.is_err() {
                break;
            }
        }
    });
}

async fn run_analysis(config: &Config, analyzer: BranchAnalyzer, control: bool) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let (control_tx, control_rx) = mpsc::channel::<Inbound>(16);

    // Without a control stream the sender must outlive the session
    let _idle_sender = if control {
        spawn_control_reader(control_tx);
        None
    } else {
        Some(control_tx)
    };

    let session = AnalysisSession::new(Arc::new(analyzer), event_tx, control_rx).configure(config);
    info!("Starting analysis session {}", session.id());
    let handle = tokio::spawn(session.run());

    while let Some(event) = event_rx.recv().await {
        println!("{}", event.to_json_line()?);
    }

    let outcome = handle.await?;
    info!(
        "Session finished ({:?}) after {} branches",
        outcome.state,
        outcome.analyzed.len()
    );
    if outcome.state == SessionState::Failed {
        color_eyre::eyre::bail!("analysis failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(&cli);

    setup_logging(config.debug, config.log_file.as_ref())?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Analyze { control } => {
            info!("Starting {} v{}", APP_NAME, VERSION);
            let analyzer = BranchAnalyzer::open(&config).await?;
            run_analysis(&config, analyzer, control).await?;
        }

        Commands::Info => {
            let analyzer = BranchAnalyzer::open(&config).await?;
            print_json(&analyzer.repo_info().await?)?;
        }

        Commands::Delete { branch, remote } => {
            let analyzer = BranchAnalyzer::open(&config).await?;
            analyzer.delete_branch(&branch, remote).await?;
            println!("Deleted {}", branch);
        }

        Commands::Diff { branch, pr } => {
            let analyzer = BranchAnalyzer::open(&config).await?;
            print_json(&analyzer.branch_diff(&branch, pr).await?)?;
        }

        Commands::Checkout { branch } => {
            let analyzer = BranchAnalyzer::open(&config).await?;
            analyzer.checkout(&branch).await?;
            println!("Switched to {}", branch);
        }

        Commands::Config { init } => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => Config::config_file_path()?,
            };

            if init {
                config.save_to(&path)?;
                println!("Configuration initialized at {:?}", path);
            } else {
                println!("Configuration:");
                println!("{}", toml::to_string_pretty(&config)?);
                println!("\nConfig file: {:?}", path);
            }
        }
    }

    Ok(())
}
