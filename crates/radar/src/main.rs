//! Radar CLI - run the alert engine as a service or one cycle at a time.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use radar::api;
use radar::config::RadarConfig;
use radar::model::AgentState;
use radar::scheduler::{CycleSummary, CycleTrigger};
use radar::service::RadarService;
use radar::store::{MemoryStore, Stores};

/// Radar - revenue-management alert engine.
#[derive(Parser)]
#[command(name = "radar")]
#[command(about = "Schedules analysis agents, deduplicates alerts and learns from feedback")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "RADAR_LOG_FORMAT")]
    log_format: LogFormat,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "RADAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler and HTTP API until interrupted
    Serve {
        /// Address to bind the HTTP API to
        #[arg(long, env = "RADAR_BIND")]
        bind: Option<String>,

        /// Override the cycle interval
        #[arg(long, env = "RADAR_INTERVAL_MINUTES")]
        interval_minutes: Option<u64>,

        /// Dispatch every agent on every cycle
        #[arg(long)]
        force_all: bool,
    },

    /// Run a single cycle and print its summary
    Cycle {
        /// Dispatch every agent regardless of probability
        #[arg(long)]
        force: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the agent roster with accuracy and counters
    Roster,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("radar=debug,info")
        } else {
            EnvFilter::new("radar=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let mut config = RadarConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve {
            bind,
            interval_minutes,
            force_all,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(minutes) = interval_minutes {
                config.scheduler.interval_minutes = minutes;
            }
            config.scheduler.force_all |= force_all;
            config.validate().context("Invalid configuration")?;
            run_serve(config).await
        }
        Commands::Cycle { force, json } => run_cycle(config, force, json).await,
        Commands::Roster => run_roster(config).await,
    }
}

/// Open the store, from the snapshot when one is configured.
async fn open_store(config: &RadarConfig) -> Result<Arc<MemoryStore>> {
    let store = match &config.store.snapshot_path {
        Some(path) => MemoryStore::load(path)
            .await
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

async fn save_snapshot(store: &MemoryStore, config: &RadarConfig) {
    if let Some(path) = &config.store.snapshot_path {
        if let Err(e) = store.save(path).await {
            error!(path = %path.display(), error = %e, "Failed to save snapshot");
        }
    }
}

async fn build(config: RadarConfig) -> Result<(RadarService, Arc<MemoryStore>)> {
    let store = open_store(&config).await?;
    let service = RadarService::builtin(config, Stores::from_memory(store.clone()));
    service
        .bootstrap()
        .await
        .context("Failed to seed agent records")?;
    Ok((service, store))
}

async fn run_serve(config: RadarConfig) -> Result<()> {
    let bind = config.server.bind.clone();
    let (service, store) = build(config).await?;

    if service.config.store.snapshot_path.is_some() {
        let mut cycles = service.scheduler.subscribe();
        let store = store.clone();
        let config = service.config.clone();
        tokio::spawn(async move {
            while cycles.changed().await.is_ok() {
                save_snapshot(&store, &config).await;
            }
        });
    }

    service.scheduler.start();
    api::run_server(service.clone(), &bind, shutdown_signal()).await?;

    info!("Waiting for in-flight cycle to finish");
    service.scheduler.shutdown().await;
    save_snapshot(&store, &service.config).await;
    info!("Radar stopped");
    Ok(())
}

async fn run_cycle(config: RadarConfig, force: bool, json: bool) -> Result<()> {
    let (service, store) = build(config).await?;

    let Some(summary) = service
        .scheduler
        .run_cycle(CycleTrigger::Manual, force)
        .await
    else {
        anyhow::bail!("a cycle is already in flight");
    };
    save_snapshot(&store, &service.config).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &CycleSummary) {
    println!("\n{}", "Cycle Summary".bold());
    println!("   Cycle:      {}", summary.cycle_id);
    println!("   Duration:   {} ms", summary.duration_ms);
    println!("   Agents:     {}", summary.agents_run);
    println!("   Scenarios:  {}", summary.scenarios_run);
    println!("   Emitted:    {}", summary.alerts_emitted.to_string().green());
    println!("   Suppressed: {}", summary.alerts_suppressed.to_string().yellow());
    if summary.failed_runs > 0 {
        println!("   Failed:     {}", summary.failed_runs.to_string().red());
    }
    if summary.timed_out {
        println!("   {}", "Cycle deadline expired".red().bold());
    }
}

async fn run_roster(config: RadarConfig) -> Result<()> {
    let (service, _store) = build(config).await?;
    let records = service.stores.agents.list_agents().await?;

    println!(
        "{:<22} {:<9} {:>9} {:>6} {:>7} {:>8}",
        "AGENT".bold(),
        "STATE".bold(),
        "ACCURACY".bold(),
        "RUNS".bold(),
        "ALERTS".bold(),
        "SAMPLES".bold()
    );
    for record in records {
        let state = match record.state {
            AgentState::Active => "active".green(),
            AgentState::Learning => "learning".yellow(),
            AgentState::Disabled => "disabled".red(),
        };
        println!(
            "{:<22} {:<9} {:>8.1}% {:>6} {:>7} {:>8}",
            record.id.as_str(),
            state,
            record.accuracy,
            record.analyses_run,
            record.alerts_generated,
            record.feedback_samples
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
