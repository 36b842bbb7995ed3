//! # SalesClaw: trigger automation for sales workspaces
//!
//! Usage:
//!   salesclaw run --events ~/feeds/slack.jsonl     # Monitor feeds until Ctrl-C
//!   salesclaw evaluate --payload '{"text": "..."}'  # Evaluate one payload
//!   salesclaw rules                                  # List rules
//!   salesclaw summary --customer acme_inc            # Journal summary

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use salesclaw_actions::Deliveries;
use salesclaw_core::SalesClawConfig;
use salesclaw_engine::{ActionSuite, JsonlFileSource, TriggerEngine, TriggerJournal, load_rules};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "salesclaw", version, about = "⚡ SalesClaw Sales Trigger Automation")]
struct Cli {
    /// Config file (default: ~/.salesclaw/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor event feeds and dispatch actions until Ctrl-C
    Run {
        /// JSON-lines feed to monitor, named after its file stem (repeatable)
        #[arg(long = "events")]
        events: Vec<String>,

        /// Poll interval for --events feeds, in seconds
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Engine state snapshot (default from config)
        #[arg(long)]
        state: Option<String>,

        /// Trigger journal database (default from config)
        #[arg(long)]
        journal: Option<String>,
    },
    /// Evaluate one payload against the rules and print stats
    Evaluate {
        /// Payload JSON, or @FILE
        #[arg(long)]
        payload: String,

        /// Source name recorded on fired events
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// List trigger rules
    Rules,
    /// Show the journaled trigger summary of a customer
    Summary {
        #[arg(long)]
        customer: String,

        /// Timeframe in days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Trigger journal database (default from config)
        #[arg(long)]
        journal: Option<String>,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&str>) -> Result<SalesClawConfig> {
    let config = match path {
        Some(p) => SalesClawConfig::load_from(&expand_path(p))?,
        None => SalesClawConfig::load()?,
    };
    Ok(config)
}

fn read_payload(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(expand_path(file))
            .with_context(|| format!("Failed to read payload file {file}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Payload is not valid JSON")
}

fn feed_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("events")
        .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "salesclaw=debug,salesclaw_engine=debug,salesclaw_actions=debug,salesclaw_triggers=debug"
    } else {
        "salesclaw=info,salesclaw_engine=info,salesclaw_actions=info,salesclaw_triggers=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            events,
            interval,
            state,
            journal,
        } => run(config, events, interval, state, journal).await,
        Commands::Evaluate { payload, source } => evaluate(config, &payload, &source).await,
        Commands::Rules => {
            for rule in load_rules(&config) {
                println!("{}", serde_json::to_string_pretty(&rule.describe())?);
            }
            Ok(())
        }
        Commands::Summary {
            customer,
            days,
            journal,
        } => {
            let path = expand_path(journal.as_deref().unwrap_or(&config.engine.journal_path));
            let journal = TriggerJournal::open(&path)?;
            let summary = journal.customer_summary(&customer, days, chrono::Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

async fn run(
    config: SalesClawConfig,
    events: Vec<String>,
    interval: u64,
    state: Option<String>,
    journal: Option<String>,
) -> Result<()> {
    let engine = Arc::new(TriggerEngine::new(&config.engine, load_rules(&config)));
    let suite = ActionSuite::from_config(&config, Deliveries::from_config(&config));
    suite.register(&engine);

    for source in &config.sources {
        let path = expand_path(&source.path);
        engine.add_source(
            Arc::new(JsonlFileSource::new(&source.name, path)),
            Duration::from_secs(source.interval_secs.max(1)),
        );
    }
    for feed in &events {
        let path = expand_path(feed);
        let name = feed_name(&path);
        engine.add_source(Arc::new(JsonlFileSource::new(&name, path)), Duration::from_secs(interval.max(1)));
    }

    let state_path = expand_path(state.as_deref().unwrap_or(&config.engine.state_path));
    if engine.load_state(&state_path).await? {
        tracing::info!("♻️ Resumed from {}", state_path.display());
    }

    let journal_path = expand_path(journal.as_deref().unwrap_or(&config.engine.journal_path));
    let journal = Arc::new(TriggerJournal::open(&journal_path)?);
    let recorder = journal.spawn_recorder(engine.subscribe());

    engine.start()?;
    tracing::info!("⚡ SalesClaw running with {} rules, Ctrl-C to stop", engine.rules().await.len());

    tokio::signal::ctrl_c().await?;
    engine.stop();
    engine.wait().await;
    let drained = engine.drain_pending().await;
    if drained > 0 {
        tracing::info!("Processed {drained} queued events before exit");
    }

    engine.save_state(&state_path).await?;
    engine.close_events();
    if let Err(e) = recorder.await {
        tracing::warn!("Journal recorder ended abnormally: {e}");
    }

    let stats = engine.get_trigger_stats();
    tracing::info!("📊 {} triggers in history", stats.total_triggers);
    for action in suite.stats() {
        tracing::debug!(
            "{}: {} runs, {:.0}% success",
            action.action_id,
            action.execution_count,
            action.success_rate * 100.0
        );
    }
    Ok(())
}

async fn evaluate(config: SalesClawConfig, payload: &str, source: &str) -> Result<()> {
    let payload = read_payload(payload)?;
    let engine = TriggerEngine::new(&config.engine, load_rules(&config));
    let suite = ActionSuite::from_config(&config, Deliveries::logging(&config));
    suite.register(&engine);

    let fired = engine.process_event(source, &payload).await;
    tracing::info!("{} rules fired", fired.len());
    engine.drain_pending().await;

    println!("{}", serde_json::to_string_pretty(&engine.get_trigger_stats())?);
    Ok(())
}
