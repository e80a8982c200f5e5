//! Process entry point: loads configuration, builds every subsystem,
//! and either runs the long-lived scheduler loop or executes a single
//! control/query command against it.
//!
//! Tracing init and `Context`-wrapped startup errors run through
//! `Config::from_env`, same as a typical service `main`, generalized
//! from a single always-on process into one that also answers one-shot
//! CLI subcommands.

mod config;
mod sources;

use std::num::NonZeroU32;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use governor::{Quota, RateLimiter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newslook_crawler::worker::{GlobalRateLimiter, WorkerConfig};
use newslook_crawler::{Manager, Monitor, Scheduler};
use newslook_crawler::manager::SourceRegistration;
use newslook_crawler::facade::{ControlQueryFacade, NewsLookFacade};
use newslook_extraction::extractor::DeclarativeExtractor;
use newslook_extraction::pipeline::Pipeline;
use newslook_extraction::storage::SqliteStorage;
use newslook_extraction::types::config::{QueryFilter, WorkerParams};

#[derive(Parser)]
#[command(name = "newslook", about = "Chinese financial news crawler and query service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until interrupted (SIGINT/Ctrl-C).
    Run,
    /// Start one source (or every source when omitted) for a single cycle.
    Start {
        source: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
        #[arg(long)]
        days: Option<u32>,
        /// Route this run's fetches through the configured proxy
        /// (`NEWSLOOK_PROXY_URL`); has no effect if none is configured.
        #[arg(long)]
        use_proxy: bool,
        /// Restrict listing to these categories; omit to list every
        /// category the source configures.
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },
    /// Print per-source status as JSON.
    Status,
    /// Print the health report as JSON.
    Health,
    /// Page through stored articles as JSON.
    Query {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long)]
        source: Option<String>,
    },
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "{log_level},newslook_crawler=debug,newslook_extraction=debug"
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build every subsystem from a loaded [`config::Config`], wiring each
/// one together through explicit passed-in handles.
async fn build(cfg: &config::Config) -> Result<NewsLookFacade> {
    let storage = Arc::new(
        SqliteStorage::open(&cfg.database_path)
            .await
            .context("failed to open the article database")?,
    );
    let monitor = Arc::new(Monitor::new());
    let pipeline = Arc::new(Pipeline::new(storage.clone(), monitor.clone()));

    let qps = NonZeroU32::new(cfg.global_qps).context("NEWSLOOK_GLOBAL_QPS must be non-zero")?;
    let rate_limiter: Arc<GlobalRateLimiter> = Arc::new(RateLimiter::direct(Quota::per_second(qps)));

    let mut registrations = Vec::new();
    for (name, mut source_config) in sources::default_source_configs() {
        let Some(over) = cfg.source_overrides.get(&name) else { continue };
        if !over.enabled {
            tracing::info!(source = %name, "source disabled by configuration, skipping registration");
            continue;
        }
        source_config.concurrency = over.concurrency;

        let http_config = newslook_extraction::types::config::HttpClientConfig {
            proxy_url: cfg.proxy_url.clone(),
            ..Default::default()
        };
        let client = newslook_extraction::http::HttpClient::with_sink(http_config, monitor.clone())
            .with_context(|| format!("failed to build http client for {name}"))?;
        let extractor = DeclarativeExtractor::new(source_config, client, "startup")
            .with_context(|| format!("failed to build extractor for {name}"))?;

        registrations.push(SourceRegistration {
            name: name.clone(),
            extractor: Arc::new(extractor),
            config: WorkerConfig { concurrency: over.concurrency, ..WorkerConfig::default() },
        });
    }

    if registrations.is_empty() {
        anyhow::bail!("no sources enabled; check NEWSLOOK_SOURCE_*_ENABLED");
    }

    let manager = Arc::new(Manager::new(registrations, pipeline, monitor.clone(), rate_limiter));
    let scheduler = Arc::new(Scheduler::new(manager.clone()).await.context("failed to start the scheduler backend")?);
    Ok(NewsLookFacade::new(storage, manager, scheduler, monitor))
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return Ok(ExitCode::from(2));
        }
    };
    init_tracing(&cfg.log_level);

    let facade = match build(&cfg).await {
        Ok(built) => built,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            return Ok(ExitCode::from(3));
        }
    };

    match cli.command {
        Command::Run => {
            if facade.schedule_list().await.is_empty() {
                tracing::warn!(
                    "starting with no schedule entries registered; nothing will run until a schedule is added via schedule_add"
                );
            }
            tracing::info!("newslook running, press Ctrl-C to stop");
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received, stopping every running source");
            let _ = facade.stop(None).await;
            return Ok(ExitCode::from(130));
        }
        Command::Start { source, max_items, days, use_proxy, categories } => {
            let params = WorkerParams { max_items, days, use_proxy, categories };
            facade.start(source.as_deref(), params).await.context("failed to start crawl")?;
            println!("started");
        }
        Command::Status => {
            let status = facade.status().await;
            print_json(&status)?;
        }
        Command::Health => {
            let health = facade.health().await.context("failed to build health report")?;
            print_json(&health)?;
        }
        Command::Query { page, page_size, source } => {
            let filter = QueryFilter { source, ..Default::default() };
            let page = facade.query_news(filter, page, page_size).await.context("query failed")?;
            print_json(&page)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(3)
        }
    }
}

