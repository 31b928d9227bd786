use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use dpkgfetcher::DpkgFetcher;
use factstore::{
    config::StoreConfig,
    fetch::Fetcher,
    gateway::{GraphStore, MemoryGraphStore},
    models::RunSummary,
    sync::DataSynchronizer,
    FactStore,
};
use nvdfetcher::{window_requests, FeedConfig, HttpNvdService, NvdFetcher};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the command line interface for linpack.
pub async fn run_cli() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(command) => run(command).await,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
            Ok(())
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Derives package lifecycle facts from a dpkg log
    IngestLog(IngestLogArgs),
    /// Derives vulnerability facts from the NVD CVE feed
    IngestFeed(IngestFeedArgs),
    /// Lists the registered fetchers and their parameters
    Fetchers,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory holding the run catalog
    #[arg(long, env = "LINPACK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
    /// SPARQL query endpoint (updates go to the same URL unless overridden)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// SPARQL update endpoint
    #[arg(long)]
    pub update_endpoint: Option<String>,
    /// Named graph all facts are written to
    #[arg(long)]
    pub graph: Option<String>,
    /// Triples per INSERT DATA request
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Keep facts in memory and report what would be written
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestLogArgs {
    /// Path to a dpkg.log file
    #[arg(long, default_value = "/var/log/dpkg.log")]
    pub path: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct IngestFeedArgs {
    /// First publication date, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS
    #[arg(long, value_parser = parse_start)]
    pub start: NaiveDateTime,
    /// Last publication date, inclusive
    #[arg(long, value_parser = parse_end)]
    pub end: NaiveDateTime,
    /// Keep only CVEs naming a Linux vendor, product or target
    #[arg(long, default_value_t = false)]
    pub linux_only: bool,
    /// NVD API key
    #[arg(long, env = "NVD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Minimum delay between feed requests in milliseconds
    #[arg(long)]
    pub min_delay_ms: Option<u64>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid date `{0}`: expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")]
    InvalidDate(String),
    #[error("range end {end} precedes start {start}")]
    EmptyRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("{failed} unit(s) failed; see the summary for details")]
    UnitsFailed { failed: usize },
    #[error("interrupted")]
    Interrupted,
}

fn parse_instant(raw: &str, end_of_day: bool) -> Result<NaiveDateTime, CliError> {
    if let Ok(instant) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(instant);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(raw.to_string()))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.ok_or_else(|| CliError::InvalidDate(raw.to_string()))
}

fn parse_start(raw: &str) -> Result<NaiveDateTime, CliError> {
    parse_instant(raw, false)
}

fn parse_end(raw: &str) -> Result<NaiveDateTime, CliError> {
    parse_instant(raw, true)
}

/// What a run wrote, printed as JSON at the end of each command.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub status: &'static str,
    pub dry_run: bool,
    /// Store operations issued; only known for dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triples: Option<usize>,
}

struct Session {
    store: FactStore,
    memory: Option<Arc<MemoryGraphStore>>,
}

impl Session {
    async fn open(args: &StoreArgs) -> anyhow::Result<Self> {
        let mut config = StoreConfig::from_env().context("failed to load store configuration")?;
        if let Some(state_dir) = &args.state_dir {
            config.catalog_path = state_dir.join("catalog.sqlite");
        }
        if let Some(endpoint) = &args.endpoint {
            config.query_endpoint = endpoint.clone();
            config.update_endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &args.update_endpoint {
            config.update_endpoint = endpoint.clone();
        }
        if let Some(graph) = &args.graph {
            config.graph = graph.clone();
        }
        if let Some(size) = args.batch_size {
            config.batch_size = size;
        }
        config.validate()?;

        if args.dry_run {
            // Dry runs checkpoint into their own catalog.
            if let Some(parent) = config.catalog_path.parent() {
                config.catalog_path = parent.join("dry-run").join("catalog.sqlite");
            }
            let memory = Arc::new(MemoryGraphStore::new());
            let graph: Arc<dyn GraphStore> = memory.clone();
            let store = FactStore::with_graph(config, graph).await?;
            info!("dry run: facts are kept in memory");
            return Ok(Self {
                store,
                memory: Some(memory),
            });
        }

        info!(
            "writing to graph <{}> via {}",
            config.graph, config.update_endpoint
        );
        Ok(Self {
            store: FactStore::new(config).await?,
            memory: None,
        })
    }

    fn register(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.store.synchronizer.register_fetcher(fetcher);
    }

    fn report(&self, summary: RunSummary) -> RunReport {
        RunReport {
            status: summary.status(),
            dry_run: self.memory.is_some(),
            operations: self.memory.as_ref().map(|m| m.operations().len()),
            triples: self.memory.as_ref().map(|m| m.len()),
            summary,
        }
    }
}

pub async fn ingest_log(args: &IngestLogArgs) -> anyhow::Result<RunReport> {
    let mut session = Session::open(&args.store).await?;
    session.register(Arc::new(DpkgFetcher::new()));

    let summary = session
        .store
        .synchronizer
        .sync("dpkgfetcher", json!({ "path": args.path }))
        .await
        .with_context(|| format!("failed to ingest {}", args.path.display()))?;
    Ok(session.report(summary))
}

pub async fn ingest_feed(args: &IngestFeedArgs) -> anyhow::Result<RunReport> {
    if args.end < args.start {
        return Err(CliError::EmptyRange {
            start: args.start,
            end: args.end,
        }
        .into());
    }

    let mut feed = FeedConfig::from_env()?;
    if let Some(key) = &args.api_key {
        feed.api_key = Some(key.clone());
    }
    if let Some(delay) = args.min_delay_ms {
        feed.min_delay = std::time::Duration::from_millis(delay);
    }
    if feed.api_key.is_none() {
        warn!("no NVD API key configured; the public rate limit applies");
    }
    let retry = feed.retry_policy();
    let service = HttpNvdService::new(feed)?;

    let mut session = Session::open(&args.store).await?;
    session.register(Arc::new(NvdFetcher::new(Arc::new(service), retry)));

    let windows = window_requests(args.start, args.end, args.linux_only);
    info!("{} window(s) between {} and {}", windows.len(), args.start, args.end);

    let run = session.store.synchronizer.sync_windows("nvdfetcher", windows);
    let summary = tokio::select! {
        summary = run => summary?,
        _ = signal::ctrl_c() => {
            warn!("interrupted; completed windows stay checkpointed");
            return Err(CliError::Interrupted.into());
        }
    };
    Ok(session.report(summary))
}

fn list_fetchers() -> anyhow::Result<()> {
    let capabilities = vec![
        DpkgFetcher::new().capability(),
        NvdFetcher::new(
            Arc::new(HttpNvdService::new(FeedConfig::default())?),
            FeedConfig::default().retry_policy(),
        )
        .capability(),
    ];
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    Ok(())
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    let report = match command {
        Command::IngestLog(args) => ingest_log(&args).await?,
        Command::IngestFeed(args) => ingest_feed(&args).await?,
        Command::Fetchers => return list_fetchers(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.summary.failed > 0 {
        return Err(CliError::UnitsFailed {
            failed: report.summary.failed,
        }
        .into());
    }
    Ok(())
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
