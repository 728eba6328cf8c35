use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use incident_sync::{
    config::{Config, ObservabilityConfig},
    metrics,
    models::{Filter, Incident, SeverityLevel, ShowState},
    realtime::{InMemoryTransport, RealtimeReconciler, RealtimeTransport},
    state::{IncidentStore, SharedStore},
    FilterCell, FilterMatcher, HttpPageFetcher, IncidentView, ViewConfig,
};
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "incident-sync")]
#[command(about = "Incident view synchronization tools", long_about = None, version)]
struct Cli {
    /// Configuration file (defaults to $INCIDENT_SYNC_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch incident pages from the API
    Fetch {
        #[command(flatten)]
        filter: FilterArgs,

        /// Page size (must be one of the configured options)
        #[arg(short = 's', long)]
        page_size: Option<usize>,

        /// Number of pages to walk
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Replay recorded realtime messages against a snapshot
    Replay {
        #[command(flatten)]
        filter: FilterArgs,

        /// JSON array of incidents to start from
        #[arg(long, value_name = "FILE")]
        snapshot: PathBuf,

        /// Realtime messages, one JSON object per line
        #[arg(long, value_name = "FILE")]
        events: PathBuf,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// open, closed or both
    #[arg(long, default_value = "open")]
    show: ShowState,

    /// Include acknowledged incidents
    #[arg(long)]
    acked: bool,

    /// Tag in key=value form, repeatable
    #[arg(short, long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// Source system id, repeatable
    #[arg(long = "source", value_name = "ID")]
    sources: Vec<i64>,

    /// Most severe level still shown, 1 (critical) to 5
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    max_level: Option<u8>,

    /// Only stateful (true) or stateless (false) incidents
    #[arg(long)]
    stateful: Option<bool>,

    /// Only incidents started within this many hours, 0 for no limit
    #[arg(long, default_value = "0")]
    timeframe_hours: u32,
}

impl FilterArgs {
    fn into_filter(self) -> Result<Filter> {
        let mut filter = Filter::default()
            .with_show(self.show)
            .with_show_acked(self.acked)
            .with_tags(self.tags)
            .with_timeframe_hours(self.timeframe_hours);
        if let Some(stateful) = self.stateful {
            filter = filter.with_stateful(stateful);
        }
        if !self.sources.is_empty() {
            filter = filter.with_sources(self.sources);
        }
        if let Some(level) = self.max_level {
            let level = SeverityLevel::try_from(level)
                .map_err(|e| anyhow::anyhow!("invalid max level: {}", e))?;
            filter = filter.with_max_level(level);
        }
        Ok(filter)
    }
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("incident_sync={}", observability.log_level).into());

    let json = observability.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.as_path())),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    tracing::debug!("Starting incident-sync v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    match cli.command {
        Commands::Fetch {
            filter,
            page_size,
            pages,
        } => fetch(&config, filter.into_filter()?, page_size, pages).await?,

        Commands::Replay {
            filter,
            snapshot,
            events,
        } => replay(&config, filter.into_filter()?, &snapshot, &events).await?,
    }

    if cli.print_metrics {
        eprintln!("{}", metrics::gather_metrics());
    }

    Ok(())
}

async fn fetch(config: &Config, filter: Filter, page_size: Option<usize>, pages: usize) -> Result<()> {
    let fetcher = Arc::new(HttpPageFetcher::from_config(&config.api)?);
    tracing::info!(endpoint = fetcher.endpoint(), "Fetching incidents");

    let mut view_config = ViewConfig::from(config);
    if let Some(size) = page_size {
        if !view_config.page_size_options.contains(&size) {
            anyhow::bail!(
                "page size {} is not one of {:?}",
                size,
                view_config.page_size_options
            );
        }
        view_config.page_size = size;
    }

    let view = IncidentView::new(
        fetcher,
        Arc::new(InMemoryTransport::from_config(&config.realtime)),
        filter.clone(),
        view_config,
    );

    view.set_filter(filter).await.context("Failed to fetch first page")?;
    print_page(&view)?;

    for _ in 1..pages {
        if !view.page_summary().has_next {
            break;
        }
        view.next_page().await.context("Failed to fetch next page")?;
        print_page(&view)?;
    }

    view.shutdown().await;
    Ok(())
}

fn print_page(view: &IncidentView) -> Result<()> {
    let output = json!({
        "page": view.page_summary(),
        "incidents": view.incidents(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn replay(config: &Config, filter: Filter, snapshot: &Path, events: &Path) -> Result<()> {
    let snapshot_text = tokio::fs::read_to_string(snapshot)
        .await
        .with_context(|| format!("Failed to read snapshot {}", snapshot.display()))?;
    let incidents: Vec<Incident> =
        serde_json::from_str(&snapshot_text).context("Snapshot is not a JSON array of incidents")?;

    // The API only returns what the filter admits
    let matcher = FilterMatcher::new(filter.clone());
    let initial: Vec<Incident> = incidents.into_iter().filter(|i| matcher.matches(i)).collect();

    let store: SharedStore = Arc::new(Mutex::new(IncidentStore::new()));
    store.lock().load_all(initial)?;

    let transport = InMemoryTransport::from_config(&config.realtime);
    transport.set_handlers(Arc::new(RealtimeReconciler::new(
        store.clone(),
        FilterCell::new(filter),
    )));
    transport.connect().await?;

    let events_text = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read events {}", events.display()))?;

    let mut applied = 0usize;
    let mut rejected = 0usize;
    for (number, line) in events_text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match transport.deliver_json(line) {
            Ok(()) => applied += 1,
            Err(e) => {
                rejected += 1;
                tracing::warn!(line = number + 1, error = %e, "Skipping realtime message");
            }
        }
    }

    transport.disconnect().await?;

    let store = store.lock();
    let output = json!({
        "messages": applied,
        "rejected": rejected,
        "count": store.len(),
        "incidents": store.incidents(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
