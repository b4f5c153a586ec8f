use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use calcrawl_client::{ClientConfig, HttpPageExtractor, MarkdownCleaner, SourceLayout};
use calcrawl_core::ingest::{self, IngestReport};
use calcrawl_core::{
    AppError, Event, EventQuery, EventStore, MemoryStore, PageExtractor, PipelineConfig,
    Scheduler, SourceConfig, SourceKind, Strategy, TagClassifier, TagDictionary,
};
use calcrawl_db::{Database, DatabaseConfig};
use calcrawl_server::state::AppState;

#[derive(Parser)]
#[command(name = "calcrawl", version, about = "Calendar event crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured source on its schedule, plus the classifier
    Run {
        /// JSON pipeline configuration (built-in New York sources if omitted)
        #[arg(short, long, env = "CALCRAWL_CONFIG")]
        config: Option<PathBuf>,

        /// Also serve the read API on this address
        #[arg(long, env = "CALCRAWL_SERVER_ADDR")]
        http_addr: Option<String>,

        /// Render pages in headless Chromium instead of plain HTTP
        #[arg(long, default_value_t = false)]
        browser: bool,
    },

    /// Crawl the sources of one kind once
    Crawl {
        /// Source to crawl
        #[arg(short, long)]
        source: SourceKind,

        #[arg(short, long, env = "CALCRAWL_CONFIG")]
        config: Option<PathBuf>,

        /// Store events in the database instead of printing them
        #[arg(long, default_value_t = false)]
        save: bool,

        #[arg(long, default_value_t = false)]
        browser: bool,
    },

    /// Run one classifier pass over unprocessed events
    Classify,

    /// List upcoming stored events
    Events {
        /// Days ahead to include
        #[arg(short, long, default_value_t = 30)]
        days: i64,

        /// Only events carrying this tag (repeatable; all must match)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// List distinct tags of upcoming events
    Tags,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calcrawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            http_addr,
            browser,
        } => cmd_run(config.as_deref(), http_addr, browser).await,
        Commands::Crawl {
            source,
            config,
            save,
            browser,
        } => cmd_crawl(source, config.as_deref(), save, browser).await,
        Commands::Classify => cmd_classify().await,
        Commands::Events {
            days,
            tags,
            limit,
            format,
        } => cmd_events(days, tags, limit, format).await,
        Commands::Tags => cmd_tags().await,
    }
}

/// Open the SQLite store and bring its schema up to date.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .with_context(|| format!("Failed to open event store at {}", config.url))?;
    db.migrate().await?;
    Ok(db)
}

/// Cancel `token` on CTRL+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for CTRL+C"),
        }
    });
}

// ---------------------------------------------------------------------------
// Extractor selection
// ---------------------------------------------------------------------------

/// Build one strategy per source with the extractor `make` returns for it.
fn build_strategies<P, F>(
    sources: &[SourceConfig],
    pipeline: &PipelineConfig,
    events: &mpsc::Sender<Event>,
    make: F,
) -> Result<Vec<Strategy<P, MarkdownCleaner>>>
where
    P: PageExtractor + 'static,
    F: Fn(SourceKind) -> Result<P, AppError>,
{
    let cleaner = MarkdownCleaner::new();
    sources
        .iter()
        .map(|source| {
            let extractor = make(source.kind())?;
            Strategy::new(
                source.clone(),
                extractor,
                cleaner.clone(),
                pipeline.crawl_config(),
                events.clone(),
            )
            .with_context(|| format!("Invalid source {}", source.name()))
        })
        .collect()
}

fn http_strategies(
    sources: &[SourceConfig],
    pipeline: &PipelineConfig,
    events: &mpsc::Sender<Event>,
) -> Result<Vec<Strategy<HttpPageExtractor, MarkdownCleaner>>> {
    let client = ClientConfig::from_env()?;
    build_strategies(sources, pipeline, events, |kind| {
        HttpPageExtractor::new(&client, SourceLayout::for_source(kind))
    })
}

#[cfg(feature = "browser")]
async fn browser_strategies(
    sources: &[SourceConfig],
    pipeline: &PipelineConfig,
    events: &mpsc::Sender<Event>,
) -> Result<Vec<Strategy<calcrawl_client::BrowserPageExtractor, MarkdownCleaner>>> {
    let client = ClientConfig::from_env()?;
    let browser = calcrawl_client::browser_extractor::launch_browser(&client).await?;
    build_strategies(sources, pipeline, events, |kind| {
        Ok(calcrawl_client::BrowserPageExtractor::with_browser(
            Arc::clone(&browser),
            &client,
            SourceLayout::for_source(kind),
        ))
    })
}

#[cfg(not(feature = "browser"))]
fn browser_unavailable() -> anyhow::Error {
    anyhow::anyhow!("--browser requires calcrawl to be built with the `browser` feature")
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config: Option<&Path>, http_addr: Option<String>, browser: bool) -> Result<()> {
    let pipeline = PipelineConfig::load(config)?;
    let db = connect_db().await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (events, ingestor) = ingest::channel(db.event_repo(), pipeline.ingest_capacity);
    let ingesting = tokio::spawn(ingestor.run(cancel.clone()));

    let mut scheduler = Scheduler::new(cancel.clone());
    if browser {
        #[cfg(feature = "browser")]
        for strategy in browser_strategies(&pipeline.sources, &pipeline, &events).await? {
            scheduler.spawn(Arc::new(strategy), pipeline.job_interval());
        }
        #[cfg(not(feature = "browser"))]
        return Err(browser_unavailable());
    } else {
        for strategy in http_strategies(&pipeline.sources, &pipeline, &events)? {
            scheduler.spawn(Arc::new(strategy), pipeline.job_interval());
        }
    }
    drop(events);

    if pipeline.enable_classifier {
        let dictionary = Arc::new(TagDictionary::bundled()?);
        scheduler.spawn(
            Arc::new(TagClassifier::new(db.event_repo(), dictionary)),
            pipeline.classifier_interval(),
        );
    }
    tracing::info!(jobs = scheduler.len(), "Scheduler started");

    let server = http_addr.map(|addr| {
        let state = Arc::new(AppState { db: db.clone() });
        let shutdown = cancel.clone().cancelled_owned();
        tokio::spawn(async move { calcrawl_server::serve(&addr, state, shutdown).await })
    });

    scheduler.join().await;
    let report = ingesting.await.context("Ingestion task failed")?;
    tracing::info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        failed = report.failed,
        "Ingestion finished"
    );

    if let Some(server) = server {
        server.await.context("Server task failed")??;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// crawl
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    kind: SourceKind,
    config: Option<&Path>,
    save: bool,
    browser: bool,
) -> Result<()> {
    let pipeline = PipelineConfig::load(config)?;
    let sources: Vec<SourceConfig> = pipeline
        .sources
        .iter()
        .filter(|source| source.kind() == kind)
        .cloned()
        .collect();
    if sources.is_empty() {
        bail!("No {kind} sources configured");
    }

    if save {
        let db = connect_db().await?;
        let report = crawl_into(db.event_repo(), &sources, &pipeline, browser).await?;
        println!(
            "Stored {} new events ({} already known, {} failed)",
            report.inserted, report.duplicates, report.failed
        );
    } else {
        let store = MemoryStore::new();
        crawl_into(store.clone(), &sources, &pipeline, browser).await?;
        for event in store.snapshot() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}

/// Tick every strategy once, feeding one ingestor backed by `store`.
async fn crawl_into<S>(
    store: S,
    sources: &[SourceConfig],
    pipeline: &PipelineConfig,
    browser: bool,
) -> Result<IngestReport>
where
    S: EventStore + 'static,
{
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (events, ingestor) = ingest::channel(store, pipeline.ingest_capacity);
    let ingesting = tokio::spawn(ingestor.run(cancel.clone()));

    if browser {
        #[cfg(feature = "browser")]
        for strategy in browser_strategies(sources, pipeline, &events).await? {
            tick_once(&strategy, &cancel).await;
        }
        #[cfg(not(feature = "browser"))]
        return Err(browser_unavailable());
    } else {
        for strategy in http_strategies(sources, pipeline, &events)? {
            tick_once(&strategy, &cancel).await;
        }
    }
    drop(events);

    ingesting.await.context("Ingestion task failed")
}

async fn tick_once<P>(strategy: &Strategy<P, MarkdownCleaner>, cancel: &CancellationToken)
where
    P: PageExtractor + 'static,
{
    let name = strategy.source().name();
    match strategy.run_once(cancel).await {
        Ok(report) => tracing::info!(
            strategy = %name,
            pages = report.crawl.pages_fetched,
            urls = report.crawl.urls,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Crawl finished"
        ),
        Err(e) => tracing::error!(strategy = %name, error = %e, "Crawl failed"),
    }
}

// ---------------------------------------------------------------------------
// classify / events / tags
// ---------------------------------------------------------------------------

async fn cmd_classify() -> Result<()> {
    let db = connect_db().await?;
    let classifier = TagClassifier::new(db.event_repo(), Arc::new(TagDictionary::bundled()?));
    let report = classifier.run_once().await?;
    println!(
        "Processed {} events: {} relevant, {} tags added",
        report.processed, report.relevant, report.tags_added
    );
    Ok(())
}

async fn cmd_events(
    days: i64,
    tags: Vec<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let db = connect_db().await?;
    let now = Utc::now();
    let query = EventQuery::between(now, now + TimeDelta::days(days.max(0)))
        .with_page(limit, 0)
        .with_tags(tags);
    let events = db.event_repo().query_events(&query).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record([
                "id",
                "name",
                "start_time",
                "end_time",
                "location",
                "tags",
                "origin_url",
            ])?;
            for event in &events {
                let tags = event.tags.iter().cloned().collect::<Vec<_>>().join(";");
                writer.write_record([
                    event.id.as_str(),
                    event.name.as_str(),
                    &event.start_time.to_rfc3339(),
                    &event.end_time.to_rfc3339(),
                    event.location.as_str(),
                    &tags,
                    event.origin_url.as_str(),
                ])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

async fn cmd_tags() -> Result<()> {
    let db = connect_db().await?;
    let tags = db.event_repo().distinct_tags_since(Utc::now()).await?;
    if tags.is_empty() {
        println!("No upcoming events");
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}
