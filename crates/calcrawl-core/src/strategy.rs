//! One configured crawl unit: listing pages → detail URLs → events → ingestion.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::crawler::{CrawlConfig, CrawlReport, PaginationCrawler};
use crate::error::AppError;
use crate::models::Event;
use crate::resolver::EventResolver;
use crate::scheduler::Job;
use crate::source::SourceConfig;
use crate::traits::{Cleaner, PageExtractor};
use crate::util::run_cancellable;

/// Outcome of one strategy tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyReport {
    pub crawl: CrawlReport,
    /// Events handed to the ingestion channel.
    pub sent: usize,
    /// Detail pages that loaded but held no usable event.
    pub skipped: usize,
    /// Detail pages that could not be fetched, or whose extraction panicked.
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Strategy<P, C>
where
    P: PageExtractor,
    C: Cleaner,
{
    name: String,
    source: SourceConfig,
    crawler: PaginationCrawler<P>,
    resolver: EventResolver<P, C>,
    events: mpsc::Sender<Event>,
}

impl<P, C> Strategy<P, C>
where
    P: PageExtractor + 'static,
    C: Cleaner,
{
    pub fn new(
        source: SourceConfig,
        extractor: P,
        cleaner: C,
        crawl: CrawlConfig,
        events: mpsc::Sender<Event>,
    ) -> Result<Self, AppError> {
        source.validate()?;
        let crawler = PaginationCrawler::new(extractor.clone(), source.url_filter()?, crawl);
        let resolver = EventResolver::new(extractor, cleaner, &source)?;

        Ok(Self {
            name: source.name(),
            source,
            crawler,
            resolver,
            events,
        })
    }

    /// Pin "today" for date resolution.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.resolver = self.resolver.with_reference_date(date);
        self
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Crawl the listing pages once and send every resolved event.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<StrategyReport, AppError> {
        let counters = Counters::default();
        let this = self;
        let counted = &counters;

        let crawl = self
            .crawler
            .crawl(
                |page| self.source.listing_url(page),
                cancel,
                move |batch| this.extract_batch(batch, cancel, counted),
            )
            .await?;

        Ok(StrategyReport {
            crawl,
            sent: counters.sent.into_inner(),
            skipped: counters.skipped.into_inner(),
            failed: counters.failed.into_inner(),
        })
    }

    async fn extract_batch(
        &self,
        urls: Vec<String>,
        cancel: &CancellationToken,
        counters: &Counters,
    ) -> Result<(), AppError> {
        tracing::debug!(strategy = %self.name, urls = urls.len(), "Extracting batch");

        for url in urls {
            let resolved = AssertUnwindSafe(run_cancellable(cancel, self.resolver.resolve(&url)))
                .catch_unwind()
                .await;

            match resolved {
                Ok(Ok(event)) => {
                    self.events
                        .send(event)
                        .await
                        .map_err(|_| AppError::ChannelClosed)?;
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(AppError::Cancelled)) => return Err(AppError::Cancelled),
                Ok(Err(e)) if e.is_parse_error() => {
                    tracing::warn!(strategy = %self.name, %url, error = %e, "Skipping event");
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        strategy = %self.name,
                        %url,
                        error = %e,
                        "Event extraction failed"
                    );
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    tracing::error!(strategy = %self.name, %url, "Event extraction panicked");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

impl<P, C> Job for Strategy<P, C>
where
    P: PageExtractor + 'static,
    C: Cleaner + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run_immediately(&self) -> bool {
        self.source.kind().run_immediately()
    }

    async fn perform(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        let report = self.run_once(cancel).await?;
        tracing::info!(
            strategy = %self.name,
            pages = report.crawl.pages_fetched,
            pages_failed = report.crawl.pages_failed,
            urls = report.crawl.urls,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Crawl finished"
        );
        Ok(())
    }
}
