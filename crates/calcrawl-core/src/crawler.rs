//! Bounded-concurrency pagination crawler.
//!
//! Page 1 is fetched alone: it decides how many pages exist and a failure
//! there aborts the crawl. Pages `2..=N` are fetched by producer tasks, at
//! most `concurrency` at a time, each admitted by an owned semaphore permit.
//! Producers push filtered detail URLs into a bounded channel; the single
//! consumer (the caller's task) groups them into batches and awaits the batch
//! callback, which also back-pressures the producers.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::filter::UrlFilter;
use crate::links::extract_links;
use crate::traits::PageExtractor;
use crate::util::run_cancellable;

/// Knobs for one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Listing pages fetched at the same time.
    pub concurrency: usize,
    /// URLs per extraction batch.
    pub batch_size: usize,
    /// Upper bound on the number of listing pages, page 1 included.
    pub max_pages: Option<u32>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_size: 25,
            max_pages: None,
        }
    }
}

/// Outcome of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    /// Unique detail URLs handed to the batch callback.
    pub urls: usize,
    pub batches: usize,
}

#[derive(Debug, Default)]
struct PageStats {
    fetched: u32,
    failed: u32,
}

pub struct PaginationCrawler<P: PageExtractor> {
    extractor: P,
    filter: Arc<UrlFilter>,
    config: CrawlConfig,
}

impl<P> PaginationCrawler<P>
where
    P: PageExtractor + 'static,
{
    pub fn new(extractor: P, filter: UrlFilter, config: CrawlConfig) -> Self {
        Self {
            extractor,
            filter: Arc::new(filter),
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl every listing page and feed detail URLs to `on_batch`.
    ///
    /// `listing_url` maps a 1-based page number to its URL. An error from
    /// `on_batch` stops the crawl and is returned as is.
    pub async fn crawl<L, F, Fut>(
        &self,
        listing_url: L,
        cancel: &CancellationToken,
        mut on_batch: F,
    ) -> Result<CrawlReport, AppError>
    where
        L: Fn(u32) -> Result<String, AppError>,
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let mut batcher = Batcher::new(self.config.batch_size);
        let mut report = CrawlReport::default();

        let first_url = listing_url(1)?;
        let first = run_cancellable(cancel, self.extractor.fetch_listing(&first_url, 1)).await?;
        report.pages_fetched = 1;

        for url in self.filter.filter(extract_links(&first.html)) {
            if let Some(batch) = batcher.push(url) {
                on_batch(batch).await?;
            }
        }

        let last_page = match (first.total_pages, self.config.max_pages) {
            (Some(total), Some(cap)) => total.min(cap),
            (Some(total), None) => total,
            (None, _) => 1,
        };
        tracing::debug!(url = %first_url, last_page, "Listing page 1 fetched");

        if last_page > 1 {
            let pages = (2..=last_page)
                .map(|page| listing_url(page).map(|url| (page, url)))
                .collect::<Result<Vec<_>, _>>()?;

            let (tx, mut rx) = mpsc::channel(self.config.batch_size.max(1));
            let producers_cancel = cancel.child_token();
            let coordinator = tokio::spawn(coordinate(
                self.extractor.clone(),
                Arc::clone(&self.filter),
                pages,
                self.config.concurrency,
                tx,
                producers_cancel.clone(),
            ));

            while let Some(url) = rx.recv().await {
                if let Some(batch) = batcher.push(url) {
                    if let Err(e) = on_batch(batch).await {
                        producers_cancel.cancel();
                        drop(rx);
                        abandon(coordinator).await;
                        return Err(e);
                    }
                }
            }

            let stats = coordinator
                .await
                .map_err(|e| AppError::Generic(format!("Crawl coordinator failed: {e}")))?;
            report.pages_fetched += stats.fetched;
            report.pages_failed += stats.failed;
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if let Some(batch) = batcher.finish() {
            on_batch(batch).await?;
        }

        report.urls = batcher.urls;
        report.batches = batcher.batches;
        Ok(report)
    }
}

/// Wait for a coordinator whose producers were cancelled after a batch error.
async fn abandon(coordinator: JoinHandle<PageStats>) -> Option<PageStats> {
    match coordinator.await {
        Ok(stats) => Some(stats),
        Err(e) if e.is_panic() => {
            tracing::warn!(error = %e, "Crawl coordinator panicked");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "Crawl coordinator did not finish");
            None
        }
    }
}

/// Spawn one producer per page behind the semaphore and wait for all of them.
/// Dropping the last sender closes the consumer's stream.
async fn coordinate<P>(
    extractor: P,
    filter: Arc<UrlFilter>,
    pages: Vec<(u32, String)>,
    concurrency: usize,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> PageStats
where
    P: PageExtractor + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut producers = JoinSet::new();

    for (page, url) in pages {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let extractor = extractor.clone();
        let filter = Arc::clone(&filter);
        let tx = tx.clone();
        let cancel = cancel.clone();
        producers.spawn(async move {
            let _permit = permit;
            match run_cancellable(&cancel, extractor.fetch_listing(&url, page)).await {
                Ok(listing) => {
                    let urls = filter.filter(extract_links(&listing.html));
                    tracing::debug!(page, urls = urls.len(), "Listing page fetched");
                    for url in urls {
                        if tx.send(url).await.is_err() {
                            break;
                        }
                    }
                    true
                }
                Err(AppError::Cancelled) => false,
                Err(e) => {
                    tracing::warn!(page, %url, error = %e, "Listing page failed");
                    false
                }
            }
        });
    }
    drop(tx);

    let mut stats = PageStats::default();
    while let Some(joined) = producers.join_next().await {
        match joined {
            Ok(true) => stats.fetched += 1,
            Ok(false) => stats.failed += 1,
            Err(e) => {
                if e.is_panic() {
                    tracing::error!(error = %e, "Listing page producer panicked");
                }
                stats.failed += 1;
            }
        }
    }
    stats
}

/// Groups unique URLs into fixed-size batches.
struct Batcher {
    size: usize,
    seen: HashSet<String>,
    current: Vec<String>,
    urls: usize,
    batches: usize,
}

impl Batcher {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            seen: HashSet::new(),
            current: Vec::with_capacity(size),
            urls: 0,
            batches: 0,
        }
    }

    fn push(&mut self, url: String) -> Option<Vec<String>> {
        if !self.seen.insert(url.clone()) {
            return None;
        }
        self.urls += 1;
        self.current.push(url);
        if self.current.len() >= self.size {
            self.batches += 1;
            Some(std::mem::replace(
                &mut self.current,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    fn finish(&mut self) -> Option<Vec<String>> {
        if self.current.is_empty() {
            return None;
        }
        self.batches += 1;
        Some(std::mem::take(&mut self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::testutil::{MockPageExtractor, detail_urls};

    fn listing(page: u32) -> Result<String, AppError> {
        Ok(format!("https://www.eventbrite.com/d/ny--new-york/anime/?page={page}"))
    }

    fn crawler(
        extractor: MockPageExtractor,
        config: CrawlConfig,
    ) -> PaginationCrawler<MockPageExtractor> {
        PaginationCrawler::new(extractor, UrlFilter::eventbrite().unwrap(), config)
    }

    async fn collect_batches(
        crawler: &PaginationCrawler<MockPageExtractor>,
        cancel: &CancellationToken,
    ) -> (Result<CrawlReport, AppError>, Vec<Vec<String>>) {
        let batches = Mutex::new(Vec::new());
        let result = crawler
            .crawl(listing, cancel, |batch| {
                batches.lock().unwrap().push(batch);
                async { Ok(()) }
            })
            .await;
        (result, batches.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_batches_flush_full_then_trailing() {
        let urls = detail_urls("anime", 60);
        let extractor = MockPageExtractor::new()
            .with_listing(1, &urls[..20], Some(3))
            .with_listing(2, &urls[20..40], Some(3))
            .with_listing(3, &urls[40..], Some(3));

        let (result, batches) = collect_batches(
            &crawler(extractor, CrawlConfig::default()),
            &CancellationToken::new(),
        )
        .await;
        let report = result.unwrap();

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![25, 25, 10]);
        assert_eq!(report.urls, 60);
        assert_eq!(report.batches, 3);
        assert_eq!(report.pages_fetched, 3);

        let mut all: Vec<String> = batches.into_iter().flatten().collect();
        all.sort();
        let mut expected = urls.clone();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_worker_pool_bound() {
        let mut extractor = MockPageExtractor::new().with_delay(Duration::from_millis(20));
        for page in 1..=20 {
            extractor =
                extractor.with_listing(page, &detail_urls(&format!("p{page}"), 2), Some(20));
        }
        let config = CrawlConfig {
            concurrency: 5,
            ..Default::default()
        };

        let (result, _) =
            collect_batches(&crawler(extractor.clone(), config), &CancellationToken::new()).await;
        let report = result.unwrap();

        assert_eq!(report.pages_fetched, 20);
        assert_eq!(report.urls, 40);
        assert!(extractor.max_in_flight() <= 5, "max {}", extractor.max_in_flight());
        assert!(extractor.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_dropped() {
        let shared = detail_urls("shared", 3);
        let extractor = MockPageExtractor::new()
            .with_listing(1, &shared, Some(2))
            .with_listing(2, &shared, Some(2));

        let (result, batches) = collect_batches(
            &crawler(extractor, CrawlConfig::default()),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap().urls, 3);
        assert_eq!(batches.concat().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_pages_contribute_nothing() {
        let urls = detail_urls("ok", 4);
        let extractor = MockPageExtractor::new()
            .with_listing(1, &urls[..2], Some(4))
            .with_listing(2, &urls[2..], Some(4))
            .with_panicking_page(3);
        // Page 4 is not registered and answers 404.

        let (result, batches) = collect_batches(
            &crawler(extractor, CrawlConfig::default()),
            &CancellationToken::new(),
        )
        .await;
        let report = result.unwrap();

        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.pages_failed, 2);
        assert_eq!(batches.concat().len(), 4);
    }

    #[tokio::test]
    async fn test_first_page_failure_aborts() {
        let extractor = MockPageExtractor::new().with_listing(2, &detail_urls("x", 1), None);
        let (result, batches) = collect_batches(
            &crawler(extractor.clone(), CrawlConfig::default()),
            &CancellationToken::new(),
        )
        .await;

        assert!(result.unwrap_err().is_fetch_error());
        assert!(batches.is_empty());
        assert_eq!(*extractor.listing_calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_single_page_source_and_max_pages() {
        let extractor = MockPageExtractor::new()
            .with_listing(1, &detail_urls("a", 2), None)
            .with_listing(2, &detail_urls("b", 2), None);
        let (result, _) = collect_batches(
            &crawler(extractor.clone(), CrawlConfig::default()),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap().pages_fetched, 1);

        let capped = MockPageExtractor::new()
            .with_listing(1, &detail_urls("a", 1), Some(10))
            .with_listing(2, &detail_urls("b", 1), Some(10));
        let config = CrawlConfig {
            max_pages: Some(2),
            ..Default::default()
        };
        let (result, _) =
            collect_batches(&crawler(capped.clone(), config), &CancellationToken::new()).await;
        assert_eq!(result.unwrap().urls, 2);
        assert_eq!(capped.listing_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_error_stops_crawl() {
        let urls = detail_urls("stop", 10);
        let extractor = MockPageExtractor::new()
            .with_listing(1, &urls[..5], Some(2))
            .with_listing(2, &urls[5..], Some(2));
        let config = CrawlConfig {
            batch_size: 5,
            ..Default::default()
        };

        let result = crawler(extractor, config)
            .crawl(listing, &CancellationToken::new(), |_| async {
                Err(AppError::ChannelClosed)
            })
            .await;
        assert!(matches!(result, Err(AppError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_batch_error_while_pages_in_flight() {
        let urls = detail_urls("late", 12);
        let extractor = MockPageExtractor::new()
            .with_listing(1, &urls[..2], Some(4))
            .with_listing(2, &urls[2..7], Some(4))
            .with_listing(4, &urls[7..], Some(4))
            .with_panicking_page(3);
        let config = CrawlConfig {
            batch_size: 5,
            concurrency: 1,
            ..Default::default()
        };

        let calls = Mutex::new(0);
        let result = crawler(extractor, config)
            .crawl(listing, &CancellationToken::new(), |_| {
                *calls.lock().unwrap() += 1;
                async { Err(AppError::ChannelClosed) }
            })
            .await;
        assert!(matches!(result, Err(AppError::ChannelClosed)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_coordinator_outcomes() {
        let finished = tokio::spawn(async {
            PageStats {
                fetched: 2,
                failed: 1,
            }
        });
        let stats = abandon(finished).await.unwrap();
        assert_eq!((stats.fetched, stats.failed), (2, 1));

        let panicked = tokio::spawn(async {
            if true {
                panic!("coordinator bug");
            }
            PageStats::default()
        });
        assert!(abandon(panicked).await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let extractor = MockPageExtractor::new()
            .with_delay(Duration::from_secs(5))
            .with_listing(1, &detail_urls("a", 1), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (result, batches) =
            collect_batches(&crawler(extractor, CrawlConfig::default()), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(batches.is_empty());
    }
}
