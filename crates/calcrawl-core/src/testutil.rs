//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::AppError;
use crate::models::{Event, EventQuery};
use crate::traits::{Cleaner, DetailPage, EventStore, ListingPage, PageExtractor};

// ---------------------------------------------------------------------------
// MockPageExtractor
// ---------------------------------------------------------------------------

/// Mock extractor serving canned listing and detail pages.
///
/// Pages not registered answer with an HTTP 404 error. Tracks how many
/// listing fetches are in flight at once so tests can assert pool bounds.
#[derive(Clone, Default)]
pub struct MockPageExtractor {
    listings: Arc<Mutex<HashMap<u32, ListingPage>>>,
    details: Arc<Mutex<HashMap<String, DetailPage>>>,
    panicking_pages: Arc<Mutex<HashSet<u32>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub listing_calls: Arc<Mutex<Vec<u32>>>,
    pub detail_calls: Arc<Mutex<Vec<String>>>,
}

impl MockPageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register listing page `page` containing anchors to `links`.
    pub fn with_listing(self, page: u32, links: &[String], total_pages: Option<u32>) -> Self {
        self.listings.lock().unwrap().insert(
            page,
            ListingPage {
                html: listing_html(links),
                total_pages,
            },
        );
        self
    }

    pub fn with_detail(self, url: &str, title: &str, description: &str, raw_date: &str) -> Self {
        self.details.lock().unwrap().insert(
            url.to_string(),
            DetailPage {
                title: title.to_string(),
                description: description.to_string(),
                raw_date: raw_date.to_string(),
            },
        );
        self
    }

    pub fn with_panicking_page(self, page: u32) -> Self {
        self.panicking_pages.lock().unwrap().insert(page);
        self
    }

    /// Sleep this long inside every listing fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PageExtractor for MockPageExtractor {
    async fn fetch_listing(&self, _url: &str, page: u32) -> Result<ListingPage, AppError> {
        self.listing_calls.lock().unwrap().push(page);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let explode = self.panicking_pages.lock().unwrap().contains(&page);
        if explode {
            panic!("listing page {page} exploded");
        }

        self.listings
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .ok_or_else(|| AppError::HttpError(format!("HTTP 404 for page {page}")))
    }

    async fn fetch_detail(&self, url: &str) -> Result<DetailPage, AppError> {
        self.detail_calls.lock().unwrap().push(url.to_string());
        self.details
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::HttpError(format!("HTTP 404 for {url}")))
    }
}

/// Minimal listing markup with one anchor per link.
pub fn listing_html(links: &[String]) -> String {
    let mut html = String::from("<html><body><ul>");
    for link in links {
        html.push_str(&format!("<li><a href=\"{link}\">event</a></li>"));
    }
    html.push_str("</ul></body></html>");
    html
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that applies a simple transformation.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockCleaner {
    /// Creates a cleaner that strips `<p>` wrappers and returns the rest.
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a cleaner that fails once with the given error.
    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(html.replace("<p>", "").replace("</p>", "").trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Event starting `days_ahead` days from now, two hours long.
pub fn make_test_event(name: &str, days_ahead: i64) -> Event {
    let start = (Utc::now() + chrono::Duration::days(days_ahead)).trunc_subsecs(0);
    let end = start + chrono::Duration::hours(2);
    Event::new(
        name,
        start.fixed_offset(),
        end.fixed_offset(),
        "New York, NY",
        format!("{name} description"),
        format!("https://lu.ma/{}", name.to_lowercase().replace(' ', "-")),
    )
}

/// `count` distinct eventbrite detail URLs sharing a prefix.
pub fn detail_urls(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://www.eventbrite.com/e/{prefix}-{i}"))
        .collect()
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// Store whose every operation fails, as if the database were unreachable.
#[derive(Clone, Copy, Default)]
pub struct FailingStore;

fn unavailable() -> AppError {
    AppError::DatabaseError("database is locked".into())
}

impl EventStore for FailingStore {
    async fn upsert_if_absent(&self, _event: &Event) -> Result<bool, AppError> {
        Err(unavailable())
    }

    async fn query_events(&self, _query: &EventQuery) -> Result<Vec<Event>, AppError> {
        Err(unavailable())
    }

    async fn get_event(&self, _id: &str) -> Result<Option<Event>, AppError> {
        Err(unavailable())
    }

    async fn get_unprocessed(&self) -> Result<Vec<Event>, AppError> {
        Err(unavailable())
    }

    async fn bulk_update_processed(&self, _events: &[Event]) -> Result<(), AppError> {
        Err(unavailable())
    }

    async fn distinct_tags_since(&self, _since: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        Err(unavailable())
    }
}
