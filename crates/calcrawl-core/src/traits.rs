use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{Event, EventQuery};

/// Raw HTML of one listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub html: String,
    /// Total number of listing pages, for sources that paginate.
    pub total_pages: Option<u32>,
}

/// Text fields pulled out of one event detail page.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub title: String,
    /// Markup or plain text, depending on the source.
    pub description: String,
    pub raw_date: String,
}

/// Fetches listing and detail pages for one source layout.
///
/// Implementations may render pages in a browser or fetch them over plain
/// HTTP; the crawl pipeline only depends on this contract.
pub trait PageExtractor: Send + Sync + Clone {
    fn fetch_listing(
        &self,
        url: &str,
        page: u32,
    ) -> impl Future<Output = Result<ListingPage, AppError>> + Send;

    fn fetch_detail(&self, url: &str) -> impl Future<Output = Result<DetailPage, AppError>> + Send;
}

/// Converts description markup into simplified Markdown.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Persists and retrieves events.
///
/// Implementations must tolerate concurrent callers: the single ingestion
/// consumer and the periodic classifier write at the same time.
pub trait EventStore: Send + Sync + Clone {
    /// Insert the event unless one with the same id already exists.
    /// Returns `true` when a new row was written.
    fn upsert_if_absent(&self, event: &Event)
    -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Events starting inside the window, ordered by start time.
    fn query_events(
        &self,
        query: &EventQuery,
    ) -> impl Future<Output = Result<Vec<Event>, AppError>> + Send;

    fn get_event(&self, id: &str) -> impl Future<Output = Result<Option<Event>, AppError>> + Send;

    fn get_unprocessed(&self) -> impl Future<Output = Result<Vec<Event>, AppError>> + Send;

    /// Persist tags, flags, and metadata of already-stored events in one write.
    fn bulk_update_processed(
        &self,
        events: &[Event],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Distinct tags of events starting after `since`, sorted.
    fn distinct_tags_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}
