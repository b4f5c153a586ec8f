use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use calcrawl_core::models::Event;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Window and filters for `GET /v1/events`. Times are unix seconds.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListEventsQuery {
    /// Window start, defaults to now.
    pub start: Option<i64>,
    /// Window end, defaults to 30 days after `start`.
    pub end: Option<i64>,
    /// Page size, defaults to 50, capped at 500.
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Comma-separated tags; every one must be present.
    pub tags: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EventResponse {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub location: String,
    pub description: String,
    pub origin_url: String,
    pub tags: Vec<String>,
    pub processed: bool,
    pub relevant: bool,
    pub metadata: BTreeMap<String, String>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            name: event.name,
            start_time: event.start_time,
            end_time: event.end_time,
            location: event.location,
            description: event.description,
            origin_url: event.origin_url,
            tags: event.tags.into_iter().collect(),
            processed: event.processed,
            relevant: event.relevant,
            metadata: event.metadata,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagListResponse {
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
