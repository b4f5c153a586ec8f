use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, TimeDelta, Utc};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use calcrawl_core::error::AppError;
use calcrawl_core::models::EventQuery;

use crate::dto::{
    EventListResponse, EventResponse, HealthResponse, ListEventsQuery, TagListResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Build the full router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/events", get(list_events))
        .route("/v1/events/{id}", get(get_event))
        .route("/v1/tags", get(list_tags))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/events",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "Events starting in the window", body = EventListResponse),
        (status = 400, description = "Invalid window", body = crate::dto::ErrorResponse),
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = event_query(&params, Utc::now())?;
    let events = state.db.event_repo().list(&query).await?;
    let total = events.len();

    let response = EventListResponse {
        events: events.into_iter().map(EventResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    };

    Ok(axum::Json(response))
}

/// Turn request parameters into a store query, applying defaults and caps.
pub fn event_query(params: &ListEventsQuery, now: DateTime<Utc>) -> Result<EventQuery, AppError> {
    let start = match params.start {
        Some(secs) => timestamp(secs, "start")?,
        None => now,
    };
    let end = match params.end {
        Some(secs) => timestamp(secs, "end")?,
        None => start + TimeDelta::days(DEFAULT_WINDOW_DAYS),
    };
    if end < start {
        return Err(AppError::ConfigError(format!(
            "end ({}) is before start ({})",
            end.timestamp(),
            start.timestamp()
        )));
    }

    let tags: Vec<String> = params
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();

    Ok(EventQuery::between(start, end)
        .with_page(
            params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            params.offset.unwrap_or(0),
        )
        .with_tags(tags))
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::ConfigError(format!("{field} is out of range: {secs}")))
}

#[utoipa::path(
    get,
    path = "/v1/events/{id}",
    params(
        ("id" = String, Path, description = "Event content hash")
    ),
    responses(
        (status = 200, description = "Event details", body = EventResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.db.event_repo().get(&id).await?;

    match event {
        Some(event) => Ok(axum::Json(EventResponse::from(event))),
        None => Err(AppError::NotFound(format!("Event not found: {id}")).into()),
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/tags",
    responses(
        (status = 200, description = "Distinct tags of upcoming events", body = TagListResponse),
    ),
    tag = "events"
)]
pub async fn list_tags(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let tags = state.db.event_repo().tags_since(Utc::now()).await?;
    Ok(axum::Json(TagListResponse { tags }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.db.event_repo().health_check().await.is_ok();

    let (status, response) = if healthy {
        (
            StatusCode::OK,
            HealthResponse {
                status: "healthy",
                database: "ok",
            },
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                status: "unhealthy",
                database: "error",
            },
        )
    };

    (status, axum::Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_742_076_000, 0).unwrap()
    }

    #[test]
    fn test_query_defaults() {
        let query = event_query(&ListEventsQuery::default(), now()).unwrap();
        assert_eq!(query.start, now());
        assert_eq!(query.end, now() + TimeDelta::days(30));
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(query.tags.is_empty());
    }

    #[test]
    fn test_query_caps_limit_and_splits_tags() {
        let params = ListEventsQuery {
            start: Some(1_000),
            end: Some(2_000),
            limit: Some(10_000),
            offset: Some(20),
            tags: Some("anime, luma,,".into()),
        };
        let query = event_query(&params, now()).unwrap();
        assert_eq!(query.start.timestamp(), 1_000);
        assert_eq!(query.end.timestamp(), 2_000);
        assert_eq!(query.limit, MAX_LIMIT);
        assert_eq!(query.offset, 20);
        assert_eq!(query.tags, vec!["anime", "luma"]);
    }

    #[test]
    fn test_end_before_start_rejected() {
        let params = ListEventsQuery {
            start: Some(2_000),
            end: Some(1_000),
            ..Default::default()
        };
        assert!(matches!(
            event_query(&params, now()),
            Err(AppError::ConfigError(_))
        ));
    }
}
