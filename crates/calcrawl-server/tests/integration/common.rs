use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, SubsecRound, Utc};
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use calcrawl_core::Event;
use calcrawl_db::Database;
use calcrawl_server::routes;
use calcrawl_server::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

/// Router over a fresh in-memory database.
pub async fn setup_test_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");

    let state = Arc::new(AppState { db: db.clone() });
    TestApp {
        router: routes::router(state),
        db,
    }
}

/// Two-hour event starting `days` days from now.
pub fn upcoming_event(name: &str, days: i64, tags: &[&str]) -> Event {
    let start = (Utc::now() + Duration::days(days))
        .trunc_subsecs(0)
        .fixed_offset();
    Event::new(
        name,
        start,
        start + Duration::hours(2),
        "New York, NY",
        format!("{name} description"),
        format!("https://lu.ma/{}", name.to_lowercase().replace(' ', "-")),
    )
    .with_tags(tags.iter().copied())
}

/// GET `uri` and decode the JSON body.
pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}
