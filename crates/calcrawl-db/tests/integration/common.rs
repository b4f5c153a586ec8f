use calcrawl_core::Event;
use calcrawl_db::Database;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

/// Fresh in-memory database with the schema applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");
    db
}

/// Fixed point in time all fixtures are relative to.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 22, 0, 0).unwrap()
}

fn eastern(time: DateTime<Utc>) -> DateTime<FixedOffset> {
    time.with_timezone(&FixedOffset::west_opt(4 * 3600).unwrap())
}

/// Two-hour event starting `hours` after [`base_time`].
pub fn event_at(name: &str, hours: i64, tags: &[&str]) -> Event {
    let start = base_time() + Duration::hours(hours);
    Event::new(
        name,
        eastern(start),
        eastern(start + Duration::hours(2)),
        "New York, NY",
        format!("{name} description"),
        format!("https://lu.ma/{}", name.to_lowercase().replace(' ', "-")),
    )
    .with_tags(tags.iter().copied())
    .with_metadata("raw-time", "Saturday 6pm")
}
