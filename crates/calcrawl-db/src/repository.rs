use std::collections::{BTreeMap, BTreeSet};

use calcrawl_core::error::AppError;
use calcrawl_core::models::{Event, EventQuery, format_rfc3339};
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const SELECT_EVENTS: &str = r#"
    SELECT e.id, e.name, e.start_time, e.end_time, e.location, e.description, e.origin_url,
           e.processed, e.relevant, e.metadata,
           (SELECT json_group_array(t.tag) FROM event_tags t WHERE t.event_id = e.id) AS tags
    FROM events e
"#;

/// Repository for event persistence in SQLite.
///
/// Tags live in the `event_tags` relation, one row per (event, tag).
#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the event and its tags unless the id is already stored.
    pub async fn insert_if_absent(&self, event: &Event) -> Result<bool, AppError> {
        let metadata = serde_json::to_string(&event.metadata)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events
                (id, name, start_time, end_time, start_ts, end_ts, location, description,
                 origin_url, processed, relevant, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(format_rfc3339(&event.start_time))
        .bind(format_rfc3339(&event.end_time))
        .bind(event.start_time.timestamp())
        .bind(event.end_time.timestamp())
        .bind(&event.location)
        .bind(&event.description)
        .bind(&event.origin_url)
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .rows_affected()
            == 1;

        if inserted {
            for tag in &event.tags {
                sqlx::query("INSERT OR IGNORE INTO event_tags (event_id, tag) VALUES (?, ?)")
                    .bind(&event.id)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
            }
        }

        tx.commit().await.map_err(db_error)?;
        Ok(inserted)
    }

    /// Events starting inside the window carrying every requested tag,
    /// ordered by start time.
    pub async fn list(&self, query: &EventQuery) -> Result<Vec<Event>, AppError> {
        let tags: BTreeSet<&str> = query.tags.iter().map(String::as_str).collect();

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_EVENTS);
        builder
            .push(" WHERE e.start_ts >= ")
            .push_bind(query.start.timestamp())
            .push(" AND e.start_ts <= ")
            .push_bind(query.end.timestamp());

        if !tags.is_empty() {
            builder.push(
                " AND (SELECT COUNT(*) FROM event_tags f WHERE f.event_id = e.id AND f.tag IN (",
            );
            {
                let mut separated = builder.separated(", ");
                for tag in &tags {
                    separated.push_bind(*tag);
                }
            }
            builder.push(")) = ").push_bind(tags.len() as i64);
        }

        builder
            .push(" ORDER BY e.start_ts, e.id LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(Event::try_from).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Event>, AppError> {
        let row = sqlx::query_as::<_, EventRow>(&format!("{SELECT_EVENTS} WHERE e.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Event::try_from).transpose()
    }

    pub async fn unprocessed(&self) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "{SELECT_EVENTS} WHERE e.processed = 0 ORDER BY e.start_ts, e.id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Event::try_from).collect()
    }

    /// Write classifier results for already stored events in one transaction.
    /// Identity columns are never touched; tags are only added.
    pub async fn mark_processed(&self, events: &[Event]) -> Result<(), AppError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for event in events {
            let metadata = serde_json::to_string(&event.metadata)?;
            sqlx::query("UPDATE events SET processed = ?, relevant = ?, metadata = ? WHERE id = ?")
                .bind(event.processed)
                .bind(event.relevant)
                .bind(&metadata)
                .bind(&event.id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

            for tag in &event.tags {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO event_tags (event_id, tag)
                    SELECT id, ? FROM events WHERE id = ?
                    "#,
                )
                .bind(tag)
                .bind(&event.id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }
        }
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(count = events.len(), "Processed events updated");
        Ok(())
    }

    pub async fn tags_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT t.tag
            FROM event_tags t
            JOIN events e ON e.id = t.event_id
            WHERE e.start_ts > ?
            ORDER BY t.tag
            "#,
        )
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|(tag,)| tag).collect())
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.0)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    name: String,
    start_time: String,
    end_time: String,
    location: String,
    description: String,
    origin_url: String,
    processed: bool,
    relevant: bool,
    metadata: String,
    tags: String,
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let tags: BTreeSet<String> = serde_json::from_str(&row.tags)?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&row.metadata)?;

        Ok(Event {
            start_time: parse_time(&row.id, &row.start_time)?,
            end_time: parse_time(&row.id, &row.end_time)?,
            id: row.id,
            name: row.name,
            location: row.location,
            description: row.description,
            origin_url: row.origin_url,
            tags,
            processed: row.processed,
            relevant: row.relevant,
            metadata,
        })
    }
}

fn parse_time(id: &str, raw: &str) -> Result<DateTime<FixedOffset>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|e| AppError::DatabaseError(format!("Event {id} has bad timestamp '{raw}': {e}")))
}

// -- Trait implementation --

impl calcrawl_core::traits::EventStore for EventRepository {
    async fn upsert_if_absent(&self, event: &Event) -> Result<bool, AppError> {
        self.insert_if_absent(event).await
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>, AppError> {
        self.list(query).await
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        self.get(id).await
    }

    async fn get_unprocessed(&self) -> Result<Vec<Event>, AppError> {
        self.unprocessed().await
    }

    async fn bulk_update_processed(&self, events: &[Event]) -> Result<(), AppError> {
        self.mark_processed(events).await
    }

    async fn distinct_tags_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        self.tags_since(since).await
    }
}
