//! In-process [`EventStore`] used for dry-run crawls and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{Event, EventQuery};
use crate::traits::EventStore;

/// Event store backed by a `HashMap` behind a mutex. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    events: Arc<Mutex<HashMap<String, Event>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored events ordered by start time.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.lock().values().cloned().collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        events
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Event>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventStore for MemoryStore {
    async fn upsert_if_absent(&self, event: &Event) -> Result<bool, AppError> {
        let mut events = self.lock();
        if events.contains_key(&event.id) {
            return Ok(false);
        }
        let mut stored = event.clone();
        stored.processed = false;
        stored.relevant = false;
        events.insert(stored.id.clone(), stored);
        Ok(true)
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>, AppError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|event| query.matches(event))
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn get_unprocessed(&self) -> Result<Vec<Event>, AppError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|event| !event.processed)
            .collect())
    }

    async fn bulk_update_processed(&self, updates: &[Event]) -> Result<(), AppError> {
        let mut events = self.lock();
        for update in updates {
            if let Some(stored) = events.get_mut(&update.id) {
                stored.tags.extend(update.tags.iter().cloned());
                stored.processed = update.processed;
                stored.relevant = update.relevant;
                stored.metadata = update.metadata.clone();
            }
        }
        Ok(())
    }

    async fn distinct_tags_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let tags: BTreeSet<String> = self
            .lock()
            .values()
            .filter(|event| event.start_time.with_timezone(&Utc) > since)
            .flat_map(|event| event.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }
}
