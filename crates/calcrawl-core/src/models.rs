use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Metadata key holding the unparsed date text scraped from the detail page.
pub const RAW_TIME_KEY: &str = "raw-time";

/// A calendar event discovered on a listing site.
///
/// `id` is a content hash over the identity fields (name, start, end,
/// location, description, origin URL). Tags, flags, and metadata are not
/// part of the identity, so re-tagging an event never changes its id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub location: String,
    pub description: String,
    pub origin_url: String,
    pub tags: BTreeSet<String>,
    pub processed: bool,
    pub relevant: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    /// Build a fresh, unprocessed event and compute its identity hash.
    pub fn new(
        name: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        location: impl Into<String>,
        description: impl Into<String>,
        origin_url: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            id: String::new(),
            name: name.into(),
            start_time,
            end_time,
            location: location.into(),
            description: description.into(),
            origin_url: origin_url.into(),
            tags: BTreeSet::new(),
            processed: false,
            relevant: false,
            metadata: BTreeMap::new(),
        };
        event.id = event.identity_hash();
        event
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Recompute the identity hash from the current identity fields.
    pub fn identity_hash(&self) -> String {
        compute_event_id(
            &self.name,
            &self.start_time,
            &self.end_time,
            &self.location,
            &self.description,
            &self.origin_url,
        )
    }
}

/// Filter for listing stored events.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: usize,
    pub offset: usize,
    /// Every listed tag must be present on a returned event.
    pub tags: Vec<String>,
}

impl EventQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            limit: 50,
            offset: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Whether an event falls inside the window and carries every tag.
    pub fn matches(&self, event: &Event) -> bool {
        let start = event.start_time.with_timezone(&Utc);
        start >= self.start
            && start <= self.end
            && self.tags.iter().all(|tag| event.tags.contains(tag))
    }
}

/// Render a timestamp the way it enters the identity hash: whole seconds,
/// `Z` for a zero offset.
pub fn format_rfc3339(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Identity hash over the fields that define an event.
pub fn compute_event_id(
    name: &str,
    start_time: &DateTime<FixedOffset>,
    end_time: &DateTime<FixedOffset>,
    location: &str,
    description: &str,
    origin_url: &str,
) -> String {
    let data = format!(
        "{}{}{}{}{}{}",
        name,
        format_rfc3339(start_time),
        format_rfc3339(end_time),
        location,
        description,
        origin_url
    );
    compute_hash(&data)
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 15, hour, 0, 0)
            .unwrap()
    }

    fn sample() -> Event {
        Event::new(
            "Rust NYC",
            at(18),
            at(20),
            "New York, NY",
            "Talks and pizza",
            "https://www.meetup.com/rust-nyc/events/123/",
        )
    }

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_rfc3339_uses_whole_seconds() {
        assert_eq!(format_rfc3339(&at(18)), "2025-03-15T18:00:00-04:00");
        let utc = Utc
            .with_ymd_and_hms(2025, 3, 15, 18, 0, 0)
            .unwrap()
            .fixed_offset();
        assert_eq!(format_rfc3339(&utc), "2025-03-15T18:00:00Z");
    }

    #[test]
    fn test_id_ignores_tags_and_metadata() {
        let plain = sample();
        let tagged = sample()
            .with_tags(["tech", "meetup"])
            .with_metadata(RAW_TIME_KEY, "Saturday 6pm");
        let reordered = sample().with_tags(["meetup", "tech", "tech"]);

        assert_eq!(plain.id, tagged.id);
        assert_eq!(tagged.id, reordered.id);
        assert_eq!(tagged.tags, reordered.tags);
        assert_eq!(plain.id, plain.identity_hash());
    }

    #[test]
    fn test_id_varies_with_identity_fields() {
        let base = sample();
        let url = base.origin_url.as_str();
        let variants = [
            Event::new("Other", at(18), at(20), "New York, NY", "Talks and pizza", url),
            Event::new("Rust NYC", at(17), at(20), "New York, NY", "Talks and pizza", url),
            Event::new("Rust NYC", at(18), at(21), "New York, NY", "Talks and pizza", url),
            Event::new("Rust NYC", at(18), at(20), "Brooklyn, NY", "Talks and pizza", url),
            Event::new("Rust NYC", at(18), at(20), "New York, NY", "Talks", url),
            Event::new(
                "Rust NYC",
                at(18),
                at(20),
                "New York, NY",
                "Talks and pizza",
                "https://lu.ma/x",
            ),
        ];
        for variant in variants {
            assert_ne!(base.id, variant.id);
        }
    }

    #[test]
    fn test_query_matches_window_and_all_tags() {
        let event = sample().with_tags(["tech", "meetup"]);
        let day = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        let next = Utc.with_ymd_and_hms(2025, 3, 16, 0, 0, 0).unwrap();

        let query = EventQuery::between(day, next);
        assert!(query.matches(&event));
        assert!(query.clone().with_tags(vec!["tech".into()]).matches(&event));
        assert!(
            !query
                .clone()
                .with_tags(vec!["tech".into(), "anime".into()])
                .matches(&event)
        );
        assert!(!EventQuery::between(next, next).matches(&event));
    }
}
