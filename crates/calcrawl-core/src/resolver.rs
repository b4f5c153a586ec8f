use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use crate::dates;
use crate::error::AppError;
use crate::models::{Event, RAW_TIME_KEY};
use crate::source::{SourceConfig, SourceKind};
use crate::traits::{Cleaner, PageExtractor};

/// Turns one detail-page URL into an [`Event`].
///
/// Pipeline: fetch → validate title/date → date search → bind zone →
/// clean description → tag → hash.
#[derive(Clone)]
pub struct EventResolver<P, C>
where
    P: PageExtractor,
    C: Cleaner,
{
    extractor: P,
    cleaner: C,
    source: SourceKind,
    location: String,
    tz: Tz,
    tags: BTreeSet<String>,
    reference_date: Option<NaiveDate>,
}

impl<P, C> EventResolver<P, C>
where
    P: PageExtractor,
    C: Cleaner,
{
    pub fn new(extractor: P, cleaner: C, config: &SourceConfig) -> Result<Self, AppError> {
        let source = config.kind();
        let mut tags: BTreeSet<String> = config.tags().iter().cloned().collect();
        tags.insert(source.tag().to_string());

        Ok(Self {
            extractor,
            cleaner,
            source,
            location: config.location_label(),
            tz: config.timezone()?,
            tags,
            reference_date: None,
        })
    }

    /// Pin "today" instead of reading the clock.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub async fn resolve(&self, url: &str) -> Result<Event, AppError> {
        let detail = self.extractor.fetch_detail(url).await?;

        let title = detail.title.trim();
        if title.is_empty() {
            return Err(AppError::MissingTitle { url: url.into() });
        }
        let raw_date = detail.raw_date.trim();
        if raw_date.is_empty() {
            return Err(AppError::MissingDate { url: url.into() });
        }

        let (start, end) = dates::parse_event_window(raw_date, self.today(), self.tz)?;
        let description = self.describe(&detail.description, url);

        Ok(Event::new(title, start, end, &self.location, description, url)
            .with_tags(self.tags.iter().cloned())
            .with_metadata(RAW_TIME_KEY, raw_date))
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().with_timezone(&self.tz).date_naive())
    }

    fn describe(&self, description: &str, url: &str) -> String {
        if !self.source.rich_description() {
            return description.trim().to_string();
        }
        match self.cleaner.clean(description) {
            Ok(markdown) => markdown,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Description cleanup failed, keeping raw text");
                description.trim().to_string()
            }
        }
    }
}
