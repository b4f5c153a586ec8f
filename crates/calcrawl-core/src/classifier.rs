use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::Event;
use crate::scheduler::Job;
use crate::traits::EventStore;

const BUNDLED: [(&str, &str); 7] = [
    (
        "ai",
        include_str!("../resources/keywords/artificial_intelligence.json"),
    ),
    (
        "refreshments",
        include_str!("../resources/keywords/food_and_drink.json"),
    ),
    ("software", include_str!("../resources/keywords/software.json")),
    ("startup", include_str!("../resources/keywords/startup.json")),
    ("anime", include_str!("../resources/keywords/anime.json")),
    ("sports", include_str!("../resources/keywords/sports.json")),
    ("improv", include_str!("../resources/keywords/improv.json")),
];

/// Category label → keywords. Matching is a case-sensitive substring test.
#[derive(Debug, Clone, Default)]
pub struct TagDictionary {
    categories: BTreeMap<String, Vec<String>>,
}

impl TagDictionary {
    /// The keyword lists compiled into the binary.
    pub fn bundled() -> Result<Self, AppError> {
        let mut categories = BTreeMap::new();
        for (label, raw) in BUNDLED {
            let keywords: Vec<String> = serde_json::from_str(raw)?;
            categories.insert(label.to_string(), keywords);
        }
        Ok(Self { categories })
    }

    pub fn from_map(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { categories }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Labels of every category with at least one keyword in `text`.
    pub fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> {
        self.categories
            .iter()
            .filter(move |(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(label, _)| label.as_str())
    }
}

/// Counters from one classifier pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    pub processed: usize,
    pub relevant: usize,
    pub tags_added: usize,
}

/// Tags freshly ingested events by keyword and marks them processed.
#[derive(Clone)]
pub struct TagClassifier<S: EventStore> {
    store: S,
    dictionary: Arc<TagDictionary>,
}

impl<S: EventStore> TagClassifier<S> {
    pub fn new(store: S, dictionary: Arc<TagDictionary>) -> Self {
        Self { store, dictionary }
    }

    /// Add category tags found in the name or description.
    ///
    /// An event counts as relevant when the keywords added nothing beyond the
    /// tags it already had. Returns the number of tags added.
    pub fn classify(&self, event: &mut Event) -> usize {
        let before = event.tags.len();
        let found: Vec<String> = self
            .dictionary
            .matching(&event.name)
            .chain(self.dictionary.matching(&event.description))
            .map(str::to_string)
            .collect();
        event.tags.extend(found);

        let added = event.tags.len() - before;
        event.relevant = added == 0;
        event.processed = true;
        added
    }

    /// Classify every unprocessed event and persist them in one write.
    pub async fn run_once(&self) -> Result<ClassifyReport, AppError> {
        let mut events = self.store.get_unprocessed().await?;
        let mut report = ClassifyReport::default();
        if events.is_empty() {
            return Ok(report);
        }

        for event in &mut events {
            report.tags_added += self.classify(event);
            report.processed += 1;
            if event.relevant {
                report.relevant += 1;
            }
        }

        self.store.bulk_update_processed(&events).await?;
        Ok(report)
    }
}

impl<S: EventStore + 'static> Job for TagClassifier<S> {
    fn name(&self) -> &str {
        "classifier"
    }

    fn run_immediately(&self) -> bool {
        true
    }

    async fn perform(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
        let report = self.run_once().await?;
        tracing::info!(
            processed = report.processed,
            relevant = report.relevant,
            tags_added = report.tags_added,
            "Classifier pass finished"
        );
        Ok(())
    }
}
