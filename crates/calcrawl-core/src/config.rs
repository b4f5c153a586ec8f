use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crawler::CrawlConfig;
use crate::error::AppError;
use crate::source::{EventbriteConfig, LumaConfig, MeetupConfig, SourceConfig};

const NEW_YORK_TZ: &str = "America/New_York";

/// Runtime configuration of the crawl pipeline.
///
/// Built once at startup from an optional JSON file, then environment
/// overrides, and passed explicitly to everything that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seconds between ticks of each source strategy.
    pub job_interval_secs: u64,
    /// Seconds between classifier passes.
    pub classifier_interval_secs: u64,
    /// Listing pages fetched concurrently within one crawl.
    pub page_concurrency: usize,
    /// Detail URLs handed to extraction at a time.
    pub batch_size: usize,
    /// Capacity of the ingestion channel.
    pub ingest_capacity: usize,
    pub enable_classifier: bool,
    /// Upper bound on listing pages per crawl.
    pub max_pages: Option<u32>,
    pub sources: Vec<SourceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_interval_secs: 4 * 60 * 60,
            classifier_interval_secs: 4 * 60 * 60,
            page_concurrency: 5,
            batch_size: 25,
            ingest_capacity: 64,
            enable_classifier: true,
            max_pages: None,
            sources: default_sources(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// File (or defaults) plus environment overrides, validated.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from environment variables.
    ///
    /// - `CALCRAWL_JOB_INTERVAL_SECS`
    /// - `CALCRAWL_PAGE_CONCURRENCY`
    /// - `CALCRAWL_BATCH_SIZE`
    /// - `CALCRAWL_INGEST_CAPACITY`
    /// - `CALCRAWL_ENABLE_CLASSIFIER`
    pub fn with_env_overrides(self) -> Result<Self, AppError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "CALCRAWL_JOB_INTERVAL_SECS")? {
            self.job_interval_secs = v;
            self.classifier_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CALCRAWL_PAGE_CONCURRENCY")? {
            self.page_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "CALCRAWL_BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CALCRAWL_INGEST_CAPACITY")? {
            self.ingest_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "CALCRAWL_ENABLE_CLASSIFIER")? {
            self.enable_classifier = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let seconds = |name: &str, secs: u64| {
            usize::try_from(secs)
                .map_err(|_| AppError::ConfigError(format!("{name} is out of range: {secs}")))
        };
        for (name, value) in [
            ("job_interval_secs", seconds("job_interval_secs", self.job_interval_secs)?),
            (
                "classifier_interval_secs",
                seconds("classifier_interval_secs", self.classifier_interval_secs)?,
            ),
            ("page_concurrency", self.page_concurrency),
            ("batch_size", self.batch_size),
            ("ingest_capacity", self.ingest_capacity),
        ] {
            if value == 0 {
                return Err(AppError::ConfigError(format!("{name} must be at least 1")));
            }
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }

    pub fn job_interval(&self) -> Duration {
        Duration::from_secs(self.job_interval_secs)
    }

    pub fn classifier_interval(&self) -> Duration {
        Duration::from_secs(self.classifier_interval_secs)
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            concurrency: self.page_concurrency,
            batch_size: self.batch_size,
            max_pages: self.max_pages,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}

/// Built-in New York sources.
pub fn default_sources() -> Vec<SourceConfig> {
    let queries = [
        ("software technology", "software-technology", vec!["tech"]),
        ("anime", "anime", vec![]),
        ("cosplay", "cosplay", vec![]),
        ("vocaloid", "vocaloid", vec![]),
    ];

    let mut sources = Vec::new();
    for (query, _, tags) in &queries {
        sources.push(SourceConfig::Meetup(MeetupConfig {
            query: query.to_string(),
            country: "us".into(),
            province: "ny".into(),
            city: "New York".into(),
            timezone: NEW_YORK_TZ.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }));
    }
    for (_, slug, tags) in &queries {
        sources.push(SourceConfig::Eventbrite(EventbriteConfig {
            query: slug.to_string(),
            region: "ny--new-york".into(),
            location: "New York, NY".into(),
            timezone: NEW_YORK_TZ.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }));
    }
    sources.push(SourceConfig::Luma(LumaConfig {
        region: "nyc".into(),
        location: "New York, NY".into(),
        timezone: NEW_YORK_TZ.into(),
        tags: vec![],
    }));
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use crate::source::SourceKind;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.job_interval(), Duration::from_secs(14400));
        assert_eq!(config.sources.len(), 9);
        assert_eq!(
            config
                .sources
                .iter()
                .filter(|s| s.kind() == SourceKind::Luma)
                .count(),
            1
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CALCRAWL_JOB_INTERVAL_SECS", "60"),
            ("CALCRAWL_BATCH_SIZE", " 10 "),
            ("CALCRAWL_ENABLE_CLASSIFIER", "false"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.job_interval_secs, 60);
        assert_eq!(config.classifier_interval_secs, 60);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.page_concurrency, 5);
        assert!(!config.enable_classifier);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = PipelineConfig::default()
            .with_overrides(|key| (key == "CALCRAWL_PAGE_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CALCRAWL_PAGE_CONCURRENCY"));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_interval_bounds() {
        let zero = PipelineConfig {
            classifier_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(AppError::ConfigError(_))));

        let huge = PipelineConfig {
            job_interval_secs: u64::MAX,
            ..Default::default()
        };
        // Only representable where usize is 64 bits wide.
        assert_eq!(huge.validate().is_ok(), usize::try_from(u64::MAX).is_ok());
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "page_concurrency": 2,
                "max_pages": 4,
                "sources": [
                    {{"source": "luma", "region": "sf", "location": "San Francisco, CA",
                      "timezone": "America/Los_Angeles", "tags": ["bay"]}}
                ]
            }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.page_concurrency, 2);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.crawl_config().max_pages, Some(4));
        assert_eq!(config.sources[0].tags(), ["bay".to_string()]);
    }

    #[test]
    fn test_missing_file() {
        let err =
            PipelineConfig::from_json_file(Path::new("/nonexistent/calcrawl.json")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
