pub mod classifier;
pub mod config;
pub mod crawler;
pub mod dates;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod links;
pub mod memory;
pub mod models;
pub mod resolver;
pub mod scheduler;
pub mod source;
pub mod strategy;
pub mod traits;
pub mod util;

#[cfg(test)]
pub mod testutil;

pub use classifier::{ClassifyReport, TagClassifier, TagDictionary};
pub use config::PipelineConfig;
pub use crawler::{CrawlConfig, CrawlReport, PaginationCrawler};
pub use error::AppError;
pub use filter::UrlFilter;
pub use ingest::{IngestReport, Ingestor};
pub use links::{LinkScanner, extract_links};
pub use memory::MemoryStore;
pub use models::{Event, EventQuery, compute_hash};
pub use resolver::EventResolver;
pub use scheduler::{Job, Scheduler, SchedulerEvent, SchedulerReporter, TracingSchedulerReporter};
pub use source::{SourceConfig, SourceKind};
pub use strategy::{Strategy, StrategyReport};
pub use traits::{Cleaner, DetailPage, EventStore, ListingPage, PageExtractor};
