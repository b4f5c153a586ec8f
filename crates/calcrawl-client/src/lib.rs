pub mod cleaner;
pub mod config;
pub mod http_extractor;
pub mod layout;

#[cfg(feature = "browser")]
pub mod browser_extractor;

#[cfg(feature = "browser")]
pub use browser_extractor::BrowserPageExtractor;
pub use cleaner::MarkdownCleaner;
pub use config::ClientConfig;
pub use http_extractor::HttpPageExtractor;
pub use layout::SourceLayout;
