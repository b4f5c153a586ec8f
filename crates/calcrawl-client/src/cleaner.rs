use std::sync::Arc;

use calcrawl_core::error::AppError;
use calcrawl_core::traits::Cleaner;
use calcrawl_core::util::collapse_blank_lines;
use htmd::HtmlToMarkdown;

/// Event description cleaner using htmd.
///
/// Converts description markup into Markdown, dropping non-content elements
/// and squeezing the blank-line runs htmd leaves between blocks.
pub struct MarkdownCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for MarkdownCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl MarkdownCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "noscript", "iframe", "svg", "nav", "footer",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for MarkdownCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for MarkdownCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|markdown| collapse_blank_lines(&markdown))
            .map_err(|e| AppError::CleanerError(e.to_string()))
    }
}
