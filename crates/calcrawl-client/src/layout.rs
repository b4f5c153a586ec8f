//! Where each source keeps its listing markup, pagination, and event fields.

use std::sync::LazyLock;

use calcrawl_core::{AppError, DetailPage, ListingPage, SourceKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Scrolls to the bottom of the page so lazy lists load more items.
pub const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// CSS selectors and rendering hints for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    /// Element holding the event list. The whole document when `None`.
    pub listing_root: Option<&'static str>,
    /// Element whose text ends with the total page count.
    pub pagination: Option<&'static str>,
    /// Scroll and settle passes a browser makes before reading a page.
    pub scroll_passes: u32,
    pub title: &'static str,
    /// Every match contributes its markup to the description.
    pub description: Option<&'static str>,
    /// First non-empty text of each selector, joined with a space.
    pub date: &'static [&'static str],
}

impl SourceLayout {
    pub const fn for_source(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Meetup => Self {
                listing_root: None,
                pagination: None,
                scroll_passes: 3,
                title: "h1",
                description: None,
                date: &["time"],
            },
            SourceKind::Eventbrite => Self {
                listing_root: None,
                pagination: Some("[data-testid=\"pagination-parent\"]"),
                scroll_passes: 1,
                title: "h1",
                description: Some(".summary"),
                date: &[".date-info__full-datetime"],
            },
            SourceKind::Luma => Self {
                listing_root: Some(".events"),
                pagination: None,
                scroll_passes: 3,
                title: ".title-wrapper",
                description: Some(".content"),
                date: &[".meta .title", ".meta .desc"],
            },
        }
    }

    pub fn parse_listing(&self, html: &str) -> Result<ListingPage, AppError> {
        let document = Html::parse_document(html);

        let html = match self.listing_root {
            Some(root) => {
                let selector = parse_selector(root)?;
                match document.select(&selector).next() {
                    Some(element) => element.html(),
                    None => {
                        tracing::debug!(
                            selector = root,
                            "Listing root missing, keeping whole page"
                        );
                        html.to_string()
                    }
                }
            }
            None => html.to_string(),
        };

        let total_pages = match self.pagination {
            Some(pagination) => {
                let selector = parse_selector(pagination)?;
                document
                    .select(&selector)
                    .next()
                    .and_then(|element| last_number(&text_of(element)))
            }
            None => None,
        };

        Ok(ListingPage { html, total_pages })
    }

    pub fn parse_detail(&self, html: &str) -> Result<DetailPage, AppError> {
        let document = Html::parse_document(html);

        let title = first_text(&document, self.title)?.unwrap_or_default();

        let description = match self.description {
            Some(description) => {
                let selector = parse_selector(description)?;
                document
                    .select(&selector)
                    .map(|element| element.html())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            None => String::new(),
        };

        let mut parts = Vec::with_capacity(self.date.len());
        for selector in self.date {
            if let Some(text) = first_text(&document, selector)? {
                parts.push(text);
            }
        }

        Ok(DetailPage {
            title,
            description,
            raw_date: parts.join(" "),
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector, AppError> {
    Selector::parse(s).map_err(|e| AppError::Generic(format!("Invalid selector '{s}': {e:?}")))
}

/// Text of the first match with any non-whitespace content.
fn first_text(document: &Html, selector: &str) -> Result<Option<String>, AppError> {
    let selector = parse_selector(selector)?;
    Ok(document
        .select(&selector)
        .map(text_of)
        .find(|text| !text.is_empty()))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn last_number(text: &str) -> Option<u32> {
    NUMBER
        .find_iter(text)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}
