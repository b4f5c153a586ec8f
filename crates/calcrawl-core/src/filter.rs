use std::collections::HashSet;

use regex::Regex;
use url::Url;

use crate::error::AppError;

/// Turns raw candidate links into canonical detail-page URLs for one source.
///
/// A link survives when it resolves to an http(s) URL whose host matches the
/// source's host pattern, whose path looks like a detail page, and which no
/// exclusion pattern rejects. Query and fragment are stripped; the output is
/// deduplicated in first-seen order.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    base: Url,
    host: Regex,
    path: Regex,
    exclusions: Vec<Regex>,
}

impl UrlFilter {
    pub fn new(base: &str, host_pattern: &str, path_pattern: &str) -> Result<Self, AppError> {
        let base = Url::parse(base)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base}': {e}")))?;
        Ok(Self {
            base,
            host: compile(host_pattern)?,
            path: compile(path_pattern)?,
            exclusions: Vec::new(),
        })
    }

    /// Reject paths matching `pattern` even when the path pattern accepts them.
    pub fn exclude(mut self, pattern: &str) -> Result<Self, AppError> {
        self.exclusions.push(compile(pattern)?);
        Ok(self)
    }

    /// `meetup.com/<group>/events/<id>/`
    pub fn meetup() -> Result<Self, AppError> {
        Self::new(
            "https://www.meetup.com",
            r"^(www\.)?meetup\.com$",
            r"^/[^/]+/events/\d+/$",
        )
    }

    /// `eventbrite.<tld>/e/<slug>`
    pub fn eventbrite() -> Result<Self, AppError> {
        Self::new(
            "https://www.eventbrite.com",
            r"^(www\.)?eventbrite\.[a-z.]+$",
            r"^/e/.+",
        )
    }

    /// `lu.ma/<slug>`, excluding the region listing page itself.
    pub fn luma(region: &str) -> Result<Self, AppError> {
        Self::new("https://lu.ma", r"^(www\.)?lu\.ma$", r"^/[a-z0-9-]+$")?
            .exclude(&format!("^/{}$", regex::escape(region)))
    }

    /// Check a single candidate link, returning its canonical form.
    pub fn accept(&self, raw: &str) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let mut url = if raw.starts_with('/') {
            self.base.join(raw).ok()?
        } else {
            Url::parse(raw).ok()?
        };

        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if !self.host.is_match(url.host_str()?) {
            return None;
        }
        let path = url.path();
        if !self.path.is_match(path) || self.exclusions.iter().any(|re| re.is_match(path)) {
            return None;
        }

        url.set_query(None);
        url.set_fragment(None);
        Some(url)
    }

    /// Filter and deduplicate a batch of candidate links.
    pub fn filter<I, S>(&self, links: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        links
            .into_iter()
            .filter_map(|link| self.accept(link.as_ref()))
            .map(String::from)
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern)
        .map_err(|e| AppError::ConfigError(format!("Invalid URL pattern '{pattern}': {e}")))
}
