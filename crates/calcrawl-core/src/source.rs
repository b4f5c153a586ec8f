use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::filter::UrlFilter;

const MEETUP_FIND_URL: &str = "https://www.meetup.com/find/";

/// Listing site an event was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Meetup,
    Eventbrite,
    Luma,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Meetup => "meetup",
            SourceKind::Eventbrite => "eventbrite",
            SourceKind::Luma => "luma",
        }
    }

    /// Tag added to every event from this source.
    pub fn tag(&self) -> &'static str {
        self.as_str()
    }

    /// Whether detail descriptions are markup that should be converted to
    /// Markdown. Meetup descriptions are kept as plain text.
    pub fn rich_description(&self) -> bool {
        matches!(self, SourceKind::Eventbrite | SourceKind::Luma)
    }

    /// Whether the job performs a tick at startup instead of waiting one
    /// interval.
    pub fn run_immediately(&self) -> bool {
        matches!(self, SourceKind::Luma)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meetup" => Ok(SourceKind::Meetup),
            "eventbrite" => Ok(SourceKind::Eventbrite),
            "luma" => Ok(SourceKind::Luma),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupConfig {
    pub query: String,
    /// ISO-3166 alpha-2 code.
    pub country: String,
    #[serde(default)]
    pub province: String,
    pub city: String,
    pub timezone: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventbriteConfig {
    /// Search slug, e.g. `software-technology`.
    pub query: String,
    /// Region slug, e.g. `ny--new-york`.
    pub region: String,
    /// Display label stored on every event.
    pub location: String,
    pub timezone: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LumaConfig {
    /// Region slug, e.g. `nyc`.
    pub region: String,
    pub location: String,
    pub timezone: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Configuration of one crawl strategy.
///
/// ```json
/// {"source": "luma", "region": "nyc", "location": "New York, NY",
///  "timezone": "America/New_York", "tags": []}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SourceConfig {
    Meetup(MeetupConfig),
    Eventbrite(EventbriteConfig),
    Luma(LumaConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::Meetup(_) => SourceKind::Meetup,
            SourceConfig::Eventbrite(_) => SourceKind::Eventbrite,
            SourceConfig::Luma(_) => SourceKind::Luma,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            SourceConfig::Meetup(c) => &c.tags,
            SourceConfig::Eventbrite(c) => &c.tags,
            SourceConfig::Luma(c) => &c.tags,
        }
    }

    pub fn timezone_name(&self) -> &str {
        match self {
            SourceConfig::Meetup(c) => &c.timezone,
            SourceConfig::Eventbrite(c) => &c.timezone,
            SourceConfig::Luma(c) => &c.timezone,
        }
    }

    pub fn timezone(&self) -> Result<Tz, AppError> {
        let name = self.timezone_name();
        name.parse::<Tz>()
            .map_err(|_| AppError::InvalidTimezone(name.to_string()))
    }

    /// Human-readable location stored on events.
    pub fn location_label(&self) -> String {
        match self {
            SourceConfig::Meetup(c) if c.province.is_empty() => {
                format!("{}, {}", c.city, c.country.to_uppercase())
            }
            SourceConfig::Meetup(c) => format!(
                "{}, {}, {}",
                c.city,
                c.province.to_uppercase(),
                c.country.to_uppercase()
            ),
            SourceConfig::Eventbrite(c) => c.location.clone(),
            SourceConfig::Luma(c) => c.location.clone(),
        }
    }

    /// Short name used for the job and in logs.
    pub fn name(&self) -> String {
        match self {
            SourceConfig::Meetup(c) => format!("meetup:{}@{}", c.query, c.city),
            SourceConfig::Eventbrite(c) => format!("eventbrite:{}@{}", c.query, c.region),
            SourceConfig::Luma(c) => format!("luma:{}", c.region),
        }
    }

    /// Check the configuration before any job is built from it.
    pub fn validate(&self) -> Result<(), AppError> {
        self.timezone()?;
        match self {
            SourceConfig::Meetup(c) => {
                require("query", &c.query)?;
                require("city", &c.city)?;
                meetup_location(&c.country, &c.province, &c.city)?;
            }
            SourceConfig::Eventbrite(c) => {
                require_slug("query", &c.query)?;
                require_slug("region", &c.region)?;
            }
            SourceConfig::Luma(c) => {
                require_slug("region", &c.region)?;
            }
        }
        Ok(())
    }

    /// Listing URL for `page` (1-based). Only eventbrite paginates.
    pub fn listing_url(&self, page: u32) -> Result<String, AppError> {
        match self {
            SourceConfig::Meetup(c) => {
                let location = meetup_location(&c.country, &c.province, &c.city)?;
                let url = Url::parse_with_params(
                    MEETUP_FIND_URL,
                    &[
                        ("suggested", "true"),
                        ("source", "EVENTS"),
                        ("keywords", c.query.as_str()),
                        ("location", location.as_str()),
                        ("eventType", "inPerson"),
                    ],
                )
                .map_err(|e| AppError::ConfigError(format!("Invalid meetup URL: {e}")))?;
                Ok(url.into())
            }
            SourceConfig::Eventbrite(c) => Ok(format!(
                "https://www.eventbrite.com/d/{}/{}/?page={}",
                c.region, c.query, page
            )),
            SourceConfig::Luma(c) => Ok(format!("https://lu.ma/{}", c.region)),
        }
    }

    pub fn url_filter(&self) -> Result<UrlFilter, AppError> {
        match self {
            SourceConfig::Meetup(_) => UrlFilter::meetup(),
            SourceConfig::Eventbrite(_) => UrlFilter::eventbrite(),
            SourceConfig::Luma(c) => UrlFilter::luma(&c.region),
        }
    }
}

/// Meetup's `location` parameter: `us--ny--New York` or `fr--Paris`.
fn meetup_location(country: &str, province: &str, city: &str) -> Result<String, AppError> {
    let country = country.trim().to_lowercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::ConfigError(format!(
            "Country should be an ISO-3166 alpha-2 code, not '{country}'"
        )));
    }

    if country == "us" {
        let province = province.trim().to_lowercase();
        if province.len() != 2 || !province.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::ConfigError(format!(
                "US province should be 2 characters, not '{province}'"
            )));
        }
        return Ok(format!("{country}--{province}--{city}"));
    }

    Ok(format!("{country}--{city}"))
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ConfigError(format!("'{field}' must not be empty")));
    }
    Ok(())
}

fn require_slug(field: &str, value: &str) -> Result<(), AppError> {
    require(field, value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::ConfigError(format!(
            "'{field}' must be a lowercase slug, not '{value}'"
        )));
    }
    Ok(())
}
