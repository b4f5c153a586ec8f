use calcrawl_core::error::AppError;
use calcrawl_core::traits::{DetailPage, ListingPage, PageExtractor};
use reqwest::{Client, Proxy};

use crate::config::ClientConfig;
use crate::layout::SourceLayout;

/// Page extractor that fetches server-rendered HTML with reqwest and reads it
/// with the source's CSS selectors. Content loaded by scripts is not seen.
#[derive(Clone)]
pub struct HttpPageExtractor {
    client: Client,
    layout: SourceLayout,
    timeout_secs: u64,
}

impl HttpPageExtractor {
    pub fn new(config: &ClientConfig, layout: SourceLayout) -> Result<Self, AppError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout);

        if let Some(proxy) = &config.http_proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            layout,
            timeout_secs: config.fetch_timeout.as_secs(),
        })
    }

    async fn get(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

impl PageExtractor for HttpPageExtractor {
    async fn fetch_listing(&self, url: &str, page: u32) -> Result<ListingPage, AppError> {
        tracing::debug!(%url, page, "Fetching listing page");
        let html = self.get(url).await?;
        self.layout.parse_listing(&html)
    }

    async fn fetch_detail(&self, url: &str) -> Result<DetailPage, AppError> {
        tracing::debug!(%url, "Fetching detail page");
        let html = self.get(url).await?;
        self.layout.parse_detail(&html)
    }
}
