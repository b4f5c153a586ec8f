use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calcrawl_core::error::AppError;
use calcrawl_core::traits::{DetailPage, ListingPage, PageExtractor};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;

use crate::config::ClientConfig;
use crate::layout::{SCROLL_SCRIPT, SourceLayout};

/// Headless-browser page extractor using Chromium over the DevTools Protocol.
///
/// Listing pages on all three sources render their event lists client-side,
/// so this is the extractor the daemon uses. One Chromium process is shared
/// by every clone; each fetch opens a tab, scrolls the page
/// `layout.scroll_passes` times waiting the settle delay after each pass,
/// reads the rendered DOM, and closes the tab.
#[derive(Clone)]
pub struct BrowserPageExtractor {
    browser: Arc<Browser>,
    layout: SourceLayout,
    timeout: Duration,
    settle_delay: Duration,
}

impl BrowserPageExtractor {
    /// Launch a headless Chromium for `layout`.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH`, `CHROME_BIN`,
    /// or one of the usual install locations.
    pub async fn launch(config: &ClientConfig, layout: SourceLayout) -> Result<Self, AppError> {
        let browser = launch_browser(config).await?;
        Ok(Self::with_browser(browser, config, layout))
    }

    /// Share an already running browser between sources.
    pub fn with_browser(
        browser: Arc<Browser>,
        config: &ClientConfig,
        layout: SourceLayout,
    ) -> Self {
        Self {
            browser,
            layout,
            timeout: config.fetch_timeout,
            settle_delay: config.settle_delay,
        }
    }

    /// Render `url` in a fresh tab. The tab is closed on every outcome.
    async fn rendered_html(&self, url: &str) -> Result<String, AppError> {
        let opened = tokio::time::timeout(self.timeout, self.browser.new_page("about:blank")).await;
        let page = match opened {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(AppError::BrowserError(format!("Failed to open tab: {e}"))),
            Err(_) => return Err(AppError::Timeout(self.timeout.as_secs())),
        };

        let closing = page.clone();
        let close = async move {
            if let Err(e) = closing.close().await {
                tracing::debug!(error = %e, "Failed to close tab");
            }
        };
        run_then_cleanup(self.timeout, self.render(&page, url), close).await
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String, AppError> {
        page.goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;

        page.find_element("body")
            .await
            .map_err(|e| AppError::BrowserError(format!("Page did not render body: {e}")))?;

        for _ in 0..self.layout.scroll_passes {
            page.evaluate(SCROLL_SCRIPT)
                .await
                .map_err(|e| AppError::BrowserError(format!("Scroll failed: {e}")))?;
            tokio::time::sleep(self.settle_delay).await;
        }

        page.content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
    }
}

/// Run `work` under `limit`, then `cleanup`, whatever `work` returned.
async fn run_then_cleanup<T, W, C>(limit: Duration, work: W, cleanup: C) -> Result<T, AppError>
where
    W: Future<Output = Result<T, AppError>>,
    C: Future<Output = ()>,
{
    let result = match tokio::time::timeout(limit, work).await {
        Ok(inner) => inner,
        Err(_) => Err(AppError::Timeout(limit.as_secs())),
    };
    cleanup.await;
    result
}

impl PageExtractor for BrowserPageExtractor {
    async fn fetch_listing(&self, url: &str, page: u32) -> Result<ListingPage, AppError> {
        tracing::debug!(%url, page, "Rendering listing page");
        let html = self.rendered_html(url).await?;
        self.layout.parse_listing(&html)
    }

    async fn fetch_detail(&self, url: &str) -> Result<DetailPage, AppError> {
        tracing::debug!(%url, "Rendering detail page");
        let html = self.rendered_html(url).await?;
        self.layout.parse_detail(&html)
    }
}

/// Start Chromium with the configured user agent and proxy.
pub async fn launch_browser(config: &ClientConfig) -> Result<Arc<Browser>, AppError> {
    let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

    // Snap-packaged Chromium ships a wrapper that rejects the flags below.
    if let Some(bin) = find_chrome_binary() {
        tracing::info!("Using Chrome binary: {}", bin.display());
        builder = builder.chrome_executable(bin);
    }

    builder = builder
        .arg("--headless=new")
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg(format!("--user-agent={}", config.user_agent));
    if let Some(proxy) = &config.http_proxy {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    let browser_config = builder
        .build()
        .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

    // The CDP handler must be polled for the connection to make progress.
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                tracing::warn!("Browser CDP handler error: {event:?}");
                break;
            }
        }
    });

    Ok(Arc::new(browser))
}

fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
