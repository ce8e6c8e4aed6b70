use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{detect_challenge, FetchOptions, PageFetcher};
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Dismisses the cookie banners the supported marketplaces show on first visit
const ACCEPT_COOKIES_JS: &str = r#"
    const button = document.querySelector(
        'button[id*="accept"], button[class*="accept"], button[aria-label*="Accept"]'
    );
    if (button) button.click();
"#;

/// Headless Chrome transport for pages rendered client-side or behind
/// a JavaScript challenge
pub struct BrowserFetcher {
    browser: Browser,
    settle: Duration,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            settle: Duration::from_secs(config.browser_settle_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Blocking: drives one tab through navigation and returns the DOM
    fn render(browser: &Browser, url: &str, settle: Duration, timeout: Duration) -> anyhow::Result<String> {
        let tab = browser.new_tab()?;
        tab.set_default_timeout(timeout);

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // Let client-side rendering finish
        thread::sleep(settle);

        if let Err(e) = tab.evaluate(ACCEPT_COOKIES_JS, false) {
            debug!(url = %url, "Cookie banner script failed: {}", e);
        }

        let html = tab
            .evaluate("document.documentElement.outerHTML", false)?
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        if let Err(e) = tab.close(true) {
            warn!(url = %url, "Failed to close tab: {}", e);
        }
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let browser = self.browser.clone();
        let target = url.to_string();
        let settle = self.settle;
        let timeout = options.timeout.unwrap_or(self.timeout);

        debug!(url = %url, "Rendering in headless Chrome");
        let rendered = tokio::task::spawn_blocking(move || Self::render(&browser, &target, settle, timeout))
            .await
            .map_err(|e| FetchError::Browser(format!("render task failed: {}", e)))?;

        let html = rendered.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("timeout") || message.to_lowercase().contains("timed out") {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Browser(message)
            }
        })?;

        if html.is_empty() {
            return Err(FetchError::Browser(format!("empty document for {}", url)));
        }
        if let Some(reason) = detect_challenge(200, &html) {
            return Err(FetchError::Blocked { status: 200, reason });
        }
        Ok(html)
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
