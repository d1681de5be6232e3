use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BrowserOptions;
use crate::voice::page::{PageDriver, PageLauncher};

/// How often a page whose load outlived chromiumoxide's own wait is re-checked.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// True once the page has left `about:blank`/an error page and finished loading.
const PAGE_LOADED_SCRIPT: &str = r#"(() => {
    const href = document.location.href;
    return href !== "about:blank"
        && !href.startsWith("chrome-error:")
        && document.readyState === "complete";
})()"#;

/// Launches a dedicated headless Chromium for every page it hands out.
pub struct ChromiumLauncher {
    options: BrowserOptions,
    navigation_timeout: Duration,
}

impl ChromiumLauncher {
    /// `navigation_timeout` bounds every page load and every CDP request.
    /// chromiumoxide stops waiting for a navigation after 30 s on its own,
    /// so loads are followed up to this deadline by polling the document.
    pub fn new(options: BrowserOptions, navigation_timeout: Duration) -> Self {
        Self {
            options,
            navigation_timeout,
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder().request_timeout(self.navigation_timeout);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if self.options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))
    }
}

#[async_trait]
impl PageLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        // The CDP connection only makes progress while the handler is polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(anyhow!("Failed to create page: {}", e));
            }
        };

        Ok(Box::new(ChromiumPage {
            browser,
            page,
            handler_task,
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumPage {
    async fn is_loaded(&self) -> bool {
        match self.page.evaluate(PAGE_LOADED_SCRIPT).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn wait_until_loaded(&self, url: &str, deadline: Instant) -> Result<()> {
        loop {
            if self.is_loaded().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "{} did not finish loading within {:?}",
                    url,
                    self.navigation_timeout
                ));
            }
            tokio::time::sleep(LOAD_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let deadline = Instant::now() + self.navigation_timeout;
        match self.page.goto(url).await {
            Ok(_) => Ok(()),
            // The navigation keeps running in the browser past chromiumoxide's
            // fixed wait; follow it until our own deadline.
            Err(CdpError::Timeout) => {
                debug!("load of {} still pending, waiting up to {:?}", url, self.navigation_timeout);
                self.wait_until_loaded(url, deadline).await
            }
            Err(e) => Err(anyhow!("Failed to load {}: {}", url, e)),
        }
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        // Set through the DOM: synthetic key events cannot type every script.
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.focus();
                el.value = {text};
                el.dispatchEvent(new Event("input", {{ bubbles: true }}));
                el.dispatchEvent(new Event("change", {{ bubbles: true }}));
                return true;
            }})()"#,
            selector = serde_json::to_string(selector)?,
            text = serde_json::to_string(text)?,
        );
        let filled: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("Fill script failed: {}", e))?
            .into_value()
            .context("Fill script returned no boolean")?;
        if !filled {
            return Err(anyhow!("No element matches {}", selector));
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("No element matches {}: {}", selector, e))?
            .click()
            .await
            .map_err(|e| anyhow!("Click on {} failed: {}", selector, e))?;
        Ok(())
    }

    async fn exists(&mut self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn attribute(&mut self, selector: &str, name: &str) -> Result<Option<String>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("No element matches {}: {}", selector, e))?;
        element
            .attribute(name)
            .await
            .map_err(|e| anyhow!("Reading {} of {} failed: {}", name, selector, e))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumPage {
            mut browser,
            page,
            handler_task,
            ..
        } = *self;
        drop(page);

        let closed = browser.close().await;
        // Reap the child process even when the CDP close failed.
        if closed.is_err() {
            let _ = browser.kill().await;
        }
        let _ = browser.wait().await;
        handler_task.abort();
        debug!("browser released");

        closed.map(|_| ()).map_err(|e| anyhow!("Close failed: {}", e))
    }
}
