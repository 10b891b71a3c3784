//! Chromium-based driver using chromiumoxide.

use super::script::{self, ClickReply};
use super::{Locator, UiDriver};
use crate::config::BrowserSettings;
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Look for a Chromium binary on the system PATH.
///
/// Only used to suggest a value for `browser.executable`; the driver itself
/// never guesses which browser to start.
pub fn find_chromium() -> Option<PathBuf> {
    ["google-chrome", "chromium", "chromium-browser", "chrome"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| {
            let mac = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
            (cfg!(target_os = "macos") && mac.exists()).then_some(mac)
        })
}

/// A single Chromium page driven over the DevTools protocol.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    dialogs: JoinHandle<()>,
    /// Dialogs accepted by the watcher and not yet reported.
    accepted: Arc<AtomicUsize>,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch a browser, or attach to a running one when a debugger URL is
    /// configured, and open a blank page.
    pub async fn start(settings: &BrowserSettings) -> DriverResult<Self> {
        let (browser, mut handler) = match &settings.debugger_url {
            Some(ws_url) => Browser::connect(ws_url.as_str())
                .await
                .map_err(|e| DriverError::Launch(format!("cannot attach to {ws_url}: {e}")))?,
            None => {
                let executable = settings
                    .executable
                    .as_ref()
                    .ok_or_else(|| DriverError::Launch("no browser executable configured".into()))?;

                let mut builder = BrowserConfig::builder()
                    .chrome_executable(executable)
                    .arg("--disable-gpu")
                    .arg("--no-sandbox")
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-extensions");
                if settings.headless {
                    builder = builder.arg("--headless=new");
                } else {
                    builder = builder.with_head();
                }
                if settings.accept_invalid_certs {
                    builder = builder.arg("--ignore-certificate-errors");
                }
                let config = builder
                    .build()
                    .map_err(|e| DriverError::Launch(format!("bad browser config: {e}")))?;

                Browser::launch(config)
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(format!("failed to create page: {e}")))?;

        let accepted = Arc::new(AtomicUsize::new(0));
        let dialogs = Self::watch_dialogs(&page, accepted.clone()).await?;

        tracing::info!(headless = settings.headless, "browser session started");

        Ok(Self {
            browser,
            page,
            handler,
            dialogs,
            accepted,
            navigation_timeout: settings.navigation_timeout,
        })
    }

    /// Accept every JavaScript dialog the page opens, as it opens.
    async fn watch_dialogs(page: &Page, accepted: Arc<AtomicUsize>) -> DriverResult<JoinHandle<()>> {
        let mut events = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| DriverError::Launch(format!("cannot watch dialogs: {e}")))?;
        let page = page.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                tracing::debug!(message = %event.message, "javascript dialog opened");
                match page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    Ok(_) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => tracing::warn!("failed to accept dialog: {e}"),
                }
            }
        }))
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> DriverResult<T> {
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| DriverError::Protocol(format!("script evaluation failed: {e}")))?;
        result
            .into_value()
            .map_err(|e| DriverError::Script(format!("{e:?}")))
    }

    async fn element(&self, locator: &Locator) -> DriverResult<Element> {
        if !self.is_present(locator).await? {
            return Err(DriverError::NotFound(locator.clone()));
        }
        self.page
            .find_element(locator.to_css())
            .await
            .map_err(|e| DriverError::Protocol(format!("failed to resolve {locator}: {e}")))
    }
}

#[async_trait]
impl UiDriver for ChromiumDriver {
    async fn open(&mut self, url: &str) -> DriverResult<()> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                if let Err(e) = self.page.wait_for_navigation().await {
                    tracing::debug!(url, "navigation did not settle: {e}");
                }
                tracing::debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, "page loaded");
                Ok(())
            }
            Ok(Err(e)) => Err(DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(DriverError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {:?}", self.navigation_timeout),
            }),
        }
    }

    async fn is_present(&self, locator: &Locator) -> DriverResult<bool> {
        self.eval(script::presence(locator)).await
    }

    async fn child_count(&self, locator: &Locator) -> DriverResult<Option<usize>> {
        let count: i64 = self.eval(script::child_count(locator)).await?;
        Ok(usize::try_from(count).ok())
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let cleared: bool = self.eval(script::clear_value(locator)).await?;
        if !cleared {
            return Err(DriverError::NotFound(locator.clone()));
        }
        let element = self.element(locator).await?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?
            .type_str(text)
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn submit(&mut self, locator: &Locator) -> DriverResult<()> {
        let element = self.element(locator).await?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?
            .press_key("Enter")
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        match self.eval::<ClickReply>(script::click(locator)).await? {
            ClickReply::Clicked => Ok(()),
            ClickReply::Missing => Err(DriverError::NotFound(locator.clone())),
            ClickReply::Intercepted { by } => Err(DriverError::ClickIntercepted {
                target: locator.clone(),
                by,
            }),
        }
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> DriverResult<()> {
        let found: bool = self.eval(script::scroll_into_view(locator)).await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::NotFound(locator.clone()))
        }
    }

    async fn children_html(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        let rows: Option<Vec<String>> = self.eval(script::children_html(locator)).await?;
        rows.ok_or_else(|| DriverError::NotFound(locator.clone()))
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.eval(script::PAGE_SOURCE.to_string()).await
    }

    async fn accept_dialog(&mut self) -> DriverResult<bool> {
        Ok(self.accepted.swap(0, Ordering::SeqCst) > 0)
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        let Self {
            mut browser,
            page,
            handler,
            dialogs,
            ..
        } = *self;
        dialogs.abort();
        let _ = page.close().await;
        let _ = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        Ok(())
    }
}
