//! UI driver abstraction for remote browser automation.
//!
//! Defines the `UiDriver` trait that abstracts over the automation engine
//! (currently Chromium via chromiumoxide). Elements are addressed by
//! `Locator` rather than by node handles, because the console re-renders
//! its widgets freely and handles go stale between steps.

pub mod chromium;
pub mod script;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DriverResult;

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Match on the element's `id` attribute.
    Id(String),
    /// Any CSS selector.
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// The locator as a CSS selector usable with `querySelector`.
    pub fn to_css(&self) -> String {
        match self {
            Locator::Id(id) => {
                let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
                format!("[id=\"{escaped}\"]")
            }
            Locator::Css(selector) => selector.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{id}"),
            Locator::Css(selector) => f.write_str(selector),
        }
    }
}

/// A remote browser page driven one operation at a time.
///
/// Every operation resolves against the live page; the page may change
/// underneath between calls, so callers wait explicitly for the state they
/// need instead of assuming it.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Load a URL in the page.
    async fn open(&mut self, url: &str) -> DriverResult<()>;
    /// Whether an element matching the locator currently exists.
    async fn is_present(&self, locator: &Locator) -> DriverResult<bool>;
    /// Number of direct children of the element, `None` if it does not exist.
    async fn child_count(&self, locator: &Locator) -> DriverResult<Option<usize>>;
    /// Clear an input and type text into it.
    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()>;
    /// Press Enter with the element focused.
    async fn submit(&mut self, locator: &Locator) -> DriverResult<()>;
    /// Click an element. Fails with `ClickIntercepted` when another element
    /// covers the click point.
    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;
    /// Scroll the element into the viewport.
    async fn scroll_into_view(&mut self, locator: &Locator) -> DriverResult<()>;
    /// Inner markup of each direct child of the element.
    async fn children_html(&self, locator: &Locator) -> DriverResult<Vec<String>>;
    /// Full markup of the current document.
    async fn page_source(&self) -> DriverResult<String>;
    /// Accept any JavaScript dialog opened since the last call. Returns
    /// `false` if none was.
    async fn accept_dialog(&mut self) -> DriverResult<bool>;
    /// Release the page and the browser behind it.
    async fn close(self: Box<Self>) -> DriverResult<()>;
}
