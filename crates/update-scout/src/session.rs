//! Exclusive ownership of one driver for the length of a discovery run.
//!
//! The console updates asynchronously, so every step that changes the page
//! is followed by an explicit wait for the state the next step needs.

use crate::driver::{Locator, UiDriver};
use crate::error::{DriverError, DriverResult};
use std::time::Duration;
use tokio::time::Instant;

/// Backoff schedule for condition polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the second check.
    pub initial: Duration,
    /// Upper bound for a single delay.
    pub max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waited {
    /// The condition held after this long.
    Ready(Duration),
    /// The deadline passed with the condition still false.
    TimedOut(Duration),
}

impl Waited {
    pub fn is_ready(&self) -> bool {
        matches!(self, Waited::Ready(_))
    }
}

/// Longest single wait; larger budgets are clamped.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest pause between checks.
const MIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
enum Condition<'a> {
    Present,
    Populated,
    /// Child markup differs from a snapshot taken earlier.
    ChangedFrom(Option<&'a [String]>),
}

/// A browser page owned by exactly one workflow.
pub struct DriverSession {
    driver: Box<dyn UiDriver>,
    poll: PollPolicy,
}

impl DriverSession {
    pub fn new(driver: Box<dyn UiDriver>) -> Self {
        Self {
            driver,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn UiDriver {
        self.driver.as_mut()
    }

    pub async fn open(&mut self, url: &str) -> DriverResult<()> {
        self.driver.open(url).await
    }

    /// Wait until an element matching the locator exists.
    pub async fn wait_for(&self, locator: &Locator, timeout: Duration) -> DriverResult<Waited> {
        self.wait(locator, timeout, Condition::Present).await
    }

    /// Wait until the element exists and has at least one child.
    pub async fn wait_until_populated(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> DriverResult<Waited> {
        self.wait(locator, timeout, Condition::Populated).await
    }

    /// Wait until the element's child markup differs from `before`, a
    /// snapshot taken with [`DriverSession::children_snapshot`]. An element
    /// that disappears counts as changed.
    pub async fn wait_until_changed(
        &self,
        locator: &Locator,
        before: Option<&[String]>,
        timeout: Duration,
    ) -> DriverResult<Waited> {
        self.wait(locator, timeout, Condition::ChangedFrom(before)).await
    }

    /// Child markup of the element, `None` if it does not exist.
    pub async fn children_snapshot(&self, locator: &Locator) -> DriverResult<Option<Vec<String>>> {
        match self.driver.children_html(locator).await {
            Ok(rows) => Ok(Some(rows)),
            Err(DriverError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn check(&self, locator: &Locator, condition: Condition<'_>) -> DriverResult<bool> {
        match condition {
            Condition::Present => self.driver.is_present(locator).await,
            Condition::Populated => Ok(self
                .driver
                .child_count(locator)
                .await?
                .is_some_and(|n| n > 0)),
            Condition::ChangedFrom(before) => {
                let now = self.children_snapshot(locator).await?;
                Ok(now.as_deref() != before)
            }
        }
    }

    async fn wait(
        &self,
        locator: &Locator,
        timeout: Duration,
        condition: Condition<'_>,
    ) -> DriverResult<Waited> {
        let start = Instant::now();
        let deadline = start + timeout.min(MAX_WAIT);
        let mut delay = self.poll.initial.max(MIN_POLL);

        loop {
            let holds = match self.check(locator, condition).await {
                Ok(holds) => holds,
                // The page may be mid-navigation; its script context comes back.
                Err(DriverError::Protocol(reason) | DriverError::Script(reason)) => {
                    tracing::debug!(%locator, %reason, "condition check failed; retrying");
                    false
                }
                Err(e) => return Err(e),
            };
            if holds {
                return Ok(Waited::Ready(start.elapsed()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Waited::TimedOut(start.elapsed()));
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(self.poll.max.max(MIN_POLL));
        }
    }

    /// Release the browser.
    pub async fn close(self) -> DriverResult<()> {
        self.driver.close().await
    }
}
