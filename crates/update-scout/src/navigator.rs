//! Navigation from the post-login landing page to a freshly loaded update table.
//!
//! The console is an ExtJS application: the section tab and the tree node
//! render synchronously once the landing page is up, but the update table is
//! filled by a background request triggered by "Check Now". Overlays (load
//! masks, toasts) regularly sit on top of "Check Now" for a moment, so that
//! click is retried while it is intercepted.

use crate::driver::Locator;
use crate::error::{DriverError, NavigationError};
use crate::session::{DriverSession, Waited};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Elements the navigator relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatePageLayout {
    /// Present once the post-login landing page has rendered.
    pub landing_marker: Locator,
    pub section_tab: Locator,
    pub updates_node: Locator,
    pub check_now: Locator,
    pub update_table: Locator,
}

impl Default for UpdatePageLayout {
    fn default() -> Self {
        Self {
            landing_marker: Locator::id("device"),
            section_tab: Locator::id("device"),
            updates_node: Locator::css(r#"div[ext\:tree-node-id="device/dynamic-updates"]"#),
            check_now: Locator::css(r#"table[itemid="Device/Dynamic Updates-Check Now"]"#),
            update_table: Locator::id("ext-gen468-gp-type-anti-virus-bd"),
        }
    }
}

/// Bounded retry for clicks blocked by a transient overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickRetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed: Duration,
}

impl Default for ClickRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            backoff: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

/// Wait budgets for the two asynchronous page states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTimeouts {
    pub landing: Duration,
    pub table: Duration,
    /// How long rows already in the table before "Check Now" may take to be
    /// replaced.
    pub settle: Duration,
}

impl Default for NavigationTimeouts {
    fn default() -> Self {
        Self {
            landing: Duration::from_secs(500),
            table: Duration::from_secs(500),
            settle: Duration::from_secs(10),
        }
    }
}

/// How the update page was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavigationReport {
    /// Whether the landing marker showed up before its timeout.
    pub landing_ready: bool,
    /// Clicks needed before "Check Now" went through.
    pub check_now_attempts: u32,
    /// False when rows present before "Check Now" were still unchanged
    /// after the settle budget.
    pub table_refreshed: bool,
    /// Time spent waiting for the table to populate.
    pub table_wait: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePageNavigator {
    layout: UpdatePageLayout,
    retry: ClickRetryPolicy,
    timeouts: NavigationTimeouts,
}

impl UpdatePageNavigator {
    pub fn new(
        layout: UpdatePageLayout,
        retry: ClickRetryPolicy,
        timeouts: NavigationTimeouts,
    ) -> Self {
        Self {
            layout,
            retry,
            timeouts,
        }
    }

    pub fn layout(&self) -> &UpdatePageLayout {
        &self.layout
    }

    /// Open the updates subsection, trigger "Check Now" and wait for the
    /// update table to fill.
    pub async fn open_updates(
        &self,
        session: &mut DriverSession,
    ) -> Result<NavigationReport, NavigationError> {
        let landing = session
            .wait_for(&self.layout.landing_marker, self.timeouts.landing)
            .await?;
        if let Waited::TimedOut(waited) = landing {
            // The console may already be showing the target page.
            tracing::warn!(
                marker = %self.layout.landing_marker,
                ?waited,
                "timed out waiting for the post-login page; continuing"
            );
        }

        let driver = session.driver_mut();
        driver.click(&self.layout.section_tab).await?;
        driver.click(&self.layout.updates_node).await?;
        driver.scroll_into_view(&self.layout.check_now).await?;

        let table = &self.layout.update_table;
        let before = session.children_snapshot(table).await?;
        let check_now_attempts = self.click_with_retry(session, &self.layout.check_now).await?;

        let mut table_refreshed = true;
        if before.as_ref().is_some_and(|rows| !rows.is_empty()) {
            let changed = session
                .wait_until_changed(table, before.as_deref(), self.timeouts.settle)
                .await?;
            if let Waited::TimedOut(waited) = changed {
                // An unchanged table is also what a console with nothing new shows.
                tracing::warn!(%table, ?waited, "update table unchanged after Check Now");
                table_refreshed = false;
            }
        }

        let table_wait = match session
            .wait_until_populated(&self.layout.update_table, self.timeouts.table)
            .await?
        {
            Waited::Ready(waited) => waited,
            Waited::TimedOut(waited) => {
                return Err(NavigationError::TableNotReady {
                    table: self.layout.update_table.clone(),
                    waited,
                })
            }
        };
        tracing::info!(?table_wait, "update table loaded");

        Ok(NavigationReport {
            landing_ready: landing.is_ready(),
            check_now_attempts,
            table_refreshed,
            table_wait,
        })
    }

    /// Click until the click is no longer intercepted. Returns the number of
    /// attempts made.
    pub async fn click_with_retry(
        &self,
        session: &mut DriverSession,
        target: &Locator,
    ) -> Result<u32, NavigationError> {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match session.driver_mut().click(target).await {
                Ok(()) => return Ok(attempts),
                Err(DriverError::ClickIntercepted { by, .. }) => {
                    tracing::debug!(%target, %by, attempt = attempts, "click intercepted");
                }
                Err(e) => return Err(e.into()),
            }

            let elapsed = start.elapsed();
            if attempts >= self.retry.max_attempts
                || elapsed + self.retry.backoff > self.retry.max_elapsed
            {
                return Err(NavigationError::ClickNeverSucceeded {
                    target: target.clone(),
                    attempts,
                    elapsed,
                });
            }
            tokio::time::sleep(self.retry.backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{Reload, ScriptedDriver};

    fn console(layout: &UpdatePageLayout) -> ScriptedDriver {
        let driver = ScriptedDriver::new()
            .with_element(layout.landing_marker.clone())
            .with_element(layout.section_tab.clone())
            .with_element(layout.updates_node.clone())
            .with_element(layout.check_now.clone());
        driver.page().revealed_by.insert(
            layout.check_now.clone(),
            vec![layout.update_table.clone()],
        );
        driver.page().children.insert(
            layout.update_table.clone(),
            vec!["<td>row</td>".into()],
        );
        driver
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_succeeds_after_k_interceptions() {
        let target = Locator::id("check-now");
        for k in [0u32, 1, 4] {
            let driver = ScriptedDriver::new().with_element(target.clone());
            driver.page().intercepts.insert(target.clone(), k);
            let mut session = DriverSession::new(Box::new(driver.clone()));

            let start = Instant::now();
            let attempts = UpdatePageNavigator::default()
                .click_with_retry(&mut session, &target)
                .await
                .unwrap();

            assert_eq!(attempts, k + 1);
            assert_eq!(driver.clicks_on(&target), (k + 1) as usize);
            assert_eq!(start.elapsed(), Duration::from_secs(k as u64));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_gives_up_after_max_attempts() {
        let target = Locator::id("check-now");
        let driver = ScriptedDriver::new().with_element(target.clone());
        driver.page().intercepts.insert(target.clone(), u32::MAX);
        let mut session = DriverSession::new(Box::new(driver.clone()));

        let navigator = UpdatePageNavigator::new(
            UpdatePageLayout::default(),
            ClickRetryPolicy {
                max_attempts: 5,
                ..ClickRetryPolicy::default()
            },
            NavigationTimeouts::default(),
        );
        let err = navigator
            .click_with_retry(&mut session, &target)
            .await
            .unwrap_err();

        assert!(matches!(err, NavigationError::ClickNeverSucceeded { attempts: 5, .. }));
        assert_eq!(driver.clicks_on(&target), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_gives_up_after_time_budget() {
        let target = Locator::id("check-now");
        let driver = ScriptedDriver::new().with_element(target.clone());
        driver.page().intercepts.insert(target.clone(), u32::MAX);
        let mut session = DriverSession::new(Box::new(driver.clone()));

        let navigator = UpdatePageNavigator::new(
            UpdatePageLayout::default(),
            ClickRetryPolicy {
                max_attempts: 1000,
                backoff: Duration::from_secs(1),
                max_elapsed: Duration::from_secs(10),
            },
            NavigationTimeouts::default(),
        );
        let err = navigator
            .click_with_retry(&mut session, &target)
            .await
            .unwrap_err();

        match err {
            NavigationError::ClickNeverSucceeded { attempts, elapsed, .. } => {
                // Attempts at t = 0s..=10s; an 11th pause would overrun the budget.
                assert_eq!(attempts, 11);
                assert_eq!(elapsed, Duration::from_secs(10));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_on_missing_element_is_not_retried() {
        let target = Locator::id("check-now");
        let driver = ScriptedDriver::new();
        let mut session = DriverSession::new(Box::new(driver));

        let err = UpdatePageNavigator::default()
            .click_with_retry(&mut session, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::ElementNotFound(l) if l == target));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_updates_full_sequence() {
        let layout = UpdatePageLayout::default();
        let driver = console(&layout);
        driver.page().intercepts.insert(layout.check_now.clone(), 2);
        let mut session = DriverSession::new(Box::new(driver.clone()));

        let report = UpdatePageNavigator::default()
            .open_updates(&mut session)
            .await
            .unwrap();

        assert!(report.landing_ready);
        assert_eq!(report.check_now_attempts, 3);
        assert_eq!(
            driver.calls(),
            vec![
                format!("click {}", layout.section_tab),
                format!("click {}", layout.updates_node),
                format!("scroll {}", layout.check_now),
                format!("click {}", layout.check_now),
                format!("click {}", layout.check_now),
                format!("click {}", layout.check_now),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_landing_marker_is_not_fatal() {
        let layout = UpdatePageLayout {
            landing_marker: Locator::id("dashboard"),
            ..UpdatePageLayout::default()
        };
        let driver = console(&layout);
        driver.page().present.remove(&layout.landing_marker);
        let mut session = DriverSession::new(Box::new(driver.clone()));

        let report = UpdatePageNavigator::new(
            layout.clone(),
            ClickRetryPolicy::default(),
            NavigationTimeouts {
                landing: Duration::from_secs(5),
                ..NavigationTimeouts::default()
            },
        )
        .open_updates(&mut session)
        .await
        .unwrap();

        assert!(!report.landing_ready);
        assert_eq!(driver.clicks_on(&layout.check_now), 1);
        assert_eq!(report.table_wait, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_stale_rows_to_be_replaced() {
        let layout = UpdatePageLayout::default();
        let driver = console(&layout);
        {
            let mut page = driver.page();
            page.revealed_by.clear();
            page.present.insert(layout.update_table.clone());
            page.children
                .insert(layout.update_table.clone(), vec!["<td>3009-3519</td>".into()]);
            page.reloads.insert(
                layout.check_now.clone(),
                Reload {
                    table: layout.update_table.clone(),
                    after_reads: 2,
                    rows: vec!["<td>3010-3520</td>".into()],
                },
            );
        }
        let mut session = DriverSession::new(Box::new(driver.clone()));

        let start = Instant::now();
        let report = UpdatePageNavigator::default()
            .open_updates(&mut session)
            .await
            .unwrap();

        assert!(report.table_refreshed);
        // 250ms + 500ms between the three reads after the click.
        assert_eq!(start.elapsed(), Duration::from_millis(750));
        assert_eq!(
            driver.page().children[&layout.update_table],
            vec!["<td>3010-3520</td>".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_table_waits_out_settle() {
        let layout = UpdatePageLayout::default();
        let driver = console(&layout);
        driver.page().present.insert(layout.update_table.clone());
        let mut session = DriverSession::new(Box::new(driver));

        let start = Instant::now();
        let report = UpdatePageNavigator::default()
            .open_updates(&mut session)
            .await
            .unwrap();

        assert!(!report.table_refreshed);
        assert_eq!(start.elapsed(), NavigationTimeouts::default().settle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_tree_node_fails() {
        let layout = UpdatePageLayout::default();
        let driver = ScriptedDriver::new()
            .with_element(layout.landing_marker.clone())
            .with_element(layout.section_tab.clone());
        let mut session = DriverSession::new(Box::new(driver));

        let err = UpdatePageNavigator::default()
            .open_updates(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::ElementNotFound(l) if l == layout.updates_node));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_table_times_out() {
        let layout = UpdatePageLayout::default();
        let driver = console(&layout);
        driver.page().children.clear();
        let mut session = DriverSession::new(Box::new(driver));

        let err = UpdatePageNavigator::new(
            layout.clone(),
            ClickRetryPolicy::default(),
            NavigationTimeouts {
                table: Duration::from_secs(20),
                ..NavigationTimeouts::default()
            },
        )
        .open_updates(&mut session)
        .await
        .unwrap_err();

        match err {
            NavigationError::TableNotReady { table, waited } => {
                assert_eq!(table, layout.update_table);
                assert_eq!(waited, Duration::from_secs(20));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
