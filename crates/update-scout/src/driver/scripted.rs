//! In-memory driver that plays back a scripted console for tests.

use super::{Locator, UiDriver};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Observable state of a scripted page.
#[derive(Debug, Default)]
pub(crate) struct Page {
    /// Elements that exist right now.
    pub present: HashSet<Locator>,
    /// Elements that appear after they have been looked up this many times.
    pub appear_after: HashMap<Locator, u32>,
    /// Elements that appear once the given element has been clicked.
    pub revealed_by: HashMap<Locator, Vec<Locator>>,
    /// Child markup per element.
    pub children: HashMap<Locator, Vec<String>>,
    /// Remaining intercepted clicks per element.
    pub intercepts: HashMap<Locator, u32>,
    /// Document markup served per URL.
    pub documents: HashMap<String, String>,
    /// A dialog opens when this element is submitted.
    pub dialog_on_submit: Option<Locator>,
    /// Dialog checks that come back empty before the dialog shows up.
    pub dialog_delay: u32,
    pub dialog_open: bool,
    /// Row replacement scheduled by a click on the key element.
    pub reloads: HashMap<Locator, Reload>,
    pending_reload: Option<Reload>,
    /// Reads left that fail with a protocol error.
    pub read_errors: u32,
    /// Number of presence and child reads made.
    pub reads: u32,
    pub current_url: Option<String>,
    pub typed: HashMap<Locator, String>,
    /// Log of every operation performed.
    pub calls: Vec<String>,
}

/// New rows for `table`, visible after it has been read `after_reads` times.
#[derive(Debug, Clone)]
pub(crate) struct Reload {
    pub table: Locator,
    pub after_reads: u32,
    pub rows: Vec<String>,
}

/// A `UiDriver` backed by a shared [`Page`].
#[derive(Clone, Default)]
pub(crate) struct ScriptedDriver {
    page: Arc<Mutex<Page>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> MutexGuard<'_, Page> {
        self.page.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_element(self, locator: Locator) -> Self {
        self.page().present.insert(locator);
        self
    }

    pub fn with_rows(self, table: Locator, rows: Vec<String>) -> Self {
        {
            let mut page = self.page();
            page.present.insert(table.clone());
            page.children.insert(table, rows);
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.page().calls.clone()
    }

    pub fn clicks_on(&self, locator: &Locator) -> usize {
        let marker = format!("click {locator}");
        self.page().calls.iter().filter(|c| **c == marker).count()
    }
}

impl Page {
    fn lookup(&mut self, locator: &Locator) -> bool {
        if self.present.contains(locator) {
            return true;
        }
        if let Some(remaining) = self.appear_after.get_mut(locator) {
            if *remaining == 0 {
                self.present.insert(locator.clone());
                return true;
            }
            *remaining -= 1;
        }
        false
    }

    /// Count a read, failing it while scripted errors remain.
    fn read(&mut self, locator: &Locator) -> DriverResult<()> {
        self.reads += 1;
        if self.read_errors > 0 {
            self.read_errors -= 1;
            return Err(DriverError::Protocol("Execution context was destroyed".into()));
        }
        if let Some(reload) = self.pending_reload.as_mut() {
            if &reload.table == locator {
                if reload.after_reads == 0 {
                    let rows = std::mem::take(&mut reload.rows);
                    self.children.insert(locator.clone(), rows);
                    self.pending_reload = None;
                } else {
                    reload.after_reads -= 1;
                }
            }
        }
        Ok(())
    }

    fn require(&mut self, locator: &Locator) -> DriverResult<()> {
        if self.lookup(locator) {
            Ok(())
        } else {
            Err(DriverError::NotFound(locator.clone()))
        }
    }
}

#[async_trait]
impl UiDriver for ScriptedDriver {
    async fn open(&mut self, url: &str) -> DriverResult<()> {
        let mut page = self.page();
        page.calls.push(format!("open {url}"));
        page.current_url = Some(url.to_string());
        Ok(())
    }

    async fn is_present(&self, locator: &Locator) -> DriverResult<bool> {
        let mut page = self.page();
        page.read(locator)?;
        Ok(page.lookup(locator))
    }

    async fn child_count(&self, locator: &Locator) -> DriverResult<Option<usize>> {
        let mut page = self.page();
        page.read(locator)?;
        if !page.lookup(locator) {
            return Ok(None);
        }
        Ok(Some(page.children.get(locator).map_or(0, Vec::len)))
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let mut page = self.page();
        page.require(locator)?;
        page.calls.push(format!("fill {locator}"));
        page.typed.insert(locator.clone(), text.to_string());
        Ok(())
    }

    async fn submit(&mut self, locator: &Locator) -> DriverResult<()> {
        let mut page = self.page();
        page.require(locator)?;
        page.calls.push(format!("submit {locator}"));
        if page.dialog_on_submit.as_ref() == Some(locator) {
            page.dialog_open = true;
        }
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let mut page = self.page();
        page.require(locator)?;
        page.calls.push(format!("click {locator}"));
        if let Some(remaining) = page.intercepts.get_mut(locator) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::ClickIntercepted {
                    target: locator.clone(),
                    by: "div#overlay".into(),
                });
            }
        }
        if let Some(revealed) = page.revealed_by.remove(locator) {
            page.present.extend(revealed);
        }
        if let Some(reload) = page.reloads.remove(locator) {
            page.pending_reload = Some(reload);
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> DriverResult<()> {
        let mut page = self.page();
        page.require(locator)?;
        page.calls.push(format!("scroll {locator}"));
        Ok(())
    }

    async fn children_html(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        let mut page = self.page();
        page.read(locator)?;
        page.require(locator)?;
        Ok(page.children.get(locator).cloned().unwrap_or_default())
    }

    async fn page_source(&self) -> DriverResult<String> {
        let page = self.page();
        let url = page.current_url.clone().unwrap_or_default();
        page.documents
            .get(&url)
            .cloned()
            .ok_or_else(|| DriverError::Navigation {
                url,
                reason: "no document scripted".into(),
            })
    }

    async fn accept_dialog(&mut self) -> DriverResult<bool> {
        let mut page = self.page();
        if page.dialog_open && page.dialog_delay > 0 {
            page.dialog_delay -= 1;
            return Ok(false);
        }
        if page.dialog_open {
            page.dialog_open = false;
            page.calls.push("accept dialog".into());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        self.page().calls.push("close".into());
        Ok(())
    }
}
