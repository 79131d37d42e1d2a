use std::collections::HashSet;
use std::time::Duration;

use form_sentinel::browser::driver::{ElementHandle, LiveStyle, PageDriver};
use form_sentinel::error::DriverError;
use form_sentinel::page::extractor::PageSnapshotExtractor;
use form_sentinel::page::page_model::{RawElement, RawPage, Viewport};
use form_sentinel::page::selector;

use super::builders::raw_page;

/// In-memory page answering driver calls with the offline selector matcher.
///
/// Every element passed in must be interactive, so that element refs equal
/// indices into `elements`.
pub struct FakeDriver {
    pub elements: Vec<RawElement>,
    /// Selectors that never find anything.
    pub missing: HashSet<String>,
    /// Selectors whose next lookup fails with a stale-element error.
    pub stale_once: HashSet<String>,
    pub page_unavailable: bool,
    pub find_calls: Vec<(String, Duration)>,
    pub fills: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub snapshot_reads: usize,
    pub scroll_y: f64,
}

impl FakeDriver {
    pub fn new(elements: Vec<RawElement>) -> Self {
        Self {
            elements,
            missing: HashSet::new(),
            stale_once: HashSet::new(),
            page_unavailable: false,
            find_calls: Vec::new(),
            fills: Vec::new(),
            clicks: Vec::new(),
            snapshot_reads: 0,
            scroll_y: 0.0,
        }
    }

    pub fn handle(element_ref: usize) -> ElementHandle {
        ElementHandle(format!("el-{}", element_ref))
    }

    fn element(&self, handle: &ElementHandle) -> Result<&RawElement, DriverError> {
        handle
            .0
            .strip_prefix("el-")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|i| self.elements.get(i))
            .ok_or_else(|| DriverError::StaleElement(handle.0.clone()))
    }

    fn page(&self) -> RawPage {
        raw_page(&self.elements)
    }
}

impl PageDriver for FakeDriver {
    fn query_snapshot(&mut self) -> Result<RawPage, DriverError> {
        if self.page_unavailable {
            return Err(DriverError::SessionIO("page crashed".into()));
        }
        self.snapshot_reads += 1;
        Ok(self.page())
    }

    fn find_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        self.find_calls.push((selector.to_string(), timeout));
        if self.stale_once.remove(selector) {
            return Err(DriverError::StaleElement(selector.to_string()));
        }
        if self.missing.contains(selector) {
            return Ok(None);
        }
        let snapshot = PageSnapshotExtractor::default().from_raw(self.page());
        let found = selector::select(selector, &snapshot)
            .into_iter()
            .find(|el| el.visibility.is_displayed())
            .map(|el| Self::handle(el.element_ref));
        Ok(found)
    }

    fn describe(&mut self, handle: &ElementHandle) -> Result<RawElement, DriverError> {
        self.element(handle).cloned()
    }

    fn computed_style(&mut self, handle: &ElementHandle) -> Result<LiveStyle, DriverError> {
        let el = self.element(handle)?;
        Ok(LiveStyle {
            style: el.style.clone(),
            rect: el.rect,
            viewport: Viewport::default(),
        })
    }

    fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        self.element(handle)?;
        self.clicks.push(handle.0.clone());
        Ok(())
    }

    fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.element(handle)?;
        self.fills.push((handle.0.clone(), text.to_string()));
        Ok(())
    }

    fn scroll_position(&mut self) -> Result<f64, DriverError> {
        Ok(self.scroll_y)
    }

    fn scroll_to(&mut self, y: f64) -> Result<(), DriverError> {
        self.scroll_y = y;
        Ok(())
    }
}
