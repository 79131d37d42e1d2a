use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use crate::analysis::classifier::{ACTION_WORDS, PurposeClassifier};
use crate::analysis::purpose::FieldPurpose;
use crate::analysis::suspicion::SuspicionScorer;
use crate::browser::driver::{ElementHandle, PageDriver};
use crate::page::extractor::PageSnapshotExtractor;
use crate::page::page_model::{ElementSnapshot, PageSnapshot};
use crate::page::selector;
use crate::resolver::live::is_trap_selector;
use crate::resolver::registry::AdaptiveSelectorRegistry;

/// An element found by discovery and verified on the live page.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredElement {
    pub selector: String,
    pub handle: ElementHandle,
    pub snapshot_fingerprint: String,
}

/// Last-resort, purpose-specific search over a fresh snapshot.
#[derive(Debug, Clone)]
pub struct DiscoveryFallback {
    extractor: PageSnapshotExtractor,
    scorer: SuspicionScorer,
    classifier: PurposeClassifier,
    verify_timeout: Duration,
}

impl Default for DiscoveryFallback {
    fn default() -> Self {
        Self::new(SuspicionScorer::default(), Duration::from_millis(500))
    }
}

impl DiscoveryFallback {
    pub fn new(scorer: SuspicionScorer, verify_timeout: Duration) -> Self {
        Self {
            extractor: PageSnapshotExtractor {
                scroll_for_lazy_content: false,
                ..PageSnapshotExtractor::default()
            },
            scorer,
            classifier: PurposeClassifier,
            verify_timeout,
        }
    }

    /// Find an element for `purpose` and put its selector first in the registry.
    ///
    /// Elements addressed by `honeypots` and trap-like selectors are never
    /// chosen, so the registry only learns selectors that passed every check.
    /// Returns `None` when nothing suitable exists or it cannot be verified live.
    pub fn discover(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        honeypots: &[String],
        registry: &AdaptiveSelectorRegistry,
    ) -> Option<DiscoveredElement> {
        let snapshot = match self.extractor.extract(driver) {
            Ok(s) => s,
            Err(e) => {
                debug!(%purpose, error = %e, "discovery could not read the page");
                return None;
            }
        };

        let element_ref = self.pick(&snapshot, purpose, honeypots)?;
        let el = snapshot.element(element_ref)?;

        for candidate in selector::derive_candidates(el, &snapshot) {
            if is_trap_selector(&candidate, honeypots) {
                continue;
            }
            match driver.find_visible(&candidate, self.verify_timeout) {
                Ok(Some(handle)) => {
                    if !self.passes_live(driver, &handle) {
                        debug!(%purpose, selector = %candidate, "discovered element scores as honeypot live");
                        return None;
                    }
                    registry.insert_front(purpose, &candidate);
                    debug!(%purpose, selector = %candidate, "discovered");
                    return Some(DiscoveredElement {
                        selector: candidate,
                        handle,
                        snapshot_fingerprint: snapshot.fingerprint(),
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(%purpose, selector = %candidate, error = %e, "discovered selector failed live");
                }
            }
        }
        None
    }

    fn passes_live(&self, driver: &mut dyn PageDriver, handle: &ElementHandle) -> bool {
        let live = driver
            .describe(handle)
            .and_then(|raw| driver.computed_style(handle).map(|style| (raw, style)));
        match live {
            Ok((mut raw, style)) => {
                raw.style = style.style;
                raw.rect = style.rect;
                let el = self.extractor.element_from_raw(&raw, 0, &style.viewport);
                !self.scorer.is_honeypot(&self.scorer.score_live(&el))
            }
            Err(e) => {
                debug!(error = %e, "discovered element unreadable");
                false
            }
        }
    }

    /// The element the heuristics for `purpose` choose, if any.
    ///
    /// Scored honeypots and elements matched by a `honeypots` selector are
    /// excluded.
    pub fn pick(
        &self,
        snapshot: &PageSnapshot,
        purpose: FieldPurpose,
        honeypots: &[String],
    ) -> Option<usize> {
        let mut traps: BTreeSet<usize> = self
            .scorer
            .score_snapshot(snapshot)
            .iter()
            .filter(|v| self.scorer.is_honeypot(v))
            .map(|v| v.element_ref)
            .collect();
        for honeypot in honeypots {
            traps.extend(selector::select(honeypot, snapshot).iter().map(|e| e.element_ref));
        }
        let usable: Vec<&ElementSnapshot> = snapshot
            .elements()
            .into_iter()
            .filter(|e| !traps.contains(&e.element_ref) && e.visibility.is_displayed())
            .collect();

        let picked = match purpose {
            FieldPurpose::Submit => {
                let buttons: Vec<&ElementSnapshot> =
                    usable.iter().copied().filter(|e| e.is_button()).collect();
                buttons
                    .iter()
                    .find(|e| ACTION_WORDS.is_match(&button_text(e)))
                    .or_else(|| buttons.iter().rev().find(|e| e.parent_form_ref.is_some()))
                    .copied()
            }
            FieldPurpose::Password | FieldPurpose::ConfirmPassword => {
                let nth = usize::from(purpose == FieldPurpose::ConfirmPassword);
                usable
                    .iter()
                    .filter(|e| e.effective_type().as_deref() == Some("password"))
                    .nth(nth)
                    .copied()
            }
            FieldPurpose::Email => usable
                .iter()
                .find(|e| e.tag == "input" && e.effective_type().as_deref() == Some("email"))
                .copied(),
            _ => usable
                .iter()
                .find(|e| self.classifier.classify(e).purpose == purpose)
                .copied(),
        };
        picked.map(|e| e.element_ref)
    }
}

fn button_text(el: &ElementSnapshot) -> String {
    format!(
        "{} {}",
        el.text.as_deref().unwrap_or(""),
        el.attr("value").unwrap_or("")
    )
}
