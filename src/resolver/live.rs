use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::analysis::classifier::PurposeClassifier;
use crate::analysis::purpose::FieldPurpose;
use crate::analysis::suspicion::{SuspicionScorer, selector_has_honeypot_token};
use crate::browser::driver::{ElementHandle, PageDriver};
use crate::error::{DriverError, EngineError};
use crate::page::extractor::PageSnapshotExtractor;
use crate::page::page_model::ElementSnapshot;
use crate::resolver::ResolvedElement;
use crate::resolver::discovery::DiscoveryFallback;
use crate::resolver::registry::AdaptiveSelectorRegistry;
use crate::resolver::stats::StatsCounters;
use crate::trace::logger::TraceLogger;
use crate::trace::trace::{ResolutionOutcome, ResolutionTraceEvent};

pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_FLOOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-candidate wait: shrinks 10% per depth, at most 80%, never below `floor`.
pub fn adaptive_timeout(base: Duration, floor: Duration, depth: usize) -> Duration {
    // Tenths, so the result is exact: base * (10 - min(8, depth)) / 10.
    let remaining = 10 - depth.min(8) as u128;
    let nanos = base.as_nanos() * remaining / 10;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)).max(floor)
}

/// Hints first, then registry templates, without repeats.
pub fn candidate_list(hints: &[String], templates: &[String]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for c in hints.iter().chain(templates.iter()) {
        let c = c.trim();
        if !c.is_empty() && !candidates.iter().any(|k| k == c) {
            candidates.push(c.to_string());
        }
    }
    candidates
}

/// Binds a purpose to one live element on the current page.
pub struct LiveSelectorResolver {
    registry: Arc<AdaptiveSelectorRegistry>,
    stats: Arc<StatsCounters>,
    scorer: SuspicionScorer,
    classifier: PurposeClassifier,
    extractor: PageSnapshotExtractor,
    discovery: DiscoveryFallback,
    base_timeout: Duration,
    floor_timeout: Duration,
    trace: Option<Arc<TraceLogger>>,
}

impl LiveSelectorResolver {
    pub fn new(registry: Arc<AdaptiveSelectorRegistry>, stats: Arc<StatsCounters>) -> Self {
        Self {
            registry,
            stats,
            scorer: SuspicionScorer::default(),
            classifier: PurposeClassifier,
            extractor: PageSnapshotExtractor::default(),
            discovery: DiscoveryFallback::new(SuspicionScorer::default(), DEFAULT_FLOOR_TIMEOUT),
            base_timeout: DEFAULT_BASE_TIMEOUT,
            floor_timeout: DEFAULT_FLOOR_TIMEOUT,
            trace: None,
        }
    }

    pub fn with_timeouts(mut self, base: Duration, floor: Duration) -> Self {
        self.base_timeout = base;
        self.floor_timeout = floor.min(base);
        self.discovery = DiscoveryFallback::new(self.scorer.clone(), self.floor_timeout);
        self
    }

    pub fn with_scorer(mut self, scorer: SuspicionScorer) -> Self {
        self.discovery = DiscoveryFallback::new(scorer.clone(), self.floor_timeout);
        self.scorer = scorer;
        self
    }

    pub fn with_trace(mut self, trace: Arc<TraceLogger>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn timeout_for(&self, depth: usize) -> Duration {
        adaptive_timeout(self.base_timeout, self.floor_timeout, depth)
    }

    /// Resolve `purpose` to a visible, non-trap element.
    ///
    /// Candidates are `hints` followed by the registry templates. A registry
    /// template that wins from position > 0 moves up one slot. When every
    /// candidate misses, discovery runs over a fresh snapshot.
    pub fn resolve(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        hints: &[String],
        honeypots: &[String],
    ) -> Result<ResolvedElement, EngineError> {
        let started = Instant::now();
        self.stats.record_attempt();

        let candidates = candidate_list(hints, &self.registry.patterns(purpose));
        let mut tried: Vec<String> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();

        for (depth, candidate) in candidates.iter().enumerate() {
            debug!(%purpose, depth, selector = %candidate, "searching");

            if is_trap_selector(candidate, honeypots) {
                debug!(%purpose, selector = %candidate, "skipping honeypot-like candidate");
                skipped.push(candidate.clone());
                continue;
            }
            tried.push(candidate.clone());

            let Some(handle) = self.probe(driver, purpose, candidate, self.timeout_for(depth))
            else {
                continue;
            };

            let from_hint = hints.iter().any(|h| h.trim() == candidate);
            let promoted = !from_hint && self.registry.promote(purpose, candidate);
            if promoted {
                self.stats.record_promotion();
            }
            self.stats.record_success();
            debug!(%purpose, depth, selector = %candidate, promoted, "resolved");

            self.emit(
                ResolutionTraceEvent::now(purpose, ResolutionOutcome::Resolved)
                    .with_selector(candidate, depth)
                    .with_candidates(&tried)
                    .with_skipped(&skipped)
                    .with_promotion(promoted)
                    .with_elapsed(started.elapsed().as_millis()),
            );

            return Ok(ResolvedElement {
                purpose,
                selector: candidate.clone(),
                handle,
                depth,
                via_discovery: false,
            });
        }

        debug!(%purpose, tried = tried.len(), "discovering");
        self.stats.record_fallback();

        if let Some(found) = self
            .discovery
            .discover(driver, purpose, honeypots, &self.registry)
        {
            self.stats.record_success();
            debug!(%purpose, selector = %found.selector, "resolved via discovery");

            self.emit(
                ResolutionTraceEvent::now(purpose, ResolutionOutcome::Discovered)
                    .with_selector(&found.selector, 0)
                    .with_candidates(&tried)
                    .with_skipped(&skipped)
                    .with_fingerprint(&found.snapshot_fingerprint)
                    .with_elapsed(started.elapsed().as_millis()),
            );

            return Ok(ResolvedElement {
                purpose,
                selector: found.selector,
                handle: found.handle,
                depth: candidates.len(),
                via_discovery: true,
            });
        }

        debug!(%purpose, "failed");
        self.emit(
            ResolutionTraceEvent::now(purpose, ResolutionOutcome::Failed)
                .with_candidates(&tried)
                .with_skipped(&skipped)
                .with_elapsed(started.elapsed().as_millis()),
        );
        Err(EngineError::ElementNotFound(purpose))
    }

    /// Try one candidate; a stale element gets exactly one retry.
    fn probe(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        selector: &str,
        timeout: Duration,
    ) -> Option<ElementHandle> {
        for attempt in 0..2 {
            match self.check_candidate(driver, purpose, selector, timeout) {
                Ok(found) => return found,
                Err(e) if e.is_stale() && attempt == 0 => {
                    debug!(%purpose, selector, "stale element, retrying");
                }
                Err(e) => {
                    debug!(%purpose, selector, error = %e, "candidate miss");
                    return None;
                }
            }
        }
        None
    }

    fn check_candidate(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let Some(handle) = driver.find_visible(selector, timeout)? else {
            return Ok(None);
        };

        let el = self.read_live(driver, &handle)?;
        let verdict = self.scorer.score_live(&el);
        if self.scorer.is_honeypot(&verdict) {
            debug!(%purpose, selector, score = verdict.score, "live element scores as honeypot");
            return Ok(None);
        }
        if !self.is_consistent(&el, purpose) {
            debug!(%purpose, selector, "live element has a different purpose");
            return Ok(None);
        }
        Ok(Some(handle))
    }

    /// Describe a live element with its current computed style.
    pub fn read_live(
        &self,
        driver: &mut dyn PageDriver,
        handle: &ElementHandle,
    ) -> Result<ElementSnapshot, DriverError> {
        let mut raw = driver.describe(handle)?;
        let live = driver.computed_style(handle)?;
        raw.style = live.style;
        raw.rect = live.rect;
        Ok(self.extractor.element_from_raw(&raw, 0, &live.viewport))
    }

    /// The live element's classified purpose equals the target, or is `Other`
    /// on a control whose type can hold the target.
    pub fn is_consistent(&self, el: &ElementSnapshot, purpose: FieldPurpose) -> bool {
        let classified = self.classifier.classify(el).purpose;
        if classified == purpose {
            return true;
        }
        // A confirmation field read in isolation looks like its base field.
        match (purpose, classified) {
            (FieldPurpose::ConfirmEmail, FieldPurpose::Email)
            | (FieldPurpose::ConfirmPassword, FieldPurpose::Password) => true,
            (_, FieldPurpose::Other) => type_compatible(el, purpose),
            _ => false,
        }
    }

    fn emit(&self, event: ResolutionTraceEvent) {
        if let Some(trace) = &self.trace {
            trace.log(&event);
        }
    }
}

/// Listed as a honeypot by the caller, or carrying a trap token.
pub fn is_trap_selector(selector: &str, honeypots: &[String]) -> bool {
    honeypots.iter().any(|h| h.trim() == selector.trim()) || selector_has_honeypot_token(selector)
}

fn type_compatible(el: &ElementSnapshot, purpose: FieldPurpose) -> bool {
    let input_type = el.effective_type().unwrap_or_default();
    match purpose {
        FieldPurpose::Submit => el.is_button(),
        p if p.is_checkbox() => el.is_checkbox(),
        FieldPurpose::Password | FieldPurpose::ConfirmPassword => input_type == "password",
        FieldPurpose::Email | FieldPurpose::ConfirmEmail => {
            matches!(input_type.as_str(), "email" | "text")
        }
        FieldPurpose::Phone => matches!(input_type.as_str(), "tel" | "text" | "number"),
        FieldPurpose::Age => {
            el.tag == "select" || matches!(input_type.as_str(), "number" | "text" | "date")
        }
        FieldPurpose::Gender => el.tag == "select" || el.is_radio() || input_type == "text",
        FieldPurpose::Other => true,
        _ => {
            el.tag == "textarea"
                || el.tag == "select"
                || matches!(input_type.as_str(), "text" | "search")
        }
    }
}
