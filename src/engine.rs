use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analysis::analysis_model::{AnalysisResult, ResolvedFieldSpec, SiteContext};
use crate::analysis::cache::AnalysisCache;
use crate::analysis::classifier::PurposeClassifier;
use crate::analysis::external::ExternalClassifierAdapter;
use crate::analysis::merger::AnalysisMerger;
use crate::analysis::purpose::{FieldPurpose, PurposeGuess};
use crate::analysis::suspicion::{SuspicionScorer, SuspicionVerdict};
use crate::browser::driver::PageDriver;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::page::extractor::PageSnapshotExtractor;
use crate::page::page_model::PageSnapshot;
use crate::page::selector;
use crate::resolver::ResolvedElement;
use crate::resolver::live::LiveSelectorResolver;
use crate::resolver::registry::AdaptiveSelectorRegistry;
use crate::resolver::stats::{ResolverStats, StatsCounters};
use crate::trace::logger::TraceLogger;

/// Orchestrator-facing entry point: analysis, resolution and the two actions
/// an orchestrator performs on a bound element.
pub struct FieldEngine {
    config: EngineConfig,
    registry: Arc<AdaptiveSelectorRegistry>,
    stats: Arc<StatsCounters>,
    cache: AnalysisCache,
    extractor: PageSnapshotExtractor,
    scorer: SuspicionScorer,
    classifier: PurposeClassifier,
    merger: AnalysisMerger,
    external: Option<ExternalClassifierAdapter>,
    resolver: LiveSelectorResolver,
}

impl FieldEngine {
    /// Engine with its own default registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(AdaptiveSelectorRegistry::new()))
    }

    /// Engine sharing `registry` with other engines in the process.
    pub fn with_registry(config: EngineConfig, registry: Arc<AdaptiveSelectorRegistry>) -> Self {
        let scorer = SuspicionScorer::new(config.scoring.honeypot_threshold)
            .with_weights(&config.scoring.weights);
        let stats = Arc::new(StatsCounters::default());

        let mut resolver = LiveSelectorResolver::new(registry.clone(), stats.clone())
            .with_scorer(scorer.clone())
            .with_timeouts(
                config.resolver.base_timeout(),
                config.resolver.floor_timeout(),
            );
        if let Some(path) = &config.trace.path {
            resolver = resolver.with_trace(Arc::new(TraceLogger::new(path)));
        }

        Self {
            merger: AnalysisMerger::new(
                config.classifier.external_gate,
                config.scoring.honeypot_threshold,
            ),
            cache: AnalysisCache::new(config.cache.ttl()),
            extractor: PageSnapshotExtractor::default(),
            classifier: PurposeClassifier,
            external: None,
            scorer,
            stats,
            registry,
            resolver,
            config,
        }
    }

    pub fn with_external(mut self, adapter: ExternalClassifierAdapter) -> Self {
        self.external = Some(adapter);
        self
    }

    pub fn with_trace(mut self, logger: Arc<TraceLogger>) -> Self {
        self.resolver = self.resolver.with_trace(logger);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdaptiveSelectorRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Analyse the page behind `driver`.
    ///
    /// A cached result for (site, url) keeps its bindings unless
    /// `force_refresh`, but every chosen selector is validated against the
    /// live page on each call.
    pub fn analyze(
        &self,
        driver: &mut dyn PageDriver,
        context: &SiteContext,
        force_refresh: bool,
    ) -> Result<AnalysisResult> {
        let snapshot = self.extractor.extract(driver)?;

        if force_refresh {
            self.cache.invalidate(&context.site, &snapshot.url);
        } else if let Some(mut hit) = self.cache.get(&context.site, &snapshot.url) {
            debug!(url = %snapshot.url, "analysis cache hit, revalidating");
            self.validate_live(driver, &mut hit);
            hit.refresh_validation_rate();
            return Ok(hit);
        }

        let (mut result, _) = self.merge_snapshot(&snapshot, context);
        self.validate_live(driver, &mut result);
        result.refresh_validation_rate();

        info!(
            url = %result.url,
            fields = result.fields.len(),
            honeypots = result.honeypots.len(),
            validation = result.validation_success_rate,
            "page analyzed"
        );
        self.cache
            .insert(&context.site, &snapshot.url, result.clone());
        Ok(result)
    }

    /// Analyse an already-extracted snapshot without touching a browser.
    ///
    /// A selector validates when it matches a snapshot element; it is
    /// interactable when that element is displayed and not a honeypot.
    pub fn analyze_snapshot(&self, snapshot: &PageSnapshot, context: &SiteContext) -> AnalysisResult {
        let (mut result, verdicts) = self.merge_snapshot(snapshot, context);
        let traps: BTreeSet<usize> = verdicts
            .iter()
            .filter(|v| self.scorer.is_honeypot(v))
            .map(|v| v.element_ref)
            .collect();

        for spec in specs_mut(&mut result) {
            validate_offline(spec, snapshot, &traps);
        }
        result.refresh_validation_rate();
        result
    }

    fn merge_snapshot(
        &self,
        snapshot: &PageSnapshot,
        context: &SiteContext,
    ) -> (AnalysisResult, Vec<SuspicionVerdict>) {
        let verdicts = self.scorer.score_snapshot(snapshot);
        let guesses: Vec<PurposeGuess> = snapshot
            .elements()
            .into_iter()
            .map(|el| self.classifier.classify(el))
            .collect();
        let external = self
            .external
            .as_ref()
            .and_then(|adapter| adapter.classify(snapshot, context));

        let result = self
            .merger
            .merge(snapshot, &verdicts, &guesses, external.as_ref());
        (result, verdicts)
    }

    fn validate_live(&self, driver: &mut dyn PageDriver, result: &mut AnalysisResult) {
        let timeout = self.config.resolver.floor_timeout();
        for spec in specs_mut(result) {
            spec.validated = false;
            spec.actually_interactable = false;
            if spec.chosen_selector.is_empty() {
                continue;
            }
            let handle = match driver.find_visible(&spec.chosen_selector, timeout) {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => {
                    debug!(selector = %spec.chosen_selector, error = %e, "validation probe failed");
                    continue;
                }
            };
            spec.validated = true;
            spec.actually_interactable = match self.resolver.read_live(driver, &handle) {
                Ok(el) => !self.scorer.is_honeypot(&self.scorer.score_live(&el)),
                Err(e) => {
                    debug!(selector = %spec.chosen_selector, error = %e, "live read failed");
                    false
                }
            };
        }
    }

    // ========================================================================
    // Resolution and actions
    // ========================================================================

    pub fn resolve(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        hints: &[String],
        honeypots: &[String],
    ) -> Result<ResolvedElement> {
        self.resolver.resolve(driver, purpose, hints, honeypots)
    }

    /// Resolve `purpose` using an analysis result's candidates and honeypots.
    pub fn resolve_from(
        &self,
        driver: &mut dyn PageDriver,
        analysis: &AnalysisResult,
        purpose: FieldPurpose,
    ) -> Result<ResolvedElement> {
        let hints = analysis
            .field(purpose)
            .map(|f| f.selector_candidates.clone())
            .unwrap_or_default();
        self.resolve(driver, purpose, &hints, &analysis.honeypot_selectors())
    }

    /// Resolve then type `text` into the element.
    pub fn fill(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        hints: &[String],
        honeypots: &[String],
        text: &str,
    ) -> Result<ResolvedElement> {
        let resolved = self.resolve(driver, purpose, hints, honeypots)?;
        driver.fill(&resolved.handle, text).map_err(|e| {
            warn!(%purpose, selector = %resolved.selector, error = %e, "fill failed");
            EngineError::ElementNotFound(purpose)
        })?;
        Ok(resolved)
    }

    /// Resolve then click the element.
    pub fn click(
        &self,
        driver: &mut dyn PageDriver,
        purpose: FieldPurpose,
        hints: &[String],
        honeypots: &[String],
    ) -> Result<ResolvedElement> {
        let resolved = self.resolve(driver, purpose, hints, honeypots)?;
        driver.click(&resolved.handle).map_err(|e| {
            warn!(%purpose, selector = %resolved.selector, error = %e, "click failed");
            EngineError::ElementNotFound(purpose)
        })?;
        Ok(resolved)
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

fn specs_mut(result: &mut AnalysisResult) -> impl Iterator<Item = &mut ResolvedFieldSpec> {
    result
        .fields
        .iter_mut()
        .chain(result.checkboxes.iter_mut())
        .chain(result.submit_button.iter_mut())
}

fn validate_offline(spec: &mut ResolvedFieldSpec, snapshot: &PageSnapshot, traps: &BTreeSet<usize>) {
    let matched = selector::select(&spec.chosen_selector, snapshot);
    let Some(first) = matched.first() else {
        return;
    };
    spec.validated = true;
    spec.actually_interactable =
        first.visibility.is_displayed() && !traps.contains(&first.element_ref);
}
