use serde::Serialize;

use crate::analysis::purpose::{FieldPurpose, GuessSource};
use crate::analysis::suspicion::DangerLevel;

/// A selector judged to address a trap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotVerdict {
    pub selector: String,
    pub score: f32,
    pub reasons: Vec<String>,
    pub danger_level: DangerLevel,
}

/// A purpose bound to an ordered list of selectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFieldSpec {
    pub purpose: FieldPurpose,
    pub selector_candidates: Vec<String>,
    pub chosen_selector: String,
    pub validated: bool,
    pub actually_interactable: bool,
    pub source: GuessSource,
    pub confidence: f32,
    #[serde(skip)]
    pub element_ref: Option<usize>,
}

/// Which pipeline branch produced the fields of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisSource {
    PatternOnly,
    External,
}

/// Everything the orchestrator needs to fill one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub url: String,
    pub fields: Vec<ResolvedFieldSpec>,
    pub checkboxes: Vec<ResolvedFieldSpec>,
    pub honeypots: Vec<HoneypotVerdict>,
    pub submit_button: Option<ResolvedFieldSpec>,
    pub confidence: f32,
    pub validation_success_rate: f32,
    pub source: AnalysisSource,
    pub snapshot_fingerprint: String,
}

impl AnalysisResult {
    pub fn field(&self, purpose: FieldPurpose) -> Option<&ResolvedFieldSpec> {
        self.fields
            .iter()
            .chain(self.checkboxes.iter())
            .chain(self.submit_button.iter())
            .find(|f| f.purpose == purpose)
    }

    pub fn honeypot_selectors(&self) -> Vec<String> {
        self.honeypots.iter().map(|h| h.selector.clone()).collect()
    }

    pub fn is_honeypot_selector(&self, selector: &str) -> bool {
        self.honeypots.iter().any(|h| h.selector == selector)
    }

    /// Share of fields and checkboxes that validated and are interactable.
    pub fn compute_validation_rate(&self) -> f32 {
        let specs: Vec<&ResolvedFieldSpec> =
            self.fields.iter().chain(self.checkboxes.iter()).collect();
        if specs.is_empty() {
            return 0.0;
        }
        let good = specs
            .iter()
            .filter(|s| s.validated && s.actually_interactable)
            .count();
        good as f32 / specs.len() as f32
    }

    pub fn refresh_validation_rate(&mut self) {
        self.validation_success_rate = self.compute_validation_rate();
    }

    /// Every selector this result would have the orchestrator touch.
    pub fn field_selectors(&self) -> Vec<&str> {
        self.fields
            .iter()
            .chain(self.checkboxes.iter())
            .chain(self.submit_button.iter())
            .map(|f| f.chosen_selector.as_str())
            .collect()
    }
}

/// What the caller knows about the site being analysed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContext {
    /// Cache namespace, usually the registrable domain.
    pub site: String,
    /// Free-form hint such as "registration" or "newsletter signup".
    pub page_kind: Option<String>,
    pub language: Option<String>,
}

impl SiteContext {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            ..Self::default()
        }
    }

    pub fn with_page_kind(mut self, kind: &str) -> Self {
        self.page_kind = Some(kind.to_string());
        self
    }
}
