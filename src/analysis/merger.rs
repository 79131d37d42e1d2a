use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::analysis::analysis_model::{
    AnalysisResult, AnalysisSource, HoneypotVerdict, ResolvedFieldSpec,
};
use crate::analysis::external::{ExternalClassification, ExternalField};
use crate::analysis::purpose::{FieldPurpose, GuessSource, PurposeGuess};
use crate::analysis::suspicion::{DangerLevel, SuspicionVerdict};
use crate::page::page_model::PageSnapshot;
use crate::page::selector;

pub const DEFAULT_EXTERNAL_GATE: f32 = 0.6;

/// Combines scorer, classifier and external outputs into one result.
#[derive(Debug, Clone)]
pub struct AnalysisMerger {
    /// External results at or below this self-reported confidence are ignored.
    pub external_gate: f32,
    pub honeypot_threshold: f32,
}

impl Default for AnalysisMerger {
    fn default() -> Self {
        Self {
            external_gate: DEFAULT_EXTERNAL_GATE,
            honeypot_threshold: crate::analysis::suspicion::DEFAULT_HONEYPOT_THRESHOLD,
        }
    }
}

/// Intermediate pattern-derived bindings.
struct PatternBindings {
    fields: Vec<ResolvedFieldSpec>,
    checkboxes: Vec<ResolvedFieldSpec>,
    submit_button: Option<ResolvedFieldSpec>,
}

impl AnalysisMerger {
    pub fn new(external_gate: f32, honeypot_threshold: f32) -> Self {
        Self {
            external_gate,
            honeypot_threshold,
        }
    }

    /// Merge everything known about one snapshot.
    ///
    /// Never fails; the worst outcome is an empty, zero-confidence result.
    pub fn merge(
        &self,
        snapshot: &PageSnapshot,
        verdicts: &[SuspicionVerdict],
        guesses: &[PurposeGuess],
        external: Option<&ExternalClassification>,
    ) -> AnalysisResult {
        let mut honeypots = self.scorer_honeypots(snapshot, verdicts);
        let mut honeypot_refs: BTreeSet<usize> = verdicts
            .iter()
            .filter(|v| v.score > self.honeypot_threshold)
            .map(|v| v.element_ref)
            .collect();

        let pattern = self.pattern_bindings(snapshot, guesses, &honeypot_refs);

        let trusted = external.filter(|e| e.confidence > self.external_gate);
        let (mut fields, mut checkboxes, mut submit_button, source) = match trusted {
            Some(ext) => {
                for h in &ext.honeypots {
                    honeypot_refs.insert(h.element_ref);
                    if honeypots.iter().any(|known| known.selector == h.selector) {
                        continue;
                    }
                    let scored = verdicts
                        .iter()
                        .find(|v| v.element_ref == h.element_ref)
                        .map(|v| v.score)
                        .unwrap_or(0.0);
                    let score = scored.max(ext.confidence);
                    honeypots.push(HoneypotVerdict {
                        selector: h.selector.clone(),
                        score,
                        reasons: vec![h.reason.clone()],
                        danger_level: DangerLevel::from_score(score),
                    });
                }

                // Suggestions aimed at a trap are dropped here so the
                // pattern binding for that purpose can take their place.
                let trap_selectors: BTreeSet<&str> =
                    honeypots.iter().map(|h| h.selector.as_str()).collect();
                let usable = |f: &&ExternalField| {
                    !honeypot_refs.contains(&f.element_ref)
                        && !trap_selectors.contains(f.selector.as_str())
                };
                let ext_fields: Vec<ExternalField> =
                    ext.fields.iter().filter(usable).cloned().collect();
                let ext_checkboxes: Vec<ExternalField> =
                    ext.checkboxes.iter().filter(usable).cloned().collect();

                let fields = prefer_external(snapshot, &ext_fields, pattern.fields);
                let checkboxes = prefer_external(snapshot, &ext_checkboxes, pattern.checkboxes);
                let submit = ext
                    .submit_button
                    .as_ref()
                    .filter(usable)
                    .map(|s| external_spec(snapshot, s))
                    .or(pattern.submit_button);
                (fields, checkboxes, submit, AnalysisSource::External)
            }
            None => (
                pattern.fields,
                pattern.checkboxes,
                pattern.submit_button,
                AnalysisSource::PatternOnly,
            ),
        };

        let honeypot_selectors: BTreeSet<String> =
            honeypots.iter().map(|h| h.selector.clone()).collect();
        enforce_exclusion(&mut fields, &honeypot_selectors, &honeypot_refs);
        enforce_exclusion(&mut checkboxes, &honeypot_selectors, &honeypot_refs);
        if let Some(submit) = submit_button.take() {
            let mut single = vec![submit];
            enforce_exclusion(&mut single, &honeypot_selectors, &honeypot_refs);
            submit_button = single.pop();
        }

        let confidences: Vec<f32> = fields
            .iter()
            .chain(checkboxes.iter())
            .map(|f| f.confidence)
            .collect();
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        info!(
            url = %snapshot.url,
            fields = fields.len(),
            checkboxes = checkboxes.len(),
            honeypots = honeypots.len(),
            ?source,
            "analysis merged"
        );

        let mut result = AnalysisResult {
            url: snapshot.url.clone(),
            fields,
            checkboxes,
            honeypots,
            submit_button,
            confidence,
            validation_success_rate: 0.0,
            source,
            snapshot_fingerprint: snapshot.fingerprint(),
        };
        result.refresh_validation_rate();
        result
    }

    fn scorer_honeypots(
        &self,
        snapshot: &PageSnapshot,
        verdicts: &[SuspicionVerdict],
    ) -> Vec<HoneypotVerdict> {
        verdicts
            .iter()
            .filter(|v| v.score > self.honeypot_threshold)
            .filter_map(|v| {
                let el = snapshot.element(v.element_ref)?;
                let selector = selector::derive_candidates(el, snapshot).into_iter().next()?;
                Some(HoneypotVerdict {
                    selector,
                    score: v.score,
                    reasons: v.reasons.iter().map(|r| r.to_string()).collect(),
                    danger_level: DangerLevel::from_score(v.score),
                })
            })
            .collect()
    }

    /// Bindings from the deterministic classifier alone.
    fn pattern_bindings(
        &self,
        snapshot: &PageSnapshot,
        guesses: &[PurposeGuess],
        honeypot_refs: &BTreeSet<usize>,
    ) -> PatternBindings {
        let mut fields: Vec<ResolvedFieldSpec> = Vec::new();
        let mut checkboxes: Vec<ResolvedFieldSpec> = Vec::new();
        let mut submit: Option<(bool, f32, ResolvedFieldSpec)> = None;
        let mut form_of: HashMap<FieldPurpose, Option<usize>> = HashMap::new();

        let forms_with_fields: BTreeSet<usize> = guesses
            .iter()
            .filter(|g| g.purpose.is_fillable() && !honeypot_refs.contains(&g.element_ref))
            .filter_map(|g| snapshot.element(g.element_ref)?.parent_form_ref)
            .collect();

        let mut ordered: Vec<&PurposeGuess> = guesses.iter().collect();
        ordered.sort_by_key(|g| g.element_ref);

        for guess in ordered {
            if honeypot_refs.contains(&guess.element_ref) || guess.purpose == FieldPurpose::Other {
                continue;
            }
            let Some(el) = snapshot.element(guess.element_ref) else {
                continue;
            };
            let spec = pattern_spec(snapshot, guess);

            if guess.purpose == FieldPurpose::Submit {
                let in_form = el
                    .parent_form_ref
                    .is_some_and(|f| forms_with_fields.contains(&f));
                let better = match &submit {
                    None => true,
                    Some((best_in_form, best_conf, _)) => {
                        (in_form, guess.confidence) > (*best_in_form, *best_conf)
                    }
                };
                if better {
                    submit = Some((in_form, guess.confidence, spec));
                }
                continue;
            }

            if guess.purpose.is_checkbox() {
                if !checkboxes.iter().any(|c| c.purpose == guess.purpose) {
                    checkboxes.push(spec);
                }
                continue;
            }

            // A second email/password in the same form is its confirmation.
            let mut purpose = guess.purpose;
            if fields.iter().any(|f| f.purpose == purpose) {
                let confirm = match purpose {
                    FieldPurpose::Password => Some(FieldPurpose::ConfirmPassword),
                    FieldPurpose::Email => Some(FieldPurpose::ConfirmEmail),
                    _ => None,
                };
                let same_form = form_of.get(&purpose).copied().flatten() == el.parent_form_ref;
                match confirm {
                    Some(c) if same_form && !fields.iter().any(|f| f.purpose == c) => {
                        purpose = c;
                    }
                    _ => {
                        // Lower-ranked duplicate: keep as extra candidates only.
                        if let Some(existing) = fields.iter_mut().find(|f| f.purpose == purpose) {
                            for candidate in spec.selector_candidates {
                                if !existing.selector_candidates.contains(&candidate) {
                                    existing.selector_candidates.push(candidate);
                                }
                            }
                        }
                        continue;
                    }
                }
            }

            form_of.insert(purpose, el.parent_form_ref);
            fields.push(ResolvedFieldSpec { purpose, ..spec });
        }

        PatternBindings {
            fields,
            checkboxes,
            submit_button: submit.map(|(_, _, spec)| spec),
        }
    }
}

fn pattern_spec(snapshot: &PageSnapshot, guess: &PurposeGuess) -> ResolvedFieldSpec {
    let candidates = snapshot
        .element(guess.element_ref)
        .map(|el| selector::derive_candidates(el, snapshot))
        .unwrap_or_default();
    ResolvedFieldSpec {
        purpose: guess.purpose,
        chosen_selector: candidates.first().cloned().unwrap_or_default(),
        selector_candidates: candidates,
        validated: false,
        actually_interactable: false,
        source: GuessSource::Pattern,
        confidence: guess.confidence,
        element_ref: Some(guess.element_ref),
    }
}

fn external_spec(snapshot: &PageSnapshot, field: &ExternalField) -> ResolvedFieldSpec {
    let mut candidates = vec![field.selector.clone()];
    if let Some(el) = snapshot.element(field.element_ref) {
        for derived in selector::derive_candidates(el, snapshot) {
            if !candidates.contains(&derived) {
                candidates.push(derived);
            }
        }
    }
    ResolvedFieldSpec {
        purpose: field.purpose,
        chosen_selector: field.selector.clone(),
        selector_candidates: candidates,
        validated: false,
        actually_interactable: false,
        source: GuessSource::External,
        confidence: field.confidence,
        element_ref: Some(field.element_ref),
    }
}

/// External bindings first; pattern bindings fill purposes and elements the
/// external answer left uncovered.
fn prefer_external(
    snapshot: &PageSnapshot,
    external: &[ExternalField],
    pattern: Vec<ResolvedFieldSpec>,
) -> Vec<ResolvedFieldSpec> {
    let mut merged: Vec<ResolvedFieldSpec> = Vec::new();
    for field in external {
        let taken = merged
            .iter()
            .any(|m| m.purpose == field.purpose || m.element_ref == Some(field.element_ref));
        if !taken {
            merged.push(external_spec(snapshot, field));
        }
    }
    for spec in pattern {
        let taken = merged
            .iter()
            .any(|m| m.purpose == spec.purpose || m.element_ref == spec.element_ref);
        if !taken {
            merged.push(spec);
        }
    }
    merged
}

/// Drop bindings that point at a honeypot and scrub honeypot selectors from
/// the remaining candidate lists.
fn enforce_exclusion(
    specs: &mut Vec<ResolvedFieldSpec>,
    honeypot_selectors: &BTreeSet<String>,
    honeypot_refs: &BTreeSet<usize>,
) {
    specs.retain(|spec| {
        let conflict = honeypot_selectors.contains(&spec.chosen_selector)
            || spec.element_ref.is_some_and(|r| honeypot_refs.contains(&r));
        if conflict {
            warn!(
                purpose = %spec.purpose,
                selector = %spec.chosen_selector,
                "dropping field that is also a honeypot"
            );
        }
        !conflict
    });
    for spec in specs.iter_mut() {
        spec.selector_candidates
            .retain(|c| !honeypot_selectors.contains(c));
    }
}
