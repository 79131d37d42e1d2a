use std::collections::{BTreeMap, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::page::page_model::{ElementSnapshot, PageSnapshot};

pub const DEFAULT_HONEYPOT_THRESHOLD: f32 = 0.6;

static STRONG_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(honey|hpot|^hp[_-]|[_-]hp$|^hp$|(^|[_-])trap($|[_-])|bot[_-]?check|(^|[_-])bot($|[_-])|leave[_-]?blank|do[_-]?not[_-]?fill|no[_-]?fill|anti[_-]?spam|spam[_-]?(check|trap))",
    )
    .expect("valid regex")
});

static WEAK_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(hidden|fake|dummy|decoy|invisible|^sr-only$|offscreen|off-screen)")
        .expect("valid regex")
});

static LEAVE_BLANK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(leave (this |it )?(field |box |input )?(blank|empty)|do not (fill|enter|complete|change)|don't (fill|enter)|if you are (a )?human|humans? (should|must)? ?(not|never)|keep this (field )?empty)",
    )
    .expect("valid regex")
});

/// Independent scoring categories; weights add across categories only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Style,
    Identifier,
    Structure,
    Accessibility,
    Instruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    DisplayNone,
    VisibilityHidden,
    Transparent,
    Offscreen,
    ZeroSize,
    Clipped,
    HoneypotIdentifier,
    SuspiciousIdentifier,
    DuplicateField,
    AriaHidden,
    NegativeTabindex,
    AutocompleteOffEmail,
    LeaveBlankInstruction,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::DisplayNone => "display:none",
            ReasonCode::VisibilityHidden => "visibility:hidden",
            ReasonCode::Transparent => "opacity~0",
            ReasonCode::Offscreen => "offscreen position",
            ReasonCode::ZeroSize => "zero size",
            ReasonCode::Clipped => "clipped",
            ReasonCode::HoneypotIdentifier => "honeypot identifier",
            ReasonCode::SuspiciousIdentifier => "suspicious identifier",
            ReasonCode::DuplicateField => "duplicate field",
            ReasonCode::AriaHidden => "aria-hidden",
            ReasonCode::NegativeTabindex => "tabindex=-1",
            ReasonCode::AutocompleteOffEmail => "autocomplete=off on email field",
            ReasonCode::LeaveBlankInstruction => "leave-blank instruction",
        };
        f.write_str(s)
    }
}

/// Facts about an element that depend on the rest of the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerFacts {
    /// Shares its name with a less suspicious element.
    pub duplicate_secondary: bool,
}

type Predicate = fn(&ElementSnapshot, &PeerFacts) -> bool;

/// One row of the scoring table.
#[derive(Clone)]
pub struct SuspicionRule {
    pub category: Category,
    pub code: ReasonCode,
    pub weight: f32,
    predicate: Predicate,
}

impl fmt::Debug for SuspicionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspicionRule")
            .field("category", &self.category)
            .field("code", &self.code)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Honeypot likelihood for one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspicionVerdict {
    pub element_ref: usize,
    pub score: f32,
    pub reasons: Vec<ReasonCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    Low,
    Medium,
    High,
}

impl DangerLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.85 {
            DangerLevel::High
        } else if score >= 0.7 {
            DangerLevel::Medium
        } else {
            DangerLevel::Low
        }
    }
}

fn rule(category: Category, code: ReasonCode, weight: f32, predicate: Predicate) -> SuspicionRule {
    SuspicionRule {
        category,
        code,
        weight,
        predicate,
    }
}

fn identifier_values(el: &ElementSnapshot) -> Vec<&str> {
    let mut values: Vec<&str> = [el.identifiers.id.as_deref(), el.identifiers.name.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    values.extend(el.classes());
    values
}

fn is_email_like(el: &ElementSnapshot) -> bool {
    if el.effective_type().as_deref() == Some("email") {
        return true;
    }
    let text = el.descriptor_text();
    text.contains("email") || text.contains("e-mail")
}

fn instruction_text(el: &ElementSnapshot) -> String {
    let mut text = el.context_text();
    if let Some(parent) = &el.context.parent_excerpt {
        text.push(' ');
        text.push_str(&parent.to_lowercase());
    }
    if let Some(p) = el.placeholder() {
        text.push(' ');
        text.push_str(&p.to_lowercase());
    }
    text
}

/// The built-in scoring table, in evaluation order.
pub fn default_rules() -> Vec<SuspicionRule> {
    vec![
        rule(Category::Style, ReasonCode::DisplayNone, 0.9, |el, _| {
            el.visibility.display_none
        }),
        rule(Category::Style, ReasonCode::VisibilityHidden, 0.9, |el, _| {
            el.visibility.visibility_hidden
        }),
        rule(Category::Style, ReasonCode::Transparent, 0.8, |el, _| {
            el.visibility.is_transparent()
        }),
        rule(Category::Style, ReasonCode::Offscreen, 0.8, |el, _| {
            el.visibility.offscreen
        }),
        rule(Category::Style, ReasonCode::ZeroSize, 0.7, |el, _| {
            el.visibility.zero_size
        }),
        rule(Category::Style, ReasonCode::Clipped, 0.7, |el, _| {
            el.visibility.clipped
        }),
        rule(
            Category::Identifier,
            ReasonCode::HoneypotIdentifier,
            0.7,
            |el, _| identifier_values(el).iter().any(|v| STRONG_TOKEN.is_match(v)),
        ),
        rule(
            Category::Identifier,
            ReasonCode::SuspiciousIdentifier,
            0.5,
            |el, _| identifier_values(el).iter().any(|v| WEAK_TOKEN.is_match(v)),
        ),
        rule(Category::Structure, ReasonCode::DuplicateField, 0.6, |_, peers| {
            peers.duplicate_secondary
        }),
        rule(Category::Accessibility, ReasonCode::AriaHidden, 0.4, |el, _| {
            el.attr("aria-hidden")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
        }),
        rule(
            Category::Accessibility,
            ReasonCode::NegativeTabindex,
            0.3,
            |el, _| el.attr("tabindex").is_some_and(|v| v.trim() == "-1"),
        ),
        rule(
            Category::Accessibility,
            ReasonCode::AutocompleteOffEmail,
            0.3,
            |el, _| {
                el.attr("autocomplete")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("off"))
                    && is_email_like(el)
            },
        ),
        rule(
            Category::Instruction,
            ReasonCode::LeaveBlankInstruction,
            0.5,
            |el, _| LEAVE_BLANK.is_match(&instruction_text(el)),
        ),
    ]
}

/// Pure, table-driven honeypot scorer.
#[derive(Debug, Clone)]
pub struct SuspicionScorer {
    rules: Vec<SuspicionRule>,
    threshold: f32,
}

impl Default for SuspicionScorer {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            threshold: DEFAULT_HONEYPOT_THRESHOLD,
        }
    }
}

impl SuspicionScorer {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Replace the weight of individual rules.
    pub fn with_weights(mut self, overrides: &BTreeMap<ReasonCode, f32>) -> Self {
        for rule in &mut self.rules {
            if let Some(weight) = overrides.get(&rule.code) {
                rule.weight = weight.clamp(0.0, 1.0);
            }
        }
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn rules(&self) -> &[SuspicionRule] {
        &self.rules
    }

    pub fn is_honeypot(&self, verdict: &SuspicionVerdict) -> bool {
        verdict.score > self.threshold
    }

    /// Score one element given what is known about its peers.
    ///
    /// Within a category only the strongest matching rule counts; categories
    /// add, and the total is capped at 1.0.
    pub fn score_element(&self, el: &ElementSnapshot, peers: &PeerFacts) -> SuspicionVerdict {
        let mut per_category: BTreeMap<Category, f32> = BTreeMap::new();
        let mut reasons = Vec::new();

        for rule in &self.rules {
            if (rule.predicate)(el, peers) {
                reasons.push(rule.code);
                let slot = per_category.entry(rule.category).or_insert(0.0);
                *slot = slot.max(rule.weight);
            }
        }

        let total: f32 = per_category.values().sum();
        SuspicionVerdict {
            element_ref: el.element_ref,
            score: round_score(total.min(1.0)),
            reasons,
        }
    }

    /// Score an element read from the live page, where peers are unknown.
    pub fn score_live(&self, el: &ElementSnapshot) -> SuspicionVerdict {
        self.score_element(el, &PeerFacts::default())
    }

    /// Score every element of a snapshot, in document order.
    pub fn score_snapshot(&self, snapshot: &PageSnapshot) -> Vec<SuspicionVerdict> {
        let elements = snapshot.elements();
        let base: Vec<SuspicionVerdict> = elements
            .iter()
            .map(|el| self.score_element(el, &PeerFacts::default()))
            .collect();

        let secondaries = duplicate_secondaries(&elements, &base);

        elements
            .iter()
            .zip(base)
            .map(|(el, verdict)| {
                if secondaries.contains(&el.element_ref) {
                    let peers = PeerFacts {
                        duplicate_secondary: true,
                    };
                    self.score_element(el, &peers)
                } else {
                    verdict
                }
            })
            .collect()
    }
}

/// Elements that share a field name with a less suspicious element.
///
/// The member with the lowest base score stays primary; ties go to the
/// earliest in document order.
fn duplicate_secondaries(elements: &[&ElementSnapshot], base: &[SuspicionVerdict]) -> Vec<usize> {
    let mut groups: HashMap<String, Vec<(usize, f32)>> = HashMap::new();

    for (el, verdict) in elements.iter().zip(base) {
        if !el.is_text_entry() {
            continue;
        }
        let Some(name) = el.identifiers.name.as_deref() else {
            continue;
        };
        groups
            .entry(name.trim().to_lowercase())
            .or_default()
            .push((el.element_ref, verdict.score));
    }

    let mut secondaries = Vec::new();
    for members in groups.values().filter(|m| m.len() > 1) {
        let primary = members
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(r, _)| *r);
        secondaries.extend(
            members
                .iter()
                .map(|(r, _)| *r)
                .filter(|r| Some(*r) != primary),
        );
    }
    secondaries.sort_unstable();
    secondaries
}

/// Whether any identifier-like token of a selector carries a strong trap word.
pub fn selector_has_honeypot_token(selector: &str) -> bool {
    selector
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|t| !t.is_empty())
        .any(|t| STRONG_TOKEN.is_match(t))
}

// Keeps sums like 0.7 + 0.3 from drifting across the threshold.
fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}
