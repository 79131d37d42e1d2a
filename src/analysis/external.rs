use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::analysis::ai_model::{MockTextInference, TextInference};
use crate::analysis::analysis_model::SiteContext;
use crate::analysis::purpose::FieldPurpose;
use crate::error::EngineError;
use crate::page::extractor::truncate_chars;
use crate::page::page_model::PageSnapshot;
use crate::page::selector;

pub const DEFAULT_EXCERPT_CHARS: usize = 12_000;

static NOISE_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<script\b.*?</script\s*>",
        r"(?is)<style\b.*?</style\s*>",
        r"(?is)<noscript\b.*?</noscript\s*>",
        r"(?is)<svg\b.*?</svg\s*>",
        r"(?s)<!--.*?-->",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").expect("valid regex"));
static FORM_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</form\s*>").expect("valid regex"));

// ============================================================================
// Wire schema (untrusted)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    fields: Vec<SuggestedField>,
    #[serde(default)]
    checkboxes: Vec<SuggestedField>,
    #[serde(default)]
    honeypots: Vec<SuggestedHoneypot>,
    #[serde(default, alias = "submit_button")]
    #[serde(rename = "submitButton")]
    submit_button: Option<String>,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct SuggestedField {
    selector: String,
    purpose: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SuggestedHoneypot {
    selector: String,
    #[serde(default)]
    reason: Option<String>,
}

// ============================================================================
// Validated suggestion
// ============================================================================

/// A suggested binding whose selector resolved in the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalField {
    pub purpose: FieldPurpose,
    pub selector: String,
    pub element_ref: usize,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalHoneypot {
    pub selector: String,
    pub element_ref: usize,
    pub reason: String,
}

/// The classifier's answer after the hallucination guard.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalClassification {
    pub fields: Vec<ExternalField>,
    pub checkboxes: Vec<ExternalField>,
    pub honeypots: Vec<ExternalHoneypot>,
    pub submit_button: Option<ExternalField>,
    pub confidence: f32,
    /// Suggestions dropped because their selector matched nothing.
    pub discarded: usize,
}

// ============================================================================
// Adapter
// ============================================================================

/// Asks an AI service for a field map and treats the answer as untrusted.
pub struct ExternalClassifierAdapter {
    backend: Box<dyn TextInference>,
    timeout: Duration,
    max_retries: u32,
    max_excerpt_chars: usize,
}

impl ExternalClassifierAdapter {
    pub fn new(backend: Box<dyn TextInference>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(30),
            max_retries: 1,
            max_excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    /// Adapter backed by a `MockTextInference` with a canned response.
    pub fn with_mock_response(response: &str) -> Self {
        Self::new(Box::new(MockTextInference {
            response: response.to_string(),
        }))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_excerpt_budget(mut self, max_chars: usize) -> Self {
        self.max_excerpt_chars = max_chars;
        self
    }

    /// Classify the snapshot, or `None` when the service fails or answers
    /// outside the schema.
    pub fn classify(
        &self,
        snapshot: &PageSnapshot,
        context: &SiteContext,
    ) -> Option<ExternalClassification> {
        let excerpt = build_excerpt(snapshot, self.max_excerpt_chars);
        let prompt = build_prompt(snapshot, context, &excerpt);

        let response = match self.request(&prompt) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "external classifier unavailable, continuing pattern-only");
                return None;
            }
        };

        match parse_response(&response, snapshot) {
            Ok(classification) => {
                debug!(
                    fields = classification.fields.len(),
                    discarded = classification.discarded,
                    confidence = classification.confidence,
                    "external classification accepted"
                );
                Some(classification)
            }
            Err(e) => {
                warn!(error = %e, "external classification discarded");
                None
            }
        }
    }

    fn request(&self, prompt: &str) -> Result<String, EngineError> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.backend.infer_text(prompt, self.timeout) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(attempt, error = %e, "classifier request failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| EngineError::ClassificationService("no attempt made".into())))
    }
}

/// Parse and validate a classifier answer against the snapshot.
pub fn parse_response(
    response: &str,
    snapshot: &PageSnapshot,
) -> Result<ExternalClassification, EngineError> {
    let body = json_body(response)
        .ok_or_else(|| EngineError::SchemaViolation("no JSON object in response".into()))?;
    let parsed: SuggestionResponse =
        serde_json::from_str(body).map_err(|e| EngineError::SchemaViolation(e.to_string()))?;

    if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(EngineError::SchemaViolation(format!(
            "confidence {} outside [0, 1]",
            parsed.confidence
        )));
    }

    let mut discarded = 0;
    let mut fields = Vec::new();
    let mut checkboxes = Vec::new();
    let mut submit_button = None;

    for suggestion in parsed.fields.iter().chain(parsed.checkboxes.iter()) {
        let Ok(purpose) = suggestion.purpose.parse::<FieldPurpose>() else {
            discarded += 1;
            continue;
        };
        let Some(element_ref) = first_match(&suggestion.selector, snapshot) else {
            debug!(selector = %suggestion.selector, "discarding unresolvable suggestion");
            discarded += 1;
            continue;
        };
        let field = ExternalField {
            purpose,
            selector: suggestion.selector.trim().to_string(),
            element_ref,
            confidence: suggestion
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(parsed.confidence)
                .clamp(0.0, 1.0),
        };
        if purpose.is_checkbox() {
            checkboxes.push(field);
        } else if purpose == FieldPurpose::Submit {
            submit_button.get_or_insert(field);
        } else if purpose != FieldPurpose::Other {
            fields.push(field);
        }
    }

    if let Some(selector) = parsed.submit_button.as_deref().filter(|s| !s.trim().is_empty()) {
        match first_match(selector, snapshot) {
            Some(element_ref) => {
                submit_button = Some(ExternalField {
                    purpose: FieldPurpose::Submit,
                    selector: selector.trim().to_string(),
                    element_ref,
                    confidence: parsed.confidence,
                });
            }
            None => discarded += 1,
        }
    }

    let honeypots = parsed
        .honeypots
        .iter()
        .filter_map(|h| {
            first_match(&h.selector, snapshot).map(|element_ref| ExternalHoneypot {
                selector: h.selector.trim().to_string(),
                element_ref,
                reason: h
                    .reason
                    .clone()
                    .unwrap_or_else(|| "flagged by classifier".to_string()),
            })
        })
        .collect();

    Ok(ExternalClassification {
        fields,
        checkboxes,
        honeypots,
        submit_button,
        confidence: parsed.confidence,
        discarded,
    })
}

fn first_match(selector: &str, snapshot: &PageSnapshot) -> Option<usize> {
    selector::select(selector, snapshot)
        .first()
        .map(|el| el.element_ref)
}

/// The outermost `{...}` of a response, ignoring code fences and chatter.
fn json_body(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

// ============================================================================
// Prompt construction
// ============================================================================

/// Remove scripts, styles, comments and inline SVG; collapse whitespace.
pub fn strip_noise(html: &str) -> String {
    let mut cleaned = html.to_string();
    for pattern in NOISE_BLOCKS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = BETWEEN_TAGS.replace_all(&cleaned, "><");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// A cleaned HTML excerpt of at most `max_chars` characters, cut at form
/// boundaries where possible.
pub fn build_excerpt(snapshot: &PageSnapshot, max_chars: usize) -> String {
    let forms: Vec<String> = snapshot
        .forms
        .iter()
        .map(|f| strip_noise(&f.html))
        .filter(|h| !h.is_empty())
        .collect();

    if !forms.is_empty() {
        let mut excerpt = String::new();
        let mut used = 0;
        for form in &forms {
            let len = form.chars().count() + usize::from(!excerpt.is_empty());
            if used + len > max_chars {
                break;
            }
            if !excerpt.is_empty() {
                excerpt.push('\n');
            }
            excerpt.push_str(form);
            used += len;
        }
        if !excerpt.is_empty() {
            return excerpt;
        }
        return truncate_chars(&forms[0], max_chars);
    }

    let page = strip_noise(&snapshot.html);
    if page.chars().count() <= max_chars {
        return page;
    }
    let budget = truncate_chars(&page, max_chars);
    match FORM_END.find_iter(&budget).last() {
        Some(end) => budget[..end.end()].to_string(),
        None => budget,
    }
}

fn build_prompt(snapshot: &PageSnapshot, context: &SiteContext, excerpt: &str) -> String {
    format!(
        r##"You map web form controls to their purpose and spot honeypot traps.

SITE: {site}
PAGE KIND: {kind}
URL: {url}
TITLE: {title}

HTML:
{excerpt}

Allowed purposes: email, confirmEmail, password, confirmPassword, firstName,
lastName, fullName, phone, company, address, age, gender, terms, privacy,
newsletter, marketing.

Return ONLY valid JSON matching this exact schema:
{{
  "fields": [{{"selector": "CSS selector present in the HTML", "purpose": "email", "confidence": 0.9}}],
  "checkboxes": [{{"selector": "...", "purpose": "terms"}}],
  "honeypots": [{{"selector": "...", "reason": "why this is a trap"}}],
  "submitButton": "CSS selector or null",
  "confidence": 0.0
}}

Only use selectors that match elements in the HTML above. Respond with ONLY valid JSON, no explanation."##,
        site = if context.site.is_empty() {
            "unknown"
        } else {
            &context.site
        },
        kind = context.page_kind.as_deref().unwrap_or("unknown"),
        url = snapshot.url,
        title = snapshot.title,
        excerpt = if excerpt.is_empty() { "(empty)" } else { excerpt },
    )
}
