use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::browser::driver::PageDriver;
use crate::error::EngineError;
use crate::page::page_model::{
    ElementContext, ElementSnapshot, FormSnapshot, Identifiers, PageIndicators, PageSnapshot,
    RawElement, RawPage, Viewport, VisibilityState,
};

const INTERACTIVE_TAGS: [&str; 4] = ["input", "textarea", "select", "button"];
const CAPTCHA_MARKERS: [&str; 4] = ["captcha", "recaptcha", "hcaptcha", "turnstile"];

/// Reads a live page into an immutable `PageSnapshot`.
#[derive(Debug, Clone)]
pub struct PageSnapshotExtractor {
    /// Nearby text farther than this (px) is ignored.
    pub nearby_radius: f32,
    pub max_adjacent_chars: usize,
    pub max_parent_chars: usize,
    /// Scroll to the bottom and back before reading, to mount lazy content.
    pub scroll_for_lazy_content: bool,
}

impl Default for PageSnapshotExtractor {
    fn default() -> Self {
        Self {
            nearby_radius: 200.0,
            max_adjacent_chars: 80,
            max_parent_chars: 200,
            scroll_for_lazy_content: true,
        }
    }
}

impl PageSnapshotExtractor {
    /// Read the page behind `driver`.
    ///
    /// Fails with `PageUnavailable` only when the page itself cannot be read;
    /// unreadable elements are dropped and noted in `indicators.insights`.
    pub fn extract(&self, driver: &mut dyn PageDriver) -> Result<PageSnapshot, EngineError> {
        let mut insights = Vec::new();

        if self.scroll_for_lazy_content {
            if let Err(note) = nudge_lazy_content(driver) {
                insights.push(note);
            }
        }

        let raw = driver
            .query_snapshot()
            .map_err(|e| EngineError::PageUnavailable(e.to_string()))?;

        let mut snapshot = self.from_raw(raw);
        insights.append(&mut snapshot.indicators.insights);
        snapshot.indicators.insights = insights;

        debug!(
            url = %snapshot.url,
            forms = snapshot.indicators.form_count,
            elements = snapshot.indicators.interactive_count,
            "page snapshot extracted"
        );
        Ok(snapshot)
    }

    /// Build a snapshot from an already-read page payload.
    pub fn from_raw(&self, raw: RawPage) -> PageSnapshot {
        let mut insights = Vec::new();
        let mut forms: Vec<FormSnapshot> = raw
            .forms
            .iter()
            .map(|f| FormSnapshot {
                form_ref: f.index,
                id: non_empty(f.id.as_deref()),
                name: non_empty(f.name.as_deref()),
                action: non_empty(f.action.as_deref()),
                method: f.method.as_deref().map(|m| m.to_lowercase()),
                html: f.html.clone(),
                elements: Vec::new(),
            })
            .collect();
        let mut loose_elements = Vec::new();
        let mut next_ref = 0usize;

        for (index, value) in raw.elements.iter().enumerate() {
            let element: RawElement = match serde_json::from_value(value.clone()) {
                Ok(el) => el,
                Err(e) => {
                    insights.push(format!("element #{} unreadable: {}", index, e));
                    continue;
                }
            };
            if let Some(err) = &element.error {
                insights.push(format!("element #{} skipped: {}", index, err));
                continue;
            }
            if !is_interactive(&element) {
                continue;
            }

            let snapshot = self.element_from_raw(&element, next_ref, &raw.viewport);
            next_ref += 1;

            match snapshot.parent_form_ref {
                Some(form_ref) => match forms.iter_mut().find(|f| f.form_ref == form_ref) {
                    Some(form) => form.elements.push(snapshot),
                    None => {
                        insights.push(format!(
                            "element #{} references unknown form {}",
                            index, form_ref
                        ));
                        loose_elements.push(ElementSnapshot {
                            parent_form_ref: None,
                            ..snapshot
                        });
                    }
                },
                None => loose_elements.push(snapshot),
            }
        }

        if !insights.is_empty() {
            warn!(count = insights.len(), "partial page snapshot");
        }

        let all = forms
            .iter()
            .flat_map(|f| f.elements.iter())
            .chain(loose_elements.iter());
        let mut interactive_count = 0;
        let mut password_fields = 0;
        let mut captcha_marker = false;
        for el in all {
            interactive_count += 1;
            if el.effective_type().as_deref() == Some("password") {
                password_fields += 1;
            }
            let ident = format!(
                "{} {} {}",
                el.identifiers.id.as_deref().unwrap_or(""),
                el.identifiers.name.as_deref().unwrap_or(""),
                el.identifiers.class.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if CAPTCHA_MARKERS.iter().any(|m| ident.contains(m)) {
                captcha_marker = true;
            }
        }

        let indicators = PageIndicators {
            form_count: forms.len(),
            interactive_count,
            password_fields,
            captcha_present: raw.captcha || captcha_marker,
            insights,
        };

        PageSnapshot {
            url: raw.url,
            title: raw.title,
            html: raw.html,
            forms,
            loose_elements,
            indicators,
        }
    }

    /// Convert one raw element read; also used for live re-reads.
    pub fn element_from_raw(
        &self,
        raw: &RawElement,
        element_ref: usize,
        viewport: &Viewport,
    ) -> ElementSnapshot {
        let attributes: BTreeMap<String, String> = raw
            .attributes
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();

        let aria_label = non_empty(raw.aria_label.as_deref())
            .or_else(|| non_empty(attributes.get("aria-label").map(|s| s.as_str())));

        let mut labels: Vec<String> = Vec::new();
        for label in &raw.labels {
            let label = collapse_whitespace(label);
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }

        let adjacent_text = raw
            .adjacent_text
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty() && t.chars().count() <= self.max_adjacent_chars);

        let nearby_text = raw
            .nearby
            .iter()
            .filter(|n| n.distance <= self.nearby_radius && !n.text.trim().is_empty())
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .map(|n| collapse_whitespace(&n.text));

        let parent_excerpt = raw
            .parent_text
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .map(|t| truncate_chars(&t, self.max_parent_chars));

        ElementSnapshot {
            element_ref,
            tag: raw.tag.to_lowercase(),
            input_type: non_empty(raw.input_type.as_deref()).map(|t| t.to_lowercase()),
            identifiers: Identifiers {
                id: non_empty(raw.id.as_deref()),
                name: non_empty(raw.name.as_deref()),
                class: non_empty(raw.class_name.as_deref()),
            },
            attributes,
            text: raw.text.as_deref().map(collapse_whitespace).filter(|t| !t.is_empty()),
            visibility: VisibilityState::from_style(&raw.style, &raw.rect, viewport),
            rect: raw.rect,
            context: ElementContext {
                labels,
                adjacent_text,
                nearby_text,
                parent_excerpt,
                aria_label,
            },
            parent_form_ref: raw.form_index,
        }
    }
}

/// Scroll to the bottom and back. Returns an insight note on failure.
fn nudge_lazy_content(driver: &mut dyn PageDriver) -> Result<(), String> {
    let original = driver
        .scroll_position()
        .map_err(|e| format!("scroll position unavailable: {}", e))?;
    let scrolled = driver.scroll_to(f64::from(u32::MAX));
    let restored = driver.scroll_to(original);
    scrolled
        .and(restored)
        .map_err(|e| format!("lazy-content scroll failed: {}", e))
}

fn is_interactive(el: &RawElement) -> bool {
    let tag = el.tag.to_lowercase();
    if tag == "input" {
        return !el
            .input_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
    }
    INTERACTIVE_TAGS.contains(&tag.as_str())
        || el
            .attributes
            .get("role")
            .is_some_and(|r| r.eq_ignore_ascii_case("button"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
