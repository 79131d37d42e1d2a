use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw records produced by the driver (browser_server.js `extract`)
// ============================================================================

/// Page payload returned by `PageDriver::query_snapshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub captcha: bool,
    #[serde(default)]
    pub forms: Vec<RawForm>,
    /// Kept as raw JSON so one malformed element cannot fail the whole page.
    #[serde(default)]
    pub elements: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawForm {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub html: String,
}

/// One interactive element as read by the page script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    pub tag: String,
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub form_index: Option<usize>,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub adjacent_text: Option<String>,
    #[serde(default)]
    pub nearby: Vec<NearbyText>,
    #[serde(default)]
    pub parent_text: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    /// Set by the page script when reading a property threw.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NearbyText {
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// The subset of `getComputedStyle` the scorer looks at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyle {
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub opacity: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub clip: Option<String>,
    #[serde(default)]
    pub clip_path: Option<String>,
}

// ============================================================================
// Immutable snapshot model
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identifiers {
    pub id: Option<String>,
    pub name: Option<String>,
    pub class: Option<String>,
}

/// Effective visibility derived from computed style, rect and viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityState {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f32,
    pub offscreen: bool,
    pub zero_size: bool,
    pub clipped: bool,
}

impl Default for VisibilityState {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
            offscreen: false,
            zero_size: false,
            clipped: false,
        }
    }
}

impl VisibilityState {
    pub const OPACITY_EPSILON: f32 = 0.05;

    pub fn from_style(style: &ComputedStyle, rect: &Rect, viewport: &Viewport) -> Self {
        let display_none = style
            .display
            .as_deref()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case("none"));
        let visibility_hidden = style.visibility.as_deref().is_some_and(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("hidden") || v.eq_ignore_ascii_case("collapse")
        });
        let opacity = style
            .opacity
            .as_deref()
            .and_then(|o| o.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        // Hidden elements report a 0x0 rect; only judge geometry when rendered.
        let rendered = !display_none;
        let zero_size = rendered && (rect.width <= 1.0 || rect.height <= 1.0);
        let offscreen = rendered && is_offscreen(rect, viewport);

        VisibilityState {
            display_none,
            visibility_hidden,
            opacity,
            offscreen,
            zero_size,
            clipped: is_clipped(style),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity <= Self::OPACITY_EPSILON
    }

    /// True when a human could see and interact with the element.
    pub fn is_displayed(&self) -> bool {
        !(self.display_none
            || self.visibility_hidden
            || self.is_transparent()
            || self.offscreen
            || self.zero_size
            || self.clipped)
    }
}

fn is_offscreen(rect: &Rect, viewport: &Viewport) -> bool {
    // Classic "left: -9999px" placement.
    if rect.x <= -500.0 || rect.y <= -500.0 {
        return true;
    }
    // Entirely left of / above the document, or far right of the viewport.
    rect.x + rect.width <= 0.0 || rect.y + rect.height <= 0.0 || rect.x >= viewport.width + 500.0
}

fn is_clipped(style: &ComputedStyle) -> bool {
    let clip = style
        .clip
        .as_deref()
        .map(|c| c.replace(' ', "").to_lowercase())
        .unwrap_or_default();
    if clip.starts_with("rect(0") || clip.starts_with("rect(1px,1px") || clip == "rect(1px1px1px1px)"
    {
        return true;
    }

    let clip_path = style
        .clip_path
        .as_deref()
        .map(|c| c.replace(' ', "").to_lowercase())
        .unwrap_or_default();
    clip_path.starts_with("inset(50%") || clip_path.starts_with("inset(100%") || clip_path == "circle(0)"
}

/// Text gathered around an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    pub labels: Vec<String>,
    pub adjacent_text: Option<String>,
    pub nearby_text: Option<String>,
    pub parent_excerpt: Option<String>,
    pub aria_label: Option<String>,
}

/// One interactive element, read once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    /// Document-order index, unique within one snapshot.
    pub element_ref: usize,
    pub tag: String,
    pub input_type: Option<String>,
    pub identifiers: Identifiers,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub visibility: VisibilityState,
    pub rect: Rect,
    pub context: ElementContext,
    pub parent_form_ref: Option<usize>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.attr("placeholder")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .class
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
    }

    /// Declared input type, lowercased; `text` for bare inputs.
    pub fn effective_type(&self) -> Option<String> {
        match (&self.input_type, self.tag.as_str()) {
            (Some(t), _) => Some(t.to_lowercase()),
            (None, "input") => Some("text".to_string()),
            _ => None,
        }
    }

    pub fn is_checkbox(&self) -> bool {
        self.tag == "input" && self.effective_type().as_deref() == Some("checkbox")
    }

    pub fn is_radio(&self) -> bool {
        self.tag == "input" && self.effective_type().as_deref() == Some("radio")
    }

    pub fn is_button(&self) -> bool {
        match self.tag.as_str() {
            "button" => true,
            "input" => matches!(
                self.effective_type().as_deref(),
                Some("submit") | Some("button") | Some("image")
            ),
            _ => self.attr("role") == Some("button"),
        }
    }

    /// Inputs a value can be typed or selected into.
    pub fn is_text_entry(&self) -> bool {
        match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !self.is_checkbox() && !self.is_radio() && !self.is_button(),
            _ => false,
        }
    }

    /// Lowercased identifier and label text used by the purpose rules.
    pub fn descriptor_text(&self) -> String {
        let parts = [
            self.identifiers.name.as_deref(),
            self.identifiers.id.as_deref(),
            self.placeholder(),
            self.context.aria_label.as_deref(),
            self.attr("title"),
            self.attr("autocomplete"),
        ];

        let mut text = parts
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        for label in &self.context.labels {
            text.push(' ');
            text.push_str(label);
        }
        if self.is_button() || self.is_checkbox() {
            if let Some(t) = &self.text {
                text.push(' ');
                text.push_str(t);
            }
            if let Some(v) = self.attr("value") {
                text.push(' ');
                text.push_str(v);
            }
        }
        text.to_lowercase()
    }

    /// Lowercased surrounding prose (labels, adjacent and nearby text).
    pub fn context_text(&self) -> String {
        let mut text = self.context.labels.join(" ");
        for extra in [&self.context.adjacent_text, &self.context.nearby_text]
            .into_iter()
            .flatten()
        {
            text.push(' ');
            text.push_str(extra);
        }
        text.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub form_ref: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub html: String,
    pub elements: Vec<ElementSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageIndicators {
    pub form_count: usize,
    pub interactive_count: usize,
    pub password_fields: usize,
    pub captcha_present: bool,
    /// Notes about anything skipped while reading the page.
    pub insights: Vec<String>,
}

/// Immutable structural read of a page's interactive elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    #[serde(skip)]
    pub html: String,
    pub forms: Vec<FormSnapshot>,
    pub loose_elements: Vec<ElementSnapshot>,
    pub indicators: PageIndicators,
}

impl PageSnapshot {
    /// All elements in document order.
    pub fn elements(&self) -> Vec<&ElementSnapshot> {
        let mut all: Vec<&ElementSnapshot> = self
            .forms
            .iter()
            .flat_map(|f| f.elements.iter())
            .chain(self.loose_elements.iter())
            .collect();
        all.sort_by_key(|e| e.element_ref);
        all
    }

    pub fn element(&self, element_ref: usize) -> Option<&ElementSnapshot> {
        self.forms
            .iter()
            .flat_map(|f| f.elements.iter())
            .chain(self.loose_elements.iter())
            .find(|e| e.element_ref == element_ref)
    }

    pub fn form(&self, form_ref: usize) -> Option<&FormSnapshot> {
        self.forms.iter().find(|f| f.form_ref == form_ref)
    }

    /// SHA-1 over the structural identity of every element.
    pub fn fingerprint(&self) -> String {
        use sha1::{Digest, Sha1};

        let mut hasher = Sha1::new();
        hasher.update(self.url.as_bytes());
        for el in self.elements() {
            hasher.update(el.tag.as_bytes());
            hasher.update(el.input_type.as_deref().unwrap_or("").as_bytes());
            hasher.update(el.identifiers.id.as_deref().unwrap_or("").as_bytes());
            hasher.update(el.identifiers.name.as_deref().unwrap_or("").as_bytes());
            hasher.update([el.visibility.is_displayed() as u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}
