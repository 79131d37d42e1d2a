//! Selector derivation and offline matching against a `PageSnapshot`.
//!
//! The matcher understands the selector subset produced by this crate and
//! commonly returned by classifiers: compound selectors (`tag#id.class[attr op "v" i]`),
//! descendant/child chains (only a `form` ancestor is checked), comma lists,
//! `:has-text("..")`, `:visible` and the Playwright `>> nth=K` suffix.
//! Anything else is treated as unmatchable.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::page_model::{ElementSnapshot, FormSnapshot, PageSnapshot};

static CSS_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"));

// Framework-generated ids change between page loads.
static VOLATILE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{4,}|[-_:][0-9a-f]{6,}$|^:r[0-9a-z]*:?$|^(ember|react-select-|mui-|radix-)\d*)")
        .expect("valid regex")
});

// ============================================================================
// Parsed representation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
    DashPrefix,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrTest {
    name: String,
    op: AttrOp,
    value: String,
    ignore_case: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    has_text: Option<String>,
    visible_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    /// Last compound is the subject; earlier ones are ancestors.
    compounds: Vec<Compound>,
    nth: Option<i64>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorPattern {
    alternatives: Vec<Complex>,
}

impl SelectorPattern {
    pub fn parse(input: &str) -> Option<SelectorPattern> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let alternatives = split_top_level(input, |c| c == ',')
            .into_iter()
            .map(|part| parse_complex(part.trim()))
            .collect::<Option<Vec<_>>>()?;
        Some(SelectorPattern { alternatives })
    }

    /// Elements matched by this selector, in document order.
    pub fn select<'a>(&self, snapshot: &'a PageSnapshot) -> Vec<&'a ElementSnapshot> {
        let elements = snapshot.elements();
        let mut matched: Vec<&ElementSnapshot> = Vec::new();

        for complex in &self.alternatives {
            let hits: Vec<&ElementSnapshot> = elements
                .iter()
                .copied()
                .filter(|el| complex.matches(el, snapshot))
                .collect();

            let hits = match complex.nth {
                Some(n) => pick_nth(&hits, n).into_iter().collect(),
                None => hits,
            };

            for hit in hits {
                if !matched.iter().any(|m| m.element_ref == hit.element_ref) {
                    matched.push(hit);
                }
            }
        }

        matched.sort_by_key(|e| e.element_ref);
        matched
    }
}

impl Complex {
    fn matches(&self, el: &ElementSnapshot, snapshot: &PageSnapshot) -> bool {
        let Some((subject, ancestors)) = self.compounds.split_last() else {
            return false;
        };
        if !subject.matches(el) {
            return false;
        }

        for ancestor in ancestors {
            if ancestor.tag.as_deref() != Some("form") {
                continue;
            }
            let form = el.parent_form_ref.and_then(|r| snapshot.form(r));
            match form {
                Some(form) if ancestor.matches_form(form) => {}
                _ => return false,
            }
        }
        true
    }
}

impl Compound {
    fn matches(&self, el: &ElementSnapshot) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !tag.eq_ignore_ascii_case(&el.tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.identifiers.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self
            .classes
            .iter()
            .all(|c| el.classes().any(|ec| ec == c.as_str()))
        {
            return false;
        }
        if !self
            .attrs
            .iter()
            .all(|test| test.matches(element_attr(el, &test.name).as_deref()))
        {
            return false;
        }
        if let Some(needle) = &self.has_text {
            let haystack = el
                .text
                .as_deref()
                .or_else(|| el.attr("value"))
                .unwrap_or("")
                .to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if self.visible_only && !el.visibility.is_displayed() {
            return false;
        }
        true
    }

    fn matches_form(&self, form: &FormSnapshot) -> bool {
        if let Some(id) = &self.id {
            if form.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.attrs.iter().all(|test| {
            let value = match test.name.as_str() {
                "id" => form.id.clone(),
                "name" => form.name.clone(),
                "action" => form.action.clone(),
                "method" => form.method.clone(),
                _ => None,
            };
            test.matches(value.as_deref())
        })
    }
}

impl AttrTest {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let (actual, expected) = if self.ignore_case {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
            AttrOp::DashPrefix => actual == expected || actual.starts_with(&format!("{}-", expected)),
        }
    }
}

fn element_attr(el: &ElementSnapshot, name: &str) -> Option<String> {
    match name {
        "id" => el.identifiers.id.clone(),
        "name" => el.identifiers.name.clone(),
        "class" => el.identifiers.class.clone(),
        "type" => el.input_type.clone(),
        "aria-label" => el
            .context
            .aria_label
            .clone()
            .or_else(|| el.attr("aria-label").map(str::to_string)),
        _ => el.attr(name).map(str::to_string),
    }
}

fn pick_nth<'a>(hits: &[&'a ElementSnapshot], n: i64) -> Option<&'a ElementSnapshot> {
    let index = if n < 0 {
        hits.len().checked_sub(n.unsigned_abs() as usize)?
    } else {
        n as usize
    };
    hits.get(index).copied()
}

// ============================================================================
// Parsing
// ============================================================================

/// Split on `is_sep` outside quotes, brackets and parentheses.
fn split_top_level(input: &str, is_sep: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '"' | '\'' if quote.is_none() => {
                quote = Some(c);
                current.push(c);
            }
            q if Some(q) == quote => {
                quote = None;
                current.push(c);
            }
            '[' | '(' if quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if quote.is_none() => {
                depth -= 1;
                current.push(c);
            }
            c if quote.is_none() && depth == 0 && is_sep(c) => {
                if !current.trim().is_empty() {
                    parts.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_complex(input: &str) -> Option<Complex> {
    let (head, nth) = match input.rsplit_once(">>") {
        Some((head, tail)) => {
            let n = tail.trim().strip_prefix("nth=")?.trim().parse::<i64>().ok()?;
            (head.trim(), Some(n))
        }
        None => (input, None),
    };

    let compounds = split_top_level(head, |c| c.is_whitespace() || c == '>' || c == '+' || c == '~')
        .into_iter()
        .map(|part| parse_compound(part.trim()))
        .collect::<Option<Vec<_>>>()?;

    if compounds.is_empty() {
        return None;
    }
    Some(Complex { compounds, nth })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let mut out = String::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '\\' && *pos + 1 < chars.len() {
            out.push(chars[*pos + 1]);
            *pos += 2;
        } else if is_ident_char(c) {
            out.push(c);
            *pos += 1;
        } else {
            break;
        }
    }
    out
}

/// Read up to the matching `close`, honouring quotes. `pos` starts after the opener.
fn read_enclosed(chars: &[char], pos: &mut usize, close: char) -> Option<String> {
    let mut out = String::new();
    let mut quote: Option<char> = None;
    while *pos < chars.len() {
        let c = chars[*pos];
        *pos += 1;
        match c {
            '\\' if *pos < chars.len() => {
                out.push(c);
                out.push(chars[*pos]);
                *pos += 1;
            }
            '"' | '\'' if quote.is_none() => {
                quote = Some(c);
                out.push(c);
            }
            q if Some(q) == quote => {
                quote = None;
                out.push(c);
            }
            c if c == close && quote.is_none() => return Some(out),
            _ => out.push(c),
        }
    }
    None
}

fn parse_compound(input: &str) -> Option<Compound> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if pos < chars.len() && (chars[pos] == '*' || chars[pos].is_alphabetic()) {
        if chars[pos] == '*' {
            pos += 1;
            compound.tag = Some("*".into());
        } else {
            compound.tag = Some(read_ident(&chars, &mut pos).to_lowercase());
        }
    }

    while pos < chars.len() {
        let c = chars[pos];
        pos += 1;
        match c {
            '#' => {
                let id = read_ident(&chars, &mut pos);
                if id.is_empty() {
                    return None;
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = read_ident(&chars, &mut pos);
                if class.is_empty() {
                    return None;
                }
                compound.classes.push(class);
            }
            '[' => {
                let inner = read_enclosed(&chars, &mut pos, ']')?;
                compound.attrs.push(parse_attr(&inner)?);
            }
            ':' => {
                let name = read_ident(&chars, &mut pos).to_lowercase();
                let arg = if pos < chars.len() && chars[pos] == '(' {
                    pos += 1;
                    Some(read_enclosed(&chars, &mut pos, ')')?)
                } else {
                    None
                };
                match (name.as_str(), arg) {
                    ("has-text" | "text" | "text-is", Some(arg)) => {
                        compound.has_text = Some(unquote(arg.trim()));
                    }
                    ("visible", None) => compound.visible_only = true,
                    _ => return None,
                }
            }
            _ => return None,
        }
    }

    if compound == Compound::default() {
        return None;
    }
    Some(compound)
}

fn parse_attr(inner: &str) -> Option<AttrTest> {
    let inner = inner.trim();
    let split = inner.find('=').map(|eq| match inner[..eq].chars().last() {
        Some('*') => (eq - 1, 2, AttrOp::Contains),
        Some('^') => (eq - 1, 2, AttrOp::Prefix),
        Some('$') => (eq - 1, 2, AttrOp::Suffix),
        Some('~') => (eq - 1, 2, AttrOp::Word),
        Some('|') => (eq - 1, 2, AttrOp::DashPrefix),
        _ => (eq, 1, AttrOp::Equals),
    });

    let Some((at, len, op)) = split else {
        let name = inner.to_lowercase();
        if name.is_empty() || !name.chars().all(is_ident_char) {
            return None;
        }
        return Some(AttrTest {
            name,
            op: AttrOp::Exists,
            value: String::new(),
            ignore_case: false,
        });
    };

    let name = inner[..at].trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    let rest = inner[at + len..].trim();

    let (value, flags) = if let Some(q) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body: Vec<char> = rest.chars().skip(1).collect();
        let mut value = String::new();
        let mut i = 0;
        let mut closed = None;
        while i < body.len() {
            match body[i] {
                '\\' if i + 1 < body.len() => {
                    value.push(body[i + 1]);
                    i += 2;
                }
                c if c == q => {
                    closed = Some(i);
                    break;
                }
                c => {
                    value.push(c);
                    i += 1;
                }
            }
        }
        let end = closed?;
        let flags: String = body[end + 1..].iter().collect();
        (value, flags)
    } else {
        let mut tokens = rest.split_whitespace();
        let value = tokens.next().unwrap_or("").to_string();
        (value, tokens.collect::<Vec<_>>().join(" "))
    };

    let ignore_case = match flags.trim() {
        "" | "s" | "S" => false,
        "i" | "I" => true,
        _ => return None,
    };

    Some(AttrTest {
        name,
        op,
        value,
        ignore_case,
    })
}

fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    let stripped = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        .unwrap_or(trimmed);
    stripped.replace("\\\"", "\"").replace("\\'", "'")
}

// ============================================================================
// Public helpers
// ============================================================================

/// Elements matched by `selector`; unparseable selectors match nothing.
pub fn select<'a>(selector: &str, snapshot: &'a PageSnapshot) -> Vec<&'a ElementSnapshot> {
    SelectorPattern::parse(selector)
        .map(|p| p.select(snapshot))
        .unwrap_or_default()
}

pub fn resolves_in(selector: &str, snapshot: &PageSnapshot) -> bool {
    !select(selector, snapshot).is_empty()
}

/// Quote a value for use inside `[attr="..."]` or `:has-text("...")`.
pub fn quote_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn is_stable_id(id: &str) -> bool {
    !id.is_empty() && !VOLATILE_ID.is_match(id)
}

/// Candidate selectors for `el`, most reflow-resistant first.
///
/// Every candidate returned selects exactly `el` in `snapshot`; the final
/// positional candidate is always present.
pub fn derive_candidates(el: &ElementSnapshot, snapshot: &PageSnapshot) -> Vec<String> {
    let tag = el.tag.to_lowercase();
    let mut raw: Vec<String> = Vec::new();

    if let Some(id) = el.identifiers.id.as_deref().filter(|id| is_stable_id(id)) {
        if CSS_IDENT.is_match(id) {
            raw.push(format!("#{}", id));
        } else {
            raw.push(format!("[id={}]", quote_value(id)));
        }
    }
    if let Some(name) = el.identifiers.name.as_deref().filter(|n| !n.is_empty()) {
        raw.push(format!("{}[name={}]", tag, quote_value(name)));
        if let Some(t) = &el.input_type {
            raw.push(format!(
                "{}[name={}][type={}]",
                tag,
                quote_value(name),
                quote_value(t)
            ));
        }
    }
    if let Some(placeholder) = el.placeholder().filter(|p| !p.is_empty()) {
        raw.push(format!("{}[placeholder={}]", tag, quote_value(placeholder)));
    }
    if let Some(aria) = el.context.aria_label.as_deref().filter(|a| !a.is_empty()) {
        raw.push(format!("{}[aria-label={}]", tag, quote_value(aria)));
    }
    if el.is_button() {
        if let Some(text) = el.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            raw.push(format!("{}:has-text({})", tag, quote_value(text)));
        }
    }
    if let Some(t) = &el.input_type {
        raw.push(format!("{}[type={}]", tag, quote_value(t)));
    }

    let mut candidates: Vec<String> = Vec::new();
    for candidate in raw {
        if candidates.contains(&candidate) {
            continue;
        }
        let hits = select(&candidate, snapshot);
        if hits.len() == 1 && hits[0].element_ref == el.element_ref {
            candidates.push(candidate);
        }
    }

    candidates.push(positional_selector(el, snapshot));
    candidates
}

/// `tag[type] >> nth=K`, where K is the index among same-kind elements.
pub fn positional_selector(el: &ElementSnapshot, snapshot: &PageSnapshot) -> String {
    let tag = el.tag.to_lowercase();
    let base = match &el.input_type {
        Some(t) => format!("{}[type={}]", tag, quote_value(t)),
        None => tag,
    };
    let index = select(&base, snapshot)
        .iter()
        .position(|e| e.element_ref == el.element_ref)
        .unwrap_or(0);
    format!("{} >> nth={}", base, index)
}
