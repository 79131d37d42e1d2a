use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::purpose::FieldPurpose;

/// One candidate selector for a purpose. Lower priority is tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorTemplate {
    pub pattern: String,
    pub purpose: FieldPurpose,
    pub priority: usize,
}

/// Serializable registry contents: ordered patterns per purpose.
pub type RegistryState = BTreeMap<FieldPurpose, Vec<String>>;

/// Built-in candidates, most specific first.
pub fn default_patterns(purpose: FieldPurpose) -> &'static [&'static str] {
    match purpose {
        FieldPurpose::Email => &[
            r#"input[type="email"]"#,
            r#"input[name="email"]"#,
            r#"input[autocomplete="email"]"#,
            r#"input[name*="email" i]"#,
            r#"input[id*="email" i]"#,
            r#"input[placeholder*="email" i]"#,
        ],
        FieldPurpose::ConfirmEmail => &[
            r#"input[name="email_confirmation"]"#,
            r#"input[name="email2"]"#,
            r#"input[name*="confirm" i][name*="email" i]"#,
            r#"input[id*="confirm" i][id*="email" i]"#,
            r#"input[placeholder*="confirm" i][placeholder*="email" i]"#,
        ],
        FieldPurpose::Password => &[
            r#"input[name="password"]"#,
            r#"input[autocomplete="new-password"]"#,
            r#"input[autocomplete="current-password"]"#,
            r#"input[type="password"]"#,
            r#"input[name*="pass" i][type="password"]"#,
        ],
        FieldPurpose::ConfirmPassword => &[
            r#"input[name="password_confirmation"]"#,
            r#"input[name="password2"]"#,
            r#"input[name*="confirm" i][type="password"]"#,
            r#"input[id*="confirm" i][type="password"]"#,
            r#"input[type="password"] >> nth=1"#,
        ],
        FieldPurpose::FirstName => &[
            r#"input[autocomplete="given-name"]"#,
            r#"input[name="firstName"]"#,
            r#"input[name="first_name"]"#,
            r#"input[name*="first" i]"#,
            r#"input[id*="first" i]"#,
            r#"input[placeholder*="first" i]"#,
        ],
        FieldPurpose::LastName => &[
            r#"input[autocomplete="family-name"]"#,
            r#"input[name="lastName"]"#,
            r#"input[name="last_name"]"#,
            r#"input[name*="last" i]"#,
            r#"input[name*="surname" i]"#,
            r#"input[placeholder*="last" i]"#,
        ],
        FieldPurpose::FullName => &[
            r#"input[autocomplete="name"]"#,
            r#"input[name="name"]"#,
            r#"input[name*="fullname" i]"#,
            r#"input[name*="full_name" i]"#,
            r#"input[placeholder*="full name" i]"#,
        ],
        FieldPurpose::Phone => &[
            r#"input[type="tel"]"#,
            r#"input[autocomplete="tel"]"#,
            r#"input[name*="phone" i]"#,
            r#"input[name*="mobile" i]"#,
        ],
        FieldPurpose::Company => &[
            r#"input[autocomplete="organization"]"#,
            r#"input[name*="company" i]"#,
            r#"input[name*="organization" i]"#,
        ],
        FieldPurpose::Address => &[
            r#"input[autocomplete="street-address"]"#,
            r#"input[autocomplete="address-line1"]"#,
            r#"input[name*="address" i]"#,
            r#"textarea[name*="address" i]"#,
            r#"input[name*="street" i]"#,
        ],
        FieldPurpose::Age => &[
            r#"input[name="age"]"#,
            r#"select[name*="age" i]"#,
            r#"input[name*="birth" i]"#,
        ],
        FieldPurpose::Gender => &[
            r#"select[name*="gender" i]"#,
            r#"input[name*="gender" i]"#,
            r#"select[name*="sex" i]"#,
        ],
        FieldPurpose::Terms => &[
            r#"input[type="checkbox"][name*="terms" i]"#,
            r#"input[type="checkbox"][id*="terms" i]"#,
            r#"input[type="checkbox"][name*="agree" i]"#,
            r#"input[type="checkbox"][name*="tos" i]"#,
        ],
        FieldPurpose::Privacy => &[
            r#"input[type="checkbox"][name*="privacy" i]"#,
            r#"input[type="checkbox"][id*="privacy" i]"#,
            r#"input[type="checkbox"][name*="gdpr" i]"#,
        ],
        FieldPurpose::Newsletter => &[
            r#"input[type="checkbox"][name*="newsletter" i]"#,
            r#"input[type="checkbox"][id*="newsletter" i]"#,
            r#"input[type="checkbox"][name*="subscribe" i]"#,
        ],
        FieldPurpose::Marketing => &[
            r#"input[type="checkbox"][name*="marketing" i]"#,
            r#"input[type="checkbox"][id*="marketing" i]"#,
            r#"input[type="checkbox"][name*="offers" i]"#,
        ],
        FieldPurpose::Submit => &[
            r#"button[type="submit"]"#,
            r#"input[type="submit"]"#,
            r#"form button"#,
        ],
        FieldPurpose::Other => &[],
    }
}

/// Process-wide, per-purpose ordered candidate lists.
///
/// Each purpose has its own mutex, so promotions for different purposes never
/// contend and updates to one purpose are never lost.
#[derive(Debug)]
pub struct AdaptiveSelectorRegistry {
    slots: BTreeMap<FieldPurpose, Mutex<Vec<SelectorTemplate>>>,
}

impl Default for AdaptiveSelectorRegistry {
    fn default() -> Self {
        let state = FieldPurpose::ALL
            .iter()
            .map(|p| {
                let patterns = default_patterns(*p).iter().map(|s| s.to_string()).collect();
                (*p, patterns)
            })
            .collect();
        Self::from_state(&state)
    }
}

impl AdaptiveSelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no templates at all.
    pub fn empty() -> Self {
        Self::from_state(&RegistryState::new())
    }

    pub fn from_state(state: &RegistryState) -> Self {
        let slots = FieldPurpose::ALL
            .iter()
            .map(|p| {
                let patterns = state.get(p).map(|v| v.as_slice()).unwrap_or(&[]);
                (*p, Mutex::new(build_templates(*p, patterns)))
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, purpose: FieldPurpose) -> MutexGuard<'_, Vec<SelectorTemplate>> {
        // Every purpose gets a slot at construction.
        let mutex = &self.slots[&purpose];
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn templates(&self, purpose: FieldPurpose) -> Vec<SelectorTemplate> {
        self.slot(purpose).clone()
    }

    pub fn patterns(&self, purpose: FieldPurpose) -> Vec<String> {
        self.slot(purpose).iter().map(|t| t.pattern.clone()).collect()
    }

    pub fn position(&self, purpose: FieldPurpose, pattern: &str) -> Option<usize> {
        self.slot(purpose).iter().position(|t| t.pattern == pattern)
    }

    /// Move `pattern` one slot toward the front. Returns whether it moved.
    pub fn promote(&self, purpose: FieldPurpose, pattern: &str) -> bool {
        let mut templates = self.slot(purpose);
        match templates.iter().position(|t| t.pattern == pattern) {
            Some(index) if index > 0 => {
                templates.swap(index - 1, index);
                renumber(&mut templates);
                debug!(%purpose, pattern, from = index, to = index - 1, "template promoted");
                true
            }
            _ => false,
        }
    }

    /// Put `pattern` first, moving it if it is already known.
    pub fn insert_front(&self, purpose: FieldPurpose, pattern: &str) {
        let mut templates = self.slot(purpose);
        templates.retain(|t| t.pattern != pattern);
        templates.insert(
            0,
            SelectorTemplate {
                pattern: pattern.to_string(),
                purpose,
                priority: 0,
            },
        );
        renumber(&mut templates);
        debug!(%purpose, pattern, "template inserted at front");
    }

    /// Replace the candidate list of one purpose.
    pub fn set_patterns(&self, purpose: FieldPurpose, patterns: &[String]) {
        *self.slot(purpose) = build_templates(purpose, patterns);
    }

    pub fn snapshot(&self) -> RegistryState {
        FieldPurpose::ALL
            .iter()
            .map(|p| (*p, self.patterns(*p)))
            .filter(|(_, patterns)| !patterns.is_empty())
            .collect()
    }

    /// Load externally saved state; purposes absent from `state` keep their lists.
    pub fn restore(&self, state: &RegistryState) {
        for (purpose, patterns) in state {
            self.set_patterns(*purpose, patterns);
        }
    }

    /// Back to the built-in defaults.
    pub fn reset(&self) {
        for purpose in FieldPurpose::ALL {
            let defaults: Vec<String> = default_patterns(purpose)
                .iter()
                .map(|s| s.to_string())
                .collect();
            self.set_patterns(purpose, &defaults);
        }
    }
}

fn build_templates(purpose: FieldPurpose, patterns: &[String]) -> Vec<SelectorTemplate> {
    let mut templates: Vec<SelectorTemplate> = Vec::new();
    for pattern in patterns {
        if templates.iter().any(|t| &t.pattern == pattern) {
            continue;
        }
        templates.push(SelectorTemplate {
            pattern: pattern.clone(),
            purpose,
            priority: templates.len(),
        });
    }
    templates
}

fn renumber(templates: &mut [SelectorTemplate]) {
    for (i, t) in templates.iter_mut().enumerate() {
        t.priority = i;
    }
}
