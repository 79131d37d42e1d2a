use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::purpose::{FieldPurpose, GuessSource, PurposeGuess};
use crate::page::page_model::ElementSnapshot;

pub const TEXT_RULE_CONFIDENCE: f32 = 0.9;
pub const CONTEXT_RULE_CONFIDENCE: f32 = 0.6;
pub const INPUT_TYPE_CONFIDENCE: f32 = 0.7;
pub const OTHER_CONFIDENCE: f32 = 0.2;

/// Words that mark a button as the form's primary action.
pub static ACTION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(submit|sign ?up|register|create|continue|next|join|send|subscribe|get started|start|finish|complete|save|apply|enroll|weiter|absenden|registrieren)\b",
    )
    .expect("valid regex")
});

struct PurposeRule {
    purpose: FieldPurpose,
    pattern: Regex,
}

fn purpose_rule(purpose: FieldPurpose, pattern: &str) -> PurposeRule {
    PurposeRule {
        purpose,
        pattern: Regex::new(pattern).expect("valid regex"),
    }
}

// Confirmation rules precede their base rules; first match wins.
static TEXT_RULES: Lazy<Vec<PurposeRule>> = Lazy::new(|| {
    vec![
        purpose_rule(
            FieldPurpose::ConfirmEmail,
            r"(confirm|repeat|retype|re-?enter|verify|again).{0,20}e-?mail|e-?mail.{0,20}(confirm|repeat|again|verif)|e-?mail_?2\b",
        ),
        purpose_rule(FieldPurpose::Email, r"e-?mail|\bmail\b"),
        purpose_rule(
            FieldPurpose::ConfirmPassword,
            r"(confirm|repeat|retype|re-?enter|verify|again).{0,20}(pass|pwd)|(passw\w*|pwd).{0,20}(confirm|repeat|again|verif)|passw\w*_?2\b|pwd_?2\b",
        ),
        purpose_rule(FieldPurpose::Password, r"passw|\bpwd\b|\bpass\b|kennwort|passwort"),
        purpose_rule(
            FieldPurpose::FirstName,
            r"first.?name|given.?name|\bfname\b|forename|vorname|pr[eé]nom|\bfirst\b",
        ),
        purpose_rule(
            FieldPurpose::LastName,
            r"last.?name|sur.?name|family.?name|\blname\b|nachname|\blast\b",
        ),
        purpose_rule(FieldPurpose::FullName, r"full.?name|your name|\bname\b"),
        purpose_rule(FieldPurpose::Phone, r"phone|\btel\b|mobile|\bcell\b|telefon|handy"),
        purpose_rule(
            FieldPurpose::Company,
            r"company|organi[sz]ation|business|employer|firma|unternehmen",
        ),
        purpose_rule(
            FieldPurpose::Address,
            r"address|street|\baddr\b|\bcity\b|\bzip\b|postal|postcode|adresse|stra(ss|ß)e",
        ),
        purpose_rule(FieldPurpose::Age, r"\bage\b|birth|\bdob\b|geburt|\balter\b"),
        purpose_rule(FieldPurpose::Gender, r"gender|\bsex\b|geschlecht|salutation|anrede"),
    ]
});

static CHECKBOX_RULES: Lazy<Vec<PurposeRule>> = Lazy::new(|| {
    vec![
        purpose_rule(
            FieldPurpose::Terms,
            r"terms|conditions|\btos\b|\bagb\b|i agree|accept",
        ),
        purpose_rule(
            FieldPurpose::Privacy,
            r"privacy|gdpr|data protection|datenschutz",
        ),
        purpose_rule(FieldPurpose::Newsletter, r"newsletter|subscribe|updates"),
        purpose_rule(
            FieldPurpose::Marketing,
            r"marketing|offers|promotion|partners|third.?part",
        ),
    ]
});

/// Deterministic rule-based purpose classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurposeClassifier;

impl PurposeClassifier {
    pub fn classify(&self, el: &ElementSnapshot) -> PurposeGuess {
        let guess = |purpose, confidence, evidence: String| PurposeGuess {
            element_ref: el.element_ref,
            purpose,
            confidence,
            source: GuessSource::Pattern,
            evidence,
        };

        if el.is_button() {
            let text = format!(
                "{} {}",
                el.text.as_deref().unwrap_or(""),
                el.attr("value").unwrap_or("")
            );
            if let Some(m) = ACTION_WORDS.find(&text) {
                return guess(
                    FieldPurpose::Submit,
                    TEXT_RULE_CONFIDENCE,
                    format!("action word '{}'", m.as_str().to_lowercase()),
                );
            }
            if el.effective_type().as_deref() == Some("submit") {
                return guess(
                    FieldPurpose::Submit,
                    INPUT_TYPE_CONFIDENCE,
                    "type=submit".to_string(),
                );
            }
            return guess(FieldPurpose::Other, OTHER_CONFIDENCE, "button".to_string());
        }

        if el.is_checkbox() {
            let text = format!("{} {}", el.descriptor_text(), el.context_text());
            return match first_match(&CHECKBOX_RULES, &text) {
                Some((purpose, evidence)) => guess(purpose, TEXT_RULE_CONFIDENCE, evidence),
                None => guess(FieldPurpose::Other, OTHER_CONFIDENCE, "checkbox".to_string()),
            };
        }

        if !el.is_text_entry() {
            return guess(FieldPurpose::Other, OTHER_CONFIDENCE, el.tag.clone());
        }

        if let Some((purpose, evidence)) = first_match(&TEXT_RULES, &el.descriptor_text()) {
            return guess(purpose, TEXT_RULE_CONFIDENCE, evidence);
        }

        if let Some((purpose, evidence)) = first_match(&TEXT_RULES, &el.context_text()) {
            return guess(purpose, CONTEXT_RULE_CONFIDENCE, format!("context {}", evidence));
        }

        let by_type = match el.effective_type().as_deref() {
            Some("email") => Some(FieldPurpose::Email),
            Some("password") => Some(FieldPurpose::Password),
            Some("tel") => Some(FieldPurpose::Phone),
            _ => None,
        };
        match by_type {
            Some(purpose) => guess(
                purpose,
                INPUT_TYPE_CONFIDENCE,
                format!("input type '{}'", el.effective_type().unwrap_or_default()),
            ),
            None => guess(
                FieldPurpose::Other,
                OTHER_CONFIDENCE,
                "no rule matched".to_string(),
            ),
        }
    }
}

fn first_match(rules: &[PurposeRule], text: &str) -> Option<(FieldPurpose, String)> {
    if text.trim().is_empty() {
        return None;
    }
    rules.iter().find_map(|rule| {
        rule.pattern
            .find(text)
            .map(|m| (rule.purpose, format!("rule {} matched '{}'", rule.purpose, m.as_str())))
    })
}
