mod common;

use std::collections::BTreeMap;

use form_sentinel::analysis::suspicion::{
    DangerLevel, ReasonCode, SuspicionScorer, selector_has_honeypot_token,
};
use form_sentinel::page::page_model::RawElement;

use crate::common::builders::{
    checkbox, display_none, input, offscreen, snapshot, visibility_hidden, with_attr, with_class,
    with_label, with_placeholder,
};

fn verdict_of(elements: &[RawElement], index: usize) -> form_sentinel::analysis::suspicion::SuspicionVerdict {
    let snap = snapshot(elements);
    SuspicionScorer::default().score_snapshot(&snap)[index].clone()
}

// =========================================================================
// Style category
// =========================================================================

#[test]
fn hidden_elements_always_score_at_least_point_seven() {
    let shapes = vec![
        input("email", "text"),
        input("company", "text"),
        with_class(input("phone", "tel"), "form-control"),
        with_attr(input("zip", "text"), "tabindex", "0"),
        checkbox("terms", "I agree"),
        RawElement {
            tag: "textarea".into(),
            name: Some("message".into()),
            form_index: Some(0),
            rect: crate::common::builders::on_screen(),
            ..Default::default()
        },
    ];

    let scorer = SuspicionScorer::default();
    for shape in shapes {
        for hidden in [display_none(shape.clone()), visibility_hidden(shape.clone())] {
            let snap = snapshot(&[hidden]);
            let verdicts = scorer.score_snapshot(&snap);
            assert!(
                verdicts[0].score >= 0.7,
                "{:?} scored {}",
                shape.name,
                verdicts[0].score
            );
        }
    }
}

#[test]
fn display_none_email_is_high_danger_honeypot() {
    let verdict = verdict_of(&[display_none(input("email", "text"))], 0);
    assert_eq!(verdict.score, 0.9);
    assert_eq!(verdict.reasons, vec![ReasonCode::DisplayNone]);
    assert!(SuspicionScorer::default().is_honeypot(&verdict));
    assert_eq!(DangerLevel::from_score(verdict.score), DangerLevel::High);
}

#[test]
fn style_rules_take_the_strongest_match_only() {
    let transparent_offscreen = {
        let mut el = offscreen(input("website", "text"));
        el.style.opacity = Some("0".into());
        el
    };
    let verdict = verdict_of(&[transparent_offscreen], 0);
    assert!(verdict.reasons.contains(&ReasonCode::Offscreen));
    assert!(verdict.reasons.contains(&ReasonCode::Transparent));
    assert_eq!(verdict.score, 0.8);
}

#[test]
fn clipped_sr_only_pattern_is_flagged() {
    let mut el = input("url", "text");
    el.style.clip = Some("rect(0, 0, 0, 0)".into());
    let verdict = verdict_of(&[el], 0);
    assert!(verdict.reasons.contains(&ReasonCode::Clipped));
    assert!(verdict.score >= 0.7);
}

// =========================================================================
// Category addition and capping
// =========================================================================

#[test]
fn categories_add_and_cap_at_one() {
    let el = with_attr(
        with_class(input("contact", "text"), "honeypot"),
        "aria-hidden",
        "true",
    );
    let verdict = verdict_of(&[el], 0);
    assert!(verdict.reasons.contains(&ReasonCode::HoneypotIdentifier));
    assert!(verdict.reasons.contains(&ReasonCode::AriaHidden));
    assert_eq!(verdict.score, 1.0);
}

#[test]
fn weak_identifier_alone_stays_below_threshold() {
    let verdict = verdict_of(&[with_class(input("nickname", "text"), "hidden-sm")], 0);
    assert_eq!(verdict.reasons, vec![ReasonCode::SuspiciousIdentifier]);
    assert_eq!(verdict.score, 0.5);
    assert!(!SuspicionScorer::default().is_honeypot(&verdict));
}

#[test]
fn leave_blank_label_is_an_instruction_signal() {
    let el = with_label(input("comment", "text"), "Leave this field blank");
    let verdict = verdict_of(&[el], 0);
    assert_eq!(verdict.reasons, vec![ReasonCode::LeaveBlankInstruction]);
    assert_eq!(verdict.score, 0.5);
}

#[test]
fn autocomplete_off_only_counts_on_email_fields() {
    let email = with_attr(input("email", "email"), "autocomplete", "off");
    let city = with_attr(input("city", "text"), "autocomplete", "off");
    let snap = snapshot(&[email, city]);
    let verdicts = SuspicionScorer::default().score_snapshot(&snap);
    assert_eq!(verdicts[0].reasons, vec![ReasonCode::AutocompleteOffEmail]);
    assert_eq!(verdicts[0].score, 0.3);
    assert!(verdicts[1].reasons.is_empty());
}

// =========================================================================
// Duplicate-field heuristic
// =========================================================================

#[test]
fn duplicate_name_flags_the_more_suspicious_member() {
    let trap = with_attr(
        with_class(input("email", "text"), "hidden"),
        "tabindex",
        "-1",
    );
    let real = with_placeholder(input("email", "text"), "Your email");
    let snap = snapshot(&[trap, real]);
    let verdicts = SuspicionScorer::default().score_snapshot(&snap);

    assert!(verdicts[0].reasons.contains(&ReasonCode::DuplicateField));
    assert_eq!(verdicts[0].score, 1.0);
    assert!(verdicts[1].reasons.is_empty());
    assert_eq!(verdicts[1].score, 0.0);
}

#[test]
fn duplicate_tie_keeps_the_earliest_as_primary() {
    let snap = snapshot(&[input("email", "email"), input("email", "email")]);
    let scorer = SuspicionScorer::default();
    let verdicts = scorer.score_snapshot(&snap);

    assert!(!verdicts[0].reasons.contains(&ReasonCode::DuplicateField));
    assert!(verdicts[1].reasons.contains(&ReasonCode::DuplicateField));
    // 0.6 alone is not strictly above the threshold.
    assert!(!scorer.is_honeypot(&verdicts[1]));
}

#[test]
fn radio_groups_are_not_duplicates() {
    let snap = snapshot(&[input("gender", "radio"), input("gender", "radio")]);
    let verdicts = SuspicionScorer::default().score_snapshot(&snap);
    assert!(verdicts.iter().all(|v| v.reasons.is_empty()));
}

// =========================================================================
// Determinism and configuration
// =========================================================================

#[test]
fn scoring_is_deterministic() {
    let elements = crate::common::builders::registration_elements();
    let snap = snapshot(&elements);
    let scorer = SuspicionScorer::default();
    let first = scorer.score_snapshot(&snap);
    for _ in 0..5 {
        assert_eq!(scorer.score_snapshot(&snap), first);
    }
}

#[test]
fn weights_and_threshold_are_configurable() {
    let el = with_attr(input("city", "text"), "tabindex", "-1");
    let snap = snapshot(&[el]);

    let default = SuspicionScorer::default();
    let verdict = &default.score_snapshot(&snap)[0];
    assert_eq!(verdict.score, 0.3);
    assert!(!default.is_honeypot(verdict));

    let overrides: BTreeMap<ReasonCode, f32> = [(ReasonCode::NegativeTabindex, 0.7)].into_iter().collect();
    let heavy = SuspicionScorer::default().with_weights(&overrides);
    let verdict = &heavy.score_snapshot(&snap)[0];
    assert_eq!(verdict.score, 0.7);
    assert!(heavy.is_honeypot(verdict));

    let strict = SuspicionScorer::new(0.9);
    let hidden = snapshot(&[display_none(input("email", "text"))]);
    assert!(!strict.is_honeypot(&strict.score_snapshot(&hidden)[0]));
}

#[test]
fn danger_level_boundaries() {
    assert_eq!(DangerLevel::from_score(1.0), DangerLevel::High);
    assert_eq!(DangerLevel::from_score(0.85), DangerLevel::High);
    assert_eq!(DangerLevel::from_score(0.84), DangerLevel::Medium);
    assert_eq!(DangerLevel::from_score(0.7), DangerLevel::Medium);
    assert_eq!(DangerLevel::from_score(0.69), DangerLevel::Low);
}

#[test]
fn selector_trap_tokens() {
    assert!(selector_has_honeypot_token(r#"input[name="hp_email"]"#));
    assert!(selector_has_honeypot_token("#honeypot"));
    assert!(selector_has_honeypot_token(r#"input[name="leave_blank"]"#));
    assert!(!selector_has_honeypot_token(r#"input[name="email"]"#));
    assert!(!selector_has_honeypot_token(r#"input[placeholder*="email" i]"#));
    assert!(!selector_has_honeypot_token(r#"button:has-text("Submit")"#));
}
