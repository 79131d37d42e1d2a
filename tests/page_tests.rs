mod common;

use form_sentinel::error::EngineError;
use form_sentinel::page::extractor::PageSnapshotExtractor;
use form_sentinel::page::page_model::{NearbyText, RawElement};
use form_sentinel::page::selector::{
    SelectorPattern, derive_candidates, is_stable_id, positional_selector, resolves_in, select,
};

use crate::common::builders::{
    PAGE_URL, button, display_none, input, raw_page, registration_elements, snapshot, with_id,
    with_placeholder,
};
use crate::common::fake_driver::FakeDriver;

// =========================================================================
// Extraction
// =========================================================================

#[test]
fn hidden_inputs_and_unreadable_elements_are_skipped() {
    let mut page = raw_page(&[input("email", "email"), input("csrf_token", "hidden")]);
    page.elements.push(serde_json::json!({"tag": "input", "error": "property access threw"}));
    page.elements.push(serde_json::json!({"tag": 42}));

    let snap = PageSnapshotExtractor::default().from_raw(page);

    assert_eq!(snap.elements().len(), 1);
    assert_eq!(snap.elements()[0].identifiers.name.as_deref(), Some("email"));
    assert_eq!(snap.indicators.insights.len(), 2);
}

#[test]
fn unknown_form_reference_becomes_loose_element() {
    let mut stray = input("phone", "tel");
    stray.form_index = Some(7);
    let snap = snapshot(&[input("email", "email"), stray]);

    assert_eq!(snap.forms[0].elements.len(), 1);
    assert_eq!(snap.loose_elements.len(), 1);
    assert_eq!(snap.loose_elements[0].parent_form_ref, None);
    assert!(snap.indicators.insights[0].contains("unknown form"));
}

#[test]
fn context_bundle_respects_limits() {
    let el = RawElement {
        adjacent_text: Some("x".repeat(120)),
        parent_text: Some("word ".repeat(100)),
        nearby: vec![
            NearbyText {
                text: "Far away".into(),
                distance: 350.0,
            },
            NearbyText {
                text: "Your e-mail".into(),
                distance: 40.0,
            },
            NearbyText {
                text: "Newsletter".into(),
                distance: 90.0,
            },
        ],
        ..input("contact", "text")
    };
    let snap = snapshot(&[el]);
    let context = &snap.elements()[0].context;

    assert_eq!(context.adjacent_text, None);
    assert_eq!(context.nearby_text.as_deref(), Some("Your e-mail"));
    assert!(context.parent_excerpt.as_ref().unwrap().chars().count() <= 200);
}

#[test]
fn indicators_count_forms_passwords_and_captcha() {
    let mut elements = registration_elements();
    elements.push(input("captcha_answer", "text"));
    let snap = snapshot(&elements);

    assert_eq!(snap.indicators.form_count, 1);
    assert_eq!(snap.indicators.interactive_count, elements.len());
    assert_eq!(snap.indicators.password_fields, 2);
    assert!(snap.indicators.captcha_present);
}

#[test]
fn extract_restores_scroll_position() {
    let mut driver = FakeDriver::new(registration_elements());
    driver.scroll_y = 320.0;

    let snap = PageSnapshotExtractor::default().extract(&mut driver).unwrap();

    assert_eq!(snap.url, PAGE_URL);
    assert_eq!(driver.scroll_y, 320.0);
    assert_eq!(driver.snapshot_reads, 1);
}

#[test]
fn unreadable_page_is_page_unavailable() {
    let mut driver = FakeDriver::new(vec![]);
    driver.page_unavailable = true;

    let err = PageSnapshotExtractor::default().extract(&mut driver).unwrap_err();
    assert!(matches!(err, EngineError::PageUnavailable(_)));
}

#[test]
fn fingerprint_tracks_structure() {
    let a = snapshot(&registration_elements());
    let b = snapshot(&registration_elements());
    let mut changed = registration_elements();
    changed.push(input("phone", "tel"));
    let c = snapshot(&changed);

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
}

// =========================================================================
// Offline selector matching
// =========================================================================

#[test]
fn attribute_operators_and_case_flag() {
    let snap = snapshot(&[
        with_placeholder(input("UserEmail", "text"), "Work e-mail"),
        input("password", "password"),
    ]);

    assert_eq!(select(r#"input[name*="email" i]"#, &snap).len(), 1);
    assert!(select(r#"input[name*="email"]"#, &snap).is_empty());
    assert_eq!(select(r#"input[name^="User"]"#, &snap).len(), 1);
    assert_eq!(select(r#"input[name$="word"]"#, &snap).len(), 1);
    assert_eq!(select(r#"input[placeholder~="e-mail"]"#, &snap).len(), 1);
    assert_eq!(select("input[placeholder]", &snap).len(), 1);
    assert_eq!(select("input[type=password]", &snap).len(), 1);
}

#[test]
fn form_ancestor_text_and_nth() {
    let snap = snapshot(&registration_elements());

    assert_eq!(select(r#"form#signup input[type="email"]"#, &snap).len(), 1);
    assert!(select(r#"form#login input[type="email"]"#, &snap).is_empty());
    assert_eq!(select(r#"button:has-text("create")"#, &snap).len(), 1);

    let second = select(r#"input[type="password"] >> nth=1"#, &snap);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].identifiers.name.as_deref(), Some("password_confirmation"));

    let last = select(r#"input[type="password"] >> nth=-1"#, &snap);
    assert_eq!(last[0].element_ref, second[0].element_ref);
}

#[test]
fn visible_pseudo_and_comma_lists() {
    let snap = snapshot(&[display_none(input("email", "text")), input("email2", "email")]);

    assert_eq!(select(r#"input[name="email"]"#, &snap).len(), 1);
    assert!(select(r#"input[name="email"]:visible"#, &snap).is_empty());
    assert_eq!(select(r#"input[name="email"], input[type="email"]"#, &snap).len(), 2);
}

#[test]
fn unsupported_syntax_matches_nothing() {
    let snap = snapshot(&registration_elements());
    assert!(SelectorPattern::parse("input:nth-child(2)").is_none());
    assert!(!resolves_in("input:nth-child(2)", &snap));
    assert!(!resolves_in("", &snap));
    assert!(!resolves_in("//input[@name='email']", &snap));
}

// =========================================================================
// Selector derivation
// =========================================================================

#[test]
fn derived_candidates_select_exactly_their_element() {
    let snap = snapshot(&registration_elements());
    for el in snap.elements() {
        let candidates = derive_candidates(el, &snap);
        assert!(!candidates.is_empty());
        for candidate in &candidates {
            let hits = select(candidate, &snap);
            assert_eq!(hits.len(), 1, "{} matched {}", candidate, hits.len());
            assert_eq!(hits[0].element_ref, el.element_ref, "{}", candidate);
        }
    }
}

#[test]
fn stable_id_comes_first_and_volatile_ids_are_skipped() {
    let snap = snapshot(&[
        with_id(input("email", "email"), "signup-email"),
        with_id(input("phone", "tel"), "input-83920471"),
    ]);
    let els = snap.elements();

    assert_eq!(derive_candidates(els[0], &snap)[0], "#signup-email");
    assert_eq!(derive_candidates(els[1], &snap)[0], r#"input[name="phone"]"#);
    assert!(is_stable_id("signup-email"));
    assert!(!is_stable_id("input-83920471"));
    assert!(!is_stable_id(":r3:"));
}

#[test]
fn buttons_get_text_candidates_and_positional_fallback() {
    let snap = snapshot(&[button("Create account", "submit"), button("Back", "button")]);
    let els = snap.elements();
    let candidates = derive_candidates(els[0], &snap);

    assert!(candidates.contains(&r#"button:has-text("Create account")"#.to_string()));
    assert_eq!(
        candidates.last().unwrap(),
        &positional_selector(els[0], &snap)
    );
    assert_eq!(positional_selector(els[0], &snap), r#"button[type="submit"] >> nth=0"#);
}
