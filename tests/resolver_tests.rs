mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use form_sentinel::analysis::analysis_model::SiteContext;
use form_sentinel::analysis::purpose::FieldPurpose;
use form_sentinel::config::EngineConfig;
use form_sentinel::engine::FieldEngine;
use form_sentinel::error::EngineError;
use form_sentinel::resolver::discovery::DiscoveryFallback;
use form_sentinel::resolver::live::{adaptive_timeout, candidate_list};
use form_sentinel::resolver::registry::{AdaptiveSelectorRegistry, RegistryState, default_patterns};
use form_sentinel::trace::logger::TraceLogger;

use crate::common::builders::{
    input, registration_elements, snapshot, with_attr, with_class, with_id, with_placeholder,
};
use crate::common::fake_driver::FakeDriver;

fn engine_with(registry: Arc<AdaptiveSelectorRegistry>) -> FieldEngine {
    FieldEngine::with_registry(EngineConfig::default(), registry)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Two inputs named "email": a hidden-class, untabbable trap and the real one.
fn duplicate_email_page() -> Vec<form_sentinel::page::page_model::RawElement> {
    vec![
        with_attr(with_class(input("email", "text"), "hidden"), "tabindex", "-1"),
        with_placeholder(input("email", "text"), "Your email"),
    ]
}

// =========================================================================
// Registry
// =========================================================================

#[test]
fn registry_starts_from_defaults() {
    let registry = AdaptiveSelectorRegistry::new();
    let templates = registry.templates(FieldPurpose::Email);

    assert_eq!(templates.len(), default_patterns(FieldPurpose::Email).len());
    for (i, t) in templates.iter().enumerate() {
        assert_eq!(t.priority, i);
        assert_eq!(t.purpose, FieldPurpose::Email);
        assert_eq!(t.pattern, default_patterns(FieldPurpose::Email)[i]);
    }
    assert!(registry.patterns(FieldPurpose::Other).is_empty());
}

#[test]
fn promote_swaps_with_predecessor() {
    let registry = AdaptiveSelectorRegistry::empty();
    registry.set_patterns(FieldPurpose::Phone, &strings(&["a", "b", "c"]));

    assert!(registry.promote(FieldPurpose::Phone, "c"));
    assert_eq!(registry.patterns(FieldPurpose::Phone), strings(&["a", "c", "b"]));
    assert!(registry.promote(FieldPurpose::Phone, "c"));
    assert!(!registry.promote(FieldPurpose::Phone, "c"));
    assert!(!registry.promote(FieldPurpose::Phone, "unknown"));
    assert_eq!(registry.patterns(FieldPurpose::Phone), strings(&["c", "a", "b"]));

    let priorities: Vec<usize> = registry
        .templates(FieldPurpose::Phone)
        .iter()
        .map(|t| t.priority)
        .collect();
    assert_eq!(priorities, vec![0, 1, 2]);
}

#[test]
fn insert_front_moves_existing_pattern() {
    let registry = AdaptiveSelectorRegistry::empty();
    registry.set_patterns(FieldPurpose::Company, &strings(&["a", "b", "c"]));

    registry.insert_front(FieldPurpose::Company, "b");
    assert_eq!(registry.patterns(FieldPurpose::Company), strings(&["b", "a", "c"]));

    registry.insert_front(FieldPurpose::Company, "new");
    assert_eq!(
        registry.patterns(FieldPurpose::Company),
        strings(&["new", "b", "a", "c"])
    );
    assert_eq!(registry.position(FieldPurpose::Company, "c"), Some(3));
}

#[test]
fn snapshot_restore_and_reset() {
    let registry = AdaptiveSelectorRegistry::new();
    registry.insert_front(FieldPurpose::Email, "#signup-email");
    let saved = registry.snapshot();
    assert_eq!(saved[&FieldPurpose::Email][0], "#signup-email");
    assert!(!saved.contains_key(&FieldPurpose::Other));

    let yaml = serde_yaml::to_string(&saved).unwrap();
    let loaded: RegistryState = serde_yaml::from_str(&yaml).unwrap();
    let copy = AdaptiveSelectorRegistry::from_state(&loaded);
    assert_eq!(copy.snapshot(), saved);

    registry.reset();
    assert_eq!(registry.position(FieldPurpose::Email, "#signup-email"), None);

    registry.restore(&saved);
    assert_eq!(registry.position(FieldPurpose::Email, "#signup-email"), Some(0));
    assert!(AdaptiveSelectorRegistry::empty().snapshot().is_empty());
}

#[test]
fn concurrent_promotions_are_not_lost() {
    let registry = Arc::new(AdaptiveSelectorRegistry::new());
    let last = default_patterns(FieldPurpose::Email).last().unwrap().to_string();
    let moves = default_patterns(FieldPurpose::Email).len() - 1;

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let last = last.clone();
            thread::spawn(move || {
                let email = registry.promote(FieldPurpose::Email, &last);
                registry.promote(FieldPurpose::Submit, "form button");
                email
            })
        })
        .collect();
    let promoted = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|moved| *moved)
        .count();

    assert_eq!(promoted, moves);
    assert_eq!(registry.position(FieldPurpose::Email, &last), Some(0));
    assert_eq!(registry.position(FieldPurpose::Submit, "form button"), Some(0));
    assert_eq!(
        registry.patterns(FieldPurpose::Email).len(),
        default_patterns(FieldPurpose::Email).len()
    );
}

// =========================================================================
// Candidate ordering and timeouts
// =========================================================================

#[test]
fn timeout_shrinks_per_depth_down_to_floor() {
    let base = ms(5000);
    assert_eq!(adaptive_timeout(base, ms(500), 0), ms(5000));
    assert_eq!(adaptive_timeout(base, ms(500), 3), ms(3500));
    assert_eq!(adaptive_timeout(base, ms(500), 8), ms(1000));
    assert_eq!(adaptive_timeout(base, ms(500), 20), ms(1000));
    assert_eq!(adaptive_timeout(base, ms(1500), 8), ms(1500));
}

#[test]
fn hints_precede_templates_without_repeats() {
    let hints = strings(&["#email", " input[name=\"email\"] ", ""]);
    let templates = strings(&["input[type=\"email\"]", "input[name=\"email\"]"]);
    assert_eq!(
        candidate_list(&hints, &templates),
        strings(&["#email", "input[name=\"email\"]", "input[type=\"email\"]"])
    );
}

// =========================================================================
// Live resolution
// =========================================================================

#[test]
fn resolver_skips_the_duplicate_trap() {
    let registry = Arc::new(AdaptiveSelectorRegistry::new());
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(duplicate_email_page());

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();

    assert_eq!(resolved.selector, r#"input[placeholder*="email" i]"#);
    assert_eq!(resolved.handle, FakeDriver::handle(1));
    assert_eq!(resolved.depth, 5);
    assert!(!resolved.via_discovery);
    assert_eq!(registry.position(FieldPurpose::Email, &resolved.selector), Some(4));
}

#[test]
fn analysis_hints_resolve_the_real_duplicate() {
    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::new()));
    let mut driver = FakeDriver::new(duplicate_email_page());

    let analysis = engine
        .analyze(&mut driver, &SiteContext::new("shop.example"), false)
        .unwrap();
    assert_eq!(analysis.honeypots.len(), 1);
    assert!(
        analysis.honeypots[0]
            .reasons
            .contains(&"duplicate field".to_string())
    );

    let resolved = engine
        .resolve_from(&mut driver, &analysis, FieldPurpose::Email)
        .unwrap();
    assert_eq!(resolved.handle, FakeDriver::handle(1));
    assert_eq!(resolved.selector, r#"input[placeholder="Your email"]"#);
    assert_eq!(resolved.depth, 0);
    assert_eq!(engine.stats().promotions, 0);
}

#[test]
fn third_candidate_wins_and_moves_up_one_slot() {
    let registry = Arc::new(AdaptiveSelectorRegistry::new());
    registry.set_patterns(
        FieldPurpose::Email,
        &strings(&["#email-field", r#"[name="x"]"#, r#"input[type="email"]"#]),
    );
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(vec![input("email", "email")]);

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();

    assert_eq!(resolved.selector, r#"input[type="email"]"#);
    assert_eq!(resolved.depth, 2);
    assert_eq!(
        registry.patterns(FieldPurpose::Email),
        strings(&["#email-field", r#"input[type="email"]"#, r#"[name="x"]"#])
    );

    let waits: Vec<Duration> = driver.find_calls.iter().map(|(_, t)| *t).collect();
    assert_eq!(waits, vec![ms(5000), ms(4500), ms(4000)]);
    assert_eq!(engine.stats().promotions, 1);
}

#[test]
fn repeated_wins_climb_to_the_front_and_stay() {
    let registry = Arc::new(AdaptiveSelectorRegistry::new());
    registry.set_patterns(
        FieldPurpose::Email,
        &strings(&["#email-field", r#"[name="x"]"#, r#"input[type="email"]"#]),
    );
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(vec![input("email", "email")]);

    let depths: Vec<usize> = (0..4)
        .map(|_| {
            engine
                .resolve(&mut driver, FieldPurpose::Email, &[], &[])
                .unwrap()
                .depth
        })
        .collect();

    assert_eq!(depths, vec![2, 1, 0, 0]);
    assert_eq!(registry.position(FieldPurpose::Email, r#"input[type="email"]"#), Some(0));
    assert_eq!(engine.stats().promotions, 2);
    assert_eq!(engine.stats().successes, 4);
}

#[test]
fn stale_element_is_retried_once() {
    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::new()));
    let mut driver = FakeDriver::new(vec![input("email", "email")]);
    driver.stale_once.insert(r#"input[type="email"]"#.to_string());

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();

    assert_eq!(resolved.depth, 0);
    let probed: Vec<&str> = driver.find_calls.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(probed, vec![r#"input[type="email"]"#, r#"input[type="email"]"#]);
}

#[test]
fn hint_winners_leave_the_registry_alone() {
    let registry = Arc::new(AdaptiveSelectorRegistry::new());
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(vec![input("email", "email")]);
    let hint = r#"input[name="email"]"#.to_string();

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[hint.clone()], &[])
        .unwrap();

    assert_eq!(resolved.selector, hint);
    assert_eq!(resolved.depth, 0);
    assert_eq!(registry.position(FieldPurpose::Email, &hint), Some(1));
    assert_eq!(engine.stats().promotions, 0);
}

#[test]
fn honeypot_selectors_are_never_probed() {
    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::new()));
    let mut driver = FakeDriver::new(vec![input("email", "email")]);
    let honeypots = strings(&[r#"input[type="email"]"#]);
    let hints = strings(&[r#"input[name="hp_email"]"#]);

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &hints, &honeypots)
        .unwrap();

    assert_eq!(resolved.selector, r#"input[name="email"]"#);
    assert_eq!(resolved.depth, 2);
    assert!(
        driver
            .find_calls
            .iter()
            .all(|(s, _)| s != r#"input[type="email"]"# && s != r#"input[name="hp_email"]"#)
    );
}

#[test]
fn element_of_the_wrong_purpose_is_rejected() {
    let registry = Arc::new(AdaptiveSelectorRegistry::empty());
    registry.set_patterns(FieldPurpose::Email, &strings(&["input", r#"input[type="email"]"#]));
    let engine = engine_with(registry);
    let mut driver = FakeDriver::new(vec![
        input("password", "password"),
        input("email", "email"),
    ]);

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();
    assert_eq!(resolved.handle, FakeDriver::handle(1));
    assert_eq!(resolved.depth, 1);
}

// =========================================================================
// Discovery
// =========================================================================

#[test]
fn discovery_finds_the_submit_button() {
    let registry = Arc::new(AdaptiveSelectorRegistry::empty());
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(registration_elements());

    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Submit, &[], &[])
        .unwrap();

    assert!(resolved.via_discovery);
    assert_eq!(resolved.depth, 0);
    assert_eq!(resolved.handle, FakeDriver::handle(8));
    assert_eq!(resolved.selector, r#"button:has-text("Create account")"#);
    assert_eq!(registry.position(FieldPurpose::Submit, &resolved.selector), Some(0));
    assert_eq!(driver.find_calls.last().unwrap().1, ms(500));

    let stats = engine.stats();
    assert_eq!(stats.fallbacks_used, 1);
    assert_eq!(stats.successes, 1);

    // The discovered selector is now the first template.
    let again = engine
        .resolve(&mut driver, FieldPurpose::Submit, &[], &[])
        .unwrap();
    assert!(!again.via_discovery);
    assert_eq!(again.depth, 0);
}

#[test]
fn discovery_picks_by_purpose() {
    let discovery = DiscoveryFallback::default();
    let snap = snapshot(&registration_elements());

    assert_eq!(discovery.pick(&snap, FieldPurpose::Email, &[]), Some(2));
    assert_eq!(discovery.pick(&snap, FieldPurpose::Password, &[]), Some(4));
    assert_eq!(discovery.pick(&snap, FieldPurpose::ConfirmPassword, &[]), Some(5));
    assert_eq!(discovery.pick(&snap, FieldPurpose::Submit, &[]), Some(8));
    assert_eq!(discovery.pick(&snap, FieldPurpose::FirstName, &[]), Some(0));
    assert_eq!(discovery.pick(&snap, FieldPurpose::Phone, &[]), None);
}

#[test]
fn discovery_never_learns_a_caller_honeypot() {
    let registry = Arc::new(AdaptiveSelectorRegistry::empty());
    let engine = engine_with(registry.clone());
    let mut driver = FakeDriver::new(vec![with_id(input("contact", "email"), "contact")]);
    let traps = strings(&["#contact"]);

    let err = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &traps)
        .unwrap_err();

    assert!(matches!(err, EngineError::ElementNotFound(FieldPurpose::Email)));
    assert!(registry.patterns(FieldPurpose::Email).is_empty());
    assert!(driver.find_calls.is_empty());

    // A caller without the honeypot list discovers it afresh.
    let resolved = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();
    assert!(resolved.via_discovery);
    assert_eq!(resolved.selector, "#contact");
}

#[test]
fn discovery_pick_skips_listed_honeypots() {
    let discovery = DiscoveryFallback::default();
    let snap = snapshot(&registration_elements());

    let traps = strings(&[r#"input[type="password"] >> nth=0"#]);
    assert_eq!(discovery.pick(&snap, FieldPurpose::Password, &traps), Some(5));
}

#[test]
fn exhausted_candidates_are_element_not_found() {
    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::empty()));
    let mut driver = FakeDriver::new(vec![input("city", "text")]);

    let err = engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap_err();

    assert!(matches!(err, EngineError::ElementNotFound(FieldPurpose::Email)));
    let stats = engine.stats();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.successes, 0);
    assert_eq!(stats.fallbacks_used, 1);
    assert_eq!(stats.success_rate(), 0.0);
}

// =========================================================================
// Actions, stats and trace
// =========================================================================

#[test]
fn fill_and_click_act_on_resolved_elements() {
    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::new()));
    let mut driver = FakeDriver::new(registration_elements());

    engine
        .fill(&mut driver, FieldPurpose::Email, &[], &[], "jane@example.com")
        .unwrap();
    engine
        .click(&mut driver, FieldPurpose::Submit, &[], &[])
        .unwrap();

    assert_eq!(
        driver.fills,
        vec![(FakeDriver::handle(2).0, "jane@example.com".to_string())]
    );
    assert_eq!(driver.clicks, vec![FakeDriver::handle(8).0]);

    let stats = engine.stats();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.success_rate(), 1.0);

    engine.reset_stats();
    assert_eq!(engine.stats(), Default::default());
}

#[test]
fn resolutions_are_traced_as_jsonl() {
    let path = std::env::temp_dir().join(format!("form-sentinel-trace-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let logger = Arc::new(TraceLogger::new(&path));
    assert!(logger.is_enabled());

    let engine = engine_with(Arc::new(AdaptiveSelectorRegistry::new())).with_trace(logger);
    let mut driver = FakeDriver::new(vec![input("email", "email")]);
    engine
        .resolve(&mut driver, FieldPurpose::Email, &[], &[])
        .unwrap();
    let _ = engine.resolve(&mut driver, FieldPurpose::Phone, &[], &[]);

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["purpose"], "email");
    assert_eq!(events[0]["outcome"], "resolved");
    assert_eq!(events[0]["selector"], r#"input[type="email"]"#);
    assert_eq!(events[0]["depth"], 0);
    assert_eq!(events[1]["purpose"], "phone");
    assert_eq!(events[1]["outcome"], "failed");
    assert!(events[1]["selector"].is_null());
}

#[test]
fn disabled_trace_logger_drops_events() {
    let logger = TraceLogger::disabled();
    assert!(!logger.is_enabled());
    logger.log(&form_sentinel::trace::trace::ResolutionTraceEvent::now(
        FieldPurpose::Email,
        form_sentinel::trace::trace::ResolutionOutcome::Failed,
    ));
}
