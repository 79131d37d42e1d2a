mod common;

use clap::Parser;
use form_sentinel::analysis::suspicion::ReasonCode;
use form_sentinel::cli::commands::{build_analyzer, cmd_analyze};
use form_sentinel::cli::config::{Cli, Commands, apply_overrides, site_of};
use form_sentinel::config::{EngineConfig, load_config, parse_config};

use crate::common::builders::{raw_page, registration_elements};

// ============================================================================
// CLI Argument Parsing Tests
// ============================================================================

#[test]
fn cli_parse_analyze_snapshot() {
    let cli = Cli::parse_from(["form-sentinel", "analyze", "--snapshot", "page.json"]);
    match cli.command {
        Commands::Analyze {
            snapshot,
            url,
            site,
            force_refresh,
        } => {
            assert_eq!(snapshot, Some("page.json".to_string()));
            assert!(url.is_none());
            assert!(site.is_none());
            assert!(!force_refresh);
        }
        _ => panic!("Expected Analyze command"),
    }
}

#[test]
fn cli_parse_analyze_url_with_refresh() {
    let cli = Cli::parse_from([
        "form-sentinel",
        "analyze",
        "--url",
        "https://shop.example/register",
        "--site",
        "shop",
        "--force-refresh",
    ]);
    match cli.command {
        Commands::Analyze {
            url,
            site,
            force_refresh,
            ..
        } => {
            assert_eq!(url, Some("https://shop.example/register".to_string()));
            assert_eq!(site, Some("shop".to_string()));
            assert!(force_refresh);
        }
        _ => panic!("Expected Analyze command"),
    }
}

#[test]
fn cli_analyze_needs_exactly_one_source() {
    assert!(Cli::try_parse_from(["form-sentinel", "analyze"]).is_err());
    assert!(
        Cli::try_parse_from([
            "form-sentinel",
            "analyze",
            "--snapshot",
            "page.json",
            "--url",
            "https://shop.example",
        ])
        .is_err()
    );
}

#[test]
fn cli_parse_resolve_with_hints() {
    let cli = Cli::parse_from([
        "form-sentinel",
        "resolve",
        "--url",
        "https://shop.example/register",
        "--purpose",
        "confirmPassword",
        "--hint",
        "#pw2",
        "--hint",
        "input[name=\"password2\"]",
        "--analyze-first",
        "false",
    ]);
    match cli.command {
        Commands::Resolve {
            url,
            purpose,
            hints,
            analyze_first,
        } => {
            assert_eq!(url, "https://shop.example/register");
            assert_eq!(purpose, "confirmPassword");
            assert_eq!(hints, vec!["#pw2", "input[name=\"password2\"]"]);
            assert!(!analyze_first);
        }
        _ => panic!("Expected Resolve command"),
    }
}

#[test]
fn cli_resolve_analyzes_first_by_default() {
    let cli = Cli::parse_from([
        "form-sentinel",
        "resolve",
        "--url",
        "https://shop.example",
        "--purpose",
        "email",
    ]);
    match cli.command {
        Commands::Resolve {
            hints,
            analyze_first,
            ..
        } => {
            assert!(hints.is_empty());
            assert!(analyze_first);
        }
        _ => panic!("Expected Resolve command"),
    }
}

#[test]
fn cli_parse_globals_after_subcommand() {
    let cli = Cli::parse_from([
        "form-sentinel",
        "analyze",
        "--snapshot",
        "page.json",
        "-vv",
        "--analyzer",
        "llm",
        "--ollama-model",
        "llama3",
    ]);
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.analyzer, Some("llm".to_string()));
    assert_eq!(cli.ollama_model, Some("llama3".to_string()));
    assert!(cli.ollama_endpoint.is_none());
}

// ============================================================================
// Config File Tests
// ============================================================================

#[test]
fn config_load_missing_file() {
    let config = load_config(Some("nonexistent_file_that_does_not_exist.yaml"));
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn config_default_values() {
    let config = EngineConfig::default();
    assert_eq!(config.scoring.honeypot_threshold, 0.6);
    assert!(config.scoring.weights.is_empty());
    assert_eq!(config.resolver.base_timeout_ms, 5000);
    assert_eq!(config.resolver.floor_timeout_ms, 500);
    assert_eq!(config.cache.ttl_secs, 1800);
    assert_eq!(config.classifier.analyzer, "mock");
    assert_eq!(config.classifier.external_gate, 0.6);
    assert_eq!(config.classifier.max_retries, 1);
    assert_eq!(config.browser.server_script, "node/browser_server.js");
    assert!(config.trace.path.is_none());
}

#[test]
fn config_yaml_roundtrip() {
    let mut config = EngineConfig::default();
    config.scoring.weights.insert(ReasonCode::NegativeTabindex, 0.4);
    config.trace.path = Some("trace.jsonl".into());
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert_eq!(parse_config(&yaml), config);
}

#[test]
fn config_partial_yaml() {
    let yaml = r#"
scoring:
  honeypot_threshold: 0.7
  weights:
    negative_tabindex: 0.5
    display_none: 1.0
resolver:
  base_timeout_ms: 3000
ollama:
  model: "llama3"
"#;
    let config = parse_config(yaml);
    assert_eq!(config.scoring.honeypot_threshold, 0.7);
    assert_eq!(config.scoring.weights[&ReasonCode::NegativeTabindex], 0.5);
    assert_eq!(config.scoring.weights[&ReasonCode::DisplayNone], 1.0);
    assert_eq!(config.resolver.base_timeout_ms, 3000);
    // Unset fields keep their defaults
    assert_eq!(config.resolver.floor_timeout_ms, 500);
    assert_eq!(config.cache.ttl_secs, 1800);
    assert_eq!(config.ollama.model, Some("llama3".to_string()));
    assert!(config.ollama.endpoint.is_none());
}

#[test]
fn config_malformed_yaml_falls_back_to_defaults() {
    let config = parse_config("scoring: [not, a, map");
    assert_eq!(config, EngineConfig::default());
}

// ============================================================================
// Builder / Helper Tests
// ============================================================================

#[test]
fn cli_overrides_win_over_config() {
    let cli = Cli::parse_from([
        "form-sentinel",
        "analyze",
        "--url",
        "https://shop.example",
        "--analyzer",
        "llm",
        "--ollama-endpoint",
        "http://gpu-box:11434/api/generate",
    ]);
    let mut config = EngineConfig::default();
    config.ollama.model = Some("qwen2.5:7b".into());

    let merged = apply_overrides(config, &cli);
    assert_eq!(merged.classifier.analyzer, "llm");
    assert_eq!(
        merged.ollama.endpoint,
        Some("http://gpu-box:11434/api/generate".to_string())
    );
    assert_eq!(merged.ollama.model, Some("qwen2.5:7b".to_string()));
}

#[test]
fn site_of_extracts_the_host() {
    assert_eq!(site_of("https://Shop.Example/register?ref=1"), "shop.example");
    assert_eq!(site_of("http://localhost:8080"), "localhost:8080");
    assert_eq!(site_of("shop.example/path"), "shop.example");
}

#[test]
fn analyzer_selection() {
    let mut config = EngineConfig::default();
    assert!(build_analyzer(&config).unwrap().is_none());

    config.classifier.analyzer = "llm".into();
    assert!(build_analyzer(&config).unwrap().is_some());

    config.classifier.analyzer = "gpt-9".into();
    assert!(build_analyzer(&config).is_err());
}

#[test]
fn analyze_offline_snapshot_file() {
    let dir = std::env::temp_dir().join("form_sentinel_cli_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("snapshot-{}.json", std::process::id()));
    let page = raw_page(&registration_elements());
    std::fs::write(&path, serde_json::to_string(&page).unwrap()).unwrap();

    let outcome = cmd_analyze(
        path.to_str(),
        None,
        None,
        false,
        EngineConfig::default(),
        0,
    );

    std::fs::remove_file(&path).unwrap();
    assert!(outcome.is_ok());
}
