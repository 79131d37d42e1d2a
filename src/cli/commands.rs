use std::time::Duration;

use crate::analysis::ai_model::OllamaBackend;
use crate::analysis::analysis_model::SiteContext;
use crate::analysis::external::ExternalClassifierAdapter;
use crate::analysis::purpose::FieldPurpose;
use crate::browser::session::BrowserSession;
use crate::cli::config::site_of;
use crate::config::EngineConfig;
use crate::engine::FieldEngine;
use crate::page::extractor::PageSnapshotExtractor;
use crate::page::page_model::RawPage;

// ============================================================================
// analyze subcommand
// ============================================================================

/// Analyse an offline snapshot file or a live URL and print the result as JSON.
pub fn cmd_analyze(
    snapshot_path: Option<&str>,
    url: Option<&str>,
    site: Option<&str>,
    force_refresh: bool,
    config: EngineConfig,
    verbose: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(config)?;

    let result = match (snapshot_path, url) {
        (Some(path), _) => {
            if verbose > 0 {
                eprintln!("Analyzing snapshot {}...", path);
            }
            let content = std::fs::read_to_string(path)?;
            let raw: RawPage = serde_json::from_str(&content)?;
            let snapshot = PageSnapshotExtractor::default().from_raw(raw);
            for insight in &snapshot.indicators.insights {
                eprintln!("  note: {}", insight);
            }
            let context = SiteContext::new(site.unwrap_or(&site_of(&snapshot.url)));
            engine.analyze_snapshot(&snapshot, &context)
        }
        (None, Some(url)) => {
            if verbose > 0 {
                eprintln!("Analyzing {}...", url);
            }
            let mut session = BrowserSession::launch(&engine.config().browser.server_script)?;
            session.navigate(url)?;
            let context = SiteContext::new(site.unwrap_or(&site_of(url)));
            let result = engine.analyze(&mut session, &context, force_refresh)?;
            session.quit()?;
            result
        }
        (None, None) => return Err("either --snapshot or --url is required".into()),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if verbose > 0 {
        eprintln!(
            "{} fields, {} checkboxes, {} honeypots (confidence {:.2}, validated {:.0}%)",
            result.fields.len(),
            result.checkboxes.len(),
            result.honeypots.len(),
            result.confidence,
            result.validation_success_rate * 100.0
        );
    }
    Ok(())
}

// ============================================================================
// resolve subcommand
// ============================================================================

pub fn cmd_resolve(
    url: &str,
    purpose: &str,
    hints: &[String],
    analyze_first: bool,
    config: EngineConfig,
    verbose: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let purpose: FieldPurpose = purpose.parse()?;
    let engine = build_engine(config)?;
    let mut session = BrowserSession::launch(&engine.config().browser.server_script)?;
    session.navigate(url)?;

    let mut hints = hints.to_vec();
    let mut honeypots = Vec::new();
    if analyze_first {
        let analysis = engine.analyze(&mut session, &SiteContext::new(&site_of(url)), false)?;
        if let Some(field) = analysis.field(purpose) {
            for candidate in &field.selector_candidates {
                if !hints.contains(candidate) {
                    hints.push(candidate.clone());
                }
            }
        }
        honeypots = analysis.honeypot_selectors();
        if verbose > 0 {
            eprintln!("Skipping {} honeypot selectors", honeypots.len());
        }
    }

    let resolved = engine.resolve(&mut session, purpose, &hints, &honeypots)?;
    session.quit()?;

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    if verbose > 0 {
        eprintln!("{}", serde_json::to_string(&engine.stats())?);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn build_engine(config: EngineConfig) -> Result<FieldEngine, Box<dyn std::error::Error>> {
    let adapter = build_analyzer(&config)?;
    let engine = FieldEngine::new(config);
    Ok(match adapter {
        Some(adapter) => engine.with_external(adapter),
        None => engine,
    })
}

/// Build the external classifier selected by `classifier.analyzer`.
///
/// `mock` means pattern-only analysis.
pub fn build_analyzer(
    config: &EngineConfig,
) -> Result<Option<ExternalClassifierAdapter>, Box<dyn std::error::Error>> {
    match config.classifier.analyzer.as_str() {
        "llm" => {
            let defaults = OllamaBackend::default();
            let backend = OllamaBackend::new(
                config.ollama.endpoint.as_deref().unwrap_or(&defaults.endpoint),
                config.ollama.model.as_deref().unwrap_or(&defaults.model),
            );
            Ok(Some(
                ExternalClassifierAdapter::new(Box::new(backend))
                    .with_timeout(Duration::from_secs(config.classifier.timeout_secs))
                    .with_retries(config.classifier.max_retries)
                    .with_excerpt_budget(config.classifier.max_excerpt_chars),
            ))
        }
        "mock" | "none" => Ok(None),
        other => Err(format!("unknown analyzer '{}' (expected mock or llm)", other).into()),
    }
}
