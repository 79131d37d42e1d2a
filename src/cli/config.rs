use clap::{Parser, Subcommand};

use crate::config::EngineConfig;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "form-sentinel",
    version,
    about = "Form field resolution with honeypot detection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ollama API endpoint
    #[arg(long, global = true)]
    pub ollama_endpoint: Option<String>,

    /// Ollama model name
    #[arg(long, global = true)]
    pub ollama_model: Option<String>,

    /// Page analyzer: mock (pattern-only) or llm
    #[arg(long, global = true)]
    pub analyzer: Option<String>,

    /// Path to config file (default: form-sentinel.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyse a page: field bindings, honeypots and submit control
    Analyze {
        /// Offline snapshot JSON (the browser server's `extract` payload)
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        snapshot: Option<String>,

        /// Live page to open in the browser
        #[arg(long)]
        url: Option<String>,

        /// Cache namespace, defaults to the URL host
        #[arg(long)]
        site: Option<String>,

        /// Ignore any cached result
        #[arg(long, default_value_t = false)]
        force_refresh: bool,
    },

    /// Resolve one purpose on a live page and print the bound selector
    Resolve {
        /// Page to open in the browser
        #[arg(long)]
        url: String,

        /// Field purpose, e.g. email, confirmPassword, submit
        #[arg(long)]
        purpose: String,

        /// Selector to try before the registry templates (repeatable)
        #[arg(long = "hint")]
        hints: Vec<String>,

        /// Analyse the page first and skip its honeypots
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        analyze_first: bool,
    },
}

// ============================================================================
// Config Builders (merge CLI args with config file)
// ============================================================================

/// Apply CLI overrides on top of the loaded config: CLI > config > defaults.
pub fn apply_overrides(mut config: EngineConfig, cli: &Cli) -> EngineConfig {
    if let Some(endpoint) = &cli.ollama_endpoint {
        config.ollama.endpoint = Some(endpoint.clone());
    }
    if let Some(model) = &cli.ollama_model {
        config.ollama.model = Some(model.clone());
    }
    if let Some(analyzer) = &cli.analyzer {
        config.classifier.analyzer = analyzer.clone();
    }
    config
}

/// Host part of a URL, used as the default cache namespace.
pub fn site_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    rest.split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .to_lowercase()
}
