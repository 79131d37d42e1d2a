use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::suspicion::ReasonCode;

// ============================================================================
// Engine Config Model (optional YAML: form-sentinel.yaml)
// ============================================================================

pub const DEFAULT_CONFIG_FILE: &str = "form-sentinel.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Elements scoring strictly above this are honeypots.
    #[serde(default = "default_threshold")]
    pub honeypot_threshold: f32,

    /// Per-rule weight overrides, e.g. `negative_tabindex: 0.4`.
    #[serde(default)]
    pub weights: BTreeMap<ReasonCode, f32>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            honeypot_threshold: default_threshold(),
            weights: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_base_timeout_ms")]
    pub base_timeout_ms: u64,

    #[serde(default = "default_floor_timeout_ms")]
    pub floor_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_timeout_ms: default_base_timeout_ms(),
            floor_timeout_ms: default_floor_timeout_ms(),
        }
    }
}

impl ResolverConfig {
    pub fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    pub fn floor_timeout(&self) -> Duration {
        Duration::from_millis(self.floor_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// `mock` (pattern-only) or `llm` (Ollama).
    #[serde(default = "default_mock")]
    pub analyzer: String,

    /// External answers at or below this confidence are ignored.
    #[serde(default = "default_threshold")]
    pub external_gate: f32,

    #[serde(default = "default_one")]
    pub max_retries: u32,

    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            analyzer: default_mock(),
            external_gate: default_threshold(),
            max_retries: default_one(),
            timeout_secs: default_classifier_timeout_secs(),
            max_excerpt_chars: default_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OllamaConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_server_script")]
    pub server_script: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            server_script: default_server_script(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TraceConfig {
    /// JSONL file receiving one event per resolution; off when unset.
    pub path: Option<String>,
}

// Serde default helpers
fn default_threshold() -> f32 { 0.6 }
fn default_base_timeout_ms() -> u64 { 5000 }
fn default_floor_timeout_ms() -> u64 { 500 }
fn default_ttl_secs() -> u64 { 30 * 60 }
fn default_mock() -> String { "mock".to_string() }
fn default_one() -> u32 { 1 }
fn default_classifier_timeout_secs() -> u64 { 30 }
fn default_excerpt_chars() -> usize { crate::analysis::external::DEFAULT_EXCERPT_CHARS }
fn default_server_script() -> String { crate::browser::session::DEFAULT_SERVER_SCRIPT.to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> EngineConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_FILE);
    match std::fs::read_to_string(config_path) {
        Ok(content) => parse_config(&content),
        Err(_) => EngineConfig::default(),
    }
}

pub fn parse_config(content: &str) -> EngineConfig {
    match serde_yaml::from_str(content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "malformed config, using defaults");
            EngineConfig::default()
        }
    }
}
