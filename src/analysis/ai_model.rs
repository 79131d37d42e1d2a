use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A text-completion service.
///
/// Implementations must honour `timeout` and report every failure as
/// `ClassificationService`; the caller decides whether to retry.
pub trait TextInference: Send + Sync {
    fn infer_text(&self, prompt: &str, timeout: Duration) -> Result<String, EngineError>;
}

// ============================================================================
// Ollama Backend
// ============================================================================

pub struct OllamaBackend {
    pub endpoint: String,
    pub model: String,
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "qwen2.5:1.5b".to_string(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        }
    }
}

impl TextInference for OllamaBackend {
    fn infer_text(&self, prompt: &str, timeout: Duration) -> Result<String, EngineError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ClassificationService(e.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::ClassificationService(e.to_string()))?;

        let body: OllamaResponse = response
            .json()
            .map_err(|e| EngineError::ClassificationService(e.to_string()))?;
        Ok(body.response)
    }
}

// ============================================================================
// Mock Backend (for testing without Ollama)
// ============================================================================

/// Returns a canned response for every prompt.
pub struct MockTextInference {
    pub response: String,
}

impl TextInference for MockTextInference {
    fn infer_text(&self, _prompt: &str, _timeout: Duration) -> Result<String, EngineError> {
        Ok(self.response.clone())
    }
}
