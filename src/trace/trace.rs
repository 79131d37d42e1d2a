use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analysis::purpose::FieldPurpose;

/// How one resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved,
    Discovered,
    Failed,
}

/// One line of the resolution trace file.
#[derive(Debug, Serialize)]
pub struct ResolutionTraceEvent {
    pub timestamp_ms: u128,
    pub purpose: FieldPurpose,
    pub outcome: ResolutionOutcome,

    pub selector: Option<String>,
    pub depth: Option<usize>,

    pub candidates_tried: Vec<String>,
    pub skipped_as_honeypot: Vec<String>,

    pub promoted: bool,
    pub snapshot_fingerprint: Option<String>,
    pub elapsed_ms: u128,
}

impl ResolutionTraceEvent {
    pub fn now(purpose: FieldPurpose, outcome: ResolutionOutcome) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            purpose,
            outcome,
            selector: None,
            depth: None,
            candidates_tried: vec![],
            skipped_as_honeypot: vec![],
            promoted: false,
            snapshot_fingerprint: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_selector(mut self, selector: impl ToString, depth: usize) -> Self {
        self.selector = Some(selector.to_string());
        self.depth = Some(depth);
        self
    }

    pub fn with_candidates(mut self, tried: &[String]) -> Self {
        self.candidates_tried = tried.to_vec();
        self
    }

    pub fn with_skipped(mut self, skipped: &[String]) -> Self {
        self.skipped_as_honeypot = skipped.to_vec();
        self
    }

    pub fn with_promotion(mut self, promoted: bool) -> Self {
        self.promoted = promoted;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl ToString) -> Self {
        self.snapshot_fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn with_elapsed(mut self, elapsed_ms: u128) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}
