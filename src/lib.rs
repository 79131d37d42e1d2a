//! Adaptive form-field resolution with honeypot detection.
//!
//! Pipeline: `page` reads a snapshot, `analysis` scores and classifies every
//! element and merges in an optional AI suggestion, `resolver` binds a purpose
//! to a live element and learns which selectors work. `engine::FieldEngine`
//! ties them together for an orchestrator.

pub mod analysis;
pub mod browser;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod page;
pub mod resolver;
pub mod trace;

pub use analysis::analysis_model::{AnalysisResult, HoneypotVerdict, ResolvedFieldSpec, SiteContext};
pub use analysis::purpose::FieldPurpose;
pub use browser::driver::{ElementHandle, PageDriver};
pub use config::EngineConfig;
pub use engine::FieldEngine;
pub use error::{DriverError, EngineError};
pub use resolver::ResolvedElement;
pub use resolver::stats::ResolverStats;
