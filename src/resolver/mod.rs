pub mod discovery;
pub mod live;
pub mod registry;
pub mod stats;

use serde::Serialize;

use crate::analysis::purpose::FieldPurpose;
use crate::browser::driver::ElementHandle;

/// A purpose bound to one live element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedElement {
    pub purpose: FieldPurpose,
    pub selector: String,
    pub handle: ElementHandle,
    /// Index of the winning candidate; the candidate count when discovered.
    pub depth: usize,
    pub via_discovery: bool,
}
