use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::page::page_model::{ComputedStyle, RawElement, RawPage, Rect, Viewport};

/// Opaque reference to a live DOM node, valid until the page changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

/// Computed style and geometry of a live element, read at call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStyle {
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub viewport: Viewport,
}

/// Browser-automation primitives the engine consumes.
///
/// Every call blocks until the browser answers. Implementations own exactly
/// one page; callers must not share a driver between concurrent resolutions.
pub trait PageDriver {
    /// Read every interactive element of the current page.
    fn query_snapshot(&mut self) -> Result<RawPage, DriverError>;

    /// First element matching `selector` that becomes visible within `timeout`.
    fn find_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError>;

    /// Identifier, attribute and context read of a live element.
    fn describe(&mut self, handle: &ElementHandle) -> Result<RawElement, DriverError>;

    fn computed_style(&mut self, handle: &ElementHandle) -> Result<LiveStyle, DriverError>;

    fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError>;

    fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError>;

    fn scroll_position(&mut self) -> Result<f64, DriverError>;

    fn scroll_to(&mut self, y: f64) -> Result<(), DriverError>;
}
