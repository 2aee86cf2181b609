//! Document inspection surface consumed by the classifiers.
//!
//! The core never touches a real document directly. Hosts implement
//! [`DocumentView`] over their live document; tests implement it over an
//! in-memory fixture. Every inspection call is fallible by design: nodes can
//! detach between the mutation that referenced them and the frame that
//! classifies them, and callers are expected to collapse failures to the
//! conservative verdict rather than propagate them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to a node in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Coarse node classification; anything else is invisible to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Element,
    Text,
}

/// Axis-aligned box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// True when the box has collapsed to a point (zero width and height).
    pub fn is_collapsed(&self) -> bool {
        self.width() == 0.0 && self.height() == 0.0
    }

    /// Overlap test used both for viewport intersection and clip checks.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right < other.left
            || self.left > other.right
            || self.bottom < other.top
            || self.top > other.bottom)
    }
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn as_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// Resolved `display` value, reduced to what classification needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    #[default]
    Block,
    Inline,
    Flex,
    Grid,
    None,
    Other,
}

/// Resolved `visibility` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityStyle {
    #[default]
    Visible,
    Hidden,
    Collapse,
}

/// Resolved `overflow` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStyle {
    #[default]
    Visible,
    Hidden,
    Scroll,
    Auto,
}

/// Iteration count of a named CSS animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationCount {
    Finite(f32),
    Infinite,
}

/// A named, non-`none` animation on an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationStyle {
    pub name: String,
    pub iteration_count: IterationCount,
}

impl AnimationStyle {
    pub fn is_looping(&self) -> bool {
        matches!(self.iteration_count, IterationCount::Infinite)
    }
}

/// Computed style snapshot for one element, limited to the properties the
/// visibility heuristics consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: DisplayStyle,
    pub visibility: VisibilityStyle,
    pub opacity: f32,
    pub overflow: OverflowStyle,
    pub animation: Option<AnimationStyle>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: DisplayStyle::default(),
            visibility: VisibilityStyle::default(),
            opacity: 1.0,
            overflow: OverflowStyle::default(),
            animation: None,
        }
    }
}

impl ComputedStyle {
    /// True when the style alone prevents the element from rendering.
    pub fn hides_element(&self) -> bool {
        self.display == DisplayStyle::None
            || self.visibility != VisibilityStyle::Visible
            || self.opacity <= 0.0
    }
}

/// Document parse/load phase, mirroring the host's ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Failure inspecting a node's geometry or style.
///
/// Inspection can fail at any time (node detached mid-check, host refused the
/// query). Callers in the classification path never surface this; they fall
/// back to the conservative verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectError {
    pub reason: String,
}

impl InspectError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn detached(node: NodeId) -> Self {
        Self::new(format!("{} is detached", node))
    }
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node inspection failed: {}", self.reason)
    }
}

impl std::error::Error for InspectError {}

/// Read-only view of the live document.
///
/// All methods that return `Option` treat `None` as "node unknown or
/// detached"; the fallible methods report inspection failures that the
/// classifiers collapse to their conservative answers.
pub trait DocumentView: Send + Sync {
    /// Root node the tracker observes (typically the document body).
    fn root(&self) -> NodeId;

    fn node_kind(&self, node: NodeId) -> Option<NodeKind>;

    /// Lowercased tag name for element nodes.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn element_id(&self, node: NodeId) -> Option<String>;

    /// Space-separated class attribute, as-is.
    fn class_name(&self, node: NodeId) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Text content of the node and its descendants.
    fn text_content(&self, node: NodeId) -> Option<String>;

    fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, InspectError>;

    /// Rendered box in viewport coordinates.
    fn bounding_rect(&self, node: NodeId) -> Result<Rect, InspectError>;

    fn viewport(&self) -> Size;

    /// True when the node is an SVG containing an animation element.
    fn contains_svg_animation(&self, node: NodeId) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// Number of elements that qualify as "large" content for the
    /// soft-navigation LCP proxy: images, videos, background-styled blocks,
    /// and headings.
    fn large_content_candidates(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_collapse_and_intersection() {
        let collapsed = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert!(collapsed.is_collapsed());

        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 150.0, 150.0);
        let c = Rect::new(200.0, 200.0, 300.0, 300.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn style_hides_element() {
        let mut style = ComputedStyle::default();
        assert!(!style.hides_element());

        style.display = DisplayStyle::None;
        assert!(style.hides_element());

        style.display = DisplayStyle::Block;
        style.opacity = 0.0;
        assert!(style.hides_element());

        style.opacity = 1.0;
        style.visibility = VisibilityStyle::Hidden;
        assert!(style.hides_element());
    }

    #[test]
    fn looping_animation_detection() {
        let finite = AnimationStyle {
            name: "pulse".to_string(),
            iteration_count: IterationCount::Finite(3.0),
        };
        let infinite = AnimationStyle {
            name: "spin".to_string(),
            iteration_count: IterationCount::Infinite,
        };
        assert!(!finite.is_looping());
        assert!(infinite.is_looping());
    }
}
