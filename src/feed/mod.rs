//! Observation feed abstractions for the tracker core.
//!
//! The feed is the crate's only window onto the live document: categorized
//! timing samples, the raw DOM-mutation stream, document lifecycle events,
//! and resource signals all arrive through callbacks registered here. Hosts
//! bind this trait to their platform observers; the deterministic test feed
//! lives in [`crate::testing`].

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::error::ObserveError;

pub mod scheduler;

pub use scheduler::{RepeatingTask, ScheduledTask, Scheduler, TimerId, TokioScheduler};

/// Identifier for an active feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Observation categories the feed can supply.
///
/// Paint and largest-contentful-paint observers are one-shot per process
/// (page-load-scoped by platform contract); layout-shift and long-task
/// observers support re-registration per navigation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationCategory {
    Paint,
    LargestContentfulPaint,
    LayoutShift,
    LongTask,
    Mutation,
    Lifecycle,
    ImageLoad,
    Resize,
}

impl ObservationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationCategory::Paint => "paint",
            ObservationCategory::LargestContentfulPaint => "largest-contentful-paint",
            ObservationCategory::LayoutShift => "layout-shift",
            ObservationCategory::LongTask => "longtask",
            ObservationCategory::Mutation => "mutation",
            ObservationCategory::Lifecycle => "lifecycle",
            ObservationCategory::ImageLoad => "image-load",
            ObservationCategory::Resize => "resize",
        }
    }
}

/// Attribute allow-list for mutation subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedAttribute {
    Style,
    Class,
    Src,
    Width,
    Height,
    Display,
}

impl WatchedAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchedAttribute::Style => "style",
            WatchedAttribute::Class => "class",
            WatchedAttribute::Src => "src",
            WatchedAttribute::Width => "width",
            WatchedAttribute::Height => "height",
            WatchedAttribute::Display => "display",
        }
    }

    /// The full allow-list, in declaration order.
    pub const ALL: [WatchedAttribute; 6] = [
        WatchedAttribute::Style,
        WatchedAttribute::Class,
        WatchedAttribute::Src,
        WatchedAttribute::Width,
        WatchedAttribute::Height,
        WatchedAttribute::Display,
    ];
}

/// One raw change notification from the document's mutation stream.
///
/// Ephemeral: consumed within one animation-frame batch, never persisted.
#[derive(Debug, Clone)]
pub enum ChangeNotification {
    NodesAdded { target: NodeId, added: Vec<NodeId> },
    NodesRemoved { target: NodeId, removed: Vec<NodeId> },
    AttributeChanged {
        target: NodeId,
        attribute: WatchedAttribute,
    },
    TextChanged { target: NodeId },
}

impl ChangeNotification {
    /// The node the notification was delivered against.
    pub fn target(&self) -> NodeId {
        match self {
            ChangeNotification::NodesAdded { target, .. }
            | ChangeNotification::NodesRemoved { target, .. }
            | ChangeNotification::AttributeChanged { target, .. }
            | ChangeNotification::TextChanged { target } => *target,
        }
    }
}

/// Paint timing phases reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintPhase {
    FirstPaint,
    FirstContentfulPaint,
}

/// A paint timing sample (page-load scoped, one-shot per process).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaintSample {
    pub phase: PaintPhase,
    pub start_time_ms: f64,
}

/// A largest-contentful-paint candidate sample.
///
/// Later samples supersede earlier ones; the render time is preferred over
/// the load time when both are present.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LargestContentfulSample {
    pub render_time_ms: Option<f64>,
    pub load_time_ms: Option<f64>,
}

impl LargestContentfulSample {
    pub fn resolved_time_ms(&self) -> Option<f64> {
        self.render_time_ms.or(self.load_time_ms)
    }
}

/// A layout-shift sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutShiftSample {
    pub value: f64,
    pub had_recent_input: bool,
}

/// A long-task sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongTaskSample {
    pub duration_ms: f64,
}

/// Document lifecycle milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    DomContentLoaded,
    Load,
}

/// Navigation-timing entry for the initial document fetch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationTiming {
    pub fetch_start_ms: f64,
    pub dom_content_loaded_event_end_ms: f64,
    pub load_event_end_ms: f64,
}

impl NavigationTiming {
    /// Time from fetch start to the end of the DOMContentLoaded handler.
    pub fn dom_ready_ms(&self) -> f64 {
        self.dom_content_loaded_event_end_ms - self.fetch_start_ms
    }

    /// Time from fetch start to the end of the load handler.
    pub fn load_complete_ms(&self) -> f64 {
        self.load_event_end_ms - self.fetch_start_ms
    }
}

pub type PaintCallback = Arc<dyn Fn(PaintSample) + Send + Sync>;
pub type LargestContentfulCallback = Arc<dyn Fn(LargestContentfulSample) + Send + Sync>;
pub type LayoutShiftCallback = Arc<dyn Fn(LayoutShiftSample) + Send + Sync>;
pub type LongTaskCallback = Arc<dyn Fn(LongTaskSample) + Send + Sync>;
pub type MutationCallback = Arc<dyn Fn(Vec<ChangeNotification>) + Send + Sync>;
pub type LifecycleCallback = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;
pub type ImageLoadCallback = Arc<dyn Fn(NodeId) + Send + Sync>;
pub type ResizeCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of categorized timing samples and the raw mutation stream.
///
/// Registration returns a [`SubscriptionId`] used for teardown; a host that
/// cannot supply a category returns [`ObserveError::FeatureUnavailable`] and
/// the corresponding metric stays unset for the session.
pub trait ObservationFeed: Send + Sync {
    fn observe_paint(&self, cb: PaintCallback) -> Result<SubscriptionId, ObserveError>;

    fn observe_largest_contentful_paint(
        &self,
        cb: LargestContentfulCallback,
    ) -> Result<SubscriptionId, ObserveError>;

    fn observe_layout_shift(&self, cb: LayoutShiftCallback)
        -> Result<SubscriptionId, ObserveError>;

    fn observe_long_tasks(&self, cb: LongTaskCallback) -> Result<SubscriptionId, ObserveError>;

    /// Subscribe to the mutation stream for the subtree rooted at `root`,
    /// restricted to the given attribute allow-list.
    fn observe_mutations(
        &self,
        root: NodeId,
        attributes: &[WatchedAttribute],
        cb: MutationCallback,
    ) -> Result<SubscriptionId, ObserveError>;

    fn observe_lifecycle(&self, cb: LifecycleCallback) -> Result<SubscriptionId, ObserveError>;

    /// Resource `load` events for images in the document.
    fn observe_image_loads(&self, cb: ImageLoadCallback) -> Result<SubscriptionId, ObserveError>;

    fn observe_resize(&self, cb: ResizeCallback) -> Result<SubscriptionId, ObserveError>;

    /// Navigation-timing entry for the initial fetch, if the host records one.
    fn navigation_timing(&self) -> Option<NavigationTiming>;

    /// Current document address.
    fn current_url(&self) -> String;

    /// Tear down a subscription. Unknown ids are ignored.
    fn disconnect(&self, id: SubscriptionId);
}

/// Trait representing a monotonic time source used for metric timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_target() {
        let n = ChangeNotification::AttributeChanged {
            target: NodeId(7),
            attribute: WatchedAttribute::Src,
        };
        assert_eq!(n.target(), NodeId(7));

        let n = ChangeNotification::NodesAdded {
            target: NodeId(1),
            added: vec![NodeId(2), NodeId(3)],
        };
        assert_eq!(n.target(), NodeId(1));
    }

    #[test]
    fn test_lcp_sample_prefers_render_time() {
        let sample = LargestContentfulSample {
            render_time_ms: Some(120.0),
            load_time_ms: Some(200.0),
        };
        assert_eq!(sample.resolved_time_ms(), Some(120.0));

        let sample = LargestContentfulSample {
            render_time_ms: None,
            load_time_ms: Some(200.0),
        };
        assert_eq!(sample.resolved_time_ms(), Some(200.0));
    }

    #[test]
    fn test_navigation_timing_offsets() {
        let timing = NavigationTiming {
            fetch_start_ms: 10.0,
            dom_content_loaded_event_end_ms: 65.0,
            load_event_end_ms: 210.0,
        };
        assert_eq!(timing.dom_ready_ms(), 55.0);
        assert_eq!(timing.load_complete_ms(), 200.0);
    }
}
