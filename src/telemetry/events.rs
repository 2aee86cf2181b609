//! Telemetry event types describing tracker activity exposed to CLI/HTTP
//! diagnostics surfaces.

use serde::{Deserialize, Serialize};

use crate::feed::ObservationCategory;
use crate::metrics::{MetricKey, TrackingMode};
use crate::navigation::AddressChangeKind;

/// Tracker lifecycle and metric events retained by the telemetry hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TrackerEvent {
    MetricUpdated {
        mode: TrackingMode,
        key: MetricKey,
        value: f64,
        timestamp_ms: u64,
    },
    SessionStarted {
        mode: TrackingMode,
        session: u64,
        navigation_count: u64,
    },
    SessionEnded {
        session: u64,
    },
    AddressChanged {
        kind: AddressChangeKind,
        url: String,
    },
    SettleReported {
        mode: TrackingMode,
        elapsed_ms: f64,
    },
    ObserverUnavailable {
        category: ObservationCategory,
    },
}
