//! Tracker telemetry collector and helpers.
//!
//! The collector multiplexes metric updates, session lifecycle, and address
//! changes into a bounded history plus an async broadcast stream, for
//! consumption by diagnostics surfaces (CLI, debug HTTP) without touching
//! the metric store itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub mod events;

pub use events::TrackerEvent;

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryCollector> = Lazy::new(TelemetryCollector::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryCollector {
    &HUB
}

/// Snapshot of collector state for HTTP/CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<TrackerEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<TrackerEvent>,
    history: Mutex<VecDeque<TrackerEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: TrackerEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().expect("history poisoned");
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().expect("history poisoned");
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricKey, TrackingMode};

    #[test]
    fn test_publish_retains_history_and_broadcasts() {
        let collector = TelemetryCollector::new(8, 4);
        let mut rx = collector.subscribe();

        let event = TrackerEvent::MetricUpdated {
            mode: TrackingMode::PageLoad,
            key: MetricKey::Fcp,
            value: 120.0,
            timestamp_ms: 120,
        };
        collector.publish(event.clone());

        assert_eq!(rx.try_recv().unwrap(), event);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_events, 1);
        assert_eq!(snapshot.recent.len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = TelemetryCollector::new(8, 2);
        for i in 0..5 {
            collector.publish(TrackerEvent::SessionEnded { session: i });
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 5);
        assert_eq!(snapshot.dropped_events, 3);
        assert_eq!(
            snapshot.recent[1],
            TrackerEvent::SessionEnded { session: 4 }
        );
    }
}
