// Paint Tracker Core - rendering performance instrumentation
// Measures initial page load and soft-navigation rendering metrics from a
// live document's observation feed.

// Module declarations
pub mod classify;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod metrics;
pub mod navigation;
pub mod stability;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use config::TrackerConfig;
pub use engine::{MetricsReport, SessionId, TrackerHandle};
pub use metrics::{MetricKey, MetricSnapshot, MetricStore, TrackingMode};

/// Initialize global logging for binaries and embedding hosts.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Verify the public surface is wired up; a metric store must be
        // constructible without any collaborators.
        let store = MetricStore::new();
        assert_eq!(store.get(TrackingMode::PageLoad, MetricKey::Fcp), None);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
