//! TrackerHandle: orchestration layer for the whole tracker.
//!
//! Owns the metric store, the visibility classifier, the navigation
//! detector, the session-scoped accumulators, and the session registry, and
//! wires feed subscriptions into them. Hosts construct one handle per
//! document, start the page-load session at process start, and install
//! navigation detection once; everything after that is callback-driven.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::classify::VisibilityClassifier;
use crate::config::TrackerConfig;
use crate::dom::DocumentView;
use crate::error::{log_observe_error, ObserveError, SessionError};
use crate::feed::{ObservationFeed, Scheduler, TimeSource};
use crate::metrics::{
    duration_to_ms, BlockingTimeAccumulator, LayoutShiftAccumulator, MetricKey, MetricSnapshot,
    MetricStore, TrackingMode,
};
use crate::navigation::NavigationDetector;
use crate::stability::{SettleSink, StabilityTracker};
use crate::telemetry::{self, TrackerEvent};

mod page_load;
mod session;
mod soft_nav;

pub use session::{SessionId, SessionRegistry};

/// Combined view of both metric sets for diagnostics surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub page_load: MetricSnapshot,
    pub navigation: MetricSnapshot,
    pub navigation_count: u64,
    pub navigation_active: bool,
}

/// Orchestrates sessions, observers, and metric writes.
pub struct TrackerHandle {
    config: TrackerConfig,
    view: Arc<dyn DocumentView>,
    feed: Arc<dyn ObservationFeed>,
    scheduler: Arc<dyn Scheduler>,
    time: Arc<dyn TimeSource>,
    store: Arc<MetricStore>,
    classifier: Arc<VisibilityClassifier>,
    sessions: Arc<SessionRegistry>,
    detector: Mutex<Option<Arc<NavigationDetector>>>,
    /// Process start; page-load metrics are relative to this origin.
    epoch: Instant,
    navigation_count: AtomicU64,
    navigation_guard: Arc<AtomicBool>,
    page_load_started: AtomicBool,
    page_load_finalized: AtomicBool,
    tbt: Mutex<BlockingTimeAccumulator>,
    cls: Mutex<LayoutShiftAccumulator>,
    /// Layout-shift and long-task subscriptions, torn down and recreated at
    /// every navigation boundary.
    shift_task_subs: Mutex<Vec<crate::feed::SubscriptionId>>,
}

impl TrackerHandle {
    pub fn new(
        view: Arc<dyn DocumentView>,
        feed: Arc<dyn ObservationFeed>,
        scheduler: Arc<dyn Scheduler>,
        time: Arc<dyn TimeSource>,
        config: TrackerConfig,
    ) -> Arc<Self> {
        let classifier = Arc::new(VisibilityClassifier::new(
            Arc::clone(&view),
            config.visibility.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&feed),
            Arc::clone(&scheduler),
        ));
        let epoch = time.now();
        let long_task_floor = config.timing.long_task_floor_ms;

        Arc::new(Self {
            config,
            view,
            feed,
            scheduler,
            time,
            store: Arc::new(MetricStore::new()),
            classifier,
            sessions,
            detector: Mutex::new(None),
            epoch,
            navigation_count: AtomicU64::new(0),
            navigation_guard: Arc::new(AtomicBool::new(false)),
            page_load_started: AtomicBool::new(false),
            page_load_finalized: AtomicBool::new(false),
            tbt: Mutex::new(BlockingTimeAccumulator::new(long_task_floor)),
            cls: Mutex::new(LayoutShiftAccumulator::new()),
            shift_task_subs: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The detector, once navigation detection is installed. Hosts wire
    /// their history-mutation and popstate hooks to it.
    pub fn navigation_detector(&self) -> Option<Arc<NavigationDetector>> {
        self.detector
            .lock()
            .expect("detector slot poisoned")
            .clone()
    }

    /// Install the navigation boundary detector once at process start.
    /// Detected address changes start navigation sessions on this handle.
    pub fn install_navigation_detection(self: &Arc<Self>) -> Result<(), SessionError> {
        let mut slot = self.detector.lock().expect("detector slot poisoned");
        if slot.is_some() {
            return Err(SessionError::DetectorAlreadyInstalled);
        }

        let detector = NavigationDetector::new(
            Arc::clone(&self.feed),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.navigation_guard),
            &self.config.navigation,
        );
        detector.install()?;

        let weak = Arc::downgrade(self);
        detector.on_address_change(Arc::new(move |change| {
            if let Some(handle) = weak.upgrade() {
                telemetry::hub().publish(TrackerEvent::AddressChanged {
                    kind: change.kind,
                    url: change.url.clone(),
                });
                handle.start_navigation_session();
            }
        }));

        *slot = Some(detector);
        Ok(())
    }

    /// End a session explicitly. Navigation teardown also clears the
    /// tracking guard.
    pub fn end_session(&self, session: SessionId) -> Result<(), SessionError> {
        match self.sessions.end(session) {
            Some(mode) => {
                if mode == TrackingMode::Navigation {
                    self.navigation_guard.store(false, Ordering::SeqCst);
                }
                telemetry::hub().publish(TrackerEvent::SessionEnded { session: session.0 });
                Ok(())
            }
            None => Err(SessionError::NotActive { session }),
        }
    }

    pub fn is_navigation_active(&self) -> bool {
        self.sessions.has_active(TrackingMode::Navigation)
    }

    pub fn navigation_count(&self) -> u64 {
        self.navigation_count.load(Ordering::SeqCst)
    }

    pub fn metrics_report(&self) -> MetricsReport {
        MetricsReport {
            page_load: self.store.snapshot(TrackingMode::PageLoad),
            navigation: self.store.snapshot(TrackingMode::Navigation),
            navigation_count: self.navigation_count(),
            navigation_active: self.is_navigation_active(),
        }
    }

    // ========================================================================
    // METRIC WRITES (session-gated)
    // ========================================================================

    /// Write a metric on behalf of `session`. A stale session makes this a
    /// silent no-op.
    pub(crate) fn write_metric(
        &self,
        session: SessionId,
        mode: TrackingMode,
        key: MetricKey,
        value: f64,
    ) -> bool {
        if !self.sessions.is_active(session) {
            tracing::trace!(
                "[TrackerHandle] dropping stale {} write from {}",
                key,
                session
            );
            return false;
        }
        let stored = self.store.set(mode, key, value);
        telemetry::hub().publish(TrackerEvent::MetricUpdated {
            mode,
            key,
            value: stored,
            timestamp_ms: self.timestamp_ms(),
        });
        true
    }

    /// Corrective write: applies only while the key is unset, still gated on
    /// the owning session.
    pub(crate) fn write_metric_if_unset(
        &self,
        session: SessionId,
        mode: TrackingMode,
        key: MetricKey,
        value: f64,
    ) -> bool {
        if !self.sessions.is_active(session) {
            return false;
        }
        if !self.store.set_if_unset(mode, key, value) {
            return false;
        }
        telemetry::hub().publish(TrackerEvent::MetricUpdated {
            mode,
            key,
            value: value.max(0.0),
            timestamp_ms: self.timestamp_ms(),
        });
        true
    }

    pub(crate) fn elapsed_since_epoch_ms(&self) -> f64 {
        duration_to_ms(self.time.now().saturating_duration_since(self.epoch))
    }

    fn timestamp_ms(&self) -> u64 {
        self.elapsed_since_epoch_ms() as u64
    }

    // ========================================================================
    // SHARED SESSION WIRING
    // ========================================================================

    /// (Re)register the session-scoped layout-shift and long-task observers.
    /// Previous registrations are disconnected first; paint-timing observers
    /// are never reattached (one-shot per process by platform contract).
    fn register_shift_and_task_observers(self: &Arc<Self>, session: SessionId, mode: TrackingMode) {
        let old: Vec<_> = std::mem::take(
            &mut *self
                .shift_task_subs
                .lock()
                .expect("shift/task subscriptions poisoned"),
        );
        for sub in old {
            self.feed.disconnect(sub);
        }

        let weak = Arc::downgrade(self);
        match self.feed.observe_layout_shift(Arc::new(move |sample| {
            if let Some(handle) = weak.upgrade() {
                if !handle.sessions.is_active(session) {
                    return;
                }
                let total = handle
                    .cls
                    .lock()
                    .expect("cls accumulator poisoned")
                    .observe(sample);
                if let Some(total) = total {
                    handle.write_metric(session, mode, MetricKey::Cls, total);
                }
            }
        })) {
            Ok(sub) => self
                .shift_task_subs
                .lock()
                .expect("shift/task subscriptions poisoned")
                .push(sub),
            Err(err) => self.report_unavailable(err, "layout-shift observer"),
        }

        let weak = Arc::downgrade(self);
        match self.feed.observe_long_tasks(Arc::new(move |sample| {
            if let Some(handle) = weak.upgrade() {
                if !handle.sessions.is_active(session) {
                    return;
                }
                let total = handle
                    .tbt
                    .lock()
                    .expect("tbt accumulator poisoned")
                    .observe(sample);
                if let Some(total) = total {
                    handle.write_metric(session, mode, MetricKey::Tbt, total);
                }
            }
        })) {
            Ok(sub) => self
                .shift_task_subs
                .lock()
                .expect("shift/task subscriptions poisoned")
                .push(sub),
            Err(err) => self.report_unavailable(err, "long-task observer"),
        }
    }

    /// Start the settle detector for a session.
    fn start_stability(self: &Arc<Self>, session: SessionId, mode: TrackingMode, started_at: Instant) {
        let weak = Arc::downgrade(self);
        let sink: SettleSink = Box::new(move |elapsed_ms| {
            if let Some(handle) = weak.upgrade() {
                if handle.write_metric(session, mode, MetricKey::LastPixelChange, elapsed_ms) {
                    telemetry::hub().publish(TrackerEvent::SettleReported { mode, elapsed_ms });
                }
            }
        });

        let tracker = StabilityTracker::new(
            mode,
            started_at,
            self.config.stability.clone(),
            Arc::clone(&self.classifier),
            Arc::clone(&self.view),
            Arc::clone(&self.feed),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.time),
            sink,
        );
        if let Err(err) = tracker.begin() {
            self.report_unavailable(err, "mutation stability tracking");
        }
        self.sessions.attach_stability(session, tracker);
    }

    fn report_unavailable(&self, err: ObserveError, context: &str) {
        if let ObserveError::FeatureUnavailable { category } = &err {
            telemetry::hub().publish(TrackerEvent::ObserverUnavailable {
                category: *category,
            });
        }
        log_observe_error(&err, context);
    }
}
