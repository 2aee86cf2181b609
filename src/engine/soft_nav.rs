// Soft-navigation session wiring
//
// Platform paint observers are one-shot and page-load-only, so a navigation
// session approximates its paint metrics from structure instead:
//
// - fcp: the first mutation batch that inserts non-empty text or an image
// - lcp: presence of any large content candidate, checked one frame after
//   the first mutation past a short settle delay; an image load resolves it
//   as a fallback
// - dom-ready: stamped on the first frame, refined downward by mutation
//   activity (the earliest observed time wins)
// - load-complete: document ready state reaching complete, observed through
//   a double frame, the load lifecycle event, or a one-shot fallback check
// - first-paint / tti: fixed-ratio and fixed-pad derivations of load-complete
//
// The structural watcher and the tracking guard live only for the detection
// window; layout-shift and long-task observers stay attached until the next
// navigation supersedes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::dom::{NodeId, NodeKind, ReadyState};
use crate::error::log_observe_error;
use crate::feed::{
    ChangeNotification, LifecycleEvent, ObservationFeed, SubscriptionId, WatchedAttribute,
};
use crate::metrics::{duration_to_ms, MetricKey, TrackingMode};
use crate::telemetry::{self, TrackerEvent};

use super::{SessionId, TrackerHandle};

impl TrackerHandle {
    /// Start a navigation session, superseding any active one. Invoked by
    /// the navigation detector; also callable directly by hosts with their
    /// own routing signal.
    pub fn start_navigation_session(self: &Arc<Self>) -> SessionId {
        let now = self.time.now();
        let count = self.navigation_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.navigation_guard.store(true, Ordering::SeqCst);

        // The previous session's subscriptions and timers die here, before
        // the metric reset, so no straggler can write into the fresh set.
        let session = self.sessions.begin(TrackingMode::Navigation, now);
        self.store.reset_navigation();
        self.tbt.lock().expect("tbt accumulator poisoned").reset();
        self.cls.lock().expect("cls accumulator poisoned").reset();

        telemetry::hub().publish(TrackerEvent::SessionStarted {
            mode: TrackingMode::Navigation,
            session: session.0,
            navigation_count: count,
        });
        tracing::info!(
            "[TrackerHandle] navigation session {} started (#{})",
            session,
            count
        );

        self.register_shift_and_task_observers(session, TrackingMode::Navigation);
        self.start_stability(session, TrackingMode::Navigation, now);

        let watcher = SoftNavWatcher::start(self, session, now);

        // Detection window: disconnect the structural watcher and clear the
        // tracking guard after the ceiling, leaving the session's shift/task
        // observers attached until superseded.
        let weak = Arc::downgrade(self);
        let timer = self.scheduler.schedule_once(
            Duration::from_millis(self.config.navigation.detection_ceiling_ms),
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    handle.navigation_guard.store(false, Ordering::SeqCst);
                    watcher.disconnect(handle.feed.as_ref());
                }
            }),
        );
        self.sessions.attach_timer(session, timer);

        session
    }

    /// Navigation dom-ready refinement: the earliest observed
    /// time-since-session-start wins.
    fn refine_navigation_dom_ready(&self, session: SessionId, elapsed_ms: f64) {
        if !self.sessions.is_active(session) {
            return;
        }
        let current = self.store.get(TrackingMode::Navigation, MetricKey::DomReady);
        if current.map_or(true, |v| v > elapsed_ms) {
            self.write_metric(
                session,
                TrackingMode::Navigation,
                MetricKey::DomReady,
                elapsed_ms,
            );
        }
    }
}

/// Structural FCP/LCP detection for one navigation session.
struct SoftNavWatcher {
    handle: Weak<TrackerHandle>,
    session: SessionId,
    started_at: Instant,
    fcp_seen: AtomicBool,
    lcp_seen: AtomicBool,
    load_tracked: AtomicBool,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl SoftNavWatcher {
    fn start(handle: &Arc<TrackerHandle>, session: SessionId, started_at: Instant) -> Arc<Self> {
        let watcher = Arc::new(Self {
            handle: Arc::downgrade(handle),
            session,
            started_at,
            fcp_seen: AtomicBool::new(false),
            lcp_seen: AtomicBool::new(false),
            load_tracked: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        });

        // Structural mutation stream, restricted to the attributes routers
        // actually touch while swapping views.
        let w = Arc::clone(&watcher);
        match handle.feed.observe_mutations(
            handle.view.root(),
            &[WatchedAttribute::Style, WatchedAttribute::Src],
            Arc::new(move |batch| w.on_mutation_batch(batch)),
        ) {
            Ok(sub) => watcher.attach(handle, sub),
            Err(err) => log_observe_error(&err, "soft-nav structural observer"),
        }

        let w = Arc::clone(&watcher);
        match handle
            .feed
            .observe_image_loads(Arc::new(move |node| w.on_image_load(node)))
        {
            Ok(sub) => watcher.attach(handle, sub),
            Err(err) => log_observe_error(&err, "soft-nav image loads"),
        }

        let w = Arc::clone(&watcher);
        match handle.feed.observe_lifecycle(Arc::new(move |event| {
            if event == LifecycleEvent::Load {
                w.mark_load_complete();
            }
        })) {
            Ok(sub) => watcher.attach(handle, sub),
            Err(err) => log_observe_error(&err, "soft-nav lifecycle"),
        }

        // First frame stamps dom-ready.
        let w = Arc::clone(&watcher);
        handle.scheduler.request_frame(Box::new(move || {
            w.stamp_dom_ready();
        }));

        watcher.probe_ready_state(handle);
        watcher
    }

    fn attach(&self, handle: &Arc<TrackerHandle>, sub: SubscriptionId) {
        self.subscriptions
            .lock()
            .expect("watcher subscriptions poisoned")
            .push(sub);
        handle.sessions.attach_subscription(self.session, sub);
    }

    /// Load-complete detection: immediate double-frame path when the
    /// document is already complete, otherwise a one-shot fallback check
    /// alongside the lifecycle event.
    fn probe_ready_state(self: &Arc<Self>, handle: &Arc<TrackerHandle>) {
        if handle.view.ready_state() == ReadyState::Complete {
            let w = Arc::clone(self);
            let scheduler = Arc::clone(&handle.scheduler);
            handle.scheduler.request_frame(Box::new(move || {
                let w2 = Arc::clone(&w);
                scheduler.request_frame(Box::new(move || {
                    w2.mark_load_complete();
                }));
            }));
        } else {
            let w = Arc::clone(self);
            let timer = handle.scheduler.schedule_once(
                Duration::from_millis(handle.config.timing.load_fallback_delay_ms),
                Box::new(move || {
                    let Some(handle) = w.handle.upgrade() else {
                        return;
                    };
                    if handle.view.ready_state() == ReadyState::Complete {
                        w.mark_load_complete();
                    }
                }),
            );
            handle.sessions.attach_timer(self.session, timer);
        }
    }

    fn elapsed_ms(&self, handle: &TrackerHandle) -> f64 {
        duration_to_ms(
            handle
                .time
                .now()
                .saturating_duration_since(self.started_at),
        )
    }

    fn on_mutation_batch(self: &Arc<Self>, batch: Vec<ChangeNotification>) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        if !handle.sessions.is_active(self.session) {
            return;
        }
        let elapsed = self.elapsed_ms(&handle);

        handle.refine_navigation_dom_ready(self.session, elapsed);

        if !self.fcp_seen.load(Ordering::SeqCst)
            && batch.iter().any(|change| self.inserts_content(&handle, change))
            && !self.fcp_seen.swap(true, Ordering::SeqCst)
        {
            handle.write_metric(
                self.session,
                TrackingMode::Navigation,
                MetricKey::Fcp,
                elapsed,
            );
        }

        if !self.lcp_seen.load(Ordering::SeqCst)
            && elapsed > handle.config.timing.lcp_settle_delay_ms
        {
            // One more frame so layout reflects the insertion before the
            // large-content probe runs.
            let w = Arc::clone(self);
            handle.scheduler.request_frame(Box::new(move || {
                w.resolve_lcp_candidate();
            }));
        }
    }

    fn inserts_content(&self, handle: &TrackerHandle, change: &ChangeNotification) -> bool {
        let ChangeNotification::NodesAdded { added, .. } = change else {
            return false;
        };
        added.iter().any(|node| match handle.view.node_kind(*node) {
            Some(NodeKind::Text) => handle
                .view
                .text_content(*node)
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false),
            Some(NodeKind::Element) => {
                handle.view.tag_name(*node).as_deref() == Some("img")
                    || handle
                        .view
                        .text_content(*node)
                        .map(|t| !t.trim().is_empty())
                        .unwrap_or(false)
            }
            None => false,
        })
    }

    fn resolve_lcp_candidate(&self) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        if !handle.sessions.is_active(self.session) {
            return;
        }
        if handle.view.large_content_candidates() == 0 {
            return;
        }
        if self.lcp_seen.swap(true, Ordering::SeqCst) {
            return;
        }
        let elapsed = self.elapsed_ms(&handle);
        handle.write_metric(
            self.session,
            TrackingMode::Navigation,
            MetricKey::Lcp,
            elapsed,
        );
    }

    /// Image load fallback for the LCP proxy.
    fn on_image_load(&self, _node: NodeId) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        if !handle.sessions.is_active(self.session) {
            return;
        }
        if self.lcp_seen.swap(true, Ordering::SeqCst) {
            return;
        }
        let elapsed = self.elapsed_ms(&handle);
        handle.write_metric(
            self.session,
            TrackingMode::Navigation,
            MetricKey::Lcp,
            elapsed,
        );
    }

    fn stamp_dom_ready(&self) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        let elapsed = self.elapsed_ms(&handle);
        handle.refine_navigation_dom_ready(self.session, elapsed);
    }

    /// Record load-complete once, deriving first-paint and scheduling the
    /// TTI approximation from it.
    fn mark_load_complete(self: &Arc<Self>) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        if !handle.sessions.is_active(self.session) {
            return;
        }
        if self.load_tracked.swap(true, Ordering::SeqCst) {
            return;
        }

        let load_complete = self.elapsed_ms(&handle);
        handle.write_metric(
            self.session,
            TrackingMode::Navigation,
            MetricKey::LoadComplete,
            load_complete,
        );
        handle.write_metric(
            self.session,
            TrackingMode::Navigation,
            MetricKey::FirstPaint,
            load_complete * handle.config.timing.navigation_first_paint_ratio,
        );

        let tti_pad = handle.config.timing.navigation_tti_pad_ms;
        let session = self.session;
        let weak = Weak::clone(&self.handle);
        let timer = handle.scheduler.schedule_once(
            Duration::from_millis(tti_pad as u64),
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    handle.write_metric(
                        session,
                        TrackingMode::Navigation,
                        MetricKey::Tti,
                        load_complete + tti_pad,
                    );
                }
            }),
        );
        handle.sessions.attach_timer(self.session, timer);
    }

    /// Drop the structural subscriptions at the end of the detection window.
    fn disconnect(&self, feed: &dyn ObservationFeed) {
        let subs: Vec<_> = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .expect("watcher subscriptions poisoned"),
        );
        for sub in subs {
            feed.disconnect(sub);
        }
    }
}
