// Mutation stability tracker - "time to last visible change" detection
//
// One tracker instance exists per tracking session. It consumes the raw
// mutation stream, filters it through the visibility classifier, and decides
// the instant at which the visible page stops changing:
//
// 1. Incoming batches are queued and processing is deferred by two
//    consecutive animation frames, so the rendering engine has applied layout
//    before geometry is inspected.
// 2. A batch containing at least one qualifying change stamps lastChangeTime
//    and (re)arms a fixed inactivity timer.
// 3. When the timer fires with no newer change inside the window (minus a
//    small late-fire tolerance), the elapsed time since session start is
//    reported exactly once through the settle sink.
//
// Image load events and debounced window resizes are synthesized into pseudo
// attribute changes so they ride the same classification and debounce path.
// A per-mode ceiling bounds the tracker's lifetime on pages that never go
// quiet.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::classify::VisibilityClassifier;
use crate::config::StabilityConfig;
use crate::dom::DocumentView;
use crate::error::{log_observe_error, ObserveError};
use crate::feed::{
    ChangeNotification, ObservationFeed, Scheduler, SubscriptionId, TimeSource, TimerId,
    WatchedAttribute,
};
use crate::metrics::TrackingMode;

/// Receives the settle report: elapsed milliseconds from session start.
pub type SettleSink = Box<dyn Fn(f64) + Send + Sync>;

struct TrackerState {
    pending: Vec<ChangeNotification>,
    frame_scheduled: bool,
    last_change: Option<Instant>,
    inactivity_timer: Option<TimerId>,
    resize_timer: Option<TimerId>,
    ceiling_timer: Option<TimerId>,
    subscriptions: Vec<SubscriptionId>,
    finalized: bool,
    stopped: bool,
}

/// Settle detector for one tracking session.
pub struct StabilityTracker {
    mode: TrackingMode,
    started_at: Instant,
    config: StabilityConfig,
    classifier: Arc<VisibilityClassifier>,
    view: Arc<dyn DocumentView>,
    feed: Arc<dyn ObservationFeed>,
    scheduler: Arc<dyn Scheduler>,
    time: Arc<dyn TimeSource>,
    sink: SettleSink,
    state: Mutex<TrackerState>,
}

impl StabilityTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: TrackingMode,
        started_at: Instant,
        config: StabilityConfig,
        classifier: Arc<VisibilityClassifier>,
        view: Arc<dyn DocumentView>,
        feed: Arc<dyn ObservationFeed>,
        scheduler: Arc<dyn Scheduler>,
        time: Arc<dyn TimeSource>,
        sink: SettleSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            mode,
            started_at,
            config,
            classifier,
            view,
            feed,
            scheduler,
            time,
            sink,
            state: Mutex::new(TrackerState {
                pending: Vec::new(),
                frame_scheduled: false,
                last_change: None,
                inactivity_timer: None,
                resize_timer: None,
                ceiling_timer: None,
                subscriptions: Vec::new(),
                finalized: false,
                stopped: false,
            }),
        })
    }

    /// Subscribe to the mutation stream and supplementary signals, and arm
    /// the per-mode ceiling.
    pub fn begin(self: &Arc<Self>) -> Result<(), ObserveError> {
        let weak = Arc::downgrade(self);
        let mutation_sub = self.feed.observe_mutations(
            self.view.root(),
            &self.config.watched_attributes,
            Arc::new(move |batch| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.enqueue(batch);
                }
            }),
        )?;
        self.lock_state().subscriptions.push(mutation_sub);

        // Supplementary signals are best-effort; a host without them just
        // loses those triggers.
        let weak = Arc::downgrade(self);
        match self.feed.observe_image_loads(Arc::new(move |node| {
            if let Some(tracker) = weak.upgrade() {
                tracker.on_image_load(node);
            }
        })) {
            Ok(sub) => self.lock_state().subscriptions.push(sub),
            Err(err) => log_observe_error(&err, "StabilityTracker image loads"),
        }

        let weak = Arc::downgrade(self);
        match self.feed.observe_resize(Arc::new(move || {
            if let Some(tracker) = weak.upgrade() {
                tracker.on_resize();
            }
        })) {
            Ok(sub) => self.lock_state().subscriptions.push(sub),
            Err(err) => log_observe_error(&err, "StabilityTracker resize"),
        }

        let ceiling_ms = match self.mode {
            TrackingMode::PageLoad => self.config.page_load_ceiling_ms,
            TrackingMode::Navigation => self.config.navigation_ceiling_ms,
        };
        let weak = Arc::downgrade(self);
        let ceiling = self.scheduler.schedule_once(
            Duration::from_millis(ceiling_ms),
            Box::new(move || {
                if let Some(tracker) = weak.upgrade() {
                    tracing::debug!(
                        "[StabilityTracker] {} ceiling reached, stopping",
                        tracker.mode
                    );
                    tracker.stop();
                }
            }),
        );
        self.lock_state().ceiling_timer = Some(ceiling);

        tracing::debug!("[StabilityTracker] {} session tracking started", self.mode);
        Ok(())
    }

    /// Append a batch and schedule the double-frame processing pass.
    pub fn enqueue(self: &Arc<Self>, batch: Vec<ChangeNotification>) {
        let schedule = {
            let mut state = self.lock_state();
            if state.stopped || state.finalized {
                return;
            }
            state.pending.extend(batch);
            if state.frame_scheduled {
                false
            } else {
                state.frame_scheduled = true;
                true
            }
        };

        if schedule {
            let weak = Arc::downgrade(self);
            self.scheduler.request_frame(Box::new(move || {
                if let Some(tracker) = weak.upgrade() {
                    let weak = Arc::downgrade(&tracker);
                    tracker.scheduler.request_frame(Box::new(move || {
                        if let Some(tracker) = weak.upgrade() {
                            tracker.process_pending();
                        }
                    }));
                }
            }));
        }
    }

    /// Classify the pending batch after layout has settled.
    fn process_pending(self: &Arc<Self>) {
        let batch = {
            let mut state = self.lock_state();
            state.frame_scheduled = false;
            if state.stopped || state.finalized {
                state.pending.clear();
                return;
            }
            std::mem::take(&mut state.pending)
        };

        let qualifying = batch.iter().any(|change| {
            let target = change.target();
            !self.classifier.is_ignored_subtree(target)
                && self.classifier.is_visible_mutation(change)
        });
        if !qualifying {
            return;
        }

        let now = self.time.now();
        let stale = {
            let mut state = self.lock_state();
            if state.stopped || state.finalized {
                return;
            }
            state.last_change = Some(now);
            state.inactivity_timer.take()
        };
        if let Some(timer) = stale {
            self.scheduler.cancel(timer);
        }

        let weak = Arc::downgrade(self);
        let timer = self.scheduler.schedule_once(
            Duration::from_millis(self.config.inactivity_threshold_ms),
            Box::new(move || {
                if let Some(tracker) = weak.upgrade() {
                    tracker.settle_check();
                }
            }),
        );
        self.lock_state().inactivity_timer = Some(timer);
    }

    /// Inactivity timer fired; verify the window really elapsed before
    /// finalizing. A timer that fired late after newer changes rearmed it
    /// reports nothing.
    fn settle_check(self: &Arc<Self>) {
        let last = {
            let state = self.lock_state();
            if state.stopped || state.finalized {
                return;
            }
            state.last_change
        };
        let Some(last) = last else {
            return;
        };

        let now = self.time.now();
        let elapsed_ms = now.saturating_duration_since(last).as_millis() as u64;
        let floor = self
            .config
            .inactivity_threshold_ms
            .saturating_sub(self.config.settle_tolerance_ms);
        if elapsed_ms >= floor {
            self.finalize(now);
        }
    }

    /// Report the settle exactly once.
    fn finalize(&self, at: Instant) {
        {
            let mut state = self.lock_state();
            if state.finalized {
                return;
            }
            state.finalized = true;
            if let Some(timer) = state.inactivity_timer.take() {
                self.scheduler.cancel(timer);
            }
        }

        let elapsed_ms =
            crate::metrics::duration_to_ms(at.saturating_duration_since(self.started_at));
        tracing::info!(
            "[StabilityTracker] {} settled at {:.0}ms",
            self.mode,
            elapsed_ms
        );
        (self.sink)(elapsed_ms);
    }

    /// Disconnect subscriptions and cancel timers. Idempotent; called by the
    /// ceiling timeout and by session teardown. A pending inactivity timer
    /// forces one final settle report from the last known change time.
    pub fn stop(&self) {
        let (subs, timers, pending_settle) = {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.pending.clear();

            let subs = std::mem::take(&mut state.subscriptions);
            let mut timers = Vec::new();
            let had_inactivity = state.inactivity_timer.is_some();
            timers.extend(state.inactivity_timer.take());
            timers.extend(state.resize_timer.take());
            timers.extend(state.ceiling_timer.take());

            let pending_settle = (had_inactivity && !state.finalized)
                .then_some(state.last_change)
                .flatten();
            (subs, timers, pending_settle)
        };

        for sub in subs {
            self.feed.disconnect(sub);
        }
        for timer in timers {
            self.scheduler.cancel(timer);
        }
        if let Some(last) = pending_settle {
            self.finalize(last);
        }
        tracing::debug!("[StabilityTracker] {} session tracking stopped", self.mode);
    }

    /// Image finished loading: ride the classification path as a pseudo
    /// `src` change unless the image is ignorable or invisible.
    fn on_image_load(self: &Arc<Self>, node: crate::dom::NodeId) {
        if self.classifier.is_ignored_subtree(node) || !self.classifier.is_visible(node) {
            return;
        }
        self.enqueue(vec![ChangeNotification::AttributeChanged {
            target: node,
            attribute: WatchedAttribute::Src,
        }]);
    }

    /// Window resized: debounce, then synthesize a style change on the root.
    fn on_resize(self: &Arc<Self>) {
        let stale = {
            let mut state = self.lock_state();
            if state.stopped || state.finalized {
                return;
            }
            state.resize_timer.take()
        };
        if let Some(timer) = stale {
            self.scheduler.cancel(timer);
        }

        let weak = Arc::downgrade(self);
        let timer = self.scheduler.schedule_once(
            Duration::from_millis(self.config.resize_debounce_ms),
            Box::new(move || {
                if let Some(tracker) = weak.upgrade() {
                    tracker.lock_state().resize_timer = None;
                    let root = tracker.view.root();
                    tracker.enqueue(vec![ChangeNotification::AttributeChanged {
                        target: root,
                        attribute: WatchedAttribute::Style,
                    }]);
                }
            }),
        );
        self.lock_state().resize_timer = Some(timer);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("stability tracker poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisibilityConfig;
    use crate::dom::{ComputedStyle, DisplayStyle};
    use crate::testing::{FixtureDocument, ManualClock, ManualScheduler, ScriptedFeed};

    struct Harness {
        doc: Arc<FixtureDocument>,
        feed: Arc<ScriptedFeed>,
        scheduler: Arc<ManualScheduler>,
        reports: Arc<Mutex<Vec<f64>>>,
        tracker: Arc<StabilityTracker>,
    }

    fn harness(mode: TrackingMode) -> Harness {
        let doc = Arc::new(FixtureDocument::new());
        let feed = Arc::new(ScriptedFeed::new("https://example.test/"));
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
        let classifier = Arc::new(VisibilityClassifier::new(
            Arc::clone(&doc) as Arc<dyn DocumentView>,
            VisibilityConfig::default(),
        ));

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        let started_at = clock.now();
        let tracker = StabilityTracker::new(
            mode,
            started_at,
            StabilityConfig::default(),
            classifier,
            Arc::clone(&doc) as Arc<dyn DocumentView>,
            Arc::clone(&feed) as Arc<dyn ObservationFeed>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            clock as Arc<dyn TimeSource>,
            Box::new(move |elapsed| {
                sink_reports.lock().unwrap().push(elapsed);
            }),
        );
        tracker.begin().expect("tracker subscribes");

        Harness {
            doc,
            feed,
            scheduler,
            reports,
            tracker,
        }
    }

    fn emit_visible_change(h: &Harness) {
        let div = h.doc.add_element("div", None);
        h.feed.emit_mutations(vec![ChangeNotification::NodesAdded {
            target: h.doc.root(),
            added: vec![div],
        }]);
    }

    #[test]
    fn test_settle_reported_once_after_inactivity_window() {
        let h = harness(TrackingMode::PageLoad);

        emit_visible_change(&h);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(300);

        let reports = h.reports.lock().unwrap().clone();
        assert_eq!(reports, vec![300.0]);
    }

    #[test]
    fn test_double_frame_deferral_before_classification() {
        let h = harness(TrackingMode::PageLoad);

        emit_visible_change(&h);
        // One frame is not enough; classification waits for the second.
        h.scheduler.run_frame();
        assert_eq!(h.scheduler.pending_frames(), 1);
        h.scheduler.advance_ms(1000);
        assert!(h.reports.lock().unwrap().is_empty());

        h.scheduler.run_frame();
        h.scheduler.advance_ms(300);
        assert_eq!(h.reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_qualifying_batch_has_no_timer_effects() {
        let h = harness(TrackingMode::PageLoad);

        let hidden = h.doc.add_element("div", None);
        h.doc.set_style(
            hidden,
            ComputedStyle {
                display: DisplayStyle::None,
                ..ComputedStyle::default()
            },
        );
        h.feed.emit_mutations(vec![ChangeNotification::NodesAdded {
            target: h.doc.root(),
            added: vec![hidden],
        }]);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(2000);

        assert!(h.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_new_changes_rearm_the_window() {
        let h = harness(TrackingMode::PageLoad);

        emit_visible_change(&h);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(200);

        emit_visible_change(&h);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(300);

        // Settles 300ms after the second change, not the first.
        let reports = h.reports.lock().unwrap().clone();
        assert_eq!(reports, vec![500.0]);
    }

    #[test]
    fn test_changes_after_finalization_are_ignored() {
        let h = harness(TrackingMode::PageLoad);

        emit_visible_change(&h);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(300);
        assert_eq!(h.reports.lock().unwrap().len(), 1);

        emit_visible_change(&h);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(1000);
        assert_eq!(h.reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ceiling_forces_final_report_from_last_change_time() {
        let h = harness(TrackingMode::PageLoad);

        // Keep the page churning every 200ms so the window never elapses.
        for _ in 0..50 {
            emit_visible_change(&h);
            h.scheduler.run_frames(2);
            h.scheduler.advance_ms(200);
        }
        // Last qualifying change landed at 9800ms; the 10s ceiling stops the
        // tracker and reports from the last known change time.
        h.scheduler.advance_ms(400);

        let reports = h.reports.lock().unwrap().clone();
        assert_eq!(reports, vec![9800.0]);

        // Tracking is disconnected after the ceiling.
        assert_eq!(h.feed.mutation_subscription_count(), 0);
    }

    #[test]
    fn test_navigation_ceiling_is_shorter() {
        let h = harness(TrackingMode::Navigation);

        for _ in 0..25 {
            emit_visible_change(&h);
            h.scheduler.run_frames(2);
            h.scheduler.advance_ms(200);
        }
        h.scheduler.advance_ms(400);

        let reports = h.reports.lock().unwrap().clone();
        assert_eq!(reports, vec![4800.0]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let h = harness(TrackingMode::PageLoad);
        h.tracker.stop();
        h.tracker.stop();
        assert!(h.reports.lock().unwrap().is_empty());
        assert_eq!(h.feed.mutation_subscription_count(), 0);
    }

    #[test]
    fn test_image_load_rides_the_pipeline_unless_ignorable() {
        let h = harness(TrackingMode::PageLoad);

        let gif = h.doc.add_element("img", None);
        h.doc.set_attribute(gif, "src", "/spinner.gif");
        h.feed.emit_image_load(gif);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(1000);
        assert!(h.reports.lock().unwrap().is_empty());

        let photo = h.doc.add_element("img", None);
        h.doc.set_attribute(photo, "src", "/photo.jpg");
        h.feed.emit_image_load(photo);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(300);
        assert_eq!(h.reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_resize_is_debounced_then_classified() {
        let h = harness(TrackingMode::PageLoad);

        h.feed.emit_resize();
        h.feed.emit_resize();
        h.scheduler.advance_ms(100);
        h.scheduler.run_frames(2);
        h.scheduler.advance_ms(300);

        let reports = h.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        // 100ms debounce + 300ms window.
        assert_eq!(reports[0], 400.0);
    }
}
