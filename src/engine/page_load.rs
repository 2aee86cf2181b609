// Page-load session wiring
//
// The page-load session starts once per process and is never reset. Live
// lifecycle events write dom-ready and load-complete first; navigation-timing
// entries correct them afterward only while still unset, so a later, looser
// approximation never clobbers a live-event value. Paint samples arrive from
// the one-shot platform observers; TTI is approximated from the
// navigation-timing dom-ready value plus a fixed pad once the load event has
// had time to settle.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::dom::ReadyState;
use crate::error::SessionError;
use crate::feed::{LifecycleEvent, PaintPhase};
use crate::metrics::{MetricKey, TrackingMode};
use crate::telemetry::{self, TrackerEvent};

use super::{SessionId, TrackerHandle};

impl TrackerHandle {
    /// Start the page-load session. Callable once per process.
    pub fn start_page_load_session(self: &Arc<Self>) -> Result<SessionId, SessionError> {
        if self.page_load_started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::PageLoadAlreadyStarted);
        }

        let session = self.sessions.begin(TrackingMode::PageLoad, self.epoch);
        telemetry::hub().publish(TrackerEvent::SessionStarted {
            mode: TrackingMode::PageLoad,
            session: session.0,
            navigation_count: 0,
        });
        tracing::info!("[TrackerHandle] page-load session {} started", session);

        self.register_paint_observers(session);
        self.register_shift_and_task_observers(session, TrackingMode::PageLoad);
        self.register_lifecycle_observer(session);
        self.start_stability(session, TrackingMode::PageLoad, self.epoch);

        // The document may already be past the milestones we would otherwise
        // hear about.
        match self.view.ready_state() {
            ReadyState::Loading => {}
            ReadyState::Interactive => {
                let elapsed = self.elapsed_since_epoch_ms();
                self.write_metric_if_unset(
                    session,
                    TrackingMode::PageLoad,
                    MetricKey::DomReady,
                    elapsed,
                );
            }
            ReadyState::Complete => {
                let elapsed = self.elapsed_since_epoch_ms();
                self.write_metric_if_unset(
                    session,
                    TrackingMode::PageLoad,
                    MetricKey::DomReady,
                    elapsed,
                );
                self.finish_page_load(session);
            }
        }

        Ok(session)
    }

    fn register_paint_observers(self: &Arc<Self>, session: SessionId) {
        let weak = Arc::downgrade(self);
        match self.feed.observe_paint(Arc::new(move |sample| {
            if let Some(handle) = weak.upgrade() {
                let key = match sample.phase {
                    PaintPhase::FirstPaint => MetricKey::FirstPaint,
                    PaintPhase::FirstContentfulPaint => MetricKey::Fcp,
                };
                handle.write_metric_if_unset(
                    session,
                    TrackingMode::PageLoad,
                    key,
                    sample.start_time_ms,
                );
            }
        })) {
            Ok(sub) => self.sessions.attach_subscription(session, sub),
            Err(err) => self.report_unavailable(err, "paint observer"),
        }

        // Every LCP candidate supersedes the previous one; the latest sample
        // is the accurate answer for the same lifecycle event.
        let weak = Arc::downgrade(self);
        match self
            .feed
            .observe_largest_contentful_paint(Arc::new(move |sample| {
                if let Some(handle) = weak.upgrade() {
                    if let Some(time_ms) = sample.resolved_time_ms() {
                        handle.write_metric(session, TrackingMode::PageLoad, MetricKey::Lcp, time_ms);
                    }
                }
            })) {
            Ok(sub) => self.sessions.attach_subscription(session, sub),
            Err(err) => self.report_unavailable(err, "largest-contentful-paint observer"),
        }
    }

    fn register_lifecycle_observer(self: &Arc<Self>, session: SessionId) {
        let weak = Arc::downgrade(self);
        match self.feed.observe_lifecycle(Arc::new(move |event| {
            let Some(handle) = weak.upgrade() else {
                return;
            };
            match event {
                LifecycleEvent::DomContentLoaded => {
                    let elapsed = handle.elapsed_since_epoch_ms();
                    handle.write_metric_if_unset(
                        session,
                        TrackingMode::PageLoad,
                        MetricKey::DomReady,
                        elapsed,
                    );
                }
                LifecycleEvent::Load => {
                    handle.finish_page_load(session);
                }
            }
        })) {
            Ok(sub) => self.sessions.attach_subscription(session, sub),
            Err(err) => self.report_unavailable(err, "lifecycle observer"),
        }
    }

    /// Load milestone: record load-complete, apply navigation-timing
    /// corrections, and schedule the TTI approximation. Runs once.
    fn finish_page_load(self: &Arc<Self>, session: SessionId) {
        if self.page_load_finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        let elapsed = self.elapsed_since_epoch_ms();
        self.write_metric_if_unset(
            session,
            TrackingMode::PageLoad,
            MetricKey::LoadComplete,
            elapsed,
        );

        if let Some(timing) = self.feed.navigation_timing() {
            self.write_metric_if_unset(
                session,
                TrackingMode::PageLoad,
                MetricKey::DomReady,
                timing.dom_ready_ms(),
            );
            self.write_metric_if_unset(
                session,
                TrackingMode::PageLoad,
                MetricKey::FirstPaint,
                timing.dom_ready_ms(),
            );
            self.write_metric_if_unset(
                session,
                TrackingMode::PageLoad,
                MetricKey::LoadComplete,
                timing.load_complete_ms(),
            );
        }

        let weak = Arc::downgrade(self);
        let tti_pad = self.config.timing.page_load_tti_pad_ms;
        let timer = self.scheduler.schedule_once(
            Duration::from_millis(self.config.timing.tti_assessment_delay_ms),
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    if let Some(timing) = handle.feed.navigation_timing() {
                        handle.write_metric(
                            session,
                            TrackingMode::PageLoad,
                            MetricKey::Tti,
                            timing.dom_ready_ms() + tti_pad,
                        );
                    }
                }
            }),
        );
        self.sessions.attach_timer(session, timer);
    }
}
