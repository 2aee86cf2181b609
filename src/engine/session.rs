// Session registry - ownership tags for subscriptions, timers, and trackers
//
// Every feed subscription and pending timer belongs to exactly one tracking
// session. Callbacks check "am I still the active session" through this
// registry before writing, which is what turns straggler callbacks from a
// superseded session into silent no-ops. Teardown is synchronous and
// idempotent: the previous session's resources are released before a
// superseding session activates.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::feed::{ObservationFeed, Scheduler, SubscriptionId, TimerId};
use crate::metrics::TrackingMode;
use crate::stability::StabilityTracker;

/// Identifier for one tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

struct ActiveSession {
    id: SessionId,
    started_at: Instant,
    subscriptions: Vec<SubscriptionId>,
    timers: Vec<TimerId>,
    stability: Option<Arc<StabilityTracker>>,
}

/// Registry of the at-most-one active session per mode.
pub struct SessionRegistry {
    feed: Arc<dyn ObservationFeed>,
    scheduler: Arc<dyn Scheduler>,
    next_id: AtomicU64,
    page_load: Mutex<Option<ActiveSession>>,
    navigation: Mutex<Option<ActiveSession>>,
}

impl SessionRegistry {
    pub fn new(feed: Arc<dyn ObservationFeed>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            feed,
            scheduler,
            next_id: AtomicU64::new(1),
            page_load: Mutex::new(None),
            navigation: Mutex::new(None),
        }
    }

    fn slot(&self, mode: TrackingMode) -> &Mutex<Option<ActiveSession>> {
        match mode {
            TrackingMode::PageLoad => &self.page_load,
            TrackingMode::Navigation => &self.navigation,
        }
    }

    /// Activate a new session for `mode`, tearing down any previous session
    /// of the same mode first.
    pub fn begin(&self, mode: TrackingMode, started_at: Instant) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let previous = {
            let mut slot = self.slot(mode).lock().expect("session slot poisoned");
            slot.replace(ActiveSession {
                id,
                started_at,
                subscriptions: Vec::new(),
                timers: Vec::new(),
                stability: None,
            })
        };
        if let Some(previous) = previous {
            tracing::debug!(
                "[SessionRegistry] {} superseded by {}",
                previous.id,
                id
            );
            self.teardown(previous);
        }
        id
    }

    /// True while the session has not been ended or superseded.
    pub fn is_active(&self, id: SessionId) -> bool {
        self.find(id).is_some()
    }

    pub fn session_start(&self, id: SessionId) -> Option<Instant> {
        self.find(id)
    }

    fn find(&self, id: SessionId) -> Option<Instant> {
        for slot in [&self.page_load, &self.navigation] {
            let guard = slot.lock().expect("session slot poisoned");
            if let Some(session) = guard.as_ref() {
                if session.id == id {
                    return Some(session.started_at);
                }
            }
        }
        None
    }

    pub fn has_active(&self, mode: TrackingMode) -> bool {
        self.slot(mode)
            .lock()
            .expect("session slot poisoned")
            .is_some()
    }

    pub fn active_session(&self, mode: TrackingMode) -> Option<SessionId> {
        self.slot(mode)
            .lock()
            .expect("session slot poisoned")
            .as_ref()
            .map(|s| s.id)
    }

    /// Attach a subscription to its owning session. If the session is gone
    /// already, the subscription is disconnected on the spot.
    pub fn attach_subscription(&self, id: SessionId, sub: SubscriptionId) {
        if !self.attach(id, |session| session.subscriptions.push(sub)) {
            self.feed.disconnect(sub);
        }
    }

    /// Attach a timer to its owning session. Cancelled immediately when the
    /// session is gone.
    pub fn attach_timer(&self, id: SessionId, timer: TimerId) {
        if !self.attach(id, |session| session.timers.push(timer)) {
            self.scheduler.cancel(timer);
        }
    }

    /// Attach the session's stability tracker. Stopped immediately when the
    /// session is gone.
    pub fn attach_stability(&self, id: SessionId, tracker: Arc<StabilityTracker>) {
        let mut tracker = Some(tracker);
        let attached = self.attach(id, |session| {
            session.stability = tracker.take();
        });
        if !attached {
            if let Some(tracker) = tracker {
                tracker.stop();
            }
        }
    }

    fn attach(&self, id: SessionId, apply: impl FnOnce(&mut ActiveSession)) -> bool {
        for slot in [&self.page_load, &self.navigation] {
            let mut guard = slot.lock().expect("session slot poisoned");
            if let Some(session) = guard.as_mut() {
                if session.id == id {
                    apply(session);
                    return true;
                }
            }
        }
        false
    }

    /// End a session explicitly. Returns its mode, or `None` when the id is
    /// not active (already ended or superseded).
    pub fn end(&self, id: SessionId) -> Option<TrackingMode> {
        for (mode, slot) in [
            (TrackingMode::PageLoad, &self.page_load),
            (TrackingMode::Navigation, &self.navigation),
        ] {
            let taken = {
                let mut guard = slot.lock().expect("session slot poisoned");
                let matches = guard.as_ref().map(|s| s.id == id).unwrap_or(false);
                if matches {
                    guard.take()
                } else {
                    None
                }
            };
            if let Some(session) = taken {
                self.teardown(session);
                return Some(mode);
            }
        }
        None
    }

    /// Disconnect subscriptions, cancel timers, stop the stability tracker.
    fn teardown(&self, session: ActiveSession) {
        for sub in session.subscriptions {
            self.feed.disconnect(sub);
        }
        for timer in session.timers {
            self.scheduler.cancel(timer);
        }
        if let Some(stability) = session.stability {
            stability.stop();
        }
        tracing::debug!("[SessionRegistry] {} torn down", session.id);
    }
}
