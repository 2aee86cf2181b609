// Navigation boundary detector - soft-navigation start recognition
//
// Three detection sources feed one dedup check against the last seen
// address:
//
// 1. history_mutated(): the host calls this after delegating to either
//    history-mutation entry point (push or replace).
// 2. pop_state(): back/forward traversal, gated on the tracking guard so a
//    detector-initiated session does not double-fire.
// 3. A fixed-interval poll catching routers that bypass history mutation or
//    use hash-only changes, gated the same way.
//
// Exactly one address-change signal is emitted per genuine change. The
// detector owns no session state beyond the guard flag; subscribers (the
// engine) start sessions in response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::NavigationConfig;
use crate::error::SessionError;
use crate::feed::{ObservationFeed, Scheduler, TimerId};

/// Which mechanism noticed the address change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressChangeKind {
    HistoryMutation,
    PopState,
    Poll,
}

/// A detected soft-navigation start.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressChange {
    pub url: String,
    pub kind: AddressChangeKind,
}

pub type AddressChangeCallback = Arc<dyn Fn(&AddressChange) + Send + Sync>;

struct AddressState {
    last_url: String,
    last_path: String,
}

/// Recognizes address changes and emits a single signal per genuine change.
pub struct NavigationDetector {
    feed: Arc<dyn ObservationFeed>,
    scheduler: Arc<dyn Scheduler>,
    /// Set while a navigation session is being tracked; cleared by the
    /// session's detection ceiling. Shared with the engine.
    guard: Arc<AtomicBool>,
    poll_interval: Duration,
    state: Mutex<AddressState>,
    subscribers: Mutex<Vec<AddressChangeCallback>>,
    poll_timer: Mutex<Option<TimerId>>,
}

impl NavigationDetector {
    pub fn new(
        feed: Arc<dyn ObservationFeed>,
        scheduler: Arc<dyn Scheduler>,
        guard: Arc<AtomicBool>,
        config: &NavigationConfig,
    ) -> Arc<Self> {
        let initial_url = feed.current_url();
        let initial_path = path_and_query(&initial_url);
        Arc::new(Self {
            feed,
            scheduler,
            guard,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            state: Mutex::new(AddressState {
                last_url: initial_url,
                last_path: initial_path,
            }),
            subscribers: Mutex::new(Vec::new()),
            poll_timer: Mutex::new(None),
        })
    }

    /// Start the polling fallback. Installed once at process start.
    pub fn install(self: &Arc<Self>) -> Result<(), SessionError> {
        let mut slot = self.poll_timer.lock().expect("poll timer poisoned");
        if slot.is_some() {
            return Err(SessionError::DetectorAlreadyInstalled);
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = self.scheduler.schedule_repeating(
            self.poll_interval,
            Box::new(move || {
                if let Some(detector) = weak.upgrade() {
                    detector.poll_tick();
                }
            }),
        );
        *slot = Some(timer);
        tracing::debug!(
            "[NavigationDetector] installed, polling every {:?}",
            self.poll_interval
        );
        Ok(())
    }

    /// Stop the polling fallback. Idempotent.
    pub fn uninstall(&self) {
        let timer = self.poll_timer.lock().expect("poll timer poisoned").take();
        if let Some(timer) = timer {
            self.scheduler.cancel(timer);
        }
    }

    /// Single subscription point for soft-navigation starts.
    pub fn on_address_change(&self, cb: AddressChangeCallback) {
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .push(cb);
    }

    /// Host hook: called after delegating to a history-mutation entry point.
    /// Not gated on the guard; dedup alone decides.
    pub fn history_mutated(&self) {
        let url = self.feed.current_url();
        self.compare_and_fire(url, AddressChangeKind::HistoryMutation);
    }

    /// Host hook: back/forward traversal notification.
    pub fn pop_state(&self) {
        if self.guard.load(Ordering::SeqCst) {
            return;
        }
        let url = self.feed.current_url();
        self.compare_and_fire(url, AddressChangeKind::PopState);
    }

    /// Poll tick: fire only on hash-only or path/query changes.
    fn poll_tick(&self) {
        if self.guard.load(Ordering::SeqCst) {
            return;
        }

        let current_url = self.feed.current_url();
        let current_path = path_and_query(&current_url);

        let fire = {
            let mut state = self.state.lock().expect("address state poisoned");
            if current_url == state.last_url {
                false
            } else {
                let hash_only = has_fragment(&current_url)
                    && strip_fragment(&current_url) == strip_fragment(&state.last_url);
                let path_change = current_path != state.last_path;
                if hash_only || path_change {
                    state.last_url = current_url.clone();
                    state.last_path = current_path;
                    true
                } else {
                    false
                }
            }
        };

        if fire {
            self.fire(AddressChange {
                url: current_url,
                kind: AddressChangeKind::Poll,
            });
        }
    }

    fn compare_and_fire(&self, url: String, kind: AddressChangeKind) {
        let fire = {
            let mut state = self.state.lock().expect("address state poisoned");
            if url == state.last_url {
                false
            } else {
                state.last_url = url.clone();
                state.last_path = path_and_query(&url);
                true
            }
        };

        if fire {
            self.fire(AddressChange { url, kind });
        }
    }

    fn fire(&self, change: AddressChange) {
        tracing::info!(
            "[NavigationDetector] soft navigation detected via {:?}: {}",
            change.kind,
            change.url
        );
        let subscribers: Vec<AddressChangeCallback> = self
            .subscribers
            .lock()
            .expect("subscribers poisoned")
            .clone();
        for cb in subscribers {
            cb(&change);
        }
    }
}

/// Path plus query of an address, without scheme/host/fragment.
fn path_and_query(address: &str) -> String {
    match url::Url::parse(address) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        // Relative or malformed address: best effort on the raw string.
        Err(_) => strip_fragment(address).to_string(),
    }
}

fn strip_fragment(address: &str) -> &str {
    address.split('#').next().unwrap_or(address)
}

fn has_fragment(address: &str) -> bool {
    address
        .split_once('#')
        .map(|(_, fragment)| !fragment.is_empty())
        .unwrap_or(false)
}
