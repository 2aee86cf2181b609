//! Dual-mode metric store.
//!
//! Two structurally identical metric sets exist at all times: one for the
//! initial page load (write-once per key, never reset) and one for the
//! current soft-navigation session (cleared at every navigation boundary).
//! The store is the single writer-of-record for metrics; sessions write into
//! it through the engine and the presentation layer only reads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod accumulate;

pub use accumulate::{BlockingTimeAccumulator, LayoutShiftAccumulator};

/// Convert a duration to fractional milliseconds with microsecond precision.
pub fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1_000.0
}

/// Named timing metrics tracked per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKey {
    FirstPaint,
    Fcp,
    DomReady,
    Lcp,
    LoadComplete,
    Tti,
    Tbt,
    Cls,
    LastPixelChange,
}

impl MetricKey {
    pub const COUNT: usize = 9;

    /// All keys, in storage order.
    pub const ALL: [MetricKey; Self::COUNT] = [
        MetricKey::FirstPaint,
        MetricKey::Fcp,
        MetricKey::DomReady,
        MetricKey::Lcp,
        MetricKey::LoadComplete,
        MetricKey::Tti,
        MetricKey::Tbt,
        MetricKey::Cls,
        MetricKey::LastPixelChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::FirstPaint => "first-paint",
            MetricKey::Fcp => "fcp",
            MetricKey::DomReady => "dom-ready",
            MetricKey::Lcp => "lcp",
            MetricKey::LoadComplete => "load-complete",
            MetricKey::Tti => "tti",
            MetricKey::Tbt => "tbt",
            MetricKey::Cls => "cls",
            MetricKey::LastPixelChange => "last-pixel-change",
        }
    }

    /// Canonical position on the loading timeline. `tbt` and `cls` are not
    /// time-based and carry no position.
    pub fn display_order(&self) -> Option<u8> {
        match self {
            MetricKey::FirstPaint => Some(1),
            MetricKey::Fcp => Some(2),
            MetricKey::DomReady => Some(3),
            MetricKey::Lcp => Some(4),
            MetricKey::LoadComplete => Some(5),
            MetricKey::Tti => Some(6),
            MetricKey::LastPixelChange => Some(7),
            MetricKey::Tbt | MetricKey::Cls => None,
        }
    }

    fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|k| k == self)
            .expect("key present in ALL")
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which metric set a session writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingMode {
    PageLoad,
    Navigation,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::PageLoad => "page-load",
            TrackingMode::Navigation => "navigation",
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mode's metric values. Unset keys report `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: [Option<f64>; MetricKey::COUNT],
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values[key.index()]
    }

    /// Set a key, clamping to non-negative. Returns the stored value.
    pub fn set(&mut self, key: MetricKey, value: f64) -> f64 {
        let stored = value.max(0.0);
        self.values[key.index()] = Some(stored);
        stored
    }

    /// Corrective write: only applies while the key is still unset.
    pub fn set_if_unset(&mut self, key: MetricKey, value: f64) -> bool {
        if self.values[key.index()].is_some() {
            return false;
        }
        self.set(key, value);
        true
    }

    pub fn clear(&mut self) {
        self.values = [None; MetricKey::COUNT];
    }

    pub fn is_set(&self, key: MetricKey) -> bool {
        self.values[key.index()].is_some()
    }

    /// Snapshot as a name → value map, unset keys omitted.
    pub fn snapshot(&self) -> MetricSnapshot {
        let mut values = BTreeMap::new();
        for key in MetricKey::ALL {
            if let Some(v) = self.get(key) {
                values.insert(key.as_str().to_string(), v);
            }
        }
        MetricSnapshot { values }
    }
}

/// Serializable view of one metric set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values.get(key.as_str()).copied()
    }
}

struct StoreState {
    page_load: MetricSet,
    navigation: MetricSet,
}

/// Thread-safe store holding both metric sets.
///
/// Writers are session callbacks; a single `RwLock` provides the
/// single-writer discipline the cooperative model otherwise guarantees.
pub struct MetricStore {
    state: RwLock<StoreState>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                page_load: MetricSet::new(),
                navigation: MetricSet::new(),
            }),
        }
    }

    pub fn get(&self, mode: TrackingMode, key: MetricKey) -> Option<f64> {
        let state = self.state.read().expect("metric store poisoned");
        match mode {
            TrackingMode::PageLoad => state.page_load.get(key),
            TrackingMode::Navigation => state.navigation.get(key),
        }
    }

    /// Set a key, returning the stored (clamped) value.
    pub fn set(&self, mode: TrackingMode, key: MetricKey, value: f64) -> f64 {
        let mut state = self.state.write().expect("metric store poisoned");
        match mode {
            TrackingMode::PageLoad => state.page_load.set(key, value),
            TrackingMode::Navigation => state.navigation.set(key, value),
        }
    }

    /// Corrective write: returns true when the value was applied.
    pub fn set_if_unset(&self, mode: TrackingMode, key: MetricKey, value: f64) -> bool {
        let mut state = self.state.write().expect("metric store poisoned");
        match mode {
            TrackingMode::PageLoad => state.page_load.set_if_unset(key, value),
            TrackingMode::Navigation => state.navigation.set_if_unset(key, value),
        }
    }

    /// Clear every key of the navigation set for a new session.
    pub fn reset_navigation(&self) {
        let mut state = self.state.write().expect("metric store poisoned");
        state.navigation.clear();
    }

    pub fn snapshot(&self, mode: TrackingMode) -> MetricSnapshot {
        let state = self.state.read().expect("metric store poisoned");
        match mode {
            TrackingMode::PageLoad => state.page_load.snapshot(),
            TrackingMode::Navigation => state.navigation.snapshot(),
        }
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}
