//! Configuration management for the tracker heuristics
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling threshold tuning without recompilation. The defaults carry the
//! shipped heuristic constants: the settle debounce window, the session
//! ceilings, the navigation poll interval, and the classifier's overlay
//! identifier sets.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::feed::WatchedAttribute;

/// Complete tracker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub visibility: VisibilityConfig,
    pub stability: StabilityConfig,
    pub navigation: NavigationConfig,
    pub timing: TimingConfig,
}

/// Visibility classifier parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Element ids belonging to the instrumentation overlay.
    pub overlay_ids: Vec<String>,
    /// Class-name fragments belonging to the instrumentation overlay.
    pub overlay_class_fragments: Vec<String>,
    /// Class-name tokens that mark continuously-animating media containers.
    pub media_class_tokens: Vec<String>,
    /// Tags that never render content.
    pub hidden_tags: Vec<String>,
    /// Maximum ancestor-chain depth inspected per node.
    pub max_ancestor_depth: usize,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            overlay_ids: vec![
                "paint-tracker-overlay".to_string(),
                "pt-mode-indicator".to_string(),
                "pt-mode-badge".to_string(),
                "pt-nav-count".to_string(),
                "pt-mode-toggle".to_string(),
                "pt-overlay-toggle".to_string(),
                "pt-overlay-content".to_string(),
                "pt-timeline-toggle".to_string(),
                "pt-timeline-container".to_string(),
                "pt-timeline-chart".to_string(),
                "pt-timeline-legend".to_string(),
            ],
            overlay_class_fragments: vec![
                "pt-overlay-header".to_string(),
                "pt-overlay-content".to_string(),
                "pt-timeline-section".to_string(),
                "pt-timeline-chart".to_string(),
                "pt-metric-indicator".to_string(),
                "pt-mode-badge".to_string(),
                "pt-mode-indicator".to_string(),
            ],
            media_class_tokens: vec![
                "video".to_string(),
                "player".to_string(),
                "animation".to_string(),
                "gif".to_string(),
                "carousel".to_string(),
                "slider".to_string(),
            ],
            hidden_tags: vec![
                "script".to_string(),
                "style".to_string(),
                "meta".to_string(),
                "link".to_string(),
                "noscript".to_string(),
                "template".to_string(),
                "head".to_string(),
            ],
            max_ancestor_depth: 15,
        }
    }
}

/// Mutation stability tracker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Inactivity window that marks the page as visually settled.
    pub inactivity_threshold_ms: u64,
    /// Late-fire tolerance subtracted from the threshold at re-check time.
    pub settle_tolerance_ms: u64,
    /// Hard stop for page-load sessions.
    pub page_load_ceiling_ms: u64,
    /// Hard stop for navigation sessions.
    pub navigation_ceiling_ms: u64,
    /// Debounce applied to window-resize signals.
    pub resize_debounce_ms: u64,
    /// Attribute allow-list for the mutation subscription.
    pub watched_attributes: Vec<WatchedAttribute>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_ms: 300,
            settle_tolerance_ms: 10,
            page_load_ceiling_ms: 10_000,
            navigation_ceiling_ms: 5_000,
            resize_debounce_ms: 100,
            watched_attributes: WatchedAttribute::ALL.to_vec(),
        }
    }
}

/// Navigation boundary detector parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Poll interval for routers that bypass history mutation.
    pub poll_interval_ms: u64,
    /// Window after which the structural watcher disconnects and the
    /// tracking guard clears.
    pub detection_ceiling_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            detection_ceiling_ms: 10_000,
        }
    }
}

/// Timing approximation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Long tasks only count the duration above this floor toward TBT.
    pub long_task_floor_ms: f64,
    /// Pad added to the navigation-timing dom-ready value for page-load TTI.
    pub page_load_tti_pad_ms: f64,
    /// Delay after the load event before the page-load TTI is computed.
    pub tti_assessment_delay_ms: u64,
    /// Pad added to load-complete for the navigation TTI approximation.
    pub navigation_tti_pad_ms: f64,
    /// Ratio of load-complete reported as the navigation first-paint proxy.
    pub navigation_first_paint_ratio: f64,
    /// Minimum time since navigation start before the LCP proxy may resolve.
    pub lcp_settle_delay_ms: f64,
    /// One-shot fallback delay for the navigation load-complete check.
    pub load_fallback_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            long_task_floor_ms: 50.0,
            page_load_tti_pad_ms: 5_000.0,
            tti_assessment_delay_ms: 1_000,
            navigation_tti_pad_ms: 300.0,
            navigation_first_paint_ratio: 0.8,
            lcp_settle_delay_ms: 50.0,
            load_fallback_delay_ms: 50,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a JSON file.
    ///
    /// Missing or malformed files fall back to the defaults with a warning;
    /// configuration problems must never keep the tracker from starting.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
