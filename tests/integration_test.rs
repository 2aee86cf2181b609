//! Integration tests for the page-load tracking lifecycle.
//!
//! These drive the real pipeline end to end through the deterministic
//! harness: fixture document, scripted feed, and manual clock/scheduler.

use std::sync::Arc;
use std::time::Duration;

use paint_tracker::dom::DocumentView;
use paint_tracker::engine::TrackerHandle;
use paint_tracker::error::SessionError;
use paint_tracker::feed::{
    ChangeNotification, LargestContentfulSample, LayoutShiftSample, LifecycleEvent,
    LongTaskSample, NavigationTiming, ObservationCategory, ObservationFeed, PaintPhase,
    PaintSample, Scheduler, TimeSource,
};
use paint_tracker::metrics::{MetricKey, TrackingMode};
use paint_tracker::testing::{FixtureDocument, ManualClock, ManualScheduler, ScriptedFeed};
use paint_tracker::TrackerConfig;

struct Harness {
    doc: Arc<FixtureDocument>,
    feed: Arc<ScriptedFeed>,
    scheduler: Arc<ManualScheduler>,
    handle: Arc<TrackerHandle>,
}

fn harness() -> Harness {
    let doc = Arc::new(FixtureDocument::new());
    let feed = Arc::new(ScriptedFeed::new("https://app.test/"));
    let clock = Arc::new(ManualClock::new());
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let handle = TrackerHandle::new(
        Arc::clone(&doc) as Arc<dyn DocumentView>,
        Arc::clone(&feed) as Arc<dyn ObservationFeed>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        clock as Arc<dyn TimeSource>,
        TrackerConfig::default(),
    );
    Harness {
        doc,
        feed,
        scheduler,
        handle,
    }
}

fn insert_content(h: &Harness, text: &str) {
    let div = h.doc.add_element("div", None);
    h.doc.add_text(text, div);
    h.feed.emit_mutations(vec![ChangeNotification::NodesAdded {
        target: h.doc.root(),
        added: vec![div],
    }]);
    h.scheduler.run_frames(2);
}

fn page_load(h: &Harness, key: MetricKey) -> Option<f64> {
    h.handle.store().get(TrackingMode::PageLoad, key)
}

#[test]
fn test_live_lifecycle_events_beat_corrective_writes() {
    let h = harness();
    h.feed.set_navigation_timing(NavigationTiming {
        fetch_start_ms: 0.0,
        dom_content_loaded_event_end_ms: 55.0,
        load_event_end_ms: 210.0,
    });
    h.handle.start_page_load_session().expect("starts");

    h.scheduler.advance(Duration::from_millis(50));
    h.feed.emit_lifecycle(LifecycleEvent::DomContentLoaded);

    h.scheduler.advance(Duration::from_millis(150));
    h.feed.emit_lifecycle(LifecycleEvent::Load);

    // Live events won; the corrective navigation-timing values (55 / 210)
    // were no-ops because both keys were already set.
    assert_eq!(page_load(&h, MetricKey::DomReady), Some(50.0));
    assert_eq!(page_load(&h, MetricKey::LoadComplete), Some(200.0));

    // First-paint had no live source, so the corrective write applied.
    assert_eq!(page_load(&h, MetricKey::FirstPaint), Some(55.0));

    // TTI is assessed a second later from navigation timing plus the pad.
    h.scheduler.advance(Duration::from_millis(1_000));
    assert_eq!(page_load(&h, MetricKey::Tti), Some(5_055.0));
}

#[test]
fn test_corrective_writes_fill_unset_keys() {
    let h = harness();
    h.feed.set_navigation_timing(NavigationTiming {
        fetch_start_ms: 0.0,
        dom_content_loaded_event_end_ms: 55.0,
        load_event_end_ms: 210.0,
    });
    h.handle.start_page_load_session().expect("starts");

    // No DOMContentLoaded was ever observed live; only the load event fires.
    h.scheduler.advance(Duration::from_millis(200));
    h.feed.emit_lifecycle(LifecycleEvent::Load);

    assert_eq!(page_load(&h, MetricKey::DomReady), Some(55.0));
    assert_eq!(page_load(&h, MetricKey::LoadComplete), Some(200.0));
}

#[test]
fn test_paint_samples_write_once_and_lcp_supersedes() {
    let h = harness();
    h.handle.start_page_load_session().expect("starts");

    h.feed.emit_paint(PaintSample {
        phase: PaintPhase::FirstPaint,
        start_time_ms: 12.0,
    });
    h.feed.emit_paint(PaintSample {
        phase: PaintPhase::FirstContentfulPaint,
        start_time_ms: 48.0,
    });
    // A duplicate paint sample must not clobber the first.
    h.feed.emit_paint(PaintSample {
        phase: PaintPhase::FirstPaint,
        start_time_ms: 20.0,
    });

    h.feed
        .emit_largest_contentful_paint(LargestContentfulSample {
            render_time_ms: Some(95.0),
            load_time_ms: None,
        });
    h.feed
        .emit_largest_contentful_paint(LargestContentfulSample {
            render_time_ms: None,
            load_time_ms: Some(140.0),
        });

    assert_eq!(page_load(&h, MetricKey::FirstPaint), Some(12.0));
    assert_eq!(page_load(&h, MetricKey::Fcp), Some(48.0));
    assert_eq!(page_load(&h, MetricKey::Lcp), Some(140.0));
}

#[test]
fn test_tbt_accumulates_above_the_floor() {
    let h = harness();
    h.handle.start_page_load_session().expect("starts");

    for duration_ms in [60.0, 120.0, 40.0] {
        h.feed.emit_long_task(LongTaskSample { duration_ms });
    }

    // (60-50) + (120-50) = 80; the 40ms task does not qualify.
    assert_eq!(page_load(&h, MetricKey::Tbt), Some(80.0));
}

#[test]
fn test_cls_excludes_input_driven_shifts() {
    let h = harness();
    h.handle.start_page_load_session().expect("starts");

    h.feed.emit_layout_shift(LayoutShiftSample {
        value: 0.04,
        had_recent_input: false,
    });
    h.feed.emit_layout_shift(LayoutShiftSample {
        value: 0.3,
        had_recent_input: true,
    });
    h.feed.emit_layout_shift(LayoutShiftSample {
        value: 0.02,
        had_recent_input: false,
    });

    let cls = page_load(&h, MetricKey::Cls).expect("cls set");
    assert!((cls - 0.06).abs() < 1e-9);
}

#[test]
fn test_settle_is_reported_once_per_session() {
    let h = harness();
    h.handle.start_page_load_session().expect("starts");

    insert_content(&h, "first wave");
    h.scheduler.advance(Duration::from_millis(300));
    let settled = page_load(&h, MetricKey::LastPixelChange).expect("settled");
    assert_eq!(settled, 300.0);

    // Later visible churn must not move the metric.
    insert_content(&h, "second wave");
    h.scheduler.advance(Duration::from_millis(1_000));
    assert_eq!(page_load(&h, MetricKey::LastPixelChange), Some(settled));
}

#[test]
fn test_unavailable_category_leaves_metric_unset() {
    let doc = Arc::new(FixtureDocument::new());
    let feed = Arc::new(ScriptedFeed::new("https://app.test/"));
    feed.mark_unavailable(ObservationCategory::LongTask);
    let clock = Arc::new(ManualClock::new());
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let handle = TrackerHandle::new(
        doc as Arc<dyn DocumentView>,
        Arc::clone(&feed) as Arc<dyn ObservationFeed>,
        scheduler as Arc<dyn Scheduler>,
        clock as Arc<dyn TimeSource>,
        TrackerConfig::default(),
    );

    handle.start_page_load_session().expect("starts");
    feed.emit_long_task(LongTaskSample { duration_ms: 120.0 });

    assert_eq!(handle.store().get(TrackingMode::PageLoad, MetricKey::Tbt), None);
}

#[test]
fn test_page_load_session_starts_once_per_process() {
    let h = harness();
    h.handle.start_page_load_session().expect("starts");
    assert_eq!(
        h.handle.start_page_load_session().unwrap_err(),
        SessionError::PageLoadAlreadyStarted
    );
}
