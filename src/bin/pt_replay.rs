//! Diagnostics replay CLI.
//!
//! Drives canned page-load and soft-navigation scenarios through the
//! deterministic harness (fixture document, scripted feed, manual clock) and
//! prints the resulting metric snapshots. Useful for eyeballing the full
//! pipeline without a live document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use paint_tracker::dom::{DocumentView, ReadyState};
use paint_tracker::engine::{MetricsReport, TrackerHandle};
use paint_tracker::feed::{
    ChangeNotification, LargestContentfulSample, LayoutShiftSample, LifecycleEvent,
    LongTaskSample, NavigationTiming, ObservationFeed, PaintPhase, PaintSample, Scheduler,
    TimeSource,
};
use paint_tracker::metrics::MetricKey;
use paint_tracker::testing::{FixtureDocument, ManualClock, ManualScheduler, ScriptedFeed};
use paint_tracker::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Initial page load: paint samples, lifecycle events, long tasks,
    /// layout shifts, and a settling mutation burst.
    PageLoad,
    /// A soft navigation detected by the address poll, with structural
    /// FCP/LCP proxies.
    SoftNav,
}

#[derive(Parser)]
#[command(name = "pt-replay", about = "Replay canned tracker scenarios")]
struct Args {
    /// Scenario to replay
    #[arg(value_enum, default_value = "page-load")]
    scenario: Scenario,

    /// Emit machine-readable JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Optional tracker configuration file (JSON); defaults are used when
    /// absent or malformed
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Harness {
    doc: Arc<FixtureDocument>,
    feed: Arc<ScriptedFeed>,
    scheduler: Arc<ManualScheduler>,
    handle: Arc<TrackerHandle>,
}

fn harness(url: &str, config: TrackerConfig) -> Harness {
    let doc = Arc::new(FixtureDocument::new());
    let feed = Arc::new(ScriptedFeed::new(url));
    let clock = Arc::new(ManualClock::new());
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let handle = TrackerHandle::new(
        Arc::clone(&doc) as Arc<dyn DocumentView>,
        Arc::clone(&feed) as Arc<dyn ObservationFeed>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        clock as Arc<dyn TimeSource>,
        config,
    );
    Harness {
        doc,
        feed,
        scheduler,
        handle,
    }
}

/// Insert a text block and pump the double-frame classification path.
fn insert_content(h: &Harness, text: &str) {
    let div = h.doc.add_element("div", None);
    h.doc.add_text(text, div);
    h.feed.emit_mutations(vec![ChangeNotification::NodesAdded {
        target: h.doc.root(),
        added: vec![div],
    }]);
    h.scheduler.run_frames(2);
}

fn replay_page_load(config: TrackerConfig) -> Result<MetricsReport> {
    let h = harness("https://app.example/", config);
    h.feed.set_navigation_timing(NavigationTiming {
        fetch_start_ms: 0.0,
        dom_content_loaded_event_end_ms: 55.0,
        load_event_end_ms: 210.0,
    });

    h.handle.start_page_load_session()?;

    h.feed.emit_paint(PaintSample {
        phase: PaintPhase::FirstPaint,
        start_time_ms: 12.0,
    });
    h.feed.emit_paint(PaintSample {
        phase: PaintPhase::FirstContentfulPaint,
        start_time_ms: 48.0,
    });
    h.feed
        .emit_largest_contentful_paint(LargestContentfulSample {
            render_time_ms: Some(95.0),
            load_time_ms: None,
        });

    h.scheduler.advance(Duration::from_millis(50));
    h.feed.emit_lifecycle(LifecycleEvent::DomContentLoaded);
    insert_content(&h, "above-the-fold copy");

    h.scheduler.advance(Duration::from_millis(150));
    h.doc.set_ready_state(ReadyState::Complete);
    h.feed.emit_lifecycle(LifecycleEvent::Load);

    for duration_ms in [60.0, 120.0, 40.0] {
        h.feed.emit_long_task(LongTaskSample { duration_ms });
    }
    h.feed.emit_layout_shift(LayoutShiftSample {
        value: 0.04,
        had_recent_input: false,
    });
    h.feed.emit_layout_shift(LayoutShiftSample {
        value: 0.3,
        had_recent_input: true,
    });

    insert_content(&h, "late hydration");

    // Settle window, then the TTI assessment.
    h.scheduler.advance(Duration::from_millis(400));
    h.scheduler.advance(Duration::from_millis(1_000));

    Ok(h.handle.metrics_report())
}

fn replay_soft_nav(config: TrackerConfig) -> Result<MetricsReport> {
    let h = harness("https://app.example/inbox", config);
    h.doc.set_ready_state(ReadyState::Complete);

    h.handle.start_page_load_session()?;
    h.handle.install_navigation_detection()?;
    h.scheduler.advance(Duration::from_millis(600));

    // The router swaps the view without touching history mutation; only the
    // address poll notices.
    h.feed.set_url("https://app.example/inbox#message-42");
    h.scheduler.advance(Duration::from_millis(100));

    // dom-ready stamp and the double-frame load-complete path.
    h.scheduler.advance(Duration::from_millis(16));
    h.scheduler.run_frame();
    h.scheduler.advance(Duration::from_millis(16));
    h.scheduler.run_frame();

    insert_content(&h, "message body");

    h.scheduler.advance(Duration::from_millis(60));
    h.doc.set_large_candidates(2);
    insert_content(&h, "attachment preview");
    h.scheduler.run_frame();

    h.feed.emit_long_task(LongTaskSample { duration_ms: 90.0 });

    // Settle window plus the navigation TTI pad.
    h.scheduler.advance(Duration::from_millis(800));

    Ok(h.handle.metrics_report())
}

fn print_report(report: &MetricsReport) {
    println!("navigations detected: {}", report.navigation_count);
    println!("navigation active:    {}", report.navigation_active);

    for (label, snapshot) in [
        ("page-load", &report.page_load),
        ("navigation", &report.navigation),
    ] {
        println!("\n{label} metrics:");
        for key in MetricKey::ALL {
            match snapshot.get(key) {
                Some(value) if key == MetricKey::Cls => {
                    println!("  {:<18} {:>10.4}", key.as_str(), value)
                }
                Some(value) => println!("  {:<18} {:>8.1} ms", key.as_str(), value),
                None => println!("  {:<18} {:>11}", key.as_str(), "-"),
            }
        }
    }
}

fn main() -> Result<()> {
    paint_tracker::init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load_from_file(path),
        None => TrackerConfig::default(),
    };
    let report = match args.scenario {
        Scenario::PageLoad => replay_page_load(config)?,
        Scenario::SoftNav => replay_soft_nav(config)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}
