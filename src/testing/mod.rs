//! Deterministic harnesses for exercising the tracker without a live
//! document.
//!
//! The pipeline under test is the real one; only the platform seams are
//! swapped: [`FixtureDocument`] stands in for the host document,
//! [`ScriptedFeed`] for the observation feed, and
//! [`ManualClock`]/[`ManualScheduler`] for time and deferred execution, so
//! tests and the replay binary can drive sessions step by step.

pub mod fixture_dom;
pub mod manual_scheduler;
pub mod scripted_feed;

pub use fixture_dom::FixtureDocument;
pub use manual_scheduler::{ManualClock, ManualScheduler};
pub use scripted_feed::ScriptedFeed;
