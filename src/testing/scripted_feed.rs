//! Scripted observation feed.
//!
//! Tests register the tracker against this feed, then emit samples and
//! mutation batches by hand. Categories can be marked unavailable to
//! exercise the registration-failure path. Callbacks are cloned out of the
//! registries before invocation so re-entrant subscribe/disconnect calls
//! from inside a callback never deadlock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::dom::NodeId;
use crate::error::ObserveError;
use crate::feed::{
    ChangeNotification, ImageLoadCallback, LargestContentfulCallback, LargestContentfulSample,
    LayoutShiftCallback, LayoutShiftSample, LifecycleCallback, LifecycleEvent, LongTaskCallback,
    LongTaskSample, MutationCallback, NavigationTiming, ObservationCategory, ObservationFeed,
    PaintCallback, PaintSample, ResizeCallback, SubscriptionId, WatchedAttribute,
};

struct MutationSub {
    #[allow(dead_code)] // Subtree scoping is not modeled; the fixture has one root.
    root: NodeId,
    attributes: Vec<WatchedAttribute>,
    cb: MutationCallback,
}

#[derive(Default)]
struct SubState {
    paint: HashMap<u64, PaintCallback>,
    largest_contentful: HashMap<u64, LargestContentfulCallback>,
    layout_shift: HashMap<u64, LayoutShiftCallback>,
    long_task: HashMap<u64, LongTaskCallback>,
    mutation: HashMap<u64, MutationSub>,
    lifecycle: HashMap<u64, LifecycleCallback>,
    image_load: HashMap<u64, ImageLoadCallback>,
    resize: HashMap<u64, ResizeCallback>,
}

/// Observation feed under test control.
pub struct ScriptedFeed {
    next_id: AtomicU64,
    url: Mutex<String>,
    timing: Mutex<Option<NavigationTiming>>,
    unavailable: Mutex<HashSet<ObservationCategory>>,
    subs: Mutex<SubState>,
}

impl ScriptedFeed {
    pub fn new(url: &str) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            url: Mutex::new(url.to_string()),
            timing: Mutex::new(None),
            unavailable: Mutex::new(HashSet::new()),
            subs: Mutex::new(SubState::default()),
        }
    }

    /// Change the document address without notifying anyone; the detector's
    /// poll or hooks must discover it, exactly like a router bypassing
    /// history mutation.
    pub fn set_url(&self, url: &str) {
        *self.url.lock().expect("feed url poisoned") = url.to_string();
    }

    pub fn set_navigation_timing(&self, timing: NavigationTiming) {
        *self.timing.lock().expect("feed timing poisoned") = Some(timing);
    }

    /// Make a category fail registration with `FeatureUnavailable`.
    pub fn mark_unavailable(&self, category: ObservationCategory) {
        self.unavailable
            .lock()
            .expect("feed availability poisoned")
            .insert(category);
    }

    fn check_available(&self, category: ObservationCategory) -> Result<(), ObserveError> {
        if self
            .unavailable
            .lock()
            .expect("feed availability poisoned")
            .contains(&category)
        {
            return Err(ObserveError::unavailable(category));
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_subs(&self) -> std::sync::MutexGuard<'_, SubState> {
        self.subs.lock().expect("feed subscriptions poisoned")
    }

    pub fn emit_paint(&self, sample: PaintSample) {
        let targets: Vec<PaintCallback> = self.lock_subs().paint.values().cloned().collect();
        for cb in targets {
            cb(sample);
        }
    }

    pub fn emit_largest_contentful_paint(&self, sample: LargestContentfulSample) {
        let targets: Vec<LargestContentfulCallback> = self
            .lock_subs()
            .largest_contentful
            .values()
            .cloned()
            .collect();
        for cb in targets {
            cb(sample);
        }
    }

    pub fn emit_layout_shift(&self, sample: LayoutShiftSample) {
        let targets: Vec<LayoutShiftCallback> =
            self.lock_subs().layout_shift.values().cloned().collect();
        for cb in targets {
            cb(sample);
        }
    }

    pub fn emit_long_task(&self, sample: LongTaskSample) {
        let targets: Vec<LongTaskCallback> = self.lock_subs().long_task.values().cloned().collect();
        for cb in targets {
            cb(sample);
        }
    }

    /// Deliver a mutation batch, filtering attribute notifications through
    /// each subscriber's allow-list.
    pub fn emit_mutations(&self, batch: Vec<ChangeNotification>) {
        let targets: Vec<(Vec<ChangeNotification>, MutationCallback)> = self
            .lock_subs()
            .mutation
            .values()
            .filter_map(|sub| {
                let filtered: Vec<ChangeNotification> = batch
                    .iter()
                    .filter(|change| match change {
                        ChangeNotification::AttributeChanged { attribute, .. } => {
                            sub.attributes.contains(attribute)
                        }
                        _ => true,
                    })
                    .cloned()
                    .collect();
                (!filtered.is_empty()).then(|| (filtered, sub.cb.clone()))
            })
            .collect();
        for (filtered, cb) in targets {
            cb(filtered);
        }
    }

    pub fn emit_lifecycle(&self, event: LifecycleEvent) {
        let targets: Vec<LifecycleCallback> = self.lock_subs().lifecycle.values().cloned().collect();
        for cb in targets {
            cb(event);
        }
    }

    pub fn emit_image_load(&self, node: NodeId) {
        let targets: Vec<ImageLoadCallback> =
            self.lock_subs().image_load.values().cloned().collect();
        for cb in targets {
            cb(node);
        }
    }

    pub fn emit_resize(&self) {
        let targets: Vec<ResizeCallback> = self.lock_subs().resize.values().cloned().collect();
        for cb in targets {
            cb();
        }
    }

    pub fn mutation_subscription_count(&self) -> usize {
        self.lock_subs().mutation.len()
    }

    pub fn layout_shift_subscription_count(&self) -> usize {
        self.lock_subs().layout_shift.len()
    }

    pub fn long_task_subscription_count(&self) -> usize {
        self.lock_subs().long_task.len()
    }
}

impl ObservationFeed for ScriptedFeed {
    fn observe_paint(&self, cb: PaintCallback) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::Paint)?;
        let id = self.next_id();
        self.lock_subs().paint.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_largest_contentful_paint(
        &self,
        cb: LargestContentfulCallback,
    ) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::LargestContentfulPaint)?;
        let id = self.next_id();
        self.lock_subs().largest_contentful.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_layout_shift(
        &self,
        cb: LayoutShiftCallback,
    ) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::LayoutShift)?;
        let id = self.next_id();
        self.lock_subs().layout_shift.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_long_tasks(&self, cb: LongTaskCallback) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::LongTask)?;
        let id = self.next_id();
        self.lock_subs().long_task.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_mutations(
        &self,
        root: NodeId,
        attributes: &[WatchedAttribute],
        cb: MutationCallback,
    ) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::Mutation)?;
        let id = self.next_id();
        self.lock_subs().mutation.insert(
            id,
            MutationSub {
                root,
                attributes: attributes.to_vec(),
                cb,
            },
        );
        Ok(SubscriptionId(id))
    }

    fn observe_lifecycle(&self, cb: LifecycleCallback) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::Lifecycle)?;
        let id = self.next_id();
        self.lock_subs().lifecycle.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_image_loads(&self, cb: ImageLoadCallback) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::ImageLoad)?;
        let id = self.next_id();
        self.lock_subs().image_load.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn observe_resize(&self, cb: ResizeCallback) -> Result<SubscriptionId, ObserveError> {
        self.check_available(ObservationCategory::Resize)?;
        let id = self.next_id();
        self.lock_subs().resize.insert(id, cb);
        Ok(SubscriptionId(id))
    }

    fn navigation_timing(&self) -> Option<NavigationTiming> {
        *self.timing.lock().expect("feed timing poisoned")
    }

    fn current_url(&self) -> String {
        self.url.lock().expect("feed url poisoned").clone()
    }

    fn disconnect(&self, id: SubscriptionId) {
        let mut subs = self.lock_subs();
        subs.paint.remove(&id.0);
        subs.largest_contentful.remove(&id.0);
        subs.layout_shift.remove(&id.0);
        subs.long_task.remove(&id.0);
        subs.mutation.remove(&id.0);
        subs.lifecycle.remove(&id.0);
        subs.image_load.remove(&id.0);
        subs.resize.remove(&id.0);
    }
}
