//! Virtual clock and manually-driven scheduler.
//!
//! `advance` runs due timers in deadline order, moving the clock to each
//! deadline before the callback fires so time reads inside callbacks are
//! consistent. Animation frames are pumped explicitly with `run_frame`; tasks
//! scheduled during a frame land in the next one, which is what makes the
//! double-frame deferral observable in tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::feed::{RepeatingTask, ScheduledTask, Scheduler, TimeSource, TimerId};

/// Monotonic clock under test control.
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn offset_ms(&self) -> u64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    fn set_offset_ms(&self, ms: u64) {
        self.offset_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms())
    }
}

enum TimerTask {
    Once(Option<ScheduledTask>),
    Repeating(Arc<Mutex<RepeatingTask>>),
}

struct ManualTimer {
    id: u64,
    due_ms: u64,
    period_ms: Option<u64>,
    task: TimerTask,
}

struct SchedulerState {
    timers: Vec<ManualTimer>,
    frames: VecDeque<ScheduledTask>,
    cancelled: HashSet<u64>,
    next_id: u64,
}

/// Deterministic [`Scheduler`] driven by explicit `advance`/`run_frame`
/// calls, sharing its notion of time with a [`ManualClock`].
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    state: Mutex<SchedulerState>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(SchedulerState {
                timers: Vec::new(),
                frames: VecDeque::new(),
                cancelled: HashSet::new(),
                next_id: 1,
            }),
        }
    }

    /// Advance virtual time, firing due timers in deadline order.
    pub fn advance(&self, delta: Duration) {
        let target = self.clock.offset_ms() + delta.as_millis() as u64;
        loop {
            enum Fired {
                Once(u64, Option<ScheduledTask>),
                Repeating(u64, Arc<Mutex<RepeatingTask>>),
            }

            let fired = {
                let mut guard = self.state.lock().expect("manual scheduler poisoned");
                let state = &mut *guard;
                state
                    .timers
                    .retain(|t| !state.cancelled.contains(&t.id));

                let idx = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_ms <= target)
                    .min_by_key(|(_, t)| (t.due_ms, t.id))
                    .map(|(i, _)| i);

                match idx {
                    Some(i) => {
                        let due = state.timers[i].due_ms;
                        match state.timers[i].period_ms {
                            Some(period) => {
                                state.timers[i].due_ms = due + period.max(1);
                                match &state.timers[i].task {
                                    TimerTask::Repeating(task) => {
                                        Some(Fired::Repeating(due, Arc::clone(task)))
                                    }
                                    TimerTask::Once(_) => unreachable!("period on one-shot"),
                                }
                            }
                            None => {
                                let mut timer = state.timers.remove(i);
                                match &mut timer.task {
                                    TimerTask::Once(task) => Some(Fired::Once(due, task.take())),
                                    TimerTask::Repeating(_) => {
                                        unreachable!("repeating without period")
                                    }
                                }
                            }
                        }
                    }
                    None => None,
                }
            };

            match fired {
                Some(Fired::Once(due, task)) => {
                    self.clock.set_offset_ms(due);
                    if let Some(task) = task {
                        task();
                    }
                }
                Some(Fired::Repeating(due, task)) => {
                    self.clock.set_offset_ms(due);
                    let mut task = task.lock().expect("repeating task poisoned");
                    (*task)();
                }
                None => break,
            }
        }
        self.clock.set_offset_ms(target);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Run the tasks queued for the current frame. Tasks scheduled while the
    /// frame runs go to the next frame.
    pub fn run_frame(&self) {
        let batch: Vec<ScheduledTask> = {
            let mut state = self.state.lock().expect("manual scheduler poisoned");
            state.frames.drain(..).collect()
        };
        for task in batch {
            task();
        }
    }

    pub fn run_frames(&self, count: usize) {
        for _ in 0..count {
            self.run_frame();
        }
    }

    pub fn pending_timers(&self) -> usize {
        let state = self.state.lock().expect("manual scheduler poisoned");
        state
            .timers
            .iter()
            .filter(|t| !state.cancelled.contains(&t.id))
            .count()
    }

    pub fn pending_frames(&self) -> usize {
        self.state
            .lock()
            .expect("manual scheduler poisoned")
            .frames
            .len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> TimerId {
        let mut state = self.state.lock().expect("manual scheduler poisoned");
        let id = state.next_id;
        state.next_id += 1;
        let due_ms = self.clock.offset_ms() + delay.as_millis() as u64;
        state.timers.push(ManualTimer {
            id,
            due_ms,
            period_ms: None,
            task: TimerTask::Once(Some(task)),
        });
        TimerId(id)
    }

    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerId {
        let mut state = self.state.lock().expect("manual scheduler poisoned");
        let id = state.next_id;
        state.next_id += 1;
        let period_ms = (period.as_millis() as u64).max(1);
        state.timers.push(ManualTimer {
            id,
            due_ms: self.clock.offset_ms() + period_ms,
            period_ms: Some(period_ms),
            task: TimerTask::Repeating(Arc::new(Mutex::new(task))),
        });
        TimerId(id)
    }

    fn cancel(&self, timer: TimerId) {
        let mut guard = self.state.lock().expect("manual scheduler poisoned");
        let state = &mut *guard;
        state.cancelled.insert(timer.0);
        state.timers.retain(|t| t.id != timer.0);
    }

    fn request_frame(&self, task: ScheduledTask) {
        self.state
            .lock()
            .expect("manual scheduler poisoned")
            .frames
            .push_back(task);
    }
}
