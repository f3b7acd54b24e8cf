//! A manually advanced, single-threaded tick scheduler.
//!
//! [`TickScheduler`] stands in for the host's scheduler in tests and in the
//! CLI. Ticks only happen when [`TickScheduler::tick`] is called; tasks run in
//! registration order within a tick. Tasks may register or cancel other tasks
//! (including themselves) while running.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::traits::{RunId, Scheduler, Step, Stepper};

enum TaskKind {
    Once(Box<dyn FnOnce() + Send>),
    Interval {
        every: u64,
        task: Box<dyn FnMut() + Send>,
    },
    Job(Box<dyn Stepper>),
}

struct Task {
    due: u64,
    kind: TaskKind,
}

#[derive(Default)]
struct SchedulerState {
    tick: u64,
    next_id: u64,
    tasks: BTreeMap<RunId, Task>,
    /// The task currently checked out for running.
    running: Option<RunId>,
    /// Whether `running` was cancelled while it ran.
    running_cancelled: bool,
    shutdown_hooks: Vec<Box<dyn FnOnce() + Send>>,
    shut_down: bool,
}

impl SchedulerState {
    fn register(&mut self, due: u64, kind: TaskKind) -> RunId {
        self.next_id += 1;
        let id = RunId(self.next_id);
        self.tasks.insert(id, Task { due, kind });
        id
    }
}

/// Cooperative scheduler advanced by hand.
#[derive(Default)]
pub struct TickScheduler {
    state: Mutex<SchedulerState>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one tick, running every task that is due.
    ///
    /// Does nothing once the scheduler has shut down.
    pub fn tick(&self) {
        let (now, due) = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.shut_down {
                return;
            }
            state.tick += 1;
            let now = state.tick;
            let due: Vec<RunId> = state
                .tasks
                .iter()
                .filter(|(_, task)| task.due <= now)
                .map(|(id, _)| *id)
                .collect();
            (now, due)
        };

        for id in due {
            // Check the task out so it can freely call back into the scheduler.
            let task = {
                let mut state = self.state.lock().expect("lock poisoned");
                let task = state.tasks.remove(&id);
                if task.is_some() {
                    state.running = Some(id);
                    state.running_cancelled = false;
                }
                task
            };
            let Some(task) = task else {
                // Cancelled by an earlier task in this tick.
                continue;
            };

            let requeue = match task.kind {
                TaskKind::Once(f) => {
                    f();
                    None
                }
                TaskKind::Interval { every, mut task } => {
                    task();
                    Some(Task {
                        due: now + every,
                        kind: TaskKind::Interval { every, task },
                    })
                }
                TaskKind::Job(mut job) => match job.next() {
                    Step::Continue => Some(Task {
                        due: now + 1,
                        kind: TaskKind::Job(job),
                    }),
                    Step::Done => {
                        debug!(run = id.0, tick = now, "job finished");
                        None
                    }
                },
            };

            let mut state = self.state.lock().expect("lock poisoned");
            state.running = None;
            let cancelled = std::mem::take(&mut state.running_cancelled);
            if let Some(task) = requeue {
                if !cancelled {
                    state.tasks.insert(id, task);
                }
            }
        }
    }

    /// Advance `n` ticks.
    pub fn run_ticks(&self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Tick until `done` returns `true`, at most `limit` times.
    ///
    /// Returns the number of ticks advanced, or `None` if the limit was hit.
    pub fn tick_until(&self, limit: u64, mut done: impl FnMut() -> bool) -> Option<u64> {
        for n in 0..limit {
            if done() {
                return Some(n);
            }
            self.tick();
        }
        done().then_some(limit)
    }

    /// Fire the shutdown hooks once and stop ticking.
    pub fn shutdown(&self) {
        let hooks = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.shut_down {
                warn!("scheduler already shut down");
                return;
            }
            state.shut_down = true;
            std::mem::take(&mut state.shutdown_hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().expect("lock poisoned").shut_down
    }

    /// Number of registered, not yet finished tasks.
    pub fn pending_tasks(&self) -> usize {
        self.state.lock().expect("lock poisoned").tasks.len()
    }
}

impl Scheduler for TickScheduler {
    fn current_tick(&self) -> u64 {
        self.state.lock().expect("lock poisoned").tick
    }

    fn run_once(&self, task: Box<dyn FnOnce() + Send>) -> RunId {
        let mut state = self.state.lock().expect("lock poisoned");
        let due = state.tick + 1;
        state.register(due, TaskKind::Once(task))
    }

    fn run_interval(&self, interval: u32, task: Box<dyn FnMut() + Send>) -> RunId {
        let every = u64::from(interval.max(1));
        let mut state = self.state.lock().expect("lock poisoned");
        let due = state.tick + every;
        state.register(due, TaskKind::Interval { every, task })
    }

    fn run_job(&self, job: Box<dyn Stepper>) -> RunId {
        let mut state = self.state.lock().expect("lock poisoned");
        let due = state.tick + 1;
        state.register(due, TaskKind::Job(job))
    }

    fn clear_run(&self, id: RunId) {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.tasks.remove(&id).is_none() && state.running == Some(id) {
            state.running_cancelled = true;
        }
    }

    fn on_shutdown(&self, hook: Box<dyn FnOnce() + Send>) {
        self.state
            .lock()
            .expect("lock poisoned")
            .shutdown_hooks
            .push(hook);
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("TickScheduler")
            .field("tick", &state.tick)
            .field("tasks", &state.tasks.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn run_once_fires_on_next_tick_only() {
        let sched = TickScheduler::new();
        let hits = counter();
        let h = hits.clone();
        sched.run_once(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sched.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sched.run_ticks(5);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sched.pending_tasks(), 0);
    }

    #[test]
    fn interval_repeats_at_its_period() {
        let sched = TickScheduler::new();
        let hits = counter();
        let h = hits.clone();
        sched.run_interval(3, Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        sched.run_ticks(2);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sched.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sched.run_ticks(6);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clear_run_stops_interval() {
        let sched = TickScheduler::new();
        let hits = counter();
        let h = hits.clone();
        let id = sched.run_interval(1, Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        sched.run_ticks(2);
        sched.clear_run(id);
        sched.run_ticks(2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn task_can_cancel_itself() {
        let sched = Arc::new(TickScheduler::new());
        let hits = counter();
        let own_id = Arc::new(Mutex::new(None::<RunId>));

        let (s, h, slot) = (sched.clone(), hits.clone(), own_id.clone());
        let id = sched.run_interval(1, Box::new(move || {
            if h.fetch_add(1, Ordering::SeqCst) == 1 {
                if let Some(id) = *slot.lock().unwrap() {
                    s.clear_run(id);
                }
            }
        }));
        *own_id.lock().unwrap() = Some(id);

        sched.run_ticks(5);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(sched.pending_tasks(), 0);
    }

    #[test]
    fn cancelling_finished_runs_leaves_nothing_behind() {
        let sched = TickScheduler::new();
        let once = sched.run_once(Box::new(|| {}));
        sched.tick();
        sched.clear_run(once);
        sched.clear_run(RunId(999));

        let hits = counter();
        let h = hits.clone();
        sched.run_interval(1, Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        sched.run_ticks(3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let state = sched.state.lock().unwrap();
        assert!(state.running.is_none());
        assert!(!state.running_cancelled);
    }

    #[test]
    fn task_registered_during_tick_waits_for_next_tick() {
        let sched = Arc::new(TickScheduler::new());
        let hits = counter();
        let (s, h) = (sched.clone(), hits.clone());
        sched.run_once(Box::new(move || {
            let h = h.clone();
            s.run_once(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }));
        sched.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sched.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct CountDown(u32, Arc<AtomicU32>);

    impl Stepper for CountDown {
        fn next(&mut self) -> Step {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0 -= 1;
            if self.0 == 0 {
                Step::Done
            } else {
                Step::Continue
            }
        }
    }

    #[test]
    fn job_steps_once_per_tick_until_done() {
        let sched = TickScheduler::new();
        let steps = counter();
        sched.run_job(Box::new(CountDown(3, steps.clone())));
        sched.tick();
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        sched.run_ticks(10);
        assert_eq!(steps.load(Ordering::SeqCst), 3);
        assert_eq!(sched.pending_tasks(), 0);
    }

    #[test]
    fn shutdown_runs_hooks_once_and_freezes_time() {
        let sched = TickScheduler::new();
        let hits = counter();
        let h = hits.clone();
        sched.on_shutdown(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        sched.tick();
        sched.shutdown();
        sched.shutdown();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sched.is_shut_down());
        sched.tick();
        assert_eq!(sched.current_tick(), 1);
    }

    #[test]
    fn tick_until_reports_ticks_used() {
        let sched = Arc::new(TickScheduler::new());
        let s = sched.clone();
        assert_eq!(sched.tick_until(10, || s.current_tick() >= 4), Some(4));
        assert_eq!(sched.tick_until(2, || false), None);
    }
}
