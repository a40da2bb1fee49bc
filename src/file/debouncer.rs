//! Idle timer thread
//!
//! Every armed timer is an entry in a min-heap ordered by due time. A single
//! thread sleeps until the earliest entry is due and fires it. Entries carry
//! the generation of the save that armed them; the target ignores entries
//! whose generation is no longer current, so a write never needs to remove
//! anything from the heap. A target saved again after arming asks for its
//! entry to be pushed back instead of arming a second one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::Result;

/// Something a timer can flush
pub(crate) trait Flushable: Send + Sync {
    /// Called when the timer armed with `generation` fires.
    ///
    /// Returns a later due time to re-arm the same timer. `force` is set when
    /// timers are drained and must not re-arm.
    fn fire(&self, generation: u64, force: bool) -> Option<Instant>;
}

struct Timer {
    due: Instant,
    seq: u64,
    generation: u64,
    target: Arc<dyn Flushable>,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so the max-heap yields the earliest timer first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Timer>,
    seq: u64,
    firing: usize,
    stopped: bool,
}

#[derive(Default)]
pub(crate) struct Timers {
    state: Mutex<State>,
    wake: Condvar,
    idle: Condvar,
}

impl Timers {
    /// Arm a timer firing `target` after `delay`
    pub(crate) fn schedule(&self, delay: Duration, target: Arc<dyn Flushable>, generation: u64) {
        let mut state = self.state.lock();
        if state.stopped {
            drop(state);
            let _ = target.fire(generation, true);
            return;
        }
        state.seq += 1;
        let seq = state.seq;
        state.heap.push(Timer {
            due: Instant::now() + delay,
            seq,
            generation,
            target,
        });
        self.wake.notify_one();
    }

    /// Fire every armed timer now and wait for in-flight ones to finish
    fn drain(&self) -> usize {
        let mut state = self.state.lock();
        let due: Vec<Timer> = state.heap.drain().collect();
        let count = due.len();
        state.firing += count;
        MutexGuard::unlocked(&mut state, || {
            let mut due = due;
            due.sort_by(|a, b| b.cmp(a));
            for timer in due {
                let _ = fire(timer, true);
            }
        });
        state.firing -= count;
        while state.firing > 0 {
            self.idle.wait(&mut state);
        }
        self.idle.notify_all();
        count
    }

    fn pending(&self) -> usize {
        self.state.lock().heap.len()
    }
}

/// Fire `timer`; returns it re-armed when the target asked for a later due
fn fire(timer: Timer, force: bool) -> Option<Timer> {
    let outcome =
        panic::catch_unwind(AssertUnwindSafe(|| timer.target.fire(timer.generation, force)));
    match outcome {
        Ok(Some(due)) => Some(Timer { due, ..timer }),
        Ok(None) => None,
        Err(_) => {
            tracing::error!("debounce timer panicked");
            None
        }
    }
}

fn run(timers: Arc<Timers>) {
    let mut state = timers.state.lock();
    loop {
        if state.stopped {
            break;
        }
        let next_due = state.heap.peek().map(|t| t.due);
        match next_due {
            None => {
                timers.wake.wait(&mut state);
            }
            Some(due) if due <= Instant::now() => {
                let Some(timer) = state.heap.pop() else {
                    continue;
                };
                state.firing += 1;
                let rearmed = MutexGuard::unlocked(&mut state, || fire(timer, false));
                state.firing -= 1;
                if let Some(timer) = rearmed {
                    state.heap.push(timer);
                }
                if state.firing == 0 {
                    timers.idle.notify_all();
                }
            }
            Some(due) => {
                timers.wake.wait_until(&mut state, due);
            }
        }
    }
}

/// Owner of the idle timer thread
pub struct Debouncer {
    timers: Arc<Timers>,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Spawn the timer thread
    pub fn start() -> Result<Self> {
        let timers = Arc::new(Timers::default());
        let worker = {
            let timers = Arc::clone(&timers);
            thread::Builder::new()
                .name("shardtree-debounce".to_string())
                .spawn(move || run(timers))?
        };
        Ok(Self {
            timers,
            worker: Some(worker),
        })
    }

    pub(crate) fn timers(&self) -> Arc<Timers> {
        Arc::clone(&self.timers)
    }

    /// Force every armed timer immediately; returns how many were fired
    pub fn drain(&self) -> usize {
        let fired = self.timers.drain();
        if fired > 0 {
            tracing::debug!(fired, "forced debounce timers");
        }
        fired
    }

    /// Number of armed timers, including superseded ones
    pub fn pending(&self) -> usize {
        self.timers.pending()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.timers.drain();
        {
            let mut state = self.timers.state.lock();
            state.stopped = true;
            self.timers.wake.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        // Timers re-armed while the thread was stopping
        self.timers.drain();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.pending())
            .finish()
    }
}
