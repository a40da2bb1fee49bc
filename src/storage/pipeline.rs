//! Per-path pipelines
//!
//! Asynchronous file actions are queued in a lane keyed by physical path and
//! executed by a small worker pool. A lane is handed to at most one worker at
//! a time, so actions on the same path run strictly in submission order
//! while different paths proceed in parallel.
//!
//! ```text
//!  submit(path, action)
//!        │
//!        ▼
//!  ┌───────────────┐  path  ┌──────────┐
//!  │ lanes[path]   │───────▶│ ready    │──▶ worker: pop one action, run it,
//!  │ VecDeque<Job> │        │ channel  │    re-queue the path if more remain,
//!  └───────────────┘        └──────────┘    else retire the lane
//! ```

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Run(PathBuf),
    Stop,
}

/// Result of an action queued on a pipeline
#[must_use = "a pending action only reports its outcome through wait()"]
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    /// An already completed action
    pub fn ready(value: T) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(value);
        Self { rx }
    }

    /// Block until the action ran; `None` if it was dropped without running
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}

struct Lanes {
    queues: Mutex<HashMap<PathBuf, VecDeque<Job>>>,
    drained: Condvar,
    ready: Sender<Task>,
}

/// Worker pool executing per-path ordered actions
pub(crate) struct Pipeline {
    lanes: Arc<Lanes>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub(crate) fn new(threads: usize) -> Self {
        let (ready, rx) = channel::unbounded();
        let lanes = Arc::new(Lanes {
            queues: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            ready,
        });

        let workers = (0..threads.max(1))
            .map(|i| {
                let lanes = Arc::clone(&lanes);
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("shardtree-io-{}", i))
                    .spawn(move || worker_loop(lanes, rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "failed to spawn I/O worker");
                    None
                }
            })
            .collect();

        Self { lanes, workers }
    }

    /// Queue `action` behind every action already queued for `key`
    pub(crate) fn submit<T, F>(&self, key: PathBuf, action: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(action());
        });

        let mut queues = self.lanes.queues.lock();
        match queues.get_mut(&key) {
            Some(lane) => lane.push_back(job),
            None => {
                tracing::trace!(path = %key.display(), "opening lane");
                queues.insert(key.clone(), VecDeque::from([job]));
                let _ = self.lanes.ready.send(Task::Run(key));
            }
        }
        Pending { rx }
    }

    /// Block until every lane is empty
    pub(crate) fn flush(&self) {
        let mut queues = self.lanes.queues.lock();
        while !queues.is_empty() {
            self.lanes.drained.wait(&mut queues);
        }
    }

    /// Block until the lane for `key` is empty
    pub(crate) fn settle(&self, key: &Path) {
        let mut queues = self.lanes.queues.lock();
        while queues.contains_key(key) {
            self.lanes.drained.wait(&mut queues);
        }
    }

    /// Number of lanes with queued or running actions
    pub(crate) fn active_lanes(&self) -> usize {
        self.lanes.queues.lock().len()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.flush();
        for _ in 0..self.workers.len() {
            let _ = self.lanes.ready.send(Task::Stop);
        }
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(lanes: Arc<Lanes>, rx: Receiver<Task>) {
    while let Ok(Task::Run(key)) = rx.recv() {
        let job = lanes
            .queues
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        if let Some(job) = job {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!(path = %key.display(), "pipeline action panicked");
            }
        }

        let mut queues = lanes.queues.lock();
        let more = queues.get(&key).is_some_and(|lane| !lane.is_empty());
        if more {
            let _ = lanes.ready.send(Task::Run(key));
        } else {
            queues.remove(&key);
            tracing::trace!(path = %key.display(), "lane drained");
            lanes.drained.notify_all();
        }
    }
}
