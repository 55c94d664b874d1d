//! Worker-thread pool with a shared LIFO stack of tasks.
//!
//! Tasks pushed while the pool is busy are popped newest first, which keeps fork-join style workloads depth first.

use crate::utilities::thread_dispatcher::IThreadDispatcher;

use super::task::Task;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

struct StackState {
    tasks: Vec<Task>,
    /// Submitted tasks that have not finished running yet, queued or in flight.
    pending: usize,
    panicked: usize,
    stop: bool,
}

struct Shared {
    state: Mutex<StackState>,
    work_available: Condvar,
    all_complete: Condvar,
    thread_count: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StackState> {
        // Task panics are caught outside the lock, so poisoning only follows a panic in this module.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn worker_loop(&self, worker_index: usize) {
        log::trace!("task stack worker {worker_index} started");
        loop {
            let task = {
                let mut state = self.lock();
                loop {
                    if let Some(task) = state.tasks.pop() {
                        break task;
                    }
                    if state.stop {
                        log::trace!("task stack worker {worker_index} stopping");
                        return;
                    }
                    state = self
                        .work_available
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            };

            let id = task.id;
            let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(worker_index, self)));

            let mut state = self.lock();
            if result.is_err() {
                log::error!("task {id} panicked on worker {worker_index}");
                state.panicked += 1;
            }
            state.pending -= 1;
            if state.pending == 0 {
                self.all_complete.notify_all();
            }
        }
    }
}

impl IThreadDispatcher for Shared {
    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn submit(&self, task: Task) {
        let mut state = self.lock();
        state.pending += 1;
        state.tasks.push(task);
        self.work_available.notify_one();
    }

    fn submit_many(&self, tasks: Vec<Task>) {
        let mut state = self.lock();
        state.pending += tasks.len();
        state.tasks.extend(tasks);
        self.work_available.notify_all();
    }

    fn wait_for_all_to_complete(&self) {
        let mut state = self.lock();
        while state.pending > 0 {
            state = self
                .all_complete
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Fixed-size pool of worker threads consuming a shared stack of tasks.
///
/// `wait_for_all_to_complete` must be called from outside the pool; a worker waiting on its own pool would block
/// forever. Dropping the pool finishes any queued tasks and joins the workers.
pub struct TaskStack {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskStack {
    /// Starts `thread_count` workers. At least one worker is always started.
    pub fn new(thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(StackState {
                tasks: Vec::new(),
                pending: 0,
                panicked: 0,
                stop: false,
            }),
            work_available: Condvar::new(),
            all_complete: Condvar::new(),
            thread_count,
        });
        let threads = (0..thread_count)
            .map(|worker_index| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("task-stack-{worker_index}"))
                    .spawn(move || shared.worker_loop(worker_index))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("failed to spawn task stack worker: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();
        Self { shared, threads }
    }

    /// One worker per available hardware thread.
    pub fn with_available_parallelism() -> Self {
        Self::new(thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Number of tasks that have panicked since the pool was created.
    pub fn panicked_task_count(&self) -> usize {
        self.shared.lock().panicked
    }
}

impl IThreadDispatcher for TaskStack {
    fn thread_count(&self) -> usize {
        self.shared.thread_count
    }

    fn submit(&self, task: Task) {
        self.shared.submit(task);
    }

    fn submit_many(&self, tasks: Vec<Task>) {
        self.shared.submit_many(tasks);
    }

    fn wait_for_all_to_complete(&self) {
        self.shared.wait_for_all_to_complete();
    }
}

impl Drop for TaskStack {
    fn drop(&mut self) {
        self.shared.lock().stop = true;
        self.shared.work_available.notify_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("task stack worker exited by panic");
            }
        }
    }
}
