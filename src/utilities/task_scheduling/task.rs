//! Task definition for the task scheduling system.
//!
//! Tasks represent units of work that can be executed by worker threads.

use crate::utilities::thread_dispatcher::IThreadDispatcher;
use std::fmt;

/// Boxed closure executed by a task.
/// Takes as arguments: task id, worker index, and dispatcher reference.
pub type TaskFunction = Box<dyn FnOnce(u64, usize, &dyn IThreadDispatcher) + Send + 'static>;

/// Description of a task to be submitted to an `IThreadDispatcher`.
pub struct Task {
    /// Function to be executed by the task.
    function: TaskFunction,
    /// User-provided identifier of this task.
    pub id: u64,
}

impl Task {
    /// Creates a new task.
    ///
    /// # Arguments
    /// * `task_id` - Id of this task to be passed into the function.
    /// * `function` - Function to be executed by the task.
    #[inline(always)]
    pub fn new<F>(task_id: u64, function: F) -> Self
    where
        F: FnOnce(u64, usize, &dyn IThreadDispatcher) + Send + 'static,
    {
        Self {
            function: Box::new(function),
            id: task_id,
        }
    }

    /// Runs the task, consuming it.
    ///
    /// # Arguments
    /// * `worker_index` - Worker index to pass to the function.
    /// * `dispatcher` - Dispatcher running this task.
    #[inline(always)]
    pub fn run(self, worker_index: usize, dispatcher: &dyn IThreadDispatcher) {
        (self.function)(self.id, worker_index, dispatcher);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}
