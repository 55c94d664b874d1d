use crate::utilities::thread_dispatcher::IThreadDispatcher;

use super::task::Task;

use std::sync::Mutex;

/// Single-worker dispatcher which runs queued tasks on the thread that calls `wait_for_all_to_complete`.
///
/// Useful for deterministic builds and tests. Tasks always see worker index 0.
#[derive(Debug, Default)]
pub struct InlineDispatcher {
    tasks: Mutex<Vec<Task>>,
}

impl InlineDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self) -> Option<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }
}

impl IThreadDispatcher for InlineDispatcher {
    fn thread_count(&self) -> usize {
        1
    }

    fn submit(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }

    fn wait_for_all_to_complete(&self) {
        // The lock is released before running so tasks can submit more work.
        while let Some(task) = self.pop() {
            task.run(0, self);
        }
    }
}
