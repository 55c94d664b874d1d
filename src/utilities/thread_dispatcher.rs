use crate::utilities::task_scheduling::Task;

/// Provides task submission and a completion barrier for multithreaded builds.
///
/// A dispatcher does not need to load balance cleverly. Submitted tasks may run in any order on any worker, and a task
/// may submit further tasks through the dispatcher reference it receives. The builder only relies on three things:
/// every worker index handed to a task is below `thread_count`, a worker runs one task at a time, and
/// `wait_for_all_to_complete` does not return while any submitted task (including ones submitted by running tasks)
/// has yet to finish.
///
/// This is important when a user wants to share some other thread pool. Wrapping whatever implementation they happen
/// to have in this trait will probably work fine.
pub trait IThreadDispatcher: Send + Sync {
    /// Gets the number of workers available in the thread dispatcher.
    fn thread_count(&self) -> usize;

    /// Queues a task for execution on some worker. Must not run the task before returning; callers may hold
    /// per-worker state locked while submitting.
    fn submit(&self, task: Task);

    /// Queues a batch of tasks.
    fn submit_many(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.submit(task);
        }
    }

    /// Blocks until every submitted task, including tasks submitted while waiting, has completed.
    fn wait_for_all_to_complete(&self);
}
