//! Task scheduling for parallel builds.
//!
//! - `Task`: a boxed unit of work that receives its id, worker index and dispatcher
//! - `TaskStack`: a worker-thread pool consuming a shared LIFO stack of tasks
//! - `InlineDispatcher`: runs everything on the waiting thread

mod inline_dispatcher;
mod task;
mod task_stack;

pub use inline_dispatcher::InlineDispatcher;
pub use task::{Task, TaskFunction};
pub use task_stack::TaskStack;
