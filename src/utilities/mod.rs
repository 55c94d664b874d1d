pub mod bounding_box;
pub mod print_output;
pub mod should_cancel;
pub mod task_scheduling;
pub mod thread_dispatcher;

pub use self::bounding_box::BoundingBox4;
pub use self::print_output::{CollectingPrintOutput, IPrintOutput, LogPrintOutput};
pub use self::should_cancel::{IShouldCancelCallback, NeverCancel};
pub use self::thread_dispatcher::IThreadDispatcher;
