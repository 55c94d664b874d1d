use std::sync::atomic::{AtomicBool, Ordering};

/// Polled by long-running work to find out whether the caller wants it abandoned.
///
/// Implementations may be called from any worker thread, concurrently.
pub trait IShouldCancelCallback: Send + Sync {
    fn should_cancel(&self) -> bool;
}

/// Callback that never requests cancellation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl IShouldCancelCallback for NeverCancel {
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        false
    }
}

impl IShouldCancelCallback for AtomicBool {
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<F> IShouldCancelCallback for F
where
    F: Fn() -> bool + Send + Sync,
{
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        self()
    }
}
