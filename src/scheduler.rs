use std::time::Duration;

/// Handle to a timer registered with a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey(pub u64);

/// Single-threaded cooperative event loop, as seen by a process handle.
///
/// Everything runs on one thread: timer callbacks are serialized with stream
/// notifications, never concurrent with them.
pub trait Scheduler {
    /// Register a repeating timer. The callback runs on every tick of the
    /// loop until cancelled.
    fn add_periodic_timer(&self, period: Duration, callback: Box<dyn FnMut()>) -> TimerKey;

    /// Cancel a timer. Unknown or already-cancelled keys are ignored.
    fn cancel_timer(&self, key: TimerKey);

    /// Process at most one pending callback, without blocking.
    ///
    /// Compatibility hook for cooperative loops: while a termination signal
    /// is pending, status reconciliation yields here once so the loop can
    /// run queued work before the next status check. Must not re-enter:
    /// a `tick` issued from within a running callback is a no-op.
    fn tick(&self);
}
