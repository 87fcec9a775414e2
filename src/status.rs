use color_eyre::Result;
use nix::sys::signal::Signal;

/// Point-in-time status of a child process, as reported by the OS.
///
/// Fields past the first snapshot of a dead process may be stale; callers
/// capture the exit code on the first not-running observation and never
/// re-derive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub running: bool,
    pub exit_code: i32,
    pub signaled: bool,
    pub term_signal: i32,
    pub stopped: bool,
    pub pid: i32,
    pub command: String,
}

/// Control surface over one spawned OS process.
///
/// `status` and `send_signal` must be cheap, synchronous and repeatable.
/// `release` consumes the reference, so the reap happens exactly once by
/// construction.
pub trait ProcessControl {
    fn status(&mut self) -> StatusSnapshot;

    fn send_signal(&mut self, signal: Signal) -> Result<()>;

    /// Close/reap the underlying OS process reference.
    fn release(self: Box<Self>);
}
