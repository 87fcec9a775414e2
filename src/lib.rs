//! Lifecycle tracking for externally spawned child processes on a
//! single-threaded, cooperative event loop.
//!
//! The crate centers on [`ProcessHandle`]: it reconciles stream end-of-stream
//! notifications, OS status polls and termination requests into a single
//! terminal `Exit`/`Close` notification, fired exactly once. Spawning, stream
//! buffering and the event loop itself stay behind the collaborator traits in
//! [`status`], [`streams`] and [`scheduler`].

pub mod configs;
pub mod emitter;
pub mod process;
pub mod scheduler;
pub mod status;
pub mod streams;

pub use configs::HandleConfig;
pub use emitter::{EventEmitter, ProcessEvent};
pub use process::ProcessHandle;
pub use scheduler::{Scheduler, TimerKey};
pub use status::{ProcessControl, StatusSnapshot};
pub use streams::{ReadableStream, WritableStream};
