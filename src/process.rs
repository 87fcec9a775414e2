use crate::configs::HandleConfig;
use crate::emitter::{EventEmitter, ProcessEvent};
use crate::scheduler::{Scheduler, TimerKey};
use crate::status::{ProcessControl, StatusSnapshot};
use crate::streams::{ReadableStream, WritableStream};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use nix::sys::signal::Signal;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// Lifecycle tracker for one externally spawned child process.
///
/// Stream end-of-stream notifications and termination requests drive status
/// reconciliation; reconciliation decides when the process counts as exited
/// and fires the terminal `Exit`/`Close` events exactly once. Everything runs
/// on a single cooperative loop thread, so state lives in `Rc<RefCell<_>>`
/// and clones of the handle are cheap references to the same process.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Rc<RefCell<Inner>>,
    emitter: Rc<RefCell<EventEmitter>>,
}

struct Inner {
    process: Option<Box<dyn ProcessControl>>,
    stdin: Box<dyn WritableStream>,
    stdout: Rc<RefCell<dyn ReadableStream>>,
    stderr: Rc<RefCell<dyn ReadableStream>>,
    scheduler: Rc<dyn Scheduler>,
    config: HandleConfig,
    status: Option<StatusSnapshot>,
    exit_code: Option<i32>,
    signal_code: Option<i32>,
    exited: bool,
    stopped: bool,
    termination_requested: bool,
    timer: Option<TimerKey>,
}

struct WeakHandle {
    inner: Weak<RefCell<Inner>>,
    emitter: Weak<RefCell<EventEmitter>>,
}

impl WeakHandle {
    fn upgrade(&self) -> Option<ProcessHandle> {
        Some(ProcessHandle {
            inner: self.inner.upgrade()?,
            emitter: self.emitter.upgrade()?,
        })
    }
}

impl ProcessHandle {
    /// Take ownership of a running process and its three standard streams.
    ///
    /// Registers end-of-stream listeners on stdout and stderr; each runs a
    /// status refresh followed by a finalization attempt. No other side
    /// effects.
    pub fn new(
        process: Box<dyn ProcessControl>,
        stdin: Box<dyn WritableStream>,
        stdout: Rc<RefCell<dyn ReadableStream>>,
        stderr: Rc<RefCell<dyn ReadableStream>>,
        scheduler: Rc<dyn Scheduler>,
        config: HandleConfig,
    ) -> Self {
        let handle = Self {
            inner: Rc::new(RefCell::new(Inner {
                process: Some(process),
                stdin,
                stdout: Rc::clone(&stdout),
                stderr: Rc::clone(&stderr),
                scheduler,
                config,
                status: None,
                exit_code: None,
                signal_code: None,
                exited: false,
                stopped: false,
                termination_requested: false,
                timer: None,
            })),
            emitter: Rc::new(RefCell::new(EventEmitter::new())),
        };

        stdout
            .borrow_mut()
            .on_end(Self::end_listener(handle.downgrade()));
        stderr
            .borrow_mut()
            .on_end(Self::end_listener(handle.downgrade()));

        handle
    }

    // Weak capture: the listener lives inside a stream the handle owns, so a
    // strong clone here would cycle and leak the whole state.
    fn end_listener(weak: WeakHandle) -> Box<dyn FnMut()> {
        Box::new(move || {
            if let Some(handle) = weak.upgrade() {
                handle.refresh_status();
                handle.attempt_finalize();
            }
        })
    }

    fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            inner: Rc::downgrade(&self.inner),
            emitter: Rc::downgrade(&self.emitter),
        }
    }

    pub fn on_exit(&self, listener: impl FnMut(Option<i32>, Option<i32>) + 'static) {
        self.emitter
            .borrow_mut()
            .on(ProcessEvent::Exit, Box::new(listener));
    }

    pub fn on_close(&self, listener: impl FnMut(Option<i32>, Option<i32>) + 'static) {
        self.emitter
            .borrow_mut()
            .on(ProcessEvent::Close, Box::new(listener));
    }

    /// Reconcile cached state with a fresh OS status snapshot.
    ///
    /// Frozen once a termination signal has been captured or the process
    /// reference released: a poll after either point would report stale data.
    pub fn refresh_status(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.signal_code.is_some() {
            return;
        }
        let Some(process) = inner.process.as_mut() else {
            return;
        };
        let snapshot = process.status();
        debug!(?snapshot, "refreshed child status");

        // Capture the exit code on the first not-running observation only.
        if !snapshot.running && !inner.stopped {
            inner.exit_code = Some(snapshot.exit_code);
            inner.stopped = true;
        }
        let signaled = snapshot.signaled;
        let term_signal = snapshot.term_signal;
        inner.status = Some(snapshot);

        if signaled {
            info!(term_signal, "child terminated by signal");
            inner.signal_code = Some(term_signal);
            if let Some(key) = inner.timer.take() {
                inner.scheduler.cancel_timer(key);
            }
            inner.termination_requested = false;
        } else if inner.termination_requested {
            if inner.stopped {
                // Child ended without the signal registering (caught it and
                // exited, or was already done). Escalation is settled.
                if let Some(key) = inner.timer.take() {
                    inner.scheduler.cancel_timer(key);
                }
                inner.termination_requested = false;
            } else {
                // Signal sent but not yet visible in the status; yield once
                // so the loop can run queued work before the next poll.
                let scheduler = Rc::clone(&inner.scheduler);
                drop(inner);
                scheduler.tick();
            }
        }
    }

    /// Finalize if the process is ready: no termination in flight and both
    /// output streams have ended. Safe to call from either stream's end
    /// listener in any order.
    pub fn attempt_finalize(&self) {
        {
            let inner = self.inner.borrow();
            if inner.termination_requested
                || inner.stdout.borrow().is_readable()
                || inner.stderr.borrow().is_readable()
            {
                return;
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.stdin.close();
            inner.stdout.borrow_mut().close();
            inner.stderr.borrow_mut().close();
        }
        self.exit_sequence();
    }

    /// Send a termination signal and start escalation polling.
    ///
    /// `None` falls back to the configured default (SIGTERM out of the box).
    /// Stream-end notifications may lag or never come once the child is
    /// signalled, so a short-period timer re-runs reconciliation until the
    /// OS reports the signal. Send failures propagate without state changes.
    pub fn terminate(&self, signal: Option<Signal>) -> Result<()> {
        let weak = self.downgrade();
        let (scheduler, period) = {
            let mut inner = self.inner.borrow_mut();
            let signal = match signal {
                Some(signal) => signal,
                None => inner.config.signal()?,
            };
            let Some(process) = inner.process.as_mut() else {
                return Err(eyre!("Process already released"));
            };
            info!(signal = ?signal, "sending termination signal");
            process
                .send_signal(signal)
                .wrap_err("Failed to signal child")?;
            inner.termination_requested = true;
            if inner.timer.is_some() {
                // Escalation poller already running, don't stack another.
                return Ok(());
            }
            (Rc::clone(&inner.scheduler), inner.config.poll_interval)
        };

        let key = scheduler.add_periodic_timer(
            period,
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    handle.refresh_status();
                    handle.attempt_finalize();
                }
            }),
        );
        self.inner.borrow_mut().timer = Some(key);
        Ok(())
    }

    /// Release the process reference and run the terminal transition.
    /// A no-op once the reference is gone.
    fn exit_sequence(&self) {
        let (exit_code, signal_code) = {
            let mut inner = self.inner.borrow_mut();
            let Some(process) = inner.process.take() else {
                return;
            };
            process.release();
            // Should already be gone by now, but a leaked timer would keep
            // ticking against a finished handle.
            if let Some(key) = inner.timer.take() {
                inner.scheduler.cancel_timer(key);
            }
            match inner.signal_code {
                Some(signal) => (None, Some(signal)),
                None => (inner.exit_code, None),
            }
        };
        self.finalize(exit_code, signal_code);
    }

    // Idempotent terminal transition: `exited` guards against racing
    // stream-end callbacks reaching here twice.
    fn finalize(&self, exit_code: Option<i32>, signal_code: Option<i32>) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.exited {
                return;
            }
            inner.exited = true;
            inner.exit_code = exit_code;
            inner.signal_code = signal_code;
        }
        info!(?exit_code, ?signal_code, "child lifecycle complete");
        let mut emitter = self.emitter.borrow_mut();
        emitter.emit(ProcessEvent::Exit, exit_code, signal_code);
        emitter.emit(ProcessEvent::Close, exit_code, signal_code);
    }

    /// Pid of the child. Queries at most once: the pid never changes, so the
    /// cached snapshot is reused on every later call.
    pub fn pid(&self) -> Option<i32> {
        self.cached_status().map(|status| status.pid)
    }

    /// Command line of the child, from the same cached snapshot as [`Self::pid`].
    pub fn command(&self) -> Option<String> {
        self.cached_status().map(|status| status.command)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.inner.borrow().exit_code
    }

    pub fn signal_code(&self) -> Option<i32> {
        self.inner.borrow().signal_code
    }

    /// Whether the OS still reports the process as running. Short-circuits
    /// to `false` once exited, avoiding a query on a released reference.
    pub fn is_running(&self) -> bool {
        if self.inner.borrow().exited {
            return false;
        }
        self.fresh_status().map_or(false, |status| status.running)
    }

    pub fn is_signaled(&self) -> bool {
        self.fresh_status().map_or(false, |status| status.signaled)
    }

    pub fn is_stopped(&self) -> bool {
        self.fresh_status().map_or(false, |status| status.stopped)
    }

    fn cached_status(&self) -> Option<StatusSnapshot> {
        if self.inner.borrow().status.is_none() {
            self.refresh_status();
        }
        self.inner.borrow().status.clone()
    }

    fn fresh_status(&self) -> Option<StatusSnapshot> {
        self.refresh_status();
        self.inner.borrow().status.clone()
    }
}
