//! Deterministic stand-ins for the OS and event-loop collaborators.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use nix::sys::signal::Signal;
use procwatch::{
    HandleConfig, ProcessControl, ProcessHandle, ReadableStream, Scheduler, StatusSnapshot,
    TimerKey, WritableStream,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

pub struct StubProcess {
    status: Rc<RefCell<StatusSnapshot>>,
    query_count: Rc<Cell<u32>>,
    released: Rc<Cell<bool>>,
    signals: Rc<RefCell<Vec<Signal>>>,
    fail_signals: bool,
}

impl ProcessControl for StubProcess {
    fn status(&mut self) -> StatusSnapshot {
        self.query_count.set(self.query_count.get() + 1);
        self.status.borrow().clone()
    }

    fn send_signal(&mut self, signal: Signal) -> Result<()> {
        if self.fail_signals {
            return Err(eyre!("ESRCH"));
        }
        self.signals.borrow_mut().push(signal);
        Ok(())
    }

    fn release(self: Box<Self>) {
        assert!(!self.released.get(), "process released twice");
        self.released.set(true);
    }
}

pub struct StubStream {
    readable: bool,
    closed: bool,
    listeners: Vec<Box<dyn FnMut()>>,
}

impl StubStream {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            readable: true,
            closed: false,
            listeners: Vec::new(),
        }))
    }

    /// Mark the stream ended and fire its listeners. Listeners are invoked
    /// with the stream borrow released, since they re-query readability.
    pub fn deliver_end(stream: &Rc<RefCell<Self>>) {
        let mut listeners = {
            let mut stream = stream.borrow_mut();
            stream.readable = false;
            std::mem::take(&mut stream.listeners)
        };
        for listener in listeners.iter_mut() {
            listener();
        }
    }

    pub fn is_closed(stream: &Rc<RefCell<Self>>) -> bool {
        stream.borrow().closed
    }
}

impl ReadableStream for StubStream {
    fn is_readable(&self) -> bool {
        self.readable
    }

    fn on_end(&mut self, listener: Box<dyn FnMut()>) {
        self.listeners.push(listener);
    }

    fn close(&mut self) {
        self.closed = true;
        self.readable = false;
    }
}

pub struct StubStdin {
    closed: Rc<Cell<bool>>,
}

impl WritableStream for StubStdin {
    fn close(&mut self) {
        self.closed.set(true);
    }
}

#[derive(Default)]
pub struct StubScheduler {
    timers: RefCell<BTreeMap<u64, Option<Box<dyn FnMut()>>>>,
    cancelled: RefCell<HashSet<u64>>,
    next_key: Cell<u64>,
    firing: Cell<bool>,
    pub tick_count: Cell<u32>,
    pub cancel_count: Cell<u32>,
}

impl StubScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn active_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Run every active periodic timer callback once.
    pub fn fire_timers(&self) {
        let keys: Vec<u64> = self.timers.borrow().keys().copied().collect();
        for key in keys {
            self.fire(key);
        }
    }

    // The callback is moved out while it runs so it can cancel its own
    // timer without re-borrowing the map.
    fn fire(&self, key: u64) {
        let callback = self
            .timers
            .borrow_mut()
            .get_mut(&key)
            .and_then(Option::take);
        let Some(mut callback) = callback else {
            return;
        };
        self.firing.set(true);
        callback();
        self.firing.set(false);
        if self.cancelled.borrow_mut().remove(&key) {
            self.timers.borrow_mut().remove(&key);
        } else if let Some(slot) = self.timers.borrow_mut().get_mut(&key) {
            *slot = Some(callback);
        }
    }
}

impl Scheduler for StubScheduler {
    fn add_periodic_timer(&self, _period: Duration, callback: Box<dyn FnMut()>) -> TimerKey {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.timers.borrow_mut().insert(key, Some(callback));
        TimerKey(key)
    }

    fn cancel_timer(&self, key: TimerKey) {
        self.cancel_count.set(self.cancel_count.get() + 1);
        let mut timers = self.timers.borrow_mut();
        // Mid-fire the slot is empty; defer removal to `fire`.
        let mid_fire = matches!(timers.get(&key.0), Some(None));
        if mid_fire {
            self.cancelled.borrow_mut().insert(key.0);
        } else {
            timers.remove(&key.0);
        }
    }

    fn tick(&self) {
        self.tick_count.set(self.tick_count.get() + 1);
        if self.firing.get() {
            return;
        }
        let first = self.timers.borrow().keys().next().copied();
        if let Some(key) = first {
            self.fire(key);
        }
    }
}

/// A handle wired to stubs, plus the probes the tests assert against.
pub struct Fixture {
    pub handle: ProcessHandle,
    pub status: Rc<RefCell<StatusSnapshot>>,
    pub query_count: Rc<Cell<u32>>,
    pub released: Rc<Cell<bool>>,
    pub signals: Rc<RefCell<Vec<Signal>>>,
    pub stdout: Rc<RefCell<StubStream>>,
    pub stderr: Rc<RefCell<StubStream>>,
    pub stdin_closed: Rc<Cell<bool>>,
    pub scheduler: Rc<StubScheduler>,
}

pub fn running_status() -> StatusSnapshot {
    StatusSnapshot {
        running: true,
        exit_code: -1,
        signaled: false,
        term_signal: 0,
        stopped: false,
        pid: 4242,
        command: "echo hi".into(),
    }
}

pub fn spawn_stub(initial: StatusSnapshot) -> Fixture {
    spawn_stub_with(initial, false)
}

pub fn spawn_stub_with(initial: StatusSnapshot, fail_signals: bool) -> Fixture {
    let status = Rc::new(RefCell::new(initial));
    let query_count = Rc::new(Cell::new(0));
    let released = Rc::new(Cell::new(false));
    let signals = Rc::new(RefCell::new(Vec::new()));
    let stdin_closed = Rc::new(Cell::new(false));
    let stdout = StubStream::new();
    let stderr = StubStream::new();
    let scheduler = StubScheduler::new();

    let process = Box::new(StubProcess {
        status: Rc::clone(&status),
        query_count: Rc::clone(&query_count),
        released: Rc::clone(&released),
        signals: Rc::clone(&signals),
        fail_signals,
    });
    let stdin = Box::new(StubStdin {
        closed: Rc::clone(&stdin_closed),
    });

    let handle = ProcessHandle::new(
        process,
        stdin,
        Rc::clone(&stdout) as Rc<RefCell<dyn ReadableStream>>,
        Rc::clone(&stderr) as Rc<RefCell<dyn ReadableStream>>,
        Rc::clone(&scheduler) as Rc<dyn Scheduler>,
        HandleConfig::default(),
    );

    Fixture {
        handle,
        status,
        query_count,
        released,
        signals,
        stdout,
        stderr,
        stdin_closed,
        scheduler,
    }
}
