use std::collections::HashMap;

/// Lifecycle notifications a [`crate::ProcessHandle`] can emit.
///
/// `Exit` and `Close` fire back-to-back from the same guarded transition;
/// both carry the final `(exit_code, signal_code)` pair, of which exactly
/// one is `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessEvent {
    Exit,
    Close,
}

pub type LifecycleListener = Box<dyn FnMut(Option<i32>, Option<i32>)>;

/// Per-instance listener registry. Listeners for an event run synchronously,
/// in registration order.
#[derive(Default)]
pub struct EventEmitter {
    listeners: HashMap<ProcessEvent, Vec<LifecycleListener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, event: ProcessEvent, listener: LifecycleListener) {
        self.listeners.entry(event).or_default().push(listener);
    }

    pub fn emit(&mut self, event: ProcessEvent, exit_code: Option<i32>, signal_code: Option<i32>) {
        if let Some(listeners) = self.listeners.get_mut(&event) {
            for listener in listeners.iter_mut() {
                listener(exit_code, signal_code);
            }
        }
    }
}
