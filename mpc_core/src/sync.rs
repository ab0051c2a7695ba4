// Completion Signalling
// =====================
// A waitable flag that hands readiness from the setup threads to the
// online-phase threads. It flips from unset to set exactly once; waiters
// block on the condition variable instead of polling.

use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the condition as fulfilled and wakes all waiters.
    pub fn set(&self) {
        let mut done = self.inner.done.lock().expect("completion lock poisoned");
        *done = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.done.lock().expect("completion lock poisoned")
    }

    /// Blocks until `set` has been called. Returns immediately when it
    /// already has.
    pub fn wait(&self) {
        let mut done = self.inner.done.lock().expect("completion lock poisoned");
        while !*done {
            done = self
                .inner
                .condvar
                .wait(done)
                .expect("completion lock poisoned");
        }
    }
}
