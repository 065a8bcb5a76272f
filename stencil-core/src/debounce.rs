use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::scheduler::{EventLoop, TimerId};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Coalesces bursts of calls into a single callback run once things go quiet.
pub struct Debouncer {
    event_loop: EventLoop,
    callback: Rc<RefCell<Box<dyn FnMut()>>>,
    timeout: Duration,
    pending: Option<TimerId>,
}

impl Debouncer {
    pub fn new(event_loop: EventLoop, callback: impl FnMut() + 'static) -> Self {
        Self::with_timeout(event_loop, DEFAULT_DEBOUNCE, callback)
    }

    pub fn with_timeout(
        event_loop: EventLoop,
        timeout: Duration,
        callback: impl FnMut() + 'static,
    ) -> Self {
        let callback: Box<dyn FnMut()> = Box::new(callback);
        Self {
            event_loop,
            callback: Rc::new(RefCell::new(callback)),
            timeout,
            pending: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// (Re)start the quiet period; the callback fires `timeout` after the last call.
    pub fn debounce(&mut self) {
        self.cancel();
        let cb = self.callback.clone();
        self.pending = Some(self.event_loop.set_timeout(self.timeout, move || {
            if let Ok(mut f) = cb.try_borrow_mut() {
                (*f)();
            }
        }));
    }

    /// Cancel any pending run and fire the callback right away.
    pub fn trigger(&mut self) {
        self.cancel();
        if let Ok(mut f) = self.callback.try_borrow_mut() {
            (*f)();
        }
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.pending.take() {
            self.event_loop.clear(id);
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
