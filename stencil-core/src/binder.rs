// stencil-core/src/binder.rs

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::scheduler::{EventLoop, TimerId};

/// A data object shared between the change detector, the builders that read it,
/// and the handlers that write to it.
pub type SharedScope = Rc<RefCell<Value>>;

/// Wrap a value into a fresh [`SharedScope`].
pub fn shared(value: Value) -> SharedScope {
    Rc::new(RefCell::new(value))
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// TypeError kind: the value is not a mapping.
    #[error("bind({0}): parameter must be object")]
    NotAnObject(&'static str),
    /// StateError kind: a write was attempted before any `bind`.
    #[error("no object is bound; call bind() before set_data_without_trigger()")]
    Unbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    pub poll_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

type OnChange = Rc<RefCell<Box<dyn FnMut(&SharedScope)>>>;

#[derive(Default)]
struct DetectorState {
    observed: Option<SharedScope>,
    last_snapshot: Option<String>,
    on_change: Option<OnChange>,
    timer: Option<TimerId>,
}

/// Polling change detector.
///
/// The bound object is serialized on every tick; the subscriber is invoked only
/// when the serialized form differs from the previous snapshot.
pub struct ChangeDetector {
    event_loop: EventLoop,
    config: DetectorConfig,
    state: Rc<RefCell<DetectorState>>,
}

/// JS-flavoured type name, used in error messages.
pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn snapshot(v: &Value) -> String {
    v.to_string()
}

impl ChangeDetector {
    pub fn new(event_loop: EventLoop) -> Self {
        Self::with_config(event_loop, DetectorConfig::default())
    }

    pub fn with_config(event_loop: EventLoop, config: DetectorConfig) -> Self {
        Self {
            event_loop,
            config,
            state: Rc::new(RefCell::new(DetectorState::default())),
        }
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    pub fn is_bound(&self) -> bool {
        self.state.borrow().observed.is_some()
    }

    /// Whether a poll timer is currently running.
    pub fn is_polling(&self) -> bool {
        self.state
            .borrow()
            .timer
            .is_some_and(|id| self.event_loop.is_active(id))
    }

    /// Last stored snapshot, if any poll or write has taken one.
    pub fn snapshot(&self) -> Option<String> {
        self.state.borrow().last_snapshot.clone()
    }

    /// Start observing `value`, replacing any previously bound object and
    /// cancelling its poll.
    pub fn bind(&mut self, value: SharedScope) -> Result<&mut Self, BindError> {
        {
            let v = value.borrow();
            if !v.is_object() {
                return Err(BindError::NotAnObject(type_name(&v)));
            }
        }
        let previous = self.state.borrow_mut().timer.take();
        if let Some(id) = previous {
            self.event_loop.clear(id);
        }

        let weak = Rc::downgrade(&self.state);
        let id = self.event_loop.set_interval(self.config.poll_interval, move || {
            if let Some(state) = weak.upgrade() {
                poll(&state);
            }
        });
        {
            let mut st = self.state.borrow_mut();
            st.observed = Some(value);
            st.timer = Some(id);
        }
        tracing::debug!(?id, interval = ?self.config.poll_interval, "change detector bound");
        Ok(self)
    }

    /// Run one poll now, outside the timer. Returns true if the subscriber was due.
    pub fn check(&self) -> bool {
        poll(&self.state)
    }

    /// Merge `partial` into the bound object in place and take a fresh snapshot,
    /// so the write does not notify the subscriber.
    pub fn set_data_without_trigger(&mut self, partial: &Value) -> Result<&mut Self, BindError> {
        let Value::Object(fields) = partial else {
            return Err(BindError::NotAnObject(type_name(partial)));
        };
        let observed = self.state.borrow().observed.clone().ok_or(BindError::Unbound)?;
        {
            let mut target = observed.borrow_mut();
            if let Value::Object(obj) = &mut *target {
                for (k, v) in fields {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        self.store_snapshot(&observed);
        Ok(self)
    }

    /// Snapshot the bound object as it is now without notifying.
    pub fn mark_clean(&mut self) -> Result<&mut Self, BindError> {
        let observed = self.state.borrow().observed.clone().ok_or(BindError::Unbound)?;
        self.store_snapshot(&observed);
        Ok(self)
    }

    fn store_snapshot(&self, observed: &SharedScope) {
        let snap = snapshot(&observed.borrow());
        self.state.borrow_mut().last_snapshot = Some(snap);
    }

    /// Register the single subscriber, replacing any previous one.
    pub fn set_on_change(&mut self, callback: impl FnMut(&SharedScope) + 'static) -> &mut Self {
        let cb: Box<dyn FnMut(&SharedScope)> = Box::new(callback);
        self.state.borrow_mut().on_change = Some(Rc::new(RefCell::new(cb)));
        self
    }

    /// Handle that cancels the current poll when disposed or dropped.
    pub fn subscription(&self) -> Subscription {
        Subscription {
            event_loop: self.event_loop.clone(),
            state: Rc::downgrade(&self.state),
            timer: self.state.borrow().timer,
        }
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        if let Some(id) = self.state.borrow_mut().timer.take() {
            self.event_loop.clear(id);
        }
    }
}

fn poll(state: &Rc<RefCell<DetectorState>>) -> bool {
    let (observed, snap, callback) = {
        let st = state.borrow();
        let Some(observed) = st.observed.clone() else {
            return false;
        };
        // a handler holding the scope mutably means we are mid-write; try next tick
        let Ok(value) = observed.try_borrow() else {
            return false;
        };
        let snap = snapshot(&value);
        drop(value);
        if st.last_snapshot.as_deref() == Some(snap.as_str()) {
            tracing::trace!("poll: unchanged");
            return false;
        }
        (observed, snap, st.on_change.clone())
    };
    let Some(cb) = callback else {
        state.borrow_mut().last_snapshot = Some(snap);
        return true;
    };
    // re-entered from the subscriber: leave the change for the next poll
    let Ok(mut f) = cb.try_borrow_mut() else {
        tracing::trace!("poll: subscriber busy");
        return false;
    };
    state.borrow_mut().last_snapshot = Some(snap);
    tracing::debug!("poll: change detected");
    (*f)(&observed);
    true
}

/// Disposable handle for an active observation.
#[must_use = "dropping a Subscription cancels the observation"]
pub struct Subscription {
    event_loop: EventLoop,
    state: Weak<RefCell<DetectorState>>,
    timer: Option<TimerId>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.timer.is_some_and(|id| self.event_loop.is_active(id))
    }

    /// Stop polling and drop the subscriber.
    pub fn dispose(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        let Some(id) = self.timer.take() else { return };
        if let Some(state) = self.state.upgrade() {
            let mut st = state.borrow_mut();
            // after a rebind this handle no longer owns the detector's timer
            if st.timer == Some(id) {
                st.timer = None;
                st.on_change = None;
            }
        }
        if self.event_loop.clear(id) {
            tracing::debug!(?id, "subscription disposed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
