//! Scheduling and change-detection primitives shared by the stencil crates.
//!
//! Everything here is single-threaded: timers run on an explicit [`EventLoop`]
//! that the host drives, and shared data lives in `Rc<RefCell<_>>` cells.

pub mod binder;
pub mod debounce;
pub mod lifecycle;
pub mod scheduler;

pub use binder::{
    BindError, ChangeDetector, DetectorConfig, SharedScope, Subscription, shared, type_name,
};
pub use debounce::Debouncer;
pub use lifecycle::{Hook, Lifecycle};
pub use scheduler::{EventLoop, TimerId};
