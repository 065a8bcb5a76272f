// stencil-core/src/scheduler.rs

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Task = Rc<RefCell<Box<dyn FnMut()>>>;

/// Identifies a timer registered on an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Timer {
    due: Duration,
    period: Option<Duration>,
    task: Task,
}

#[derive(Default)]
struct LoopState {
    now: Duration,
    next_id: u64,
    timers: HashMap<TimerId, Timer>,
}

impl LoopState {
    /// Earliest timer due at or before `limit`, ties broken by registration order.
    fn next_due(&self, limit: Duration) -> Option<(TimerId, Duration)> {
        self.timers
            .iter()
            .filter(|(_, t)| t.due <= limit)
            .map(|(id, t)| (*id, t.due))
            .min_by_key(|(id, due)| (*due, *id))
    }
}

/// Cooperative, single-threaded timer queue with a virtual clock.
///
/// Nothing runs until the host drives the loop with [`EventLoop::advance`],
/// [`EventLoop::run_until_idle`] or [`EventLoop::run_for`]. Callbacks are invoked
/// without any internal borrow held, so they may freely register or clear timers
/// (including their own).
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now", &st.now)
            .field("pending", &st.timers.len())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since the loop was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of registered timers (one-shot and periodic).
    pub fn pending(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.state.borrow().timers.contains_key(&id)
    }

    /// Run `f` once after `delay`.
    pub fn set_timeout(&self, delay: Duration, f: impl FnMut() + 'static) -> TimerId {
        self.insert(delay, None, Box::new(f))
    }

    /// Run `f` every `period`, first after one full period.
    pub fn set_interval(&self, period: Duration, f: impl FnMut() + 'static) -> TimerId {
        // a zero period would spin forever inside `advance`
        let period = period.max(Duration::from_millis(1));
        self.insert(period, Some(period), Box::new(f))
    }

    /// Queue a macrotask: runs on the next turn of the loop.
    pub fn queue_task(&self, f: impl FnMut() + 'static) -> TimerId {
        self.insert(Duration::ZERO, None, Box::new(f))
    }

    /// Cancel a timer. Returns false if it already fired or was cleared.
    pub fn clear(&self, id: TimerId) -> bool {
        self.state.borrow_mut().timers.remove(&id).is_some()
    }

    fn insert(&self, delay: Duration, period: Option<Duration>, f: Box<dyn FnMut()>) -> TimerId {
        let mut st = self.state.borrow_mut();
        let id = TimerId(st.next_id);
        st.next_id += 1;
        let due = st.now + delay;
        st.timers.insert(
            id,
            Timer {
                due,
                period,
                task: Rc::new(RefCell::new(f)),
            },
        );
        tracing::trace!(?id, ?due, ?period, "timer registered");
        id
    }

    /// Move the virtual clock forward by `by`, running every timer that falls due,
    /// in due-time order. Returns the number of callbacks invoked.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let ran = self.run_due(target);
        self.state.borrow_mut().now = target;
        ran
    }

    /// Run everything already due (including tasks queued by those tasks) without
    /// moving the clock.
    pub fn run_until_idle(&self) -> usize {
        self.run_due(self.now())
    }

    fn run_due(&self, limit: Duration) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut st = self.state.borrow_mut();
                let Some((id, due)) = st.next_due(limit) else { break };
                st.now = due;
                let timer = st.timers.get_mut(&id).map(|t| {
                    let task = t.task.clone();
                    match t.period {
                        Some(p) => {
                            t.due += p;
                            (task, false)
                        }
                        None => (task, true),
                    }
                });
                match timer {
                    Some((task, one_shot)) => {
                        if one_shot {
                            st.timers.remove(&id);
                        }
                        task
                    }
                    None => break,
                }
            };
            // Re-entrant runs of the same periodic task are skipped rather than
            // panicking on the RefCell.
            if let Ok(mut f) = task.try_borrow_mut() {
                (*f)();
                ran += 1;
            }
        }
        ran
    }

    /// Drive the loop in real time for `total`, sleeping between due timers.
    pub fn run_for(&self, total: Duration) -> usize {
        let started = Instant::now();
        let mut ran = 0;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }
            let next = {
                let st = self.state.borrow();
                st.timers.values().map(|t| t.due.saturating_sub(st.now)).min()
            };
            let step = next.unwrap_or(total - elapsed).min(total - elapsed);
            if !step.is_zero() {
                std::thread::sleep(step);
            }
            ran += self.advance(step);
        }
        ran
    }
}
