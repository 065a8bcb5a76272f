// stencil-core/src/lifecycle.rs

pub type Hook<E> = Box<dyn FnOnce() -> Result<(), E>>;

/// Ready-event hooks.
///
/// Hooks registered before [`Lifecycle::ready`] are queued and run in
/// registration order when it fires; hooks registered afterwards run
/// immediately. The first failing hook stops the run and its error is returned;
/// hooks after it stay queued for the next `ready` call.
///
/// Owners that keep the lifecycle behind a `RefCell` use [`Lifecycle::defer`],
/// [`Lifecycle::take_ready`] and [`Lifecycle::requeue`] so hooks run with the
/// cell released and may register further hooks.
pub struct Lifecycle<E> {
    hooks: Vec<Hook<E>>,
    is_ready: bool,
}

impl<E> Default for Lifecycle<E> {
    fn default() -> Self {
        Self {
            hooks: Vec::new(),
            is_ready: false,
        }
    }
}

impl<E> Lifecycle<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn pending(&self) -> usize {
        self.hooks.len()
    }

    /// Register a hook to run on the ready event.
    pub fn on_ready(&mut self, hook: impl FnOnce() -> Result<(), E> + 'static) -> Result<(), E> {
        match self.defer(Box::new(hook)) {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    /// Queue `hook`, or hand it back when ready already fired and it is due now.
    pub fn defer(&mut self, hook: Hook<E>) -> Option<Hook<E>> {
        if self.is_ready {
            return Some(hook);
        }
        self.hooks.push(hook);
        None
    }

    /// Mark the event as fired and take the queued hooks, in order.
    pub fn take_ready(&mut self) -> Vec<Hook<E>> {
        self.is_ready = true;
        std::mem::take(&mut self.hooks)
    }

    /// Put back hooks a failed run did not reach; they go first in the queue.
    pub fn requeue(&mut self, hooks: impl IntoIterator<Item = Hook<E>>) {
        let rest = std::mem::take(&mut self.hooks);
        self.hooks.extend(hooks);
        self.hooks.extend(rest);
    }

    /// Fire the ready event.
    pub fn ready(&mut self) -> Result<(), E> {
        let mut queued = self.take_ready().into_iter();
        while let Some(hook) = queued.next() {
            if let Err(e) = hook() {
                self.requeue(queued);
                return Err(e);
            }
        }
        Ok(())
    }
}
