//! Asynchronous write-once cells.

use std::rc::Rc;

use crate::effect::Effect;
use crate::oneshot::{ListenerId, OneShot};
use crate::value::Value;

/// An async cell filled at most once.
///
/// `wait` suspends the calling fiber until the cell is filled; waiters
/// interrupted in the meantime deregister their listeners.
#[derive(Clone, Default)]
pub struct Deferred {
    cell: Rc<OneShot<Value>>,
}

impl Deferred {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> Deferred {
        Deferred {
            cell: Rc::new(OneShot::new()),
        }
    }

    /// Suspend until the cell is filled, then succeed with its value.
    pub fn wait(&self) -> Effect {
        let cell = Rc::clone(&self.cell);
        Effect::from_async(move |switch| {
            let waker = Rc::clone(&switch);
            let id = cell.listen(move |value| waker.resume(Ok(value)));
            let pending = Rc::clone(&cell);
            switch.set_abort(move || pending.unlisten(id));
        })
    }

    /// Fill the cell, resuming every waiter in registration order.
    ///
    /// Filling twice is a programmer error: the underlying cell panics.
    pub fn fill(&self, value: impl Into<Value>) -> Effect {
        let cell = Rc::clone(&self.cell);
        let value = value.into();
        Effect::suspend(move || {
            cell.set(value);
            Effect::unit()
        })
    }

    /// Whether the cell is still empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cell.is_set()
    }

    /// Whether the cell has been filled.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.cell.is_set()
    }

    pub(crate) fn fill_now(&self, value: Value) {
        self.cell.set(value);
    }

    pub(crate) fn listen(&self, listener: impl FnOnce(Value) + 'static) -> ListenerId {
        self.cell.listen(listener)
    }

    pub(crate) fn unlisten(&self, id: ListenerId) {
        self.cell.unlisten(id);
    }
}
