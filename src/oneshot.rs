//! Write-once observable cell.
//!
//! The cell transitions from empty to full at most once. Listeners
//! registered while empty fire in registration order at the moment of
//! fill; listeners registered after fill fire synchronously. Setting a
//! full cell is a programmer error and panics.

use std::cell::RefCell;

/// Handle to a pending listener registration.
///
/// Closures have no identity in Rust, so deregistration is id-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener<T> = Box<dyn FnOnce(T)>;

struct State<T> {
    value: Option<T>,
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<T>)>,
}

/// A write-once slot with multi-listener notification.
pub struct OneShot<T> {
    state: RefCell<State<T>>,
}

impl<T: Clone> OneShot<T> {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> OneShot<T> {
        OneShot {
            state: RefCell::new(State {
                value: None,
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    /// Fill the cell and notify pending listeners in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already full.
    pub fn set(&self, value: T) {
        let listeners = {
            let mut state = self.state.borrow_mut();
            assert!(state.value.is_none(), "one-shot cell set twice");
            state.value = Some(value.clone());
            std::mem::take(&mut state.listeners)
        };
        // Listeners run outside the borrow: they may re-enter the cell.
        for (_, listener) in listeners {
            listener(value.clone());
        }
    }

    /// The stored value, if the cell is full.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.state.borrow().value.clone()
    }

    /// Whether the cell has been filled.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.borrow().value.is_some()
    }

    /// The stored value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is still empty.
    #[must_use]
    pub fn value(&self) -> T {
        self.get().expect("one-shot cell read before it was set")
    }

    /// Register a listener.
    ///
    /// While the cell is empty the listener is invoked exactly once when
    /// `set` occurs; if the cell is already full it is invoked now.
    pub fn listen(&self, listener: impl FnOnce(T) + 'static) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        match state.value.clone() {
            Some(value) => {
                drop(state);
                listener(value);
            }
            None => state.listeners.push((id, Box::new(listener))),
        }
        id
    }

    /// Remove a pending registration. No-op after fill.
    pub fn unlisten(&self, id: ListenerId) {
        self.state
            .borrow_mut()
            .listeners
            .retain(|(registered, _)| *registered != id);
    }
}

impl<T: Clone> Default for OneShot<T> {
    fn default() -> Self {
        OneShot::new()
    }
}
