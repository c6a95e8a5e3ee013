//! Shared mutable reference cells.
//!
//! All mutation happens inside synchronous effect steps, which the
//! single-threaded scheduler never interleaves, so reads and writes are
//! atomic with respect to other fibers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::effect::Effect;
use crate::value::Value;

/// A mutable cell accessed through effects.
#[derive(Clone)]
pub struct Ref {
    cell: Rc<RefCell<Value>>,
}

impl Ref {
    /// Create a cell holding `initial`.
    #[must_use]
    pub fn new(initial: impl Into<Value>) -> Ref {
        Ref {
            cell: Rc::new(RefCell::new(initial.into())),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> Effect {
        let cell = Rc::clone(&self.cell);
        Effect::suspend(move || Effect::of(cell.borrow().clone()))
    }

    /// Replace the value.
    pub fn set(&self, value: impl Into<Value>) -> Effect {
        let cell = Rc::clone(&self.cell);
        let value = value.into();
        Effect::suspend(move || {
            *cell.borrow_mut() = value;
            Effect::unit()
        })
    }

    /// Apply `f` to the stored value.
    pub fn update(&self, f: impl FnOnce(Value) -> Value + 'static) -> Effect {
        let cell = Rc::clone(&self.cell);
        Effect::suspend(move || {
            let current = cell.borrow().clone();
            *cell.borrow_mut() = f(current);
            Effect::unit()
        })
    }

    /// Apply `f` to the stored value, storing the first component and
    /// succeeding with the second.
    pub fn modify(&self, f: impl FnOnce(Value) -> (Value, Value) + 'static) -> Effect {
        let cell = Rc::clone(&self.cell);
        Effect::suspend(move || {
            let current = cell.borrow().clone();
            let (next, result) = f(current);
            *cell.borrow_mut() = next;
            Effect::of(result)
        })
    }

    /// Read the value from host code, outside any effect.
    #[must_use]
    pub fn read(&self) -> Value {
        self.cell.borrow().clone()
    }
}
