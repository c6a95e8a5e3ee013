//! The effect algebra: immutable descriptions of computations.
//!
//! An `Effect` is an inert tree of step nodes. Nothing happens when one is
//! built; a runtime walks the tree when the effect is started on a fiber.
//! The node set is closed and known to the interpreter, which dispatches
//! by tag.

use std::rc::Rc;

use crate::outcome::{Cause, Outcome};
use crate::runtime::ContextSwitch;
use crate::value::Value;

pub(crate) type Thunk = Box<dyn FnOnce() -> Effect>;
pub(crate) type Register = Box<dyn FnOnce(Rc<ContextSwitch>)>;
pub(crate) type Cont = Box<dyn FnOnce(Value) -> Effect>;
pub(crate) type ErrCont = Box<dyn FnOnce(Cause) -> Effect>;

/// One step node. Children are themselves effects.
pub(crate) enum Node {
    /// Already-succeeded value.
    Of(Value),
    /// Typed failure.
    Fail(Value),
    /// Pre-built failure cause.
    Raise(Cause),
    /// Deferred construction; a panic in the thunk becomes a defect.
    Suspend(Thunk),
    /// Asynchronous boundary. The register function receives the context
    /// switch used to resume the fiber.
    Async(Register),
    /// Run the inner effect with interruption masked.
    Critical(Box<Effect>),
    /// Sequential bind on success.
    AndThen(Box<Effect>, Cont),
    /// Recovery on cause.
    Catch(Box<Effect>, ErrCont),
    /// Run the finalizer on any exit: success, failure, or interruption.
    OnExit(Box<Effect>, Box<Effect>),
    /// Run the handler only when unwinding due to interruption.
    OnInterrupt(Box<Effect>, Box<Effect>),
}

/// An immutable description of a concurrent, failure-aware computation.
///
/// Effects are values: building one performs nothing. They are consumed
/// when run, so a reusable program is expressed as a constructor function
/// rather than a shared value.
#[must_use = "effects do nothing until started on a fiber"]
pub struct Effect {
    pub(crate) node: Node,
}

impl Effect {
    fn from_node(node: Node) -> Effect {
        Effect { node }
    }

    /// An effect that immediately succeeds with `value`.
    pub fn of(value: impl Into<Value>) -> Effect {
        Effect::from_node(Node::Of(value.into()))
    }

    /// An effect that immediately succeeds with unit.
    pub fn unit() -> Effect {
        Effect::of(Value::Unit)
    }

    /// An effect that fails with the typed error `error`.
    pub fn fail(error: impl Into<Value>) -> Effect {
        Effect::from_node(Node::Fail(error.into()))
    }

    /// An effect that fails with a pre-built cause.
    pub fn raise(cause: Cause) -> Effect {
        Effect::from_node(Node::Raise(cause))
    }

    /// Defer construction of an effect until it is stepped.
    ///
    /// A panic escaping the thunk is caught at the interpret boundary and
    /// becomes a defect cause.
    pub fn suspend(thunk: impl FnOnce() -> Effect + 'static) -> Effect {
        Effect::from_node(Node::Suspend(Box::new(thunk)))
    }

    /// An asynchronous boundary.
    ///
    /// `register` is invoked with the fiber's context switch when the
    /// interpreter reaches this node; the fiber stays suspended until the
    /// switch is resumed. Installing a cancel hook via
    /// [`ContextSwitch::set_abort`] makes the boundary interruptible.
    pub fn from_async(register: impl FnOnce(Rc<ContextSwitch>) + 'static) -> Effect {
        Effect::from_node(Node::Async(Box::new(register)))
    }

    /// An interruptible effect that never resumes on its own.
    pub fn never() -> Effect {
        Effect::from_async(|switch| switch.set_abort(|| {}))
    }

    /// Run this effect inside a critical section: a pending interrupt is
    /// latched and honored only after the section exits.
    pub fn critical(self) -> Effect {
        Effect::from_node(Node::Critical(Box::new(self)))
    }

    /// Sequential bind: run this effect, then feed its value to `k`.
    pub fn and_then(self, k: impl FnOnce(Value) -> Effect + 'static) -> Effect {
        Effect::from_node(Node::AndThen(Box::new(self), Box::new(k)))
    }

    /// Run this effect, discard its value, then run `next`.
    pub fn then(self, next: Effect) -> Effect {
        self.and_then(move |_| next)
    }

    /// Map the success value.
    pub fn map(self, f: impl FnOnce(Value) -> Value + 'static) -> Effect {
        self.and_then(move |value| Effect::of(f(value)))
    }

    /// Recover from any cause, including defects.
    pub fn catch_cause(self, k: impl FnOnce(Cause) -> Effect + 'static) -> Effect {
        Effect::from_node(Node::Catch(Box::new(self), Box::new(k)))
    }

    /// Recover from a typed failure. Defects and composite causes are
    /// re-raised untouched.
    pub fn catch(self, k: impl FnOnce(Value) -> Effect + 'static) -> Effect {
        self.catch_cause(move |cause| match cause {
            Cause::Fail(error) => k(error),
            other => Effect::raise(other),
        })
    }

    /// Attach a finalizer that runs on every exit path. Finalizers run in
    /// reverse installation order, inside a critical section.
    pub fn on_exit(self, finalizer: Effect) -> Effect {
        Effect::from_node(Node::OnExit(Box::new(self), Box::new(finalizer)))
    }

    /// Attach a handler that runs only if the fiber is interrupted while
    /// this effect is on the stack.
    pub fn on_interrupt(self, handler: Effect) -> Effect {
        Effect::from_node(Node::OnInterrupt(Box::new(self), Box::new(handler)))
    }

    /// Reify this effect's outcome as a value.
    ///
    /// The resulting effect always succeeds: a success becomes
    /// `Outcome::Success`, any cause becomes `Outcome::Failure`. Failures
    /// stop propagating, which is how finalizer results are observed
    /// without cancelling an in-flight cause.
    pub fn resurrect(self) -> Effect {
        self.and_then(|value| Effect::of(Value::outcome(Outcome::Success(value))))
            .catch_cause(|cause| Effect::of(Value::outcome(Outcome::Failure(cause))))
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Node::Of(value) => f.debug_tuple("Of").field(value).finish(),
            Node::Fail(error) => f.debug_tuple("Fail").field(error).finish(),
            Node::Raise(cause) => f.debug_tuple("Raise").field(cause).finish(),
            Node::Suspend(_) => f.write_str("Suspend(..)"),
            Node::Async(_) => f.write_str("Async(..)"),
            Node::Critical(inner) => f.debug_tuple("Critical").field(inner).finish(),
            Node::AndThen(inner, _) => write!(f, "AndThen({inner:?}, ..)"),
            Node::Catch(inner, _) => write!(f, "Catch({inner:?}, ..)"),
            Node::OnExit(inner, finalizer) => f
                .debug_tuple("OnExit")
                .field(inner)
                .field(finalizer)
                .finish(),
            Node::OnInterrupt(inner, handler) => f
                .debug_tuple("OnInterrupt")
                .field(inner)
                .field(handler)
                .finish(),
        }
    }
}
