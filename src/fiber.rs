//! First-class handles to running fibers.
//!
//! A `Fiber` observes a runtime's result cell. Its methods return effect
//! values: nothing is registered until the effect itself is executed, and
//! every registration installs a deregistration hook so an interrupted
//! observer does not retain memory.

use std::rc::Rc;

use crate::effect::Effect;
use crate::outcome::{Cause, Outcome};
use crate::runtime::Core;
use crate::trace::FiberId;
use crate::value::Value;

/// Handle to a fiber: a running effect under a runtime.
#[derive(Clone)]
pub struct Fiber {
    core: Rc<Core>,
}

impl Fiber {
    pub(crate) fn from_core(core: Rc<Core>) -> Fiber {
        Fiber { core }
    }

    /// This fiber's id within its scheduler.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.core.fiber
    }

    /// The terminal outcome, if the fiber has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.core.result.get()
    }

    /// Wait for the fiber and adopt its value or failure.
    ///
    /// If the fiber was interrupted, `join` aborts with a defect: an
    /// interrupted dependency is a bug from the joiner's point of view.
    pub fn join(&self) -> Effect {
        self.observe(|outcome| match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(cause) => Err(cause),
            Outcome::Interrupted => Err(Cause::defect("joined fiber was interrupted")),
        })
    }

    /// Wait for the fiber and observe its outcome as a value. Never fails;
    /// interruption is seen as `Outcome::Interrupted`.
    pub fn wait(&self) -> Effect {
        self.observe(|outcome| Ok(Value::outcome(outcome)))
    }

    /// Signal interruption to the fiber. Synchronous: the signal is
    /// delivered and the effect completes immediately.
    pub fn interrupt(&self) -> Effect {
        let core = Rc::clone(&self.core);
        Effect::suspend(move || {
            core.interrupt();
            Effect::unit()
        })
    }

    /// Interrupt the fiber, then wait for its terminal outcome.
    pub fn interrupt_and_wait(&self) -> Effect {
        self.interrupt().then(self.wait())
    }

    /// Signal interruption from host code, outside any effect.
    pub fn interrupt_now(&self) {
        self.core.interrupt();
    }

    fn observe(
        &self,
        translate: impl FnOnce(Outcome) -> Result<Value, Cause> + 'static,
    ) -> Effect {
        let core = Rc::clone(&self.core);
        Effect::from_async(move |switch| {
            let waker = Rc::clone(&switch);
            let id = core
                .result
                .listen(move |outcome| waker.resume(translate(outcome)));
            let cell = Rc::clone(&core);
            switch.set_abort(move || cell.result.unlisten(id));
        })
    }
}
