//! The fiber runtime: one interpreter instance driving one effect tree.
//!
//! Non-suspending steps reduce in a tight loop; an `Async` node installs a
//! context switch and yields out. Failure unwinds the call-frame stack,
//! collecting finalizers and composing their causes; interruption is
//! cooperative, latched, and masked inside critical sections. The terminal
//! outcome is published once into the runtime's result cell.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::effect::{Cont, Effect, ErrCont, Node};
use crate::fiber::Fiber;
use crate::oneshot::OneShot;
use crate::outcome::{Cause, Outcome};
use crate::scheduler::Scheduler;
use crate::trace::{FiberId, ObsEvent};
use crate::value::Value;

/// Payload delivered when resuming a suspended fiber: a value to feed the
/// next frame, or a cause to unwind with.
pub type StepOutcome = Result<Value, Cause>;

/// One call frame on the interpreter stack.
enum Frame {
    /// Continuation for normal values.
    Apply(Cont),
    /// Continuation for causes.
    Recover(ErrCont),
    /// Runs on any exit past this point.
    Finalize(Effect),
    /// Runs only when unwinding due to interruption.
    Interrupt(Effect),
}

/// Interpreter state shared between the runtime handle, its fiber handles,
/// and outstanding context switches. Exactly one fiber's loop is active at
/// a time; all mutation happens from synchronous steps.
pub(crate) struct Core {
    pub(crate) fiber: FiberId,
    pub(crate) sched: Rc<Scheduler>,
    pub(crate) result: OneShot<Outcome>,
    stack: RefCell<Vec<Frame>>,
    switch: RefCell<Option<Rc<ContextSwitch>>>,
    /// Outcome handed over by a context switch resumed from within this
    /// fiber's own step (e.g. a register function resuming synchronously).
    inbox: RefCell<Option<StepOutcome>>,
    critical: Cell<u32>,
    started: Cell<bool>,
    running: Cell<bool>,
    suspended: Cell<bool>,
    interrupted: Cell<bool>,
    finalizing: Cell<bool>,
}

impl Core {
    fn new(sched: Rc<Scheduler>, fiber: FiberId) -> Rc<Core> {
        Rc::new(Core {
            fiber,
            sched,
            result: OneShot::new(),
            stack: RefCell::new(Vec::new()),
            switch: RefCell::new(None),
            inbox: RefCell::new(None),
            critical: Cell::new(0),
            started: Cell::new(false),
            running: Cell::new(false),
            suspended: Cell::new(false),
            interrupted: Cell::new(false),
            finalizing: Cell::new(false),
        })
    }

    /// A latched interrupt is honored only between steps, outside critical
    /// sections, and never while already running the interrupt finalizers.
    fn should_finalize(&self) -> bool {
        self.interrupted.get() && !self.finalizing.get() && self.critical.get() == 0
    }

    pub(crate) fn start(self: &Rc<Self>, effect: Effect) {
        assert!(!self.started.replace(true), "runtime started twice");
        tracing::trace!(fiber = self.fiber, "fiber started");
        self.run_loop(Some(effect), false);
    }

    /// Drive the step loop until the fiber completes or suspends.
    ///
    /// `grace` skips the very first interrupt check, which is what gives
    /// `resume_later` its at-least-one-step guarantee.
    fn run_loop(self: &Rc<Self>, mut current: Option<Effect>, mut grace: bool) {
        let was_running = self.running.replace(true);
        while let Some(effect) = current.take() {
            if !grace && self.should_finalize() {
                self.running.set(was_running);
                self.finalize_interrupt();
                return;
            }
            grace = false;
            current = self.step(effect);
            if current.is_none() {
                // A register function may have resumed synchronously.
                if let Some(outcome) = self.inbox.borrow_mut().take() {
                    current = self.apply_outcome(outcome);
                }
            }
        }
        self.running.set(was_running);

        // Interrupted while the loop was suspending on an interruptible
        // boundary (the register function may itself have signalled us).
        if self.suspended.get() && self.should_finalize() {
            let switch = self.switch.borrow().clone();
            if let Some(switch) = switch {
                if switch.is_interruptible() {
                    self.switch.borrow_mut().take();
                    self.suspended.set(false);
                    switch.interrupt();
                    self.finalize_interrupt();
                }
            }
        }
    }

    /// Decode one step node and advance. `None` means the fiber suspended
    /// or completed.
    fn step(self: &Rc<Self>, effect: Effect) -> Option<Effect> {
        match effect.node {
            Node::Of(value) => self.pop_value(value),
            Node::Fail(error) => self.unwind(Cause::Fail(error)),
            Node::Raise(cause) => self.unwind(cause),
            Node::Suspend(thunk) => Some(match catch_unwind(AssertUnwindSafe(thunk)) {
                Ok(next) => next,
                Err(payload) => Effect::raise(Cause::Defect(panic_message(payload))),
            }),
            Node::Critical(inner) => {
                self.critical.set(self.critical.get() + 1);
                let core = Rc::downgrade(self);
                // The decrement is pushed as a plain finalize frame so the
                // depth stays balanced on every exit path.
                self.stack.borrow_mut().push(Frame::Finalize(Effect::suspend(
                    move || {
                        if let Some(core) = core.upgrade() {
                            core.critical.set(core.critical.get() - 1);
                        }
                        Effect::unit()
                    },
                )));
                Some(*inner)
            }
            Node::AndThen(inner, k) => {
                self.stack.borrow_mut().push(Frame::Apply(k));
                Some(*inner)
            }
            Node::Catch(inner, k) => {
                self.stack.borrow_mut().push(Frame::Recover(k));
                Some(*inner)
            }
            Node::OnExit(inner, finalizer) => {
                self.stack
                    .borrow_mut()
                    .push(Frame::Finalize((*finalizer).critical()));
                Some(*inner)
            }
            Node::OnInterrupt(inner, handler) => {
                self.stack
                    .borrow_mut()
                    .push(Frame::Interrupt((*handler).critical()));
                Some(*inner)
            }
            Node::Async(register) => {
                let switch = ContextSwitch::new(Rc::downgrade(self));
                *self.switch.borrow_mut() = Some(Rc::clone(&switch));
                self.suspended.set(true);
                self.record(|tick, fiber| ObsEvent::Suspended { tick, fiber });
                if let Err(payload) = catch_unwind(AssertUnwindSafe(move || register(switch))) {
                    self.suspended.set(false);
                    self.switch.borrow_mut().take();
                    self.inbox.borrow_mut().take();
                    return Some(Effect::raise(Cause::Defect(panic_message(payload))));
                }
                None
            }
        }
    }

    /// Feed a value to the topmost frame that wants one, or complete.
    fn pop_value(&self, value: Value) -> Option<Effect> {
        loop {
            let frame = self.stack.borrow_mut().pop();
            match frame {
                None => {
                    self.complete(Outcome::Success(value));
                    return None;
                }
                Some(Frame::Apply(k)) => return Some(k(value)),
                // Recovery and interrupt frames pass values through.
                Some(Frame::Recover(_)) | Some(Frame::Interrupt(_)) => {}
                Some(Frame::Finalize(finalizer)) => {
                    return Some(finalizer.and_then(move |_| Effect::of(value)));
                }
            }
        }
    }

    /// Unwind the stack with a cause.
    ///
    /// Pops frames until a recover frame is found or the stack empties,
    /// collecting finalizers along the way. Collected finalizers run as a
    /// single critical sequence; a finalizer that itself fails appends its
    /// cause on the right, never masking the in-flight cause.
    fn unwind(&self, cause: Cause) -> Option<Effect> {
        let mut finalizers: Vec<Effect> = Vec::new();
        let mut recover: Option<ErrCont> = None;
        loop {
            let frame = self.stack.borrow_mut().pop();
            match frame {
                None => break,
                Some(Frame::Recover(k)) => {
                    recover = Some(k);
                    break;
                }
                Some(Frame::Finalize(finalizer)) => finalizers.push(finalizer),
                Some(Frame::Apply(_)) | Some(Frame::Interrupt(_)) => {}
            }
        }

        if finalizers.is_empty() {
            return match recover {
                Some(k) => Some(k(cause)),
                None => {
                    self.complete(Outcome::Failure(cause));
                    None
                }
            };
        }

        // The recover frame goes back on the stack so it catches the cause
        // re-raised after the finalizers complete.
        if let Some(k) = recover {
            self.stack.borrow_mut().push(Frame::Recover(k));
        }

        let carried = Rc::new(RefCell::new(Some(cause)));
        let mut sequence = Effect::unit();
        for finalizer in finalizers {
            let slot = Rc::clone(&carried);
            sequence = sequence.and_then(move |_| {
                finalizer.catch_cause(move |late| {
                    let mut slot = slot.borrow_mut();
                    let base = slot.take().expect("carried cause");
                    *slot = Some(base.and(late));
                    Effect::unit()
                })
            });
        }
        Some(sequence.critical().and_then(move |_| {
            let cause = carried.borrow_mut().take().expect("carried cause");
            Effect::raise(cause)
        }))
    }

    fn apply_outcome(&self, outcome: StepOutcome) -> Option<Effect> {
        match outcome {
            Ok(value) => self.pop_value(value),
            Err(cause) => self.unwind(cause),
        }
    }

    /// Honor a latched interrupt: run every pending finalizer and interrupt
    /// handler in pop order, swallowing their failures, then terminate.
    fn finalize_interrupt(self: &Rc<Self>) {
        self.finalizing.set(true);
        tracing::trace!(fiber = self.fiber, "running interrupt finalizers");
        let frames = std::mem::take(&mut *self.stack.borrow_mut());
        let mut sequence = Effect::unit();
        for frame in frames.into_iter().rev() {
            match frame {
                Frame::Finalize(effect) | Frame::Interrupt(effect) => {
                    sequence = sequence
                        .and_then(move |_| effect.catch_cause(|_| Effect::unit()));
                }
                Frame::Apply(_) | Frame::Recover(_) => {}
            }
        }
        self.run_loop(Some(sequence), false);
    }

    fn complete(&self, outcome: Outcome) {
        // Interruption fixes the terminal outcome regardless of what the
        // finalizers produced.
        let outcome = if self.interrupted.get() {
            Outcome::Interrupted
        } else {
            outcome
        };
        tracing::trace!(fiber = self.fiber, ?outcome, "fiber completed");
        self.switch.borrow_mut().take();
        self.record(|tick, fiber| ObsEvent::Completed {
            tick,
            fiber,
            outcome: outcome.clone(),
        });
        self.result.set(outcome);
    }

    /// Signal interruption. Cooperative, latched, idempotent; never blocks.
    pub(crate) fn interrupt(self: &Rc<Self>) {
        if self.result.is_set() || self.interrupted.get() {
            return;
        }
        self.interrupted.set(true);
        self.record(|tick, fiber| ObsEvent::InterruptRequested { tick, fiber });
        tracing::debug!(fiber = self.fiber, "interrupt requested");

        if self.critical.get() > 0 || self.running.get() {
            // Latched: the loop's cooperative check honors it later.
            return;
        }
        if self.suspended.get() {
            let switch = self.switch.borrow().clone();
            if let Some(switch) = switch {
                if switch.is_interruptible() {
                    self.switch.borrow_mut().take();
                    self.suspended.set(false);
                    switch.interrupt();
                    self.finalize_interrupt();
                }
            }
        }
    }

    /// Deliver a resume from a context switch.
    ///
    /// A resume is honored only while `origin` is the currently registered
    /// switch: results arriving after completion, or from a boundary that
    /// interruption already cancelled, are dropped.
    fn resume_with(self: &Rc<Self>, origin: &Rc<ContextSwitch>, outcome: StepOutcome, grace: bool) {
        if self.result.is_set() {
            return;
        }
        let registered = self.switch.borrow().clone();
        match registered {
            Some(current) if Rc::ptr_eq(&current, origin) => {}
            _ => return,
        }
        self.switch.borrow_mut().take();
        self.suspended.set(false);
        self.record(|tick, fiber| ObsEvent::Resumed { tick, fiber });
        if self.running.get() {
            *self.inbox.borrow_mut() = Some(outcome);
            return;
        }
        if !grace && self.should_finalize() {
            self.finalize_interrupt();
            return;
        }
        let current = self.apply_outcome(outcome);
        self.run_loop(current, false);
    }

    fn record(&self, event: impl FnOnce(u64, FiberId) -> ObsEvent) {
        let tick = self.sched.tick();
        self.sched.record(event(tick, self.fiber));
    }
}

/// The interpreter instance that drives one fiber to completion.
///
/// A runtime is created empty, started exactly once, and publishes its
/// terminal [`Outcome`] into its result cell. Observers hold [`Fiber`]
/// handles rather than the runtime itself.
pub struct Runtime {
    core: Rc<Core>,
}

impl Runtime {
    /// Create a runtime bound to a scheduler. The fiber id is assigned by
    /// the scheduler.
    #[must_use]
    pub fn new(scheduler: &Rc<Scheduler>) -> Runtime {
        let fiber = scheduler.next_fiber_id();
        Runtime {
            core: Core::new(Rc::clone(scheduler), fiber),
        }
    }

    /// Start the runtime on an effect.
    ///
    /// # Panics
    ///
    /// Panics if the runtime has already been started.
    pub fn start(&self, effect: Effect) {
        self.core.start(effect);
    }

    /// A handle observing this runtime.
    #[must_use]
    pub fn fiber(&self) -> Fiber {
        Fiber::from_core(Rc::clone(&self.core))
    }

    /// Signal interruption; returns immediately.
    pub fn interrupt(&self) {
        self.core.interrupt();
    }

    /// The terminal outcome, if the fiber has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.core.result.get()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SwitchState {
    Waiting,
    Resumed,
    Interrupted,
}

/// Handle given to an `async` register function to resume its fiber.
///
/// At most one context switch is active per runtime. The first of
/// `resume`, `resume_later`, or interruption wins; everything after is a
/// no-op.
pub struct ContextSwitch {
    core: Weak<Core>,
    state: Cell<SwitchState>,
    abort: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ContextSwitch {
    fn new(core: Weak<Core>) -> Rc<ContextSwitch> {
        Rc::new(ContextSwitch {
            core,
            state: Cell::new(SwitchState::Waiting),
            abort: RefCell::new(None),
        })
    }

    /// Resume the fiber synchronously with `outcome`.
    pub fn resume(self: &Rc<Self>, outcome: StepOutcome) {
        if self.state.replace(SwitchState::Resumed) != SwitchState::Waiting {
            return;
        }
        self.abort.borrow_mut().take();
        if let Some(core) = self.core.upgrade() {
            core.resume_with(self, outcome, false);
        }
    }

    /// Resume the fiber on the next scheduler tick.
    ///
    /// On delivery at least one step is executed even if an interrupt
    /// fired between scheduling and delivery.
    pub fn resume_later(self: &Rc<Self>, outcome: StepOutcome) {
        if self.state.replace(SwitchState::Resumed) != SwitchState::Waiting {
            return;
        }
        self.abort.borrow_mut().take();
        if let Some(core) = self.core.upgrade() {
            let origin = Rc::clone(self);
            let target = Rc::downgrade(&core);
            core.sched.schedule(move || {
                if let Some(core) = target.upgrade() {
                    core.resume_with(&origin, outcome, true);
                }
            });
        }
    }

    /// Install the cancellation hook. The boundary becomes interruptible
    /// only once a hook is set.
    pub fn set_abort(&self, cancel: impl FnOnce() + 'static) {
        if self.state.get() == SwitchState::Waiting {
            *self.abort.borrow_mut() = Some(Box::new(cancel));
        }
    }

    /// Whether interruption can cancel this boundary right now.
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        self.state.get() == SwitchState::Waiting && self.abort.borrow().is_some()
    }

    /// Cancel the outstanding registration.
    ///
    /// # Panics
    ///
    /// Panics if no cancellation hook was installed.
    pub(crate) fn interrupt(&self) {
        if self.state.replace(SwitchState::Interrupted) != SwitchState::Waiting {
            return;
        }
        let cancel = self
            .abort
            .borrow_mut()
            .take()
            .expect("context switch interrupted without a cancel hook");
        cancel();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "opaque panic payload".to_string(),
        },
    }
}
