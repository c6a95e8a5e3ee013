//! Deterministic single-threaded scheduler.
//!
//! One logical executor drives every fiber: a FIFO ready queue models the
//! host's next-tick mechanism, and a virtual clock with a timer wheel
//! models the host timer. Time only advances when the ready queue drains,
//! which makes timing-sensitive tests deterministic.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::effect::Effect;
use crate::fiber::Fiber;
use crate::outcome::{Cause, Outcome};
use crate::runtime::Runtime;
use crate::trace::{FiberId, ObsEvent};
use crate::value::Value;

type Task = Box<dyn FnOnce()>;

/// Handle to a pending timer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId {
    deadline: Duration,
    seq: u64,
}

/// Errors from driving an effect to completion.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The root fiber terminated with a failure cause.
    #[error("fiber failed: {0}")]
    Failed(Cause),
    /// The root fiber was interrupted.
    #[error("fiber was interrupted")]
    Interrupted,
    /// No ready fibers or pending timers remain, but the root fiber has
    /// not finished. Every remaining fiber is suspended on a boundary
    /// nobody will resume.
    #[error("all fibers suspended; no ready work or timers remain")]
    Stalled,
}

/// The single-threaded cooperative executor.
pub struct Scheduler {
    ready: RefCell<VecDeque<Task>>,
    timers: RefCell<BTreeMap<(Duration, u64), Task>>,
    now: Cell<Duration>,
    tick: Cell<u64>,
    seq: Cell<u64>,
    next_fiber: Cell<FiberId>,
    trace: RefCell<Vec<ObsEvent>>,
}

impl Scheduler {
    /// Create a scheduler with the clock at zero.
    #[must_use]
    pub fn new() -> Rc<Scheduler> {
        Rc::new(Scheduler {
            ready: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BTreeMap::new()),
            now: Cell::new(Duration::ZERO),
            tick: Cell::new(0),
            seq: Cell::new(0),
            next_fiber: Cell::new(0),
            trace: RefCell::new(Vec::new()),
        })
    }

    /// Queue `task` to run after the current turn completes.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.ready.borrow_mut().push_back(Box::new(task));
    }

    /// Queue `task` to run once the virtual clock reaches `now + delay`.
    pub fn schedule_after(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId {
            deadline: self.now.get() + delay,
            seq: self.seq.replace(self.seq.get() + 1),
        };
        self.timers
            .borrow_mut()
            .insert((id.deadline, id.seq), Box::new(task));
        id
    }

    /// Cancel a pending timer. No-op if it already fired.
    pub fn cancel_timer(&self, id: TimerId) {
        self.timers.borrow_mut().remove(&(id.deadline, id.seq));
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of tasks executed so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick.get()
    }

    /// Run until the ready queue and timer wheel are both empty.
    ///
    /// The ready queue is drained first; only when no immediate work
    /// remains does the clock jump to the next timer deadline.
    pub fn run_until_idle(&self) {
        loop {
            loop {
                let task = self.ready.borrow_mut().pop_front();
                match task {
                    Some(task) => {
                        self.tick.set(self.tick.get() + 1);
                        task();
                    }
                    None => break,
                }
            }
            let next = self.timers.borrow_mut().pop_first();
            match next {
                Some(((deadline, _), task)) => {
                    if deadline > self.now.get() {
                        self.now.set(deadline);
                    }
                    self.tick.set(self.tick.get() + 1);
                    task();
                }
                None => return,
            }
        }
    }

    /// Fork an effect onto a fresh runtime.
    ///
    /// The runtime starts on the next tick, so a fiber forking in a tight
    /// loop cannot starve its children.
    pub fn spawn(self: &Rc<Self>, effect: Effect) -> Fiber {
        let runtime = Runtime::new(self);
        let fiber = runtime.fiber();
        self.record(ObsEvent::Spawned {
            tick: self.tick(),
            fiber: fiber.id(),
        });
        tracing::debug!(fiber = fiber.id(), "fiber spawned");
        self.schedule(move || runtime.start(effect));
        fiber
    }

    /// Fork an effect from inside an effect program. The continuation
    /// receives the child's handle.
    pub fn fork(
        self: &Rc<Self>,
        effect: Effect,
        k: impl FnOnce(Fiber) -> Effect + 'static,
    ) -> Effect {
        let sched = Rc::clone(self);
        Effect::suspend(move || k(sched.spawn(effect)))
    }

    /// An interruptible effect that succeeds with unit once the virtual
    /// clock has advanced by `delay`. Interruption deregisters the timer.
    pub fn delay(self: &Rc<Self>, delay: Duration) -> Effect {
        let sched = Rc::clone(self);
        Effect::from_async(move |switch| {
            let waker = Rc::clone(&switch);
            let id = sched.schedule_after(delay, move || waker.resume(Ok(Value::Unit)));
            let sched = Rc::clone(&sched);
            switch.set_abort(move || sched.cancel_timer(id));
        })
    }

    /// Drive `effect` to completion and translate its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Failed`] or [`RunError::Interrupted`] for the
    /// corresponding terminal outcomes, and [`RunError::Stalled`] if the
    /// scheduler goes idle before the root fiber finishes.
    pub fn run(self: &Rc<Self>, effect: Effect) -> Result<Value, RunError> {
        let fiber = self.spawn(effect);
        self.run_until_idle();
        match fiber.outcome() {
            Some(Outcome::Success(value)) => Ok(value),
            Some(Outcome::Failure(cause)) => Err(RunError::Failed(cause)),
            Some(Outcome::Interrupted) => Err(RunError::Interrupted),
            None => Err(RunError::Stalled),
        }
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ObsEvent> {
        self.trace.borrow().clone()
    }

    pub(crate) fn record(&self, event: ObsEvent) {
        self.trace.borrow_mut().push(event);
    }

    pub(crate) fn next_fiber_id(&self) -> FiberId {
        self.next_fiber.replace(self.next_fiber.get() + 1)
    }
}
