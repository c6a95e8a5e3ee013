//! Shared test infrastructure.

use std::cell::RefCell;
use std::rc::Rc;

use filament::{Effect, Outcome, Scheduler, Value};

/// Run a program on a fresh scheduler and return its success value.
pub fn run_value(program: Effect) -> Value {
    Scheduler::new().run(program).expect("program succeeds")
}

/// Spawn a program, drive the scheduler to idle, and return the outcome.
pub fn run_outcome(sched: &Rc<Scheduler>, program: Effect) -> Outcome {
    let fiber = sched.spawn(program);
    sched.run_until_idle();
    fiber.outcome().expect("fiber finished")
}

/// A shared append-only log written from effect steps.
pub type Log = Rc<RefCell<Vec<&'static str>>>;

/// Create an empty log.
pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// An effect that appends `tag` to the log when stepped.
pub fn log_step(log: &Log, tag: &'static str) -> Effect {
    let log = Rc::clone(log);
    Effect::suspend(move || {
        log.borrow_mut().push(tag);
        Effect::unit()
    })
}
