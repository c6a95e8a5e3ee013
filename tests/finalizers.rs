//! Finalizer and interrupt-handler ordering guarantees.

#[allow(dead_code, unreachable_pub)]
mod helpers;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use assert_matches::assert_matches;
use filament::{Cause, Effect, Outcome, Scheduler, Value};

use helpers::{log, log_step, run_value};

fn count_step(counter: &Rc<Cell<u32>>) -> Effect {
    let counter = Rc::clone(counter);
    Effect::suspend(move || {
        counter.set(counter.get() + 1);
        Effect::unit()
    })
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn finalizers_run_innermost_first_on_success() {
    let log = log();
    let program = log_step(&log, "body")
        .on_exit(log_step(&log, "inner"))
        .on_exit(log_step(&log, "outer"));

    run_value(program);

    assert_eq!(*log.borrow(), vec!["body", "inner", "outer"]);
}

#[test]
fn finalizers_run_innermost_first_on_failure() {
    let log = log();
    let program = Effect::fail("down")
        .on_exit(log_step(&log, "inner"))
        .on_exit(log_step(&log, "outer"))
        .catch(|_| Effect::unit());

    run_value(program);

    assert_eq!(*log.borrow(), vec!["inner", "outer"]);
}

// ============================================================================
// Exactly once, on every exit path
// ============================================================================

#[test]
fn finalizer_runs_once_on_success() {
    let counter = Rc::new(Cell::new(0));
    run_value(Effect::of(1i64).on_exit(count_step(&counter)));
    assert_eq!(counter.get(), 1);
}

#[test]
fn finalizer_runs_once_on_typed_failure() {
    let counter = Rc::new(Cell::new(0));
    run_value(
        Effect::fail("e")
            .on_exit(count_step(&counter))
            .catch(|_| Effect::unit()),
    );
    assert_eq!(counter.get(), 1);
}

#[test]
fn finalizer_runs_once_on_defect() {
    let counter = Rc::new(Cell::new(0));
    run_value(
        Effect::suspend(|| panic!("defective"))
            .on_exit(count_step(&counter))
            .catch_cause(|_| Effect::unit()),
    );
    assert_eq!(counter.get(), 1);
}

#[test]
fn finalizer_runs_once_on_interruption() {
    let sched = Scheduler::new();
    let counter = Rc::new(Cell::new(0));

    let fiber = sched.spawn(Effect::never().on_exit(count_step(&counter)));
    sched.run_until_idle();
    fiber.interrupt_now();
    sched.run_until_idle();

    assert_eq!(counter.get(), 1);
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

// ============================================================================
// Interrupt handlers
// ============================================================================

#[test]
fn interrupt_handler_does_not_run_on_success() {
    let counter = Rc::new(Cell::new(0));
    run_value(Effect::of(1i64).on_interrupt(count_step(&counter)));
    assert_eq!(counter.get(), 0);
}

#[test]
fn interrupt_handler_does_not_run_on_typed_failure() {
    let counter = Rc::new(Cell::new(0));
    run_value(
        Effect::fail("e")
            .on_interrupt(count_step(&counter))
            .catch(|_| Effect::unit()),
    );
    assert_eq!(counter.get(), 0);
}

#[test]
fn interrupt_handler_runs_on_interruption() {
    let sched = Scheduler::new();
    let counter = Rc::new(Cell::new(0));

    let fiber = sched.spawn(Effect::never().on_interrupt(count_step(&counter)));
    sched.run_until_idle();
    fiber.interrupt_now();
    sched.run_until_idle();

    assert_eq!(counter.get(), 1);
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

#[test]
fn interrupt_handler_and_finalizer_both_run_in_pop_order() {
    let sched = Scheduler::new();
    let log = log();

    let program = Effect::never()
        .on_interrupt(log_step(&log, "handler"))
        .on_exit(log_step(&log, "finalizer"));
    let fiber = sched.spawn(program);
    sched.run_until_idle();
    fiber.interrupt_now();
    sched.run_until_idle();

    assert_eq!(*log.borrow(), vec!["handler", "finalizer"]);
}

// ============================================================================
// Cause composition through failing finalizers
// ============================================================================

#[test]
fn a_failing_finalizer_appends_its_cause_on_the_right() {
    let seen: Rc<RefCell<Option<Cause>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&seen);

    run_value(
        Effect::fail("base")
            .on_exit(Effect::suspend(|| panic!("cleanup blew up")))
            .catch_cause(move |cause| {
                *slot.borrow_mut() = Some(cause);
                Effect::unit()
            }),
    );

    let cause = seen.borrow_mut().take().expect("cause observed");
    match cause {
        Cause::And(first, second) => {
            assert_eq!(*first, Cause::fail("base"));
            assert_matches!(*second, Cause::Defect(message) if message.contains("cleanup blew up"));
        }
        other => panic!("expected composite cause, got {other:?}"),
    }
}

#[test]
fn a_succeeding_finalizer_is_invisible_to_the_outer_flow() {
    let value = run_value(Effect::of(3i64).on_exit(Effect::of(99i64)));
    assert_eq!(value, Value::Int(3));
}

#[test]
fn an_error_with_no_finalizers_still_reaches_its_recover_frame() {
    let value = run_value(Effect::fail(8i64).catch(|error| Effect::of(error)));
    assert_eq!(value, Value::Int(8));
}

#[test]
fn a_finalizer_defect_on_the_success_path_propagates() {
    let seen: Rc<RefCell<Option<Cause>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&seen);

    run_value(
        Effect::of(1i64)
            .on_exit(Effect::suspend(|| panic!("late failure")))
            .catch_cause(move |cause| {
                *slot.borrow_mut() = Some(cause);
                Effect::unit()
            }),
    );

    assert_matches!(
        seen.borrow_mut().take(),
        Some(Cause::Defect(message)) if message.contains("late failure")
    );
}
