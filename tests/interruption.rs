//! Interruption: latching, masking, cancellation of async boundaries.

#[allow(dead_code, unreachable_pub)]
mod helpers;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use assert_matches::assert_matches;
use filament::{Cause, ContextSwitch, Effect, Outcome, RunError, Scheduler, Value};

fn millis(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Capture the context switch of a boundary so the test can resume it.
fn captured_boundary(
    slot: &Rc<RefCell<Option<Rc<ContextSwitch>>>>,
    interruptible: bool,
) -> Effect {
    let slot = Rc::clone(slot);
    Effect::from_async(move |switch| {
        if interruptible {
            switch.set_abort(|| {});
        }
        *slot.borrow_mut() = Some(switch);
    })
}

// ============================================================================
// Basic interruption
// ============================================================================

#[test]
fn interrupt_and_wait_observes_interruption_as_a_value() {
    let sched = Scheduler::new();
    let fiber = sched.spawn(Effect::never());

    let result = sched.run(fiber.interrupt_and_wait()).expect("wait succeeds");

    assert_eq!(result, Value::outcome(Outcome::Interrupted));
}

#[test]
fn interrupt_is_latched_and_idempotent() {
    let sched = Scheduler::new();
    let fiber = sched.spawn(Effect::never());
    sched.run_until_idle();

    fiber.interrupt_now();
    fiber.interrupt_now();
    sched.run_until_idle();

    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
    let requests = sched
        .events()
        .iter()
        .filter(|event| matches!(event, filament::ObsEvent::InterruptRequested { .. }))
        .count();
    assert_eq!(requests, 1);
}

#[test]
fn interrupt_before_start_wins() {
    let sched = Scheduler::new();
    let touched = Rc::new(Cell::new(false));
    let inner = Rc::clone(&touched);

    let fiber = sched.spawn(Effect::suspend(move || {
        inner.set(true);
        Effect::unit()
    }));
    fiber.interrupt_now();
    sched.run_until_idle();

    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
    assert!(!touched.get());
}

#[test]
fn join_on_an_interrupted_fiber_aborts_with_a_defect() {
    let sched = Scheduler::new();
    let fiber = sched.spawn(Effect::never());
    fiber.interrupt_now();

    let result = sched.run(fiber.join());

    assert_matches!(result, Err(RunError::Failed(Cause::Defect(message))) if message.contains("interrupted"));
}

// ============================================================================
// Critical sections
// ============================================================================

#[test]
fn interruption_is_deferred_until_a_critical_section_exits() {
    let sched = Scheduler::new();
    let reached_inner = Rc::new(Cell::new(false));
    let reached_after = Rc::new(Cell::new(false));

    let inner_flag = Rc::clone(&reached_inner);
    let after_flag = Rc::clone(&reached_after);
    let program = sched
        .delay(millis(10))
        .and_then(move |_| {
            inner_flag.set(true);
            Effect::unit()
        })
        .critical()
        .and_then(move |_| {
            after_flag.set(true);
            Effect::unit()
        });

    let fiber = sched.spawn(program);
    let target = fiber.clone();
    sched.schedule_after(millis(5), move || target.interrupt_now());
    sched.run_until_idle();

    // The interrupt at t=5 was latched: the delay and the step after it,
    // both inside the critical section, still ran.
    assert!(reached_inner.get());
    assert!(!reached_after.get());
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

#[test]
fn a_cause_raised_inside_a_critical_section_is_delivered_before_interruption() {
    let sched = Scheduler::new();
    let seen: Rc<RefCell<Option<Cause>>> = Rc::new(RefCell::new(None));

    let slot = Rc::clone(&seen);
    let program = sched
        .delay(millis(10))
        .then(Effect::fail("inner failure"))
        .catch_cause(move |cause| {
            *slot.borrow_mut() = Some(cause);
            Effect::unit()
        })
        .critical();

    let fiber = sched.spawn(program);
    let target = fiber.clone();
    sched.schedule_after(millis(5), move || target.interrupt_now());
    sched.run_until_idle();

    assert_eq!(
        seen.borrow_mut().take(),
        Some(Cause::fail("inner failure"))
    );
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

// ============================================================================
// Async boundaries
// ============================================================================

#[test]
fn interrupting_a_non_interruptible_boundary_waits_for_the_resume() {
    let sched = Scheduler::new();
    let slot = Rc::new(RefCell::new(None));

    let fiber = sched.spawn(captured_boundary(&slot, false));
    sched.run_until_idle();
    fiber.interrupt_now();

    // No cancel hook: the fiber stays suspended with the interrupt latched.
    assert_eq!(fiber.outcome(), None);

    let switch = slot.borrow_mut().take().expect("boundary reached");
    switch.resume(Ok(Value::Int(1)));
    sched.run_until_idle();

    // The late result is discarded; interruption wins.
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

#[test]
fn resume_later_still_executes_the_continuation_under_a_pending_interrupt() {
    let sched = Scheduler::new();
    let slot = Rc::new(RefCell::new(None));
    let continued = Rc::new(Cell::new(false));

    let flag = Rc::clone(&continued);
    let program = captured_boundary(&slot, false).and_then(move |_| {
        flag.set(true);
        Effect::never()
    });
    let fiber = sched.spawn(program);
    sched.run_until_idle();

    let switch = slot.borrow_mut().take().expect("boundary reached");
    switch.resume_later(Ok(Value::Unit));
    fiber.interrupt_now();
    sched.run_until_idle();

    // Delivery happens after the interrupt, but the continuation still ran.
    assert!(continued.get());
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

#[test]
fn a_resume_after_cancellation_is_dropped() {
    let sched = Scheduler::new();
    let slot = Rc::new(RefCell::new(None));

    let fiber = sched.spawn(captured_boundary(&slot, true));
    sched.run_until_idle();
    let switch = slot.borrow_mut().take().expect("boundary reached");

    fiber.interrupt_now();
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));

    switch.resume(Ok(Value::Int(9)));
    sched.run_until_idle();
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}

#[test]
fn interrupting_a_delay_deregisters_its_timer() {
    let sched = Scheduler::new();
    let finished = Rc::new(Cell::new(false));

    let flag = Rc::clone(&finished);
    let fiber = sched.spawn(sched.delay(millis(50)).and_then(move |_| {
        flag.set(true);
        Effect::unit()
    }));
    let target = fiber.clone();
    sched.schedule_after(millis(5), move || target.interrupt_now());
    sched.run_until_idle();

    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
    assert!(!finished.get());
    // The cancelled timer never fired, so the clock stopped at the
    // interrupt, not at the delay deadline.
    assert_eq!(sched.now(), millis(5));
}

// ============================================================================
// Finalizers under interruption
// ============================================================================

#[test]
fn an_async_finalizer_completes_before_the_fiber_reports_interrupted() {
    let sched = Scheduler::new();
    let cleaned = Rc::new(Cell::new(false));

    let flag = Rc::clone(&cleaned);
    let finalizer = sched.delay(millis(5)).and_then(move |_| {
        flag.set(true);
        Effect::unit()
    });
    let fiber = sched.spawn(Effect::never().on_exit(finalizer));
    sched.run_until_idle();

    fiber.interrupt_now();
    // The finalizer is waiting on its timer; the fiber is not done yet.
    assert_eq!(fiber.outcome(), None);

    sched.run_until_idle();
    assert!(cleaned.get());
    assert_matches!(fiber.outcome(), Some(Outcome::Interrupted));
}
