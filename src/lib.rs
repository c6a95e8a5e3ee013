//! Single-threaded cooperative effect and fiber runtime.
//!
//! This crate lets a program build a value describing a concurrent,
//! failure-aware computation (an [`Effect`]), and then execute it on a
//! cooperatively scheduled single-threaded event loop. An effect is an
//! immutable tree of suspended steps; the interpreter walks that tree,
//! crosses asynchronous boundaries, pushes and pops call frames, unwinds
//! on failure, and runs finalizers in the correct order under
//! interruption.
//!
//! # Architecture
//!
//! - **Effects** ([`effect::Effect`]): a closed set of step nodes built by
//!   smart constructors; pure values until run.
//! - **Runtime** ([`runtime::Runtime`]): the interpreter driving one fiber
//!   to its terminal [`outcome::Outcome`].
//! - **Fibers** ([`fiber::Fiber`]): first-class concurrent tasks with
//!   `join`, `wait`, `interrupt`, and `interrupt_and_wait`.
//! - **Scheduler** ([`scheduler::Scheduler`]): deterministic executor with
//!   a FIFO ready queue and a virtual-clock timer wheel.
//! - **Primitives**: [`cell::Ref`], [`deferred::Deferred`],
//!   [`semaphore::Semaphore`], and [`semaphore::Mutex`], all built on the
//!   runtime's cancellation contract.
//!
//! # Usage
//!
//! ```
//! use filament::{Effect, Scheduler, Value};
//!
//! let sched = Scheduler::new();
//! let program = Effect::of(20i64).map(|v| match v {
//!     Value::Int(n) => Value::Int(n * 2 + 2),
//!     other => other,
//! });
//! assert_eq!(sched.run(program).unwrap(), Value::Int(42));
//! ```

#![warn(missing_docs)]

pub mod cell;
pub mod deferred;
pub mod effect;
pub mod fiber;
pub mod oneshot;
pub mod outcome;
pub mod runtime;
pub mod scheduler;
pub mod semaphore;
pub mod trace;
pub mod value;

pub use cell::Ref;
pub use deferred::Deferred;
pub use effect::Effect;
pub use fiber::Fiber;
pub use oneshot::{ListenerId, OneShot};
pub use outcome::{Cause, Outcome};
pub use runtime::{ContextSwitch, Runtime, StepOutcome};
pub use scheduler::{RunError, Scheduler, TimerId};
pub use semaphore::{Mutex, Semaphore};
pub use trace::{FiberId, ObsEvent};
pub use value::Value;
