//! Observable events emitted by the scheduler and its fibers.

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// Identifier of a fiber within one scheduler.
pub type FiberId = u64;

/// Observable event, stamped with the scheduler tick at which it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObsEvent {
    /// A fiber was created and queued to start.
    Spawned {
        /// Scheduler tick when the event occurred.
        tick: u64,
        /// Fiber ID.
        fiber: FiberId,
    },
    /// A fiber yielded at an asynchronous boundary.
    Suspended {
        /// Scheduler tick when the event occurred.
        tick: u64,
        /// Fiber ID.
        fiber: FiberId,
    },
    /// A suspended fiber was resumed.
    Resumed {
        /// Scheduler tick when the event occurred.
        tick: u64,
        /// Fiber ID.
        fiber: FiberId,
    },
    /// Interruption was requested for a fiber.
    InterruptRequested {
        /// Scheduler tick when the event occurred.
        tick: u64,
        /// Fiber ID.
        fiber: FiberId,
    },
    /// A fiber reached its terminal outcome.
    Completed {
        /// Scheduler tick when the event occurred.
        tick: u64,
        /// Fiber ID.
        fiber: FiberId,
        /// The terminal outcome.
        outcome: Outcome,
    },
}
