//! Failure causes and terminal fiber outcomes.
//!
//! A `Cause` describes why a computation failed; an `Outcome` is what an
//! onlooker observes when a fiber terminates. Interruption is a terminal
//! outcome only, never a cause: it cannot be caught from inside the fiber.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Structured description of why a computation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cause {
    /// Typed failure raised with `Effect::fail`. Recoverable.
    Fail(Value),
    /// Unexpected defect: a host panic escaping a suspend thunk or an
    /// async register call. Observable through `catch_cause`, but not
    /// through `catch`.
    Defect(String),
    /// Composite cause: a failure that propagated through a finalizer
    /// which itself failed. Associative, non-commutative; the original
    /// cause is on the left.
    And(Box<Cause>, Box<Cause>),
}

impl Cause {
    /// Typed failure cause.
    #[must_use]
    pub fn fail(error: impl Into<Value>) -> Cause {
        Cause::Fail(error.into())
    }

    /// Defect cause from a host-level failure description.
    #[must_use]
    pub fn defect(message: impl Into<String>) -> Cause {
        Cause::Defect(message.into())
    }

    /// Append `later` to this cause, keeping this cause on the left.
    #[must_use]
    pub fn and(self, later: Cause) -> Cause {
        Cause::And(Box::new(self), Box::new(later))
    }

    /// Whether this cause is (or starts with) a typed failure.
    #[must_use]
    pub fn is_fail(&self) -> bool {
        matches!(self, Cause::Fail(_))
    }

    /// Whether this cause is a defect.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Cause::Defect(_))
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cause::Fail(value) => write!(f, "failure: {value:?}"),
            Cause::Defect(message) => write!(f, "defect: {message}"),
            Cause::And(first, second) => write!(f, "{first}; then {second}"),
        }
    }
}

/// Terminal outcome of a fiber, as observed through its result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// The fiber completed with a value.
    Success(Value),
    /// The fiber terminated with a failure cause.
    Failure(Cause),
    /// The fiber was terminated by interruption.
    Interrupted,
}

impl Outcome {
    /// Whether this is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The success value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }
}
