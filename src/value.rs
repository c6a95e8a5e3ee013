//! Runtime values carried by effects.
//!
//! Effects are untyped at the interpreter level: success values and typed
//! failure values are both drawn from this closed, serializable enum. Hosts
//! embed richer data as pairs or strings.

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// Runtime value carried through effect steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unit / no value.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// String.
    Str(String),
    /// Product pair value.
    Pair(Box<Value>, Box<Value>),
    /// A reified fiber outcome, as produced by `wait` or `resurrect`.
    Outcome(Box<Outcome>),
}

impl Value {
    /// Build a pair value.
    #[must_use]
    pub fn pair(first: impl Into<Value>, second: impl Into<Value>) -> Value {
        Value::Pair(Box::new(first.into()), Box::new(second.into()))
    }

    /// Wrap an outcome as a value.
    #[must_use]
    pub fn outcome(outcome: Outcome) -> Value {
        Value::Outcome(Box::new(outcome))
    }

    /// The boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Value {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<Outcome> for Value {
    fn from(outcome: Outcome) -> Value {
        Value::outcome(outcome)
    }
}
