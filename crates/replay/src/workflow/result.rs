//! Result algebra for eventual outcomes
//!
//! An eventual is pending until a [`EventualResult`] is recorded for its
//! sequence number. Pending is always expressed as `Option::None`; there is
//! no pending variant.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowError;

/// Sequence number assigned to an eventual in program order
pub type Seq = u32;

/// Settled outcome of an awaitable operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventualResult {
    /// The operation produced a value
    Resolved {
        /// Result value (JSON)
        value: Value,
    },

    /// The operation failed
    Failed {
        /// Error details
        error: WorkflowError,
    },
}

impl EventualResult {
    /// Create a resolved result
    pub fn resolved(value: Value) -> Self {
        Self::Resolved { value }
    }

    /// Create a failed result
    pub fn failed(error: WorkflowError) -> Self {
        Self::Failed { error }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The resolved value, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Resolved { value } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&WorkflowError> {
        match self {
            Self::Resolved { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<Value, WorkflowError> {
        match self {
            Self::Resolved { value } => Ok(value),
            Self::Failed { error } => Err(error),
        }
    }

    /// Deserialize the resolved value into a concrete type
    ///
    /// Failures pass through unchanged; a value that does not match `T`
    /// becomes a serialization error.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
        match self {
            Self::Resolved { value } => serde_json::from_value(value.clone())
                .map_err(|e| WorkflowError::serialization(e.to_string())),
            Self::Failed { error } => Err(error.clone()),
        }
    }
}

impl From<Result<Value, WorkflowError>> for EventualResult {
    fn from(result: Result<Value, WorkflowError>) -> Self {
        match result {
            Ok(value) => Self::Resolved { value },
            Err(error) => Self::Failed { error },
        }
    }
}

/// Settled results keyed by sequence number
///
/// Entries are write-once: a second insert for the same seq is ignored.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    results: HashMap<Seq, EventualResult>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result, returning `false` if the seq already had one
    pub fn insert(&mut self, seq: Seq, result: EventualResult) -> bool {
        if self.results.contains_key(&seq) {
            return false;
        }
        self.results.insert(seq, result);
        true
    }

    pub fn get(&self, seq: Seq) -> Option<&EventualResult> {
        self.results.get(&seq)
    }

    pub fn contains(&self, seq: Seq) -> bool {
        self.results.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
