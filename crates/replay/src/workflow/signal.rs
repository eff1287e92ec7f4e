//! Signal addressing

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Seq;

/// Receiver of a signal sent by a workflow
///
/// Signals are addressed by name on the receiving side; the receiving
/// execution sees them as `SignalReceived` result events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalTarget {
    /// Any execution, by id
    Execution { execution_id: Uuid },

    /// A child workflow started by this execution, by the seq of its call
    ChildWorkflow { seq: Seq },
}

impl SignalTarget {
    pub fn execution(execution_id: Uuid) -> Self {
        Self::Execution { execution_id }
    }

    pub fn child(seq: Seq) -> Self {
        Self::ChildWorkflow { seq }
    }
}
