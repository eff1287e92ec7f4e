//! Combinator evaluation
//!
//! Combinators own no commands; they settle purely from the results of
//! their children, re-evaluated every time a child settles.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::workflow::{EventualResult, ResultTable, Seq, WorkflowError};

/// How a combinator derives its result from its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinatorMode {
    /// All children resolve (values in child order); first failure wins
    All,

    /// All children settle; resolves with one outcome record per child
    AllSettled,

    /// First child to resolve; fails only when every child failed
    Any,

    /// First child to settle, success or failure
    Race,
}

impl CombinatorMode {
    /// Result for a combinator with no children
    ///
    /// An empty race never settles.
    pub fn empty_result(self) -> Option<EventualResult> {
        match self {
            Self::All | Self::AllSettled => Some(EventualResult::resolved(json!([]))),
            Self::Any => Some(EventualResult::failed(WorkflowError::aggregate(
                "all eventuals failed",
            ))),
            Self::Race => None,
        }
    }

    /// Evaluate after `trigger` (one of `children`) settled
    pub fn evaluate(
        self,
        children: &[Seq],
        trigger: &EventualResult,
        settled: &ResultTable,
    ) -> Option<EventualResult> {
        match self {
            Self::All => {
                if trigger.is_failed() {
                    return Some(trigger.clone());
                }
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    match settled.get(*child) {
                        Some(EventualResult::Resolved { value }) => values.push(value.clone()),
                        // A failed child short-circuits through its own trigger
                        _ => return None,
                    }
                }
                Some(EventualResult::resolved(Value::Array(values)))
            }

            Self::AllSettled => {
                let mut outcomes = Vec::with_capacity(children.len());
                for child in children {
                    outcomes.push(settled_record(settled.get(*child)?));
                }
                Some(EventualResult::resolved(Value::Array(outcomes)))
            }

            Self::Any => {
                if trigger.is_resolved() {
                    return Some(trigger.clone());
                }
                let mut errors = Vec::with_capacity(children.len());
                for child in children {
                    match settled.get(*child)? {
                        resolved @ EventualResult::Resolved { .. } => {
                            return Some(resolved.clone())
                        }
                        EventualResult::Failed { error } => errors.push(error.message.clone()),
                    }
                }
                Some(EventualResult::failed(WorkflowError::aggregate(format!(
                    "all eventuals failed: {}",
                    errors.join("; ")
                ))))
            }

            Self::Race => Some(trigger.clone()),
        }
    }
}

fn settled_record(result: &EventualResult) -> Value {
    match result {
        EventualResult::Resolved { value } => json!({ "status": "fulfilled", "value": value }),
        EventualResult::Failed { error } => json!({ "status": "rejected", "reason": error }),
    }
}
