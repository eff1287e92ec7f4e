//! Workflow trait definition

use std::task::Poll;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{EventualRef, EventualResult, WorkflowContext};

/// Well-known error codes carried by [`WorkflowError`]
pub mod error_codes {
    /// Replayed program diverged from the recorded history
    pub const DETERMINISM: &str = "DeterminismError";

    /// An operation or the whole execution timed out
    pub const TIMEOUT: &str = "Timeout";

    /// A task stopped sending heartbeats
    pub const HEARTBEAT_TIMEOUT: &str = "HeartbeatTimeout";

    /// Every child of an `any` combinator failed
    pub const AGGREGATE: &str = "AggregateError";

    /// The workflow program panicked during a step
    pub const PANIC: &str = "Panic";

    /// A value could not be converted to or from JSON
    pub const SERIALIZATION: &str = "Serialization";
}

/// Error type for workflow and operation failures
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,
}

impl WorkflowError {
    /// Create a new workflow error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn determinism(message: impl Into<String>) -> Self {
        Self::new(message).with_code(error_codes::DETERMINISM)
    }

    pub fn timeout() -> Self {
        Self::new("operation timed out").with_code(error_codes::TIMEOUT)
    }

    pub fn heartbeat_timeout() -> Self {
        Self::new("task heartbeat timed out").with_code(error_codes::HEARTBEAT_TIMEOUT)
    }

    pub fn aggregate(message: impl Into<String>) -> Self {
        Self::new(message).with_code(error_codes::AGGREGATE)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(message).with_code(error_codes::PANIC)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(message).with_code(error_codes::SERIALIZATION)
    }

    fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn is_determinism(&self) -> bool {
        self.has_code(error_codes::DETERMINISM)
    }

    pub fn is_timeout(&self) -> bool {
        self.has_code(error_codes::TIMEOUT)
    }

    pub fn is_heartbeat_timeout(&self) -> bool {
        self.has_code(error_codes::HEARTBEAT_TIMEOUT)
    }

    pub fn is_aggregate(&self) -> bool {
        self.has_code(error_codes::AGGREGATE)
    }

    pub fn is_panic(&self) -> bool {
        self.has_code(error_codes::PANIC)
    }

    pub fn is_serialization(&self) -> bool {
        self.has_code(error_codes::SERIALIZATION)
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Outcome of one program step
///
/// `Poll::Pending` suspends the program until one of its eventuals settles.
/// `Poll::Ready` ends it with a terminal result.
pub type Step<T> = Poll<Result<T, WorkflowError>>;

/// A workflow is a deterministic, resumable program
///
/// The executor drives the program one step at a time. Every awaitable
/// operation is declared through the [`WorkflowContext`] handed to each
/// step; the program is resumed with [`Workflow::on_resolved`] whenever one
/// of its eventuals settles.
///
/// # Determinism
///
/// Given the same input and the same sequence of resumptions, a workflow
/// must declare the same operations in the same order. The executor checks
/// this against recorded history and fails the execution with a
/// determinism error when it does not hold.
///
/// # Example
///
/// ```ignore
/// use durable_replay::prelude::*;
///
/// struct GreetWorkflow {
///     name: String,
///     greeting: Option<EventualRef>,
/// }
///
/// impl Workflow for GreetWorkflow {
///     const TYPE: &'static str = "greet";
///     type Input = String;
///     type Output = String;
///
///     fn new(name: String) -> Self {
///         Self { name, greeting: None }
///     }
///
///     fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<String> {
///         self.greeting = Some(ctx.call_task("greet", json!(self.name)));
///         Poll::Pending
///     }
///
///     fn on_resolved(
///         &mut self,
///         _ctx: &mut WorkflowContext,
///         eventual: EventualRef,
///         result: &EventualResult,
///     ) -> Step<String> {
///         if Some(eventual) == self.greeting {
///             return Poll::Ready(result.decode());
///         }
///         Poll::Pending
///     }
/// }
/// ```
pub trait Workflow: Send + 'static {
    /// Unique type identifier for this workflow
    ///
    /// This is used to look up the workflow in the registry.
    const TYPE: &'static str;

    /// Input type for starting the workflow
    type Input: Serialize + DeserializeOwned + Send;

    /// Output type when workflow completes successfully
    type Output: Serialize + DeserializeOwned + Send;

    /// Create a new workflow instance from input
    ///
    /// This is called both for a first run and for every replay.
    fn new(input: Self::Input) -> Self;

    /// First step of the program
    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Self::Output>;

    /// Called when an eventual declared by this program settles
    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Self::Output>;

    /// Called for every signal delivered to a handler registered with
    /// [`WorkflowContext::on_signal`]
    fn on_signal(
        &mut self,
        ctx: &mut WorkflowContext,
        handler: EventualRef,
        signal_id: &str,
        payload: &Value,
    ) -> Step<Self::Output> {
        let _ = (ctx, handler, signal_id, payload);
        Poll::Pending
    }

    /// Evaluate a named predicate for [`WorkflowContext::condition`]
    ///
    /// Re-evaluated after every committed event while the condition waits.
    fn condition(&self, name: &str) -> bool {
        let _ = name;
        false
    }
}
