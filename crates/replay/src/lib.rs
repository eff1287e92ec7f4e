//! # Deterministic Replay Engine
//!
//! Drives durable workflow programs against an append-only execution
//! history.
//!
//! ## Features
//!
//! - **Deterministic replay**: every operation a program declares is checked
//!   against the recorded history; divergence fails the execution
//! - **Command emission**: operations the history has not seen yet become
//!   outbound commands for the surrounding runtime to carry out
//! - **Eventual composition**: all / all-settled / any / race combinators
//!   and deadlines built from plain dependency wiring
//! - **Signals and conditions**: one-shot waits, long-lived handlers and
//!   named predicates re-checked after every committed event
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Workflow program                        │
//! │  (declares eventuals through WorkflowContext, one step at   │
//! │   a time)                                                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowExecutor                        │
//! │  (matches declarations to history, commits result events,   │
//! │   emits commands, records the terminal result)               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 History store / task workers                 │
//! │  (external: persist events, carry out commands)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use durable_replay::prelude::*;
//!
//! let mut executor = WorkflowExecutor::for_workflow::<GreetWorkflow>(
//!     history,
//!     ExecutorConfig::default().resumable(),
//! );
//!
//! let outcome = executor
//!     .start(json!("world"), ExecutionContext::new(GreetWorkflow::TYPE))
//!     .await?;
//!
//! for command in outcome.commands {
//!     // hand each command to the runtime
//! }
//! ```

pub mod engine;
pub mod eventual;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::engine::{
        ExecutionStatus, ExecutorConfig, ExecutorError, ExecutorHooks, ProcessResult,
        SharedExecutor, WorkflowExecutor, WorkflowRegistry,
    };
    pub use crate::workflow::{
        Command, EventualRef, EventualResult, ExecutionContext, HistoryEvent, ResultEvent,
        ScheduledEvent, SignalTarget, Step, TaskOptions, TimerSchedule, Workflow, WorkflowContext,
        WorkflowError,
    };
    pub use serde_json::{json, Value};
    pub use std::task::Poll;
}

// Re-export key types at crate root
pub use engine::{
    ExecutionStatus, ExecutorConfig, ExecutorError, ProcessResult, SharedExecutor,
    WorkflowExecutor, WorkflowRegistry,
};
pub use workflow::{
    Command, EventualRef, EventualResult, ExecutionContext, HistoryEvent, ResultEvent,
    ScheduledEvent, Step, Workflow, WorkflowContext, WorkflowError,
};
