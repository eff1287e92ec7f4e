//! Workflow abstractions and types
//!
//! This module contains the program-facing primitives:
//! - [`Workflow`] trait for defining resumable workflow programs
//! - [`WorkflowContext`] through which programs declare operations
//! - [`Command`] enum for outbound instructions
//! - [`HistoryEvent`] enum for the replayed log
//! - [`EventualResult`] for settled outcomes

mod command;
mod context;
mod definition;
mod event;
mod result;
mod signal;

pub use command::{Command, TaskOptions, TimerSchedule};
pub(crate) use context::Directive;
pub use context::{EventualRef, ExecutionContext, ParentExecution, WorkflowContext};
pub use definition::{error_codes, Step, Workflow, WorkflowError};
pub use event::{HistoryEvent, ResultEvent, ScheduledEvent};
pub use result::{EventualResult, ResultTable, Seq};
pub use signal::SignalTarget;
