//! Observation hooks
//!
//! Hooks let tooling watch replay progress. They receive shared references
//! only and cannot change the outcome of an execution.

use crate::workflow::{Command, ResultEvent, ScheduledEvent};

/// Callbacks invoked by the executor while it replays
pub trait ExecutorHooks: Send + Sync {
    /// A declared call matched the next recorded scheduled event
    fn historical_event_matched(&self, expected: &ScheduledEvent, call: &Command) {
        let _ = (expected, call);
    }

    /// A result event is about to be committed
    fn before_applying_result_event(&self, event: &ResultEvent) {
        let _ = event;
    }
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ExecutorHooks for NoopHooks {}
