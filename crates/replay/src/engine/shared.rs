//! Shareable executor handle
//!
//! [`SharedExecutor`] lets several tasks hold the same execution while
//! still rejecting overlapping `start` / `continue_with` calls.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::executor::{ExecutionStatus, ExecutorError, ProcessResult, WorkflowExecutor};
use crate::workflow::{EventualResult, ExecutionContext, HistoryEvent};

/// Cloneable handle to one executor
#[derive(Clone)]
pub struct SharedExecutor {
    inner: Arc<Mutex<WorkflowExecutor>>,
}

impl SharedExecutor {
    pub fn new(executor: WorkflowExecutor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(executor)),
        }
    }

    /// Start the execution; fails with [`ExecutorError::InFlight`] while
    /// another call holds the executor
    pub async fn start(
        &self,
        input: Value,
        context: ExecutionContext,
    ) -> Result<ProcessResult, ExecutorError> {
        let mut executor = self.inner.try_lock().map_err(|_| ExecutorError::InFlight)?;
        executor.start(input, context).await
    }

    /// Append history; fails with [`ExecutorError::InFlight`] while another
    /// call holds the executor
    pub async fn continue_with(
        &self,
        events: Vec<HistoryEvent>,
    ) -> Result<ProcessResult, ExecutorError> {
        let mut executor = self.inner.try_lock().map_err(|_| ExecutorError::InFlight)?;
        executor.continue_with(events).await
    }

    /// Current status, waiting for any in-flight call to finish
    pub async fn status(&self) -> ExecutionStatus {
        self.inner.lock().await.status()
    }

    /// Terminal result, waiting for any in-flight call to finish
    pub async fn result(&self) -> Option<EventualResult> {
        self.inner.lock().await.result().cloned()
    }
}

impl std::fmt::Debug for SharedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedExecutor")
            .field("in_use", &self.inner.try_lock().is_err())
            .finish()
    }
}
