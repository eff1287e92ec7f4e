//! Workflow registry for type-erased workflow creation
//!
//! The registry allows registering workflow factories that create workflow
//! programs from JSON input without knowing the concrete type at runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::executor::{ExecutorConfig, WorkflowExecutor};
use crate::workflow::{EventualRef, EventualResult, HistoryEvent, Step, Workflow, WorkflowContext};

/// Type-erased workflow interface
///
/// This trait allows the executor to drive workflows without knowing their
/// concrete types. Outputs are converted to JSON.
pub trait AnyWorkflow: Send {
    /// Get the workflow type identifier
    fn workflow_type(&self) -> &'static str;

    /// First step of the program
    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value>;

    /// Called when an eventual settles
    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value>;

    /// Called when a signal reaches a registered handler
    fn on_signal(
        &mut self,
        ctx: &mut WorkflowContext,
        handler: EventualRef,
        signal_id: &str,
        payload: &Value,
    ) -> Step<Value>;

    /// Evaluate a named predicate
    fn condition(&self, name: &str) -> bool;
}

/// Wrapper to implement AnyWorkflow for any Workflow
struct WorkflowWrapper<W: Workflow> {
    inner: W,
}

fn erase<T: Serialize>(step: Step<T>) -> Step<Value> {
    step.map(|result| result.and_then(|output| serde_json::to_value(output).map_err(Into::into)))
}

impl<W: Workflow> AnyWorkflow for WorkflowWrapper<W> {
    fn workflow_type(&self) -> &'static str {
        W::TYPE
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        erase(self.inner.on_start(ctx))
    }

    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        erase(self.inner.on_resolved(ctx, eventual, result))
    }

    fn on_signal(
        &mut self,
        ctx: &mut WorkflowContext,
        handler: EventualRef,
        signal_id: &str,
        payload: &Value,
    ) -> Step<Value> {
        erase(self.inner.on_signal(ctx, handler, signal_id, payload))
    }

    fn condition(&self, name: &str) -> bool {
        self.inner.condition(name)
    }
}

/// Factory function type for creating workflows from JSON input
pub type WorkflowFactory =
    Arc<dyn Fn(Value) -> Result<Box<dyn AnyWorkflow>, serde_json::Error> + Send + Sync>;

/// Factory for one workflow type
pub fn workflow_factory<W: Workflow>() -> WorkflowFactory {
    Arc::new(|input: Value| {
        let typed_input: W::Input = serde_json::from_value(input)?;
        let workflow = W::new(typed_input);
        Ok(Box::new(WorkflowWrapper { inner: workflow }) as Box<dyn AnyWorkflow>)
    })
}

/// Registry of workflow factories
///
/// The registry maps workflow type names to factory functions that create
/// workflow programs from JSON input.
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a workflow type
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = WorkflowRegistry::new();
    /// registry.register::<MyWorkflow>();
    /// ```
    pub fn register<W: Workflow>(&mut self) {
        self.factories
            .insert(W::TYPE.to_string(), workflow_factory::<W>());
    }

    /// Check if a workflow type is registered
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Get the factory for a workflow type
    pub fn factory(&self, workflow_type: &str) -> Result<WorkflowFactory, RegistryError> {
        self.factories
            .get(workflow_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.to_string()))
    }

    /// Create a workflow program from type name and JSON input
    pub fn create(
        &self,
        workflow_type: &str,
        input: Value,
    ) -> Result<Box<dyn AnyWorkflow>, RegistryError> {
        let factory = self.factory(workflow_type)?;
        factory(input).map_err(RegistryError::Deserialization)
    }

    /// Create an executor for a registered workflow type
    pub fn executor(
        &self,
        workflow_type: &str,
        history: Vec<HistoryEvent>,
        config: ExecutorConfig,
    ) -> Result<WorkflowExecutor, RegistryError> {
        let factory = self.factory(workflow_type)?;
        Ok(WorkflowExecutor::new(factory, history, config))
    }

    /// Get the number of registered workflow types
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Get all registered workflow type names
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Workflow type not registered
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Failed to deserialize workflow input
    #[error("failed to deserialize workflow input: {0}")]
    Deserialization(#[source] serde_json::Error),
}
