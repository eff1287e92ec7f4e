//! Workflow execution engine
//!
//! The engine module provides the `WorkflowExecutor` which drives workflow
//! programs through history replay and command emission.

mod executor;
mod hooks;
mod registry;
mod shared;
mod state;

pub use executor::{
    ExecutionStatus, ExecutorConfig, ExecutorError, ProcessResult, ReplayDiagnostics,
    WorkflowExecutor,
};
pub use hooks::{ExecutorHooks, NoopHooks};
pub use registry::{workflow_factory, AnyWorkflow, RegistryError, WorkflowFactory, WorkflowRegistry};
pub use shared::SharedExecutor;
