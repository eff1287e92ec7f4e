//! Per-step workflow context
//!
//! A [`WorkflowContext`] is created for exactly one program step. Every
//! awaitable the program declares during that step is assigned the next
//! sequence number and collected in the context; the executor takes the
//! collected declarations once the step returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{EventualResult, Seq, SignalTarget, TaskOptions, TimerSchedule, WorkflowError};
use crate::eventual::{CombinatorMode, Eventual};

/// Handle to an eventual declared by the program
///
/// The program keeps these to recognise which operation settled when it is
/// resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventualRef(Seq);

impl EventualRef {
    pub(crate) fn new(seq: Seq) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> Seq {
        self.0
    }
}

impl std::fmt::Display for EventualRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Link from a child execution to the call that started it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentExecution {
    /// Parent execution id
    pub execution_id: Uuid,

    /// Seq of the child workflow call in the parent
    pub seq: Seq,
}

/// Facts about the running execution, fixed for its lifetime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Execution identifier
    pub execution_id: Uuid,

    /// Workflow type being executed
    pub workflow_type: String,

    /// When the execution started (recorded, never read from the clock
    /// during replay)
    pub started_at: DateTime<Utc>,

    /// Parent linkage when this is a child workflow
    pub parent: Option<ParentExecution>,
}

impl ExecutionContext {
    /// Create a context for a fresh top-level execution
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            workflow_type: workflow_type.into(),
            started_at: Utc::now(),
            parent: None,
        }
    }

    /// Set the start time
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Mark this execution as a child of another
    pub fn with_parent(mut self, execution_id: Uuid, seq: Seq) -> Self {
        self.parent = Some(ParentExecution { execution_id, seq });
        self
    }
}

/// Something the program asked for during one step
#[derive(Debug, Clone)]
pub(crate) enum Directive {
    Declare { seq: Seq, eventual: Eventual },
    DisposeSignalHandler { seq: Seq },
}

/// Capability handle through which a program declares every operation
pub struct WorkflowContext {
    execution: Arc<ExecutionContext>,
    next_seq: Seq,
    directives: Vec<Directive>,
}

impl WorkflowContext {
    pub(crate) fn new(execution: Arc<ExecutionContext>, next_seq: Seq) -> Self {
        Self {
            execution,
            next_seq,
            directives: Vec::new(),
        }
    }

    /// Hand the collected declarations back to the executor
    pub(crate) fn into_parts(self) -> (Seq, Vec<Directive>) {
        (self.next_seq, self.directives)
    }

    /// Execution this program runs in
    pub fn execution(&self) -> &ExecutionContext {
        &self.execution
    }

    fn declare(&mut self, eventual: Eventual) -> EventualRef {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.directives.push(Directive::Declare { seq, eventual });
        EventualRef::new(seq)
    }

    /// Invoke a task with default options
    pub fn call_task(&mut self, name: impl Into<String>, input: Value) -> EventualRef {
        self.call_task_with(name, input, TaskOptions::default())
    }

    /// Invoke a task
    pub fn call_task_with(
        &mut self,
        name: impl Into<String>,
        input: Value,
        options: TaskOptions,
    ) -> EventualRef {
        self.declare(Eventual::TaskCall {
            name: name.into(),
            input,
            options,
        })
    }

    /// Wait for a relative duration
    pub fn sleep(&mut self, duration: Duration) -> EventualRef {
        self.declare(Eventual::TimerWait {
            schedule: TimerSchedule::Duration { duration },
        })
    }

    /// Wait until an absolute point in time
    pub fn sleep_until(&mut self, until: DateTime<Utc>) -> EventualRef {
        self.declare(Eventual::TimerWait {
            schedule: TimerSchedule::Until { until },
        })
    }

    /// Wait for the next signal with this name; resolves with its payload
    pub fn expect_signal(&mut self, signal_id: impl Into<String>) -> EventualRef {
        self.declare(Eventual::SignalWait {
            signal_id: signal_id.into(),
        })
    }

    /// Register a handler invoked through [`Workflow::on_signal`] for every
    /// delivery of this signal until disposed
    ///
    /// [`Workflow::on_signal`]: super::Workflow::on_signal
    pub fn on_signal(&mut self, signal_id: impl Into<String>) -> EventualRef {
        self.declare(Eventual::SignalHandler {
            signal_id: signal_id.into(),
        })
    }

    /// Stop delivering signals to a handler
    pub fn dispose_signal_handler(&mut self, handler: EventualRef) {
        self.directives
            .push(Directive::DisposeSignalHandler { seq: handler.seq() });
    }

    /// Send a signal; resolves as soon as the send is recorded
    pub fn send_signal(
        &mut self,
        target: SignalTarget,
        signal_id: impl Into<String>,
        payload: Value,
    ) -> EventualRef {
        self.declare(Eventual::SendSignal {
            target,
            signal_id: signal_id.into(),
            payload,
        })
    }

    /// Start a child workflow and wait for its result
    pub fn call_child_workflow(&mut self, name: impl Into<String>, input: Value) -> EventualRef {
        self.declare(Eventual::ChildWorkflowCall {
            name: name.into(),
            input,
        })
    }

    /// Wait until [`Workflow::condition`] returns true for `name`
    ///
    /// Resolves with `true`. If the predicate already holds the condition
    /// resolves without emitting a command.
    ///
    /// [`Workflow::condition`]: super::Workflow::condition
    pub fn condition(&mut self, name: impl Into<String>) -> EventualRef {
        self.declare(Eventual::Condition { name: name.into() })
    }

    /// Resolve with every child value once all resolve; first failure wins
    pub fn all(&mut self, children: &[EventualRef]) -> EventualRef {
        self.combine(CombinatorMode::All, children)
    }

    /// Resolve with every child outcome once all settle
    pub fn all_settled(&mut self, children: &[EventualRef]) -> EventualRef {
        self.combine(CombinatorMode::AllSettled, children)
    }

    /// Resolve with the first child success; fail once all children fail
    pub fn any(&mut self, children: &[EventualRef]) -> EventualRef {
        self.combine(CombinatorMode::Any, children)
    }

    /// Settle like the first child to settle
    pub fn race(&mut self, children: &[EventualRef]) -> EventualRef {
        self.combine(CombinatorMode::Race, children)
    }

    fn combine(&mut self, mode: CombinatorMode, children: &[EventualRef]) -> EventualRef {
        self.declare(Eventual::Combinator {
            mode,
            children: children.iter().map(EventualRef::seq).collect(),
        })
    }

    /// Fail `primary` with a timeout if `timer` settles first
    ///
    /// The returned eventual resolves once `primary` settles either way.
    pub fn deadline(&mut self, primary: EventualRef, timer: EventualRef) -> EventualRef {
        self.declare(Eventual::Deadline {
            primary: primary.seq(),
            timer: timer.seq(),
        })
    }

    /// An eventual that is already resolved
    pub fn resolved(&mut self, value: Value) -> EventualRef {
        self.declare(Eventual::Constant {
            result: EventualResult::resolved(value),
        })
    }

    /// An eventual that has already failed
    pub fn failed(&mut self, error: WorkflowError) -> EventualRef {
        self.declare(Eventual::Constant {
            result: EventualResult::failed(error),
        })
    }
}
