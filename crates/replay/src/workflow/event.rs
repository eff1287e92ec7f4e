//! History events replayed by the executor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Command, Seq, SignalTarget, TimerSchedule, WorkflowError};

/// An operation was started
///
/// Scheduled events are what the replay checks against: on replay the
/// program must declare the same operations, in the same order, as these
/// events record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledEvent {
    /// A task was scheduled
    TaskScheduled { seq: Seq, name: String },

    /// A timer was armed
    TimerScheduled { seq: Seq, schedule: TimerSchedule },

    /// A child workflow was started
    ChildWorkflowScheduled { seq: Seq, name: String },

    /// The workflow started waiting for a signal
    ExpectSignalStarted { seq: Seq, signal_id: String },

    /// The workflow sent a signal
    SignalSent {
        seq: Seq,
        signal_id: String,
        target: SignalTarget,
    },

    /// The workflow started waiting on a condition
    ConditionStarted { seq: Seq },
}

impl ScheduledEvent {
    pub fn seq(&self) -> Seq {
        match self {
            Self::TaskScheduled { seq, .. }
            | Self::TimerScheduled { seq, .. }
            | Self::ChildWorkflowScheduled { seq, .. }
            | Self::ExpectSignalStarted { seq, .. }
            | Self::SignalSent { seq, .. }
            | Self::ConditionStarted { seq } => *seq,
        }
    }

    /// Short kind label for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskScheduled { .. } => "task_scheduled",
            Self::TimerScheduled { .. } => "timer_scheduled",
            Self::ChildWorkflowScheduled { .. } => "child_workflow_scheduled",
            Self::ExpectSignalStarted { .. } => "expect_signal_started",
            Self::SignalSent { .. } => "signal_sent",
            Self::ConditionStarted { .. } => "condition_started",
        }
    }
}

impl From<&Command> for ScheduledEvent {
    fn from(command: &Command) -> Self {
        match command {
            Command::ScheduleTask { seq, name, .. } => Self::TaskScheduled {
                seq: *seq,
                name: name.clone(),
            },
            Command::StartTimer { seq, schedule } => Self::TimerScheduled {
                seq: *seq,
                schedule: schedule.clone(),
            },
            Command::ScheduleChildWorkflow { seq, name, .. } => Self::ChildWorkflowScheduled {
                seq: *seq,
                name: name.clone(),
            },
            Command::ExpectSignal { seq, signal_id } => Self::ExpectSignalStarted {
                seq: *seq,
                signal_id: signal_id.clone(),
            },
            Command::SendSignal {
                seq,
                target,
                signal_id,
                ..
            } => Self::SignalSent {
                seq: *seq,
                signal_id: signal_id.clone(),
                target: target.clone(),
            },
            Command::StartCondition { seq } => Self::ConditionStarted { seq: *seq },
        }
    }
}

/// An operation completed, failed or timed out, or something arrived from
/// outside the execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEvent {
    /// Task returned a value
    TaskSucceeded {
        seq: Seq,
        result: serde_json::Value,
    },

    /// Task failed
    TaskFailed { seq: Seq, error: WorkflowError },

    /// Task did not complete within its timeout
    TaskTimedOut { seq: Seq },

    /// Task stopped heartbeating
    TaskHeartbeatTimedOut { seq: Seq },

    /// Timer fired
    TimerCompleted { seq: Seq },

    /// Child workflow completed successfully
    ChildWorkflowSucceeded {
        seq: Seq,
        result: serde_json::Value,
    },

    /// Child workflow failed
    ChildWorkflowFailed { seq: Seq, error: WorkflowError },

    /// A signal was delivered to this execution (addressed by name)
    SignalReceived {
        signal_id: String,
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// A new run of the execution began
    WorkflowRunStarted { timestamp: DateTime<Utc> },

    /// The whole execution exceeded its timeout
    WorkflowTimedOut,
}

impl ResultEvent {
    /// Sequence number this result is addressed to
    ///
    /// Signals and execution-wide markers are not addressed by seq.
    pub fn seq(&self) -> Option<Seq> {
        match self {
            Self::TaskSucceeded { seq, .. }
            | Self::TaskFailed { seq, .. }
            | Self::TaskTimedOut { seq }
            | Self::TaskHeartbeatTimedOut { seq }
            | Self::TimerCompleted { seq }
            | Self::ChildWorkflowSucceeded { seq, .. }
            | Self::ChildWorkflowFailed { seq, .. } => Some(*seq),
            Self::SignalReceived { .. }
            | Self::WorkflowRunStarted { .. }
            | Self::WorkflowTimedOut => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskSucceeded { .. } => "task_succeeded",
            Self::TaskFailed { .. } => "task_failed",
            Self::TaskTimedOut { .. } => "task_timed_out",
            Self::TaskHeartbeatTimedOut { .. } => "task_heartbeat_timed_out",
            Self::TimerCompleted { .. } => "timer_completed",
            Self::ChildWorkflowSucceeded { .. } => "child_workflow_succeeded",
            Self::ChildWorkflowFailed { .. } => "child_workflow_failed",
            Self::SignalReceived { .. } => "signal_received",
            Self::WorkflowRunStarted { .. } => "workflow_run_started",
            Self::WorkflowTimedOut => "workflow_timed_out",
        }
    }
}

/// One entry of the append-only history log
///
/// A Scheduled event for a seq always precedes its Result events in the
/// log. The executor does not rely on physical position, though: results
/// are committed by seq or signal name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HistoryEvent {
    Scheduled(ScheduledEvent),
    Result(ResultEvent),
}

impl HistoryEvent {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

impl From<ScheduledEvent> for HistoryEvent {
    fn from(event: ScheduledEvent) -> Self {
        Self::Scheduled(event)
    }
}

impl From<ResultEvent> for HistoryEvent {
    fn from(event: ResultEvent) -> Self {
        Self::Result(event)
    }
}

impl From<&Command> for HistoryEvent {
    fn from(command: &Command) -> Self {
        Self::Scheduled(command.into())
    }
}
