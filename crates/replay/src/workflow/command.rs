//! Outbound commands and task options

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Seq, SignalTarget};

/// Commands a workflow asks the outside world to perform
///
/// Commands are emitted only for operations the history has not recorded
/// yet. A worker layer executes them and records the matching
/// [`ScheduledEvent`](super::ScheduledEvent) and, later, result events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Invoke a task by name
    ScheduleTask {
        /// Sequence number of the declaring eventual
        seq: Seq,

        /// Task name (used by workers to look up a handler)
        name: String,

        /// Input data for the task (JSON)
        input: serde_json::Value,

        /// Execution options (timeouts)
        #[serde(default)]
        options: TaskOptions,
    },

    /// Arm a timer
    StartTimer {
        seq: Seq,

        /// When the timer fires
        schedule: TimerSchedule,
    },

    /// Start a child workflow execution
    ScheduleChildWorkflow {
        seq: Seq,

        /// Workflow type of the child
        name: String,

        /// Input for the child workflow
        input: serde_json::Value,
    },

    /// Record that the workflow waits for a signal
    ExpectSignal {
        seq: Seq,

        /// Name of the awaited signal
        signal_id: String,
    },

    /// Deliver a signal to another execution
    SendSignal {
        seq: Seq,

        /// Receiving execution
        target: SignalTarget,

        /// Signal name
        signal_id: String,

        /// Signal payload (JSON)
        payload: serde_json::Value,
    },

    /// Record that the workflow waits on a condition
    StartCondition { seq: Seq },
}

impl Command {
    /// Sequence number of the eventual that produced this command
    pub fn seq(&self) -> Seq {
        match self {
            Self::ScheduleTask { seq, .. }
            | Self::StartTimer { seq, .. }
            | Self::ScheduleChildWorkflow { seq, .. }
            | Self::ExpectSignal { seq, .. }
            | Self::SendSignal { seq, .. }
            | Self::StartCondition { seq } => *seq,
        }
    }
}

/// When a timer fires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerSchedule {
    /// Fire after a relative duration
    Duration {
        #[serde(with = "duration_serde")]
        duration: Duration,
    },

    /// Fire at an absolute point in time
    Until { until: DateTime<Utc> },
}

/// Options for task execution
///
/// Timeouts are enforced by the worker layer and reported back as
/// `TaskTimedOut` / `TaskHeartbeatTimedOut` result events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskOptions {
    /// Maximum time for the task to complete
    #[serde(default, with = "option_duration_serde")]
    pub timeout: Option<Duration>,

    /// Maximum time between heartbeats
    #[serde(default, with = "option_duration_serde")]
    pub heartbeat_timeout: Option<Duration>,
}

impl TaskOptions {
    /// Set the completion timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable heartbeating with the specified timeout
    pub fn with_heartbeat(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }
}

/// Serde support for Duration (as milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration>
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_serialization() {
        let command = Command::ScheduleTask {
            seq: 3,
            name: "charge_card".to_string(),
            input: json!({"amount": 42}),
            options: TaskOptions::default(),
        };

        let json = serde_json::to_string(&command).unwrap();
        assert!(json.contains("\"type\":\"schedule_task\""));

        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(command, parsed);
        assert_eq!(parsed.seq(), 3);
    }

    #[test]
    fn test_task_options_serialization() {
        let options = TaskOptions::default()
            .with_timeout(Duration::from_secs(10))
            .with_heartbeat(Duration::from_secs(30));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["timeout"], json!(10_000));
        assert_eq!(json["heartbeat_timeout"], json!(30_000));

        let parsed: TaskOptions = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.heartbeat_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_task_options_may_be_omitted() {
        let parsed: TaskOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed, TaskOptions::default());

        let command: Command = serde_json::from_value(json!({
            "type": "schedule_task",
            "seq": 0,
            "name": "charge_card",
            "input": null,
            "options": { "timeout": 5000 }
        }))
        .unwrap();
        assert!(matches!(
            command,
            Command::ScheduleTask { options, .. }
                if options.timeout == Some(Duration::from_secs(5)) && options.heartbeat_timeout.is_none()
        ));
    }

    #[test]
    fn test_timer_schedule_serialization() {
        let schedule = TimerSchedule::Duration {
            duration: Duration::from_secs(60),
        };

        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json, json!({"kind": "duration", "duration": 60_000}));
    }
}
