//! Eventual descriptors
//!
//! An [`Eventual`] is a pure description of one awaitable operation. The
//! executor asks it four questions, each answered by an exhaustive match:
//! which command it emits, how it consumes a result event, which signals it
//! listens to, and how it reacts when one of its dependencies settles.

use serde_json::Value;

use super::CombinatorMode;
use crate::workflow::{
    Command, EventualResult, ResultEvent, ResultTable, ScheduledEvent, Seq, SignalTarget,
    TaskOptions, TimerSchedule, WorkflowError,
};

/// Description of one awaitable operation
#[derive(Debug, Clone, PartialEq)]
pub enum Eventual {
    /// Invoke a task by name
    TaskCall {
        name: String,
        input: Value,
        options: TaskOptions,
    },

    /// Wait for a timer
    TimerWait { schedule: TimerSchedule },

    /// Wait for one delivery of a named signal
    SignalWait { signal_id: String },

    /// Receive every delivery of a named signal until disposed
    SignalHandler { signal_id: String },

    /// Send a signal to another execution
    SendSignal {
        target: SignalTarget,
        signal_id: String,
        payload: Value,
    },

    /// Run a child workflow
    ChildWorkflowCall { name: String, input: Value },

    /// Wait until a named program predicate holds
    Condition { name: String },

    /// Compose other eventuals
    Combinator {
        mode: CombinatorMode,
        children: Vec<Seq>,
    },

    /// Fail `primary` with a timeout when `timer` settles first
    Deadline { primary: Seq, timer: Seq },

    /// Already settled at declaration
    Constant { result: EventualResult },
}

/// How an eventual reacts to another eventual settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyHandler {
    /// A combinator child settled
    Child,

    /// The deadline timer settled
    DeadlineTimer,

    /// The guarded operation settled
    DeadlinePrimary,
}

/// Wiring from an eventual to one it depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// The eventual whose settlement triggers the handler
    pub on: Seq,
    pub handler: DependencyHandler,
}

/// A result produced by a dependency handler, addressed to any eventual
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub seq: Seq,
    pub result: EventualResult,
}

/// What applying a result event to an eventual produced
#[derive(Debug, Clone, PartialEq)]
pub enum EventApplication {
    /// The eventual settles with this result
    Settle(EventualResult),

    /// A signal handler must be run; the eventual stays active
    DeliverSignal { signal_id: String, payload: Value },

    /// The event is not meant for this eventual
    Ignore,
}

impl Eventual {
    /// Short kind label for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCall { .. } => "task_call",
            Self::TimerWait { .. } => "timer_wait",
            Self::SignalWait { .. } => "signal_wait",
            Self::SignalHandler { .. } => "signal_handler",
            Self::SendSignal { .. } => "send_signal",
            Self::ChildWorkflowCall { .. } => "child_workflow_call",
            Self::Condition { .. } => "condition",
            Self::Combinator { .. } => "combinator",
            Self::Deadline { .. } => "deadline",
            Self::Constant { .. } => "constant",
        }
    }

    /// Outbound command, for eventuals that are visible outside the
    /// execution
    pub fn command(&self, seq: Seq) -> Option<Command> {
        match self {
            Self::TaskCall {
                name,
                input,
                options,
            } => Some(Command::ScheduleTask {
                seq,
                name: name.clone(),
                input: input.clone(),
                options: options.clone(),
            }),
            Self::TimerWait { schedule } => Some(Command::StartTimer {
                seq,
                schedule: schedule.clone(),
            }),
            Self::SignalWait { signal_id } => Some(Command::ExpectSignal {
                seq,
                signal_id: signal_id.clone(),
            }),
            Self::SendSignal {
                target,
                signal_id,
                payload,
            } => Some(Command::SendSignal {
                seq,
                target: target.clone(),
                signal_id: signal_id.clone(),
                payload: payload.clone(),
            }),
            Self::ChildWorkflowCall { name, input } => Some(Command::ScheduleChildWorkflow {
                seq,
                name: name.clone(),
                input: input.clone(),
            }),
            Self::Condition { .. } => Some(Command::StartCondition { seq }),
            Self::SignalHandler { .. }
            | Self::Combinator { .. }
            | Self::Deadline { .. }
            | Self::Constant { .. } => None,
        }
    }

    /// Whether a recorded scheduled event is this call, replayed
    ///
    /// Compares seq, kind and the identifying fields; inputs and payloads
    /// are not compared.
    pub fn is_corresponding(&self, seq: Seq, expected: &ScheduledEvent) -> bool {
        if expected.seq() != seq {
            return false;
        }
        match (self, expected) {
            (Self::TaskCall { name, .. }, ScheduledEvent::TaskScheduled { name: recorded, .. }) => {
                name == recorded
            }
            (
                Self::TimerWait { schedule },
                ScheduledEvent::TimerScheduled {
                    schedule: recorded, ..
                },
            ) => schedule == recorded,
            (
                Self::SignalWait { signal_id },
                ScheduledEvent::ExpectSignalStarted {
                    signal_id: recorded,
                    ..
                },
            ) => signal_id == recorded,
            (
                Self::SendSignal {
                    target, signal_id, ..
                },
                ScheduledEvent::SignalSent {
                    signal_id: recorded_id,
                    target: recorded_target,
                    ..
                },
            ) => signal_id == recorded_id && target == recorded_target,
            (
                Self::ChildWorkflowCall { name, .. },
                ScheduledEvent::ChildWorkflowScheduled { name: recorded, .. },
            ) => name == recorded,
            (Self::Condition { .. }, ScheduledEvent::ConditionStarted { .. }) => true,
            _ => false,
        }
    }

    /// Consume a result event addressed to this eventual
    pub fn apply_event(&self, event: &ResultEvent) -> EventApplication {
        use EventApplication::{DeliverSignal, Ignore, Settle};

        match (self, event) {
            (Self::TaskCall { .. }, ResultEvent::TaskSucceeded { result, .. }) => {
                Settle(EventualResult::resolved(result.clone()))
            }
            (Self::TaskCall { .. }, ResultEvent::TaskFailed { error, .. }) => {
                Settle(EventualResult::failed(error.clone()))
            }
            (Self::TaskCall { .. }, ResultEvent::TaskTimedOut { .. }) => {
                Settle(EventualResult::failed(WorkflowError::timeout()))
            }
            (Self::TaskCall { .. }, ResultEvent::TaskHeartbeatTimedOut { .. }) => {
                Settle(EventualResult::failed(WorkflowError::heartbeat_timeout()))
            }
            (Self::TimerWait { .. }, ResultEvent::TimerCompleted { .. }) => {
                Settle(EventualResult::resolved(Value::Null))
            }
            (Self::ChildWorkflowCall { .. }, ResultEvent::ChildWorkflowSucceeded { result, .. }) => {
                Settle(EventualResult::resolved(result.clone()))
            }
            (Self::ChildWorkflowCall { .. }, ResultEvent::ChildWorkflowFailed { error, .. }) => {
                Settle(EventualResult::failed(error.clone()))
            }
            (
                Self::SignalWait { signal_id },
                ResultEvent::SignalReceived {
                    signal_id: received,
                    payload,
                },
            ) if signal_id == received => Settle(EventualResult::resolved(payload.clone())),
            (
                Self::SignalHandler { signal_id },
                ResultEvent::SignalReceived {
                    signal_id: received,
                    payload,
                },
            ) if signal_id == received => DeliverSignal {
                signal_id: received.clone(),
                payload: payload.clone(),
            },
            _ => Ignore,
        }
    }

    /// Signal names this eventual listens to while active
    pub fn signals(&self) -> Vec<&str> {
        match self {
            Self::SignalWait { signal_id } | Self::SignalHandler { signal_id } => {
                vec![signal_id.as_str()]
            }
            Self::TaskCall { .. }
            | Self::TimerWait { .. }
            | Self::SendSignal { .. }
            | Self::ChildWorkflowCall { .. }
            | Self::Condition { .. }
            | Self::Combinator { .. }
            | Self::Deadline { .. }
            | Self::Constant { .. } => Vec::new(),
        }
    }

    /// Name of the predicate to re-check after every committed event
    pub fn after_every_event(&self) -> Option<&str> {
        match self {
            Self::Condition { name } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Other eventuals whose settlement this one reacts to
    pub fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Self::Combinator { children, .. } => children
                .iter()
                .map(|child| Dependency {
                    on: *child,
                    handler: DependencyHandler::Child,
                })
                .collect(),
            Self::Deadline { primary, timer } => vec![
                Dependency {
                    on: *timer,
                    handler: DependencyHandler::DeadlineTimer,
                },
                Dependency {
                    on: *primary,
                    handler: DependencyHandler::DeadlinePrimary,
                },
            ],
            Self::TaskCall { .. }
            | Self::TimerWait { .. }
            | Self::SignalWait { .. }
            | Self::SignalHandler { .. }
            | Self::SendSignal { .. }
            | Self::ChildWorkflowCall { .. }
            | Self::Condition { .. }
            | Self::Constant { .. } => Vec::new(),
        }
    }

    /// React to a dependency settling
    ///
    /// `owner` is this eventual's seq. The returned resolution may target
    /// another eventual (a deadline fails its primary).
    pub fn on_dependency(
        &self,
        owner: Seq,
        handler: DependencyHandler,
        result: &EventualResult,
        settled: &ResultTable,
    ) -> Option<Resolution> {
        match (self, handler) {
            (Self::Combinator { mode, children }, DependencyHandler::Child) => mode
                .evaluate(children, result, settled)
                .map(|result| Resolution { seq: owner, result }),
            (Self::Deadline { primary, .. }, DependencyHandler::DeadlineTimer) => {
                Some(Resolution {
                    seq: *primary,
                    result: EventualResult::failed(WorkflowError::timeout()),
                })
            }
            (Self::Deadline { .. }, DependencyHandler::DeadlinePrimary) => Some(Resolution {
                seq: owner,
                result: EventualResult::resolved(Value::Null),
            }),
            _ => None,
        }
    }

    /// Result known at declaration, before any history is consulted
    ///
    /// Eventuals with a known result never emit commands and are never
    /// registered as active.
    pub fn known_result(&self) -> Option<EventualResult> {
        match self {
            Self::Constant { result } => Some(result.clone()),
            Self::Combinator { mode, children } if children.is_empty() => mode.empty_result(),
            _ => None,
        }
    }

    /// Result available as soon as the command is emitted or matched
    pub fn result_on_schedule(&self) -> Option<EventualResult> {
        match self {
            Self::SendSignal { .. } => Some(EventualResult::resolved(Value::Null)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn task(name: &str) -> Eventual {
        Eventual::TaskCall {
            name: name.to_string(),
            input: json!({}),
            options: TaskOptions::default(),
        }
    }

    #[test]
    fn test_task_corresponds_by_seq_and_name() {
        let expected = ScheduledEvent::TaskScheduled {
            seq: 0,
            name: "charge".to_string(),
        };

        assert!(task("charge").is_corresponding(0, &expected));
        assert!(!task("refund").is_corresponding(0, &expected));
        assert!(!task("charge").is_corresponding(1, &expected));
    }

    #[test]
    fn test_kind_mismatch_does_not_correspond() {
        let timer = ScheduledEvent::TimerScheduled {
            seq: 0,
            schedule: TimerSchedule::Duration {
                duration: Duration::from_secs(1),
            },
        };

        assert!(!task("charge").is_corresponding(0, &timer));
    }

    #[test]
    fn test_task_results() {
        let call = task("charge");

        assert_eq!(
            call.apply_event(&ResultEvent::TaskSucceeded {
                seq: 0,
                result: json!(5)
            }),
            EventApplication::Settle(EventualResult::resolved(json!(5)))
        );

        let EventApplication::Settle(result) =
            call.apply_event(&ResultEvent::TaskHeartbeatTimedOut { seq: 0 })
        else {
            panic!("Expected Settle");
        };
        assert!(result.error().is_some_and(WorkflowError::is_heartbeat_timeout));

        assert_eq!(
            call.apply_event(&ResultEvent::TimerCompleted { seq: 0 }),
            EventApplication::Ignore
        );
    }

    #[test]
    fn test_signal_wait_and_handler() {
        let received = ResultEvent::SignalReceived {
            signal_id: "approve".to_string(),
            payload: json!({"by": "ops"}),
        };

        let wait = Eventual::SignalWait {
            signal_id: "approve".to_string(),
        };
        assert_eq!(
            wait.apply_event(&received),
            EventApplication::Settle(EventualResult::resolved(json!({"by": "ops"})))
        );
        assert_eq!(wait.signals(), vec!["approve"]);

        let handler = Eventual::SignalHandler {
            signal_id: "approve".to_string(),
        };
        assert!(matches!(
            handler.apply_event(&received),
            EventApplication::DeliverSignal { .. }
        ));
        assert_eq!(handler.command(0), None);
    }

    #[test]
    fn test_deadline_dependencies() {
        let deadline = Eventual::Deadline {
            primary: 0,
            timer: 1,
        };
        let settled = ResultTable::new();

        let deps = deadline.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].on, 1);

        let fired = deadline
            .on_dependency(
                2,
                DependencyHandler::DeadlineTimer,
                &EventualResult::resolved(Value::Null),
                &settled,
            )
            .expect("should resolve");
        assert_eq!(fired.seq, 0);
        assert!(fired.result.error().is_some_and(WorkflowError::is_timeout));

        let released = deadline
            .on_dependency(
                2,
                DependencyHandler::DeadlinePrimary,
                &EventualResult::resolved(json!("done")),
                &settled,
            )
            .expect("should resolve");
        assert_eq!(released.seq, 2);
    }

    #[test]
    fn test_known_results() {
        let constant = Eventual::Constant {
            result: EventualResult::resolved(json!(1)),
        };
        assert_eq!(
            constant.known_result(),
            Some(EventualResult::resolved(json!(1)))
        );

        let empty_all = Eventual::Combinator {
            mode: CombinatorMode::All,
            children: vec![],
        };
        assert!(empty_all.known_result().is_some());
        assert_eq!(task("x").known_result(), None);
    }

    #[test]
    fn test_send_signal_resolves_on_schedule() {
        let send = Eventual::SendSignal {
            target: SignalTarget::child(0),
            signal_id: "wake".to_string(),
            payload: json!(null),
        };

        assert!(send.command(3).is_some());
        assert_eq!(
            send.result_on_schedule(),
            Some(EventualResult::resolved(Value::Null))
        );
    }
}
