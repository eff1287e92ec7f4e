//! Workflows and history helpers shared by the integration tests

#![allow(dead_code)]

use std::time::Duration;

use durable_replay::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================
// History helpers
// ============================================

pub fn task_scheduled(seq: u32, name: &str) -> HistoryEvent {
    ScheduledEvent::TaskScheduled {
        seq,
        name: name.to_string(),
    }
    .into()
}

pub fn task_succeeded(seq: u32, result: Value) -> HistoryEvent {
    ResultEvent::TaskSucceeded { seq, result }.into()
}

pub fn task_failed(seq: u32, message: &str) -> HistoryEvent {
    ResultEvent::TaskFailed {
        seq,
        error: WorkflowError::new(message),
    }
    .into()
}

pub fn timer_scheduled(seq: u32, duration: Duration) -> HistoryEvent {
    ScheduledEvent::TimerScheduled {
        seq,
        schedule: TimerSchedule::Duration { duration },
    }
    .into()
}

pub fn timer_completed(seq: u32) -> HistoryEvent {
    ResultEvent::TimerCompleted { seq }.into()
}

pub fn signal_expected(seq: u32, signal_id: &str) -> HistoryEvent {
    ScheduledEvent::ExpectSignalStarted {
        seq,
        signal_id: signal_id.to_string(),
    }
    .into()
}

pub fn signal_received(signal_id: &str, payload: Value) -> HistoryEvent {
    ResultEvent::SignalReceived {
        signal_id: signal_id.to_string(),
        payload,
    }
    .into()
}

pub fn condition_started(seq: u32) -> HistoryEvent {
    ScheduledEvent::ConditionStarted { seq }.into()
}

/// Config for executors that are fed history in several calls
pub fn resumable() -> ExecutorConfig {
    ExecutorConfig::default().resumable()
}

pub fn context_for<W: Workflow>() -> ExecutionContext {
    ExecutionContext::new(W::TYPE)
}

// ============================================
// Sequential tasks
// ============================================

/// Calls each named task in turn and returns their results
pub struct SequentialWorkflow {
    tasks: Vec<String>,
    results: Vec<Value>,
    current: Option<EventualRef>,
}

impl SequentialWorkflow {
    fn next(&mut self, ctx: &mut WorkflowContext) -> Step<Vec<Value>> {
        match self.tasks.get(self.results.len()) {
            Some(name) => {
                let index = self.results.len();
                self.current = Some(ctx.call_task(name.clone(), json!({ "index": index })));
                Poll::Pending
            }
            None => Poll::Ready(Ok(self.results.clone())),
        }
    }
}

impl Workflow for SequentialWorkflow {
    const TYPE: &'static str = "sequential";
    type Input = Vec<String>;
    type Output = Vec<Value>;

    fn new(tasks: Vec<String>) -> Self {
        Self {
            tasks,
            results: Vec::new(),
            current: None,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Vec<Value>> {
        self.next(ctx)
    }

    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Vec<Value>> {
        if Some(eventual) != self.current {
            return Poll::Pending;
        }
        match result.clone().into_result() {
            Ok(value) => {
                self.results.push(value);
                self.next(ctx)
            }
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

// ============================================
// Timer, then two concurrent tasks
// ============================================

/// Sleeps, then starts `first` and `second` together and returns the
/// result of `second`
pub struct TimerThenPairWorkflow {
    timer: Option<EventualRef>,
    second: Option<EventualRef>,
}

impl Workflow for TimerThenPairWorkflow {
    const TYPE: &'static str = "timer_then_pair";
    type Input = ();
    type Output = Value;

    fn new(_input: ()) -> Self {
        Self {
            timer: None,
            second: None,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        self.timer = Some(ctx.sleep(Duration::from_secs(1)));
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        if Some(eventual) == self.timer {
            ctx.call_task("first", json!(null));
            self.second = Some(ctx.call_task("second", json!(null)));
        } else if Some(eventual) == self.second {
            return Poll::Ready(result.clone().into_result());
        }
        Poll::Pending
    }
}

// ============================================
// Signal fan-out
// ============================================

/// Waits for two deliveries of `X` through separate waits; tracks `Y`
pub struct SignalFanOutWorkflow {
    both: Option<EventualRef>,
    y: Option<EventualRef>,
    y_received: bool,
}

impl Workflow for SignalFanOutWorkflow {
    const TYPE: &'static str = "signal_fan_out";
    type Input = ();
    type Output = Value;

    fn new(_input: ()) -> Self {
        Self {
            both: None,
            y: None,
            y_received: false,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        let first = ctx.expect_signal("X");
        let second = ctx.expect_signal("X");
        self.y = Some(ctx.expect_signal("Y"));
        self.both = Some(ctx.all(&[first, second]));
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        _ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        if Some(eventual) == self.y {
            self.y_received = true;
        }
        if Some(eventual) == self.both {
            let x = result.value().cloned().unwrap_or_default();
            return Poll::Ready(Ok(json!({ "x": x, "y_received": self.y_received })));
        }
        Poll::Pending
    }
}

// ============================================
// Deadline
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineInput {
    pub timeout_secs: u64,
}

/// Runs `slow` under a deadline and returns its result
pub struct DeadlineWorkflow {
    timeout: Duration,
    task: Option<EventualRef>,
}

impl Workflow for DeadlineWorkflow {
    const TYPE: &'static str = "deadline";
    type Input = DeadlineInput;
    type Output = Value;

    fn new(input: DeadlineInput) -> Self {
        Self {
            timeout: Duration::from_secs(input.timeout_secs),
            task: None,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        let task = ctx.call_task("slow", json!(null));
        let timer = ctx.sleep(self.timeout);
        ctx.deadline(task, timer);
        self.task = Some(task);
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        _ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        if Some(eventual) == self.task {
            return Poll::Ready(result.clone().into_result());
        }
        Poll::Pending
    }
}

// ============================================
// Approval race
// ============================================

/// Races an `approve` signal against an expiry timer
pub struct ApprovalWorkflow {
    approval: Option<EventualRef>,
    race: Option<EventualRef>,
}

impl Workflow for ApprovalWorkflow {
    const TYPE: &'static str = "approval";
    type Input = ();
    type Output = String;

    fn new(_input: ()) -> Self {
        Self {
            approval: None,
            race: None,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<String> {
        let approval = ctx.expect_signal("approve");
        let expiry = ctx.sleep(Duration::from_secs(3600));
        self.approval = Some(approval);
        self.race = Some(ctx.race(&[approval, expiry]));
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        _ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<String> {
        if Some(eventual) != self.race {
            return Poll::Pending;
        }
        match result.value() {
            Some(Value::Null) | None => Poll::Ready(Ok("expired".to_string())),
            Some(by) => Poll::Ready(Ok(format!("approved by {}", by.as_str().unwrap_or("?")))),
        }
    }
}

// ============================================
// Signal handler with a condition
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterInput {
    pub target: i64,
}

/// Sums `increment` payloads until the `reached` condition holds
pub struct SignalCounterWorkflow {
    target: i64,
    count: i64,
    handler: Option<EventualRef>,
    reached: Option<EventualRef>,
}

impl Workflow for SignalCounterWorkflow {
    const TYPE: &'static str = "signal_counter";
    type Input = CounterInput;
    type Output = i64;

    fn new(input: CounterInput) -> Self {
        Self {
            target: input.target,
            count: 0,
            handler: None,
            reached: None,
        }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<i64> {
        self.handler = Some(ctx.on_signal("increment"));
        self.reached = Some(ctx.condition("reached"));
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        ctx: &mut WorkflowContext,
        eventual: EventualRef,
        _result: &EventualResult,
    ) -> Step<i64> {
        if Some(eventual) != self.reached {
            return Poll::Pending;
        }
        if let Some(handler) = self.handler.take() {
            ctx.dispose_signal_handler(handler);
        }
        Poll::Ready(Ok(self.count))
    }

    fn on_signal(
        &mut self,
        _ctx: &mut WorkflowContext,
        _handler: EventualRef,
        _signal_id: &str,
        payload: &Value,
    ) -> Step<i64> {
        self.count += payload.as_i64().unwrap_or(0);
        Poll::Pending
    }

    fn condition(&self, name: &str) -> bool {
        name == "reached" && self.count >= self.target
    }
}

// ============================================
// Late signals after completion
// ============================================

/// Completes with the result of `work`; every `audit` signal, even after
/// completion, schedules a `record_audit` task
pub struct AuditedWorkflow {
    work: Option<EventualRef>,
}

impl Workflow for AuditedWorkflow {
    const TYPE: &'static str = "audited";
    type Input = ();
    type Output = Value;

    fn new(_input: ()) -> Self {
        Self { work: None }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        ctx.on_signal("audit");
        self.work = Some(ctx.call_task("work", json!(null)));
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        _ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        if Some(eventual) == self.work {
            return Poll::Ready(result.clone().into_result());
        }
        Poll::Pending
    }

    fn on_signal(
        &mut self,
        ctx: &mut WorkflowContext,
        _handler: EventualRef,
        _signal_id: &str,
        payload: &Value,
    ) -> Step<Value> {
        ctx.call_task("record_audit", payload.clone());
        Poll::Pending
    }
}

// ============================================
// Child workflow and outbound signal
// ============================================

/// Starts a child workflow, signals it, and returns the child's result
pub struct ParentWorkflow {
    child: Option<EventualRef>,
}

impl Workflow for ParentWorkflow {
    const TYPE: &'static str = "parent";
    type Input = ();
    type Output = Value;

    fn new(_input: ()) -> Self {
        Self { child: None }
    }

    fn on_start(&mut self, ctx: &mut WorkflowContext) -> Step<Value> {
        let child = ctx.call_child_workflow("child", json!({ "depth": 1 }));
        ctx.send_signal(SignalTarget::child(child.seq()), "wake", json!(null));
        self.child = Some(child);
        Poll::Pending
    }

    fn on_resolved(
        &mut self,
        _ctx: &mut WorkflowContext,
        eventual: EventualRef,
        result: &EventualResult,
    ) -> Step<Value> {
        if Some(eventual) == self.child {
            return Poll::Ready(result.clone().into_result());
        }
        Poll::Pending
    }
}
