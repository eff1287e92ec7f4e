//! Workflow executor with replay support
//!
//! The `WorkflowExecutor` is responsible for:
//! - Driving a workflow program step by step
//! - Checking every replayed call against recorded history
//! - Emitting commands for calls the history has not seen yet
//! - Committing result events, one at a time, to in-flight eventuals

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::Poll;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::eventual::{DependencyHandler, EventApplication, Eventual, Resolution};
use crate::workflow::{
    error_codes, Command, Directive, EventualRef, EventualResult, ExecutionContext, HistoryEvent,
    ResultEvent, ScheduledEvent, Seq, Step, Workflow, WorkflowContext, WorkflowError,
};

use super::hooks::{ExecutorHooks, NoopHooks};
use super::registry::{workflow_factory, AnyWorkflow, WorkflowFactory};
use super::state::RuntimeState;

/// Configuration for the workflow executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Whether more history may be supplied later through
    /// [`WorkflowExecutor::continue_with`]
    pub resumable: bool,

    /// Maximum history events per execution (for safety)
    pub max_history_events: usize,

    /// Yield to the async runtime between committed result events
    pub yield_between_events: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            resumable: false,
            max_history_events: 10000,
            yield_between_events: true,
        }
    }
}

impl ExecutorConfig {
    /// Allow `continue_with` after `start`
    pub fn resumable(mut self) -> Self {
        self.resumable = true;
        self
    }

    /// Set the history size limit
    pub fn with_max_history_events(mut self, max: usize) -> Self {
        self.max_history_events = max;
        self
    }

    /// Commit every available result event without yielding
    pub fn without_yielding(mut self) -> Self {
        self.yield_between_events = false;
        self
    }
}

/// Errors returned to the caller of `start` / `continue_with`
///
/// Failures of the workflow itself (including determinism failures) are
/// not errors here; they are reported as the terminal result.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// `start` was called a second time
    #[error("execution already started")]
    AlreadyStarted,

    /// `continue_with` was called before `start`
    #[error("execution has not been started")]
    NotStarted,

    /// `continue_with` was called on a non-resumable executor
    #[error("executor is not resumable")]
    NotResumable,

    /// A previous `start` / `continue_with` has not finished
    #[error("a previous start or continue call is still in flight")]
    InFlight,

    /// A previous `start` / `continue_with` future was dropped before it
    /// finished; the runtime state is partially applied and the executor
    /// must be rebuilt from history
    #[error("a previous start or continue call was dropped before finishing")]
    Abandoned,

    /// Too many events
    #[error("history has too many events ({0} > {1})")]
    TooManyEvents(usize, usize),
}

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    NotStarted,
    Running,
    /// Waiting for more history
    Suspended,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Result of one `start` / `continue_with` call
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// Commands emitted during this call, in seq order of declaration
    pub commands: Vec<Command>,

    /// Terminal result, once known
    pub result: Option<EventualResult>,

    /// Status after this call
    pub status: ExecutionStatus,
}

impl ProcessResult {
    /// Decode the terminal output, if the execution has finished
    pub fn output<T: DeserializeOwned>(&self) -> Option<Result<T, WorkflowError>> {
        self.result.as_ref().map(EventualResult::decode)
    }
}

/// Counters for result events that were committed without effect
///
/// Ignoring these events is the expected behaviour (an eventual may settle
/// through a dependency before its own result arrives); the counters exist
/// so duplicated or corrupted history can still be spotted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayDiagnostics {
    /// Results for eventuals that had already settled
    pub duplicate_results: usize,

    /// Results for seqs that were never declared or are no longer in flight
    /// without having settled
    pub orphaned_results: usize,

    /// Results of the wrong kind for the eventual they address
    pub mismatched_results: usize,

    /// Scheduled events repeated for seqs already replayed
    pub duplicate_scheduled: usize,
}

/// Work queued between program steps
#[derive(Debug)]
enum Job {
    /// An eventual settled: run its dependents, then resume the program
    Settled { seq: Seq, result: EventualResult },

    /// A dependency that had already settled when it was wired
    Dependency {
        owner: Seq,
        handler: DependencyHandler,
        on: Seq,
    },

    /// Run a signal handler
    Signal {
        handler: Seq,
        signal_id: String,
        payload: Value,
    },
}

/// Workflow executor
///
/// One executor drives one execution. It is constructed from the recorded
/// history, started once, and (in resumable mode) fed more history as it
/// arrives.
///
/// # Example
///
/// ```ignore
/// use durable_replay::prelude::*;
///
/// let mut executor = WorkflowExecutor::for_workflow::<OrderWorkflow>(
///     history,
///     ExecutorConfig::default(),
/// );
///
/// let outcome = executor
///     .start(json!({ "order_id": "123" }), ExecutionContext::new(OrderWorkflow::TYPE))
///     .await?;
///
/// for command in outcome.commands {
///     dispatcher.dispatch(command).await?;
/// }
/// ```
pub struct WorkflowExecutor {
    factory: WorkflowFactory,
    program: Option<Box<dyn AnyWorkflow>>,
    execution: Option<Arc<ExecutionContext>>,
    state: RuntimeState,
    config: ExecutorConfig,
    hooks: Arc<dyn ExecutorHooks>,
    status: ExecutionStatus,
    result: Option<EventualResult>,
    next_seq: Seq,
    commands: Vec<Command>,
    emitted: HashMap<Seq, ScheduledEvent>,
    /// Seqs declared without a command; history never schedules these
    commandless: BTreeSet<Seq>,
    jobs: VecDeque<Job>,
    halted: bool,
    diagnostics: ReplayDiagnostics,
}

impl WorkflowExecutor {
    /// Create an executor for the program built by `factory`
    pub fn new(factory: WorkflowFactory, history: Vec<HistoryEvent>, config: ExecutorConfig) -> Self {
        Self {
            factory,
            program: None,
            execution: None,
            state: RuntimeState::new(history),
            config,
            hooks: Arc::new(NoopHooks),
            status: ExecutionStatus::NotStarted,
            result: None,
            next_seq: 0,
            commands: Vec::new(),
            emitted: HashMap::new(),
            commandless: BTreeSet::new(),
            jobs: VecDeque::new(),
            halted: false,
            diagnostics: ReplayDiagnostics::default(),
        }
    }

    /// Create an executor for a workflow type
    pub fn for_workflow<W: Workflow>(history: Vec<HistoryEvent>, config: ExecutorConfig) -> Self {
        Self::new(workflow_factory::<W>(), history, config)
    }

    /// Install observation hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn ExecutorHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Terminal result, once known
    pub fn result(&self) -> Option<&EventualResult> {
        self.result.as_ref()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &ReplayDiagnostics {
        &self.diagnostics
    }

    /// Number of eventuals currently in flight
    pub fn in_flight(&self) -> usize {
        self.state.active_count()
    }

    /// Run the program from the beginning against the history supplied at
    /// construction
    ///
    /// May be called once per executor. Dropping the returned future before
    /// it completes leaves the executor unusable: later calls fail with
    /// [`ExecutorError::Abandoned`].
    #[instrument(
        skip(self, input, context),
        fields(execution_id = %context.execution_id, workflow_type = %context.workflow_type)
    )]
    pub async fn start(
        &mut self,
        input: Value,
        context: ExecutionContext,
    ) -> Result<ProcessResult, ExecutorError> {
        match self.status {
            ExecutionStatus::NotStarted => {}
            ExecutionStatus::Running => return Err(ExecutorError::Abandoned),
            _ => return Err(ExecutorError::AlreadyStarted),
        }
        self.check_history_limit(0)?;

        info!(history_len = self.state.history_len(), "starting workflow execution");

        self.status = ExecutionStatus::Running;
        self.execution = Some(Arc::new(context));

        match (self.factory)(input) {
            Ok(program) => {
                self.program = Some(program);
                self.step_program(|program, ctx| program.on_start(ctx));
                self.settle();
            }
            Err(e) => {
                warn!(error = %e, "workflow input rejected");
                self.force_complete(EventualResult::failed(e.into()));
            }
        }

        self.drain(true).await;

        if !self.config.resumable && self.result.is_none() && self.state.has_expected() {
            self.fail_determinism(format!(
                "Workflow did not return expected commands ({} scheduled events not replayed)",
                self.state.remaining_expected()
            ));
        }

        Ok(self.finish_turn())
    }

    /// Append history and resume the execution
    ///
    /// Only valid in resumable mode, after `start` has returned. Scheduled
    /// events acknowledging commands this executor already emitted are
    /// checked against those commands and then dropped.
    ///
    /// As with `start`, dropping the future before it completes makes later
    /// calls fail with [`ExecutorError::Abandoned`].
    #[instrument(skip(self, events), fields(new_events = events.len()))]
    pub async fn continue_with(
        &mut self,
        events: Vec<HistoryEvent>,
    ) -> Result<ProcessResult, ExecutorError> {
        if !self.config.resumable {
            return Err(ExecutorError::NotResumable);
        }
        match self.status {
            ExecutionStatus::NotStarted => return Err(ExecutorError::NotStarted),
            ExecutionStatus::Running => return Err(ExecutorError::Abandoned),
            _ => {}
        }
        self.check_history_limit(events.len())?;

        let was_completed = self.result.is_some();
        self.status = ExecutionStatus::Running;

        let accepted = self.acknowledge_history(events);
        self.state.extend_history(accepted);

        // A completed execution keeps applying events (late signal handlers
        // may still emit commands) but its result stays frozen.
        self.drain(!was_completed).await;

        Ok(self.finish_turn())
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn check_history_limit(&self, incoming: usize) -> Result<(), ExecutorError> {
        let total = self.state.history_len() + incoming;
        if total > self.config.max_history_events {
            return Err(ExecutorError::TooManyEvents(
                total,
                self.config.max_history_events,
            ));
        }
        Ok(())
    }

    /// Filter out scheduled events for seqs that were already declared
    fn acknowledge_history(&mut self, events: Vec<HistoryEvent>) -> Vec<HistoryEvent> {
        let mut accepted = Vec::with_capacity(events.len());
        for event in events {
            match event {
                HistoryEvent::Scheduled(scheduled) if scheduled.seq() < self.next_seq => {
                    let seq = scheduled.seq();
                    match self.emitted.remove(&seq) {
                        Some(emitted) if emitted == scheduled => {
                            trace!(seq, kind = scheduled.kind(), "command acknowledged by history");
                        }
                        Some(emitted) => {
                            self.fail_determinism(format!(
                                "history recorded {} for seq {}, but the workflow emitted {}",
                                scheduled.kind(),
                                seq,
                                emitted.kind()
                            ));
                        }
                        None if self.commandless.contains(&seq) => {
                            self.fail_determinism(format!(
                                "history recorded {} for seq {}, but the workflow declared no command for it",
                                scheduled.kind(),
                                seq
                            ));
                        }
                        None => {
                            self.diagnostics.duplicate_scheduled += 1;
                            warn!(seq, kind = scheduled.kind(), "scheduled event for an already replayed seq ignored");
                        }
                    }
                }
                other => accepted.push(other),
            }
        }
        accepted
    }

    /// Commit result events in log order until the cursor is exhausted
    async fn drain(&mut self, stop_on_result: bool) {
        loop {
            if self.halted || (stop_on_result && self.result.is_some()) {
                break;
            }
            let Some(event) = self.state.next_event() else {
                break;
            };

            let timed_out = self.commit_result_event(event);
            self.settle();
            if timed_out {
                break;
            }

            if self.config.yield_between_events && self.state.has_events() {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Apply one result event to its targets, then re-check conditions
    ///
    /// Returns `true` when the event timed out the whole execution.
    fn commit_result_event(&mut self, event: ResultEvent) -> bool {
        self.hooks.before_applying_result_event(&event);
        debug!(kind = event.kind(), seq = ?event.seq(), "committing result event");

        let targets = match &event {
            ResultEvent::WorkflowTimedOut => {
                self.force_complete(EventualResult::failed(
                    WorkflowError::new("workflow timed out").with_code(error_codes::TIMEOUT),
                ));
                let discarded = self.state.discard_events();
                if discarded > 0 {
                    debug!(discarded, "discarded result events queued after workflow timeout");
                }
                return true;
            }
            ResultEvent::WorkflowRunStarted { timestamp } => {
                trace!(%timestamp, "workflow run started");
                return false;
            }
            ResultEvent::SignalReceived { signal_id, .. } => {
                let targets = self.state.signal_targets(signal_id);
                if targets.is_empty() {
                    debug!(%signal_id, "signal received with no listeners");
                }
                targets
            }
            _ => match event.seq() {
                Some(seq) if self.state.is_active(seq) => vec![seq],
                Some(seq) => {
                    self.note_unaddressed(seq);
                    Vec::new()
                }
                None => Vec::new(),
            },
        };

        for seq in targets {
            let application = match self.state.active(seq) {
                Some(active) => active.eventual.apply_event(&event),
                None => continue,
            };
            match application {
                EventApplication::Settle(result) => self.try_resolve_eventual(seq, result),
                EventApplication::DeliverSignal { signal_id, payload } => {
                    self.jobs.push_back(Job::Signal {
                        handler: seq,
                        signal_id,
                        payload,
                    });
                }
                EventApplication::Ignore => {
                    self.diagnostics.mismatched_results += 1;
                    warn!(seq, kind = event.kind(), "result event does not apply to its eventual");
                }
            }
        }

        self.sweep_awaiting_any();
        false
    }

    fn note_unaddressed(&mut self, seq: Seq) {
        if self.state.settled().contains(seq) {
            self.diagnostics.duplicate_results += 1;
            debug!(seq, "result for an already settled eventual ignored");
        } else {
            self.diagnostics.orphaned_results += 1;
            warn!(seq, next_seq = self.next_seq, "result for an eventual that is not in flight ignored");
        }
    }

    /// Settle an active eventual; no-op when it is no longer active
    fn try_resolve_eventual(&mut self, seq: Seq, result: EventualResult) {
        if self.state.deactivate(seq).is_none() {
            return;
        }
        trace!(seq, resolved = result.is_resolved(), "eventual settled");
        self.state.record(seq, result.clone());
        self.jobs.push_back(Job::Settled { seq, result });
    }

    /// Settle an eventual that was never activated
    fn settle_immediately(&mut self, seq: Seq, result: EventualResult) {
        self.state.record(seq, result.clone());
        self.jobs.push_back(Job::Settled { seq, result });
    }

    /// Run queued jobs and condition sweeps until nothing changes
    fn settle(&mut self) {
        loop {
            while let Some(job) = self.jobs.pop_front() {
                if self.halted {
                    self.jobs.clear();
                    return;
                }
                self.run_job(job);
            }
            if self.halted || !self.sweep_awaiting_any() {
                break;
            }
        }
    }

    fn run_job(&mut self, job: Job) {
        match job {
            Job::Settled { seq, result } => {
                for (owner, handler) in self.state.take_dependents(seq) {
                    self.run_dependency(owner, handler, &result);
                }
                self.step_program(|program, ctx| {
                    program.on_resolved(ctx, EventualRef::new(seq), &result)
                });
            }
            Job::Dependency { owner, handler, on } => {
                if let Some(result) = self.state.settled().get(on).cloned() {
                    self.run_dependency(owner, handler, &result);
                }
            }
            Job::Signal {
                handler,
                signal_id,
                payload,
            } => {
                if self.state.is_active(handler) {
                    self.step_program(|program, ctx| {
                        program.on_signal(ctx, EventualRef::new(handler), &signal_id, &payload)
                    });
                }
            }
        }
    }

    fn run_dependency(&mut self, owner: Seq, handler: DependencyHandler, result: &EventualResult) {
        let resolution = match self.state.active(owner) {
            Some(active) => {
                active
                    .eventual
                    .on_dependency(owner, handler, result, self.state.settled())
            }
            None => return,
        };
        if let Some(Resolution { seq, result }) = resolution {
            self.try_resolve_eventual(seq, result);
        }
    }

    /// Resolve every waiting condition whose predicate now holds
    fn sweep_awaiting_any(&mut self) -> bool {
        let mut resolved_any = false;
        for seq in self.state.awaiting_any() {
            let Some(name) = self
                .state
                .active(seq)
                .and_then(|active| active.eventual.after_every_event())
                .map(str::to_owned)
            else {
                continue;
            };
            if self.evaluate_condition(&name) {
                self.try_resolve_eventual(seq, EventualResult::resolved(Value::Bool(true)));
                resolved_any = true;
            }
        }
        resolved_any
    }

    fn evaluate_condition(&mut self, name: &str) -> bool {
        let Some(program) = self.program.as_ref() else {
            return false;
        };
        match guarded(|| program.condition(name)) {
            Ok(satisfied) => satisfied,
            Err(error) => {
                self.program_panicked(error);
                false
            }
        }
    }

    /// Run one program step and take the eventuals it declared
    fn step_program<F>(&mut self, step: F)
    where
        F: FnOnce(&mut dyn AnyWorkflow, &mut WorkflowContext) -> Step<Value>,
    {
        if self.halted {
            return;
        }
        let (Some(program), Some(execution)) = (self.program.as_mut(), self.execution.as_ref())
        else {
            return;
        };

        let mut ctx = WorkflowContext::new(Arc::clone(execution), self.next_seq);
        let outcome = guarded(|| step(&mut **program, &mut ctx));
        let (next_seq, directives) = ctx.into_parts();
        self.next_seq = next_seq;

        for directive in directives {
            self.apply_directive(directive);
            if self.halted {
                return;
            }
        }

        match outcome {
            Ok(Poll::Pending) => {}
            Ok(Poll::Ready(Ok(value))) => self.force_complete(EventualResult::resolved(value)),
            Ok(Poll::Ready(Err(error))) => self.force_complete(EventualResult::failed(error)),
            Err(error) => self.program_panicked(error),
        }
    }

    fn program_panicked(&mut self, error: WorkflowError) {
        error!(error = %error.message, "workflow program panicked");
        self.program = None;
        self.force_complete(EventualResult::failed(error));
    }

    fn apply_directive(&mut self, directive: Directive) {
        match directive {
            Directive::Declare { seq, eventual } => self.register_eventual(seq, eventual),
            Directive::DisposeSignalHandler { seq } => {
                let is_handler = matches!(
                    self.state.active(seq).map(|active| &active.eventual),
                    Some(Eventual::SignalHandler { .. })
                );
                if is_handler {
                    self.state.deactivate(seq);
                    debug!(seq, "signal handler disposed");
                }
            }
        }
    }

    /// Check a declared eventual against history, emit its command if new,
    /// and make it active unless it already has a result
    fn register_eventual(&mut self, seq: Seq, eventual: Eventual) {
        let known = match &eventual {
            Eventual::Condition { name } => self
                .evaluate_condition(name)
                .then(|| EventualResult::resolved(Value::Bool(true))),
            _ => eventual.known_result(),
        };
        if let Some(result) = known {
            trace!(seq, kind = eventual.kind(), "eventual resolved at declaration");
            self.commandless.insert(seq);
            self.settle_immediately(seq, result);
            return;
        }

        match eventual.command(seq) {
            Some(command) => match self.state.next_expected() {
                Some(expected) => {
                    if !eventual.is_corresponding(seq, &expected) {
                        self.fail_determinism(format!(
                            "history recorded {} for seq {}, but the workflow declared {} for seq {}",
                            expected.kind(),
                            expected.seq(),
                            eventual.kind(),
                            seq
                        ));
                        return;
                    }
                    self.hooks.historical_event_matched(&expected, &command);
                    trace!(seq, kind = expected.kind(), "replayed call matched history");
                }
                None => {
                    debug!(seq, kind = eventual.kind(), "emitting command");
                    self.emitted.insert(seq, ScheduledEvent::from(&command));
                    self.commands.push(command);
                }
            },
            None => {
                self.commandless.insert(seq);
            }
        }

        if let Some(result) = eventual.result_on_schedule() {
            self.settle_immediately(seq, result);
            return;
        }

        let dependencies = eventual.dependencies();
        self.state.activate(seq, eventual);
        for dependency in dependencies {
            if self.state.settled().contains(dependency.on) {
                self.jobs.push_back(Job::Dependency {
                    owner: seq,
                    handler: dependency.handler,
                    on: dependency.on,
                });
            } else {
                self.state
                    .add_dependent(dependency.on, seq, dependency.handler);
            }
        }
    }

    /// Set the terminal result unless one is already set
    fn force_complete(&mut self, result: EventualResult) {
        if self.result.is_some() {
            debug!("terminal result already set; later result ignored");
            return;
        }
        match &result {
            EventualResult::Resolved { .. } => info!("workflow completed"),
            EventualResult::Failed { error } => warn!(error = %error, "workflow failed"),
        }
        self.result = Some(result);
    }

    fn fail_determinism(&mut self, message: String) {
        error!(%message, "determinism check failed");
        self.force_complete(EventualResult::failed(WorkflowError::determinism(message)));
        self.halted = true;
        self.commands.clear();
        self.jobs.clear();
    }

    fn finish_turn(&mut self) -> ProcessResult {
        self.status = match &self.result {
            Some(EventualResult::Resolved { .. }) => ExecutionStatus::Completed,
            Some(EventualResult::Failed { .. }) => ExecutionStatus::Failed,
            None => ExecutionStatus::Suspended,
        };
        ProcessResult {
            commands: std::mem::take(&mut self.commands),
            result: self.result.clone(),
            status: self.status,
        }
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("status", &self.status)
            .field("next_seq", &self.next_seq)
            .field("in_flight", &self.state.active_count())
            .field("result", &self.result)
            .finish()
    }
}

/// Run program code, turning a panic into a workflow error
fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, WorkflowError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "workflow program panicked".to_string());
        WorkflowError::panic(message)
    })
}
