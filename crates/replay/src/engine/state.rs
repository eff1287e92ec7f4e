//! Runtime state of one execution
//!
//! Tracks in-flight eventuals and the two history cursors. Ordered
//! collections are used throughout so iteration order is a function of
//! seq order, never of hashing.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::eventual::{DependencyHandler, Eventual};
use crate::workflow::{EventualResult, HistoryEvent, ResultEvent, ResultTable, ScheduledEvent, Seq};

/// Live counterpart of an unresolved eventual
#[derive(Debug, Clone)]
pub struct ActiveEventual {
    pub eventual: Eventual,
}

/// In-flight eventuals, their indices and the history cursors
#[derive(Debug, Default)]
pub struct RuntimeState {
    active: BTreeMap<Seq, ActiveEventual>,
    awaiting_signals: HashMap<String, BTreeSet<Seq>>,
    awaiting_any: BTreeSet<Seq>,
    dependents: BTreeMap<Seq, Vec<(Seq, DependencyHandler)>>,
    settled: ResultTable,
    expected: VecDeque<ScheduledEvent>,
    events: VecDeque<ResultEvent>,
    history_len: usize,
}

impl RuntimeState {
    pub fn new(history: Vec<HistoryEvent>) -> Self {
        let mut state = Self::default();
        state.extend_history(history);
        state
    }

    /// Append events to the tail of history
    ///
    /// Scheduled events feed the expected cursor, kept in seq order;
    /// result events feed the event cursor in log order.
    pub fn extend_history(&mut self, history: Vec<HistoryEvent>) {
        self.history_len += history.len();
        for event in history {
            match event {
                HistoryEvent::Scheduled(scheduled) => self.expected.push_back(scheduled),
                HistoryEvent::Result(result) => self.events.push_back(result),
            }
        }
        self.expected
            .make_contiguous()
            .sort_by_key(ScheduledEvent::seq);
    }

    /// Total number of history events received so far
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn next_expected(&mut self) -> Option<ScheduledEvent> {
        self.expected.pop_front()
    }

    pub fn has_expected(&self) -> bool {
        !self.expected.is_empty()
    }

    pub fn remaining_expected(&self) -> usize {
        self.expected.len()
    }

    pub fn next_event(&mut self) -> Option<ResultEvent> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Drop every queued result event, returning how many were dropped
    pub fn discard_events(&mut self) -> usize {
        let discarded = self.events.len();
        self.events.clear();
        discarded
    }

    /// Register an eventual as in flight and index its subscriptions
    pub fn activate(&mut self, seq: Seq, eventual: Eventual) {
        for signal in eventual.signals() {
            self.awaiting_signals
                .entry(signal.to_string())
                .or_default()
                .insert(seq);
        }
        if eventual.after_every_event().is_some() {
            self.awaiting_any.insert(seq);
        }
        self.active.insert(seq, ActiveEventual { eventual });
    }

    /// Remove an eventual and every index entry pointing at it
    ///
    /// Returns `None` when it was not active; calling this twice is safe.
    pub fn deactivate(&mut self, seq: Seq) -> Option<ActiveEventual> {
        let active = self.active.remove(&seq)?;
        self.awaiting_any.remove(&seq);
        for signal in active.eventual.signals() {
            if let Some(listeners) = self.awaiting_signals.get_mut(signal) {
                listeners.remove(&seq);
                if listeners.is_empty() {
                    self.awaiting_signals.remove(signal);
                }
            }
        }
        Some(active)
    }

    pub fn is_active(&self, seq: Seq) -> bool {
        self.active.contains_key(&seq)
    }

    pub fn active(&self, seq: Seq) -> Option<&ActiveEventual> {
        self.active.get(&seq)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Eventuals listening to a signal, in seq order
    pub fn signal_targets(&self, signal_id: &str) -> Vec<Seq> {
        self.awaiting_signals
            .get(signal_id)
            .map(|listeners| listeners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Eventuals re-checked after every event, in seq order
    pub fn awaiting_any(&self) -> Vec<Seq> {
        self.awaiting_any.iter().copied().collect()
    }

    /// Wire `owner` to react when `on` settles
    pub fn add_dependent(&mut self, on: Seq, owner: Seq, handler: DependencyHandler) {
        self.dependents.entry(on).or_default().push((owner, handler));
    }

    /// Take the handlers waiting on `seq`, in wiring order
    pub fn take_dependents(&mut self, seq: Seq) -> Vec<(Seq, DependencyHandler)> {
        self.dependents.remove(&seq).unwrap_or_default()
    }

    /// Record a settled result; the first result for a seq wins
    pub fn record(&mut self, seq: Seq, result: EventualResult) -> bool {
        self.settled.insert(seq, result)
    }

    pub fn settled(&self) -> &ResultTable {
        &self.settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal_wait(name: &str) -> Eventual {
        Eventual::SignalWait {
            signal_id: name.to_string(),
        }
    }

    #[test]
    fn test_history_is_partitioned() {
        let state = RuntimeState::new(vec![
            ResultEvent::TimerCompleted { seq: 0 }.into(),
            ScheduledEvent::ConditionStarted { seq: 1 }.into(),
            ScheduledEvent::ConditionStarted { seq: 0 }.into(),
        ]);

        assert_eq!(state.remaining_expected(), 2);
        assert!(state.has_events());
        assert_eq!(state.history_len(), 3);
    }

    #[test]
    fn test_expected_is_sorted_by_seq() {
        let mut state = RuntimeState::new(vec![
            ScheduledEvent::ConditionStarted { seq: 2 }.into(),
            ScheduledEvent::ConditionStarted { seq: 0 }.into(),
        ]);
        state.extend_history(vec![ScheduledEvent::ConditionStarted { seq: 1 }.into()]);

        let order: Vec<Seq> = std::iter::from_fn(|| state.next_expected())
            .map(|e| e.seq())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_activate_indexes_signals() {
        let mut state = RuntimeState::default();
        state.activate(3, signal_wait("go"));
        state.activate(1, signal_wait("go"));
        state.activate(2, signal_wait("stop"));

        assert_eq!(state.signal_targets("go"), vec![1, 3]);
        assert_eq!(state.signal_targets("missing"), Vec::<Seq>::new());
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut state = RuntimeState::default();
        state.activate(
            0,
            Eventual::Condition {
                name: "ready".to_string(),
            },
        );
        state.activate(1, signal_wait("go"));

        assert_eq!(state.awaiting_any(), vec![0]);
        assert!(state.deactivate(0).is_some());
        assert!(state.deactivate(0).is_none());
        assert!(state.awaiting_any().is_empty());

        assert!(state.deactivate(1).is_some());
        assert!(state.signal_targets("go").is_empty());
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn test_record_is_write_once() {
        let mut state = RuntimeState::default();
        assert!(state.record(0, EventualResult::resolved(json!(1))));
        assert!(!state.record(0, EventualResult::resolved(json!(2))));
        assert_eq!(
            state.settled().get(0),
            Some(&EventualResult::resolved(json!(1)))
        );
    }

    #[test]
    fn test_dependents_are_taken_once() {
        let mut state = RuntimeState::default();
        state.add_dependent(0, 2, DependencyHandler::Child);
        state.add_dependent(0, 3, DependencyHandler::DeadlinePrimary);

        assert_eq!(
            state.take_dependents(0),
            vec![
                (2, DependencyHandler::Child),
                (3, DependencyHandler::DeadlinePrimary)
            ]
        );
        assert!(state.take_dependents(0).is_empty());
    }
}
