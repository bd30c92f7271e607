use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::TimelineEvent;
use crate::models::{Direction, GapId, PaginationRequest, TaskId};
use crate::pagination::{fetch_all, CompletionReport, FetchCompletion, StatusFetcher, TriggerOutcome};
use crate::store::StoreError;
use crate::timeline::Timeline;

/// Drives a `Timeline` against a fetcher.
///
/// Fetches run as tokio tasks; their completions come back over a channel
/// and are applied by whoever owns the runtime, one at a time. Nothing but
/// the fetch itself runs off that sequence.
pub struct TimelineRuntime<F: StatusFetcher + 'static> {
    timeline: Timeline,
    fetcher: Arc<F>,
    completion_tx: mpsc::UnboundedSender<FetchCompletion>,
    completion_rx: mpsc::UnboundedReceiver<FetchCompletion>,
    in_flight: HashMap<Direction, (TaskId, JoinHandle<()>)>,
}

impl<F: StatusFetcher + 'static> TimelineRuntime<F> {
    pub fn new(timeline: Timeline, fetcher: Arc<F>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            timeline,
            fetcher,
            completion_tx,
            completion_rx,
            in_flight: HashMap::new(),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    pub fn into_timeline(self) -> Timeline {
        for (_, (_, handle)) in self.in_flight {
            handle.abort();
        }
        self.timeline
    }

    /// Number of spawned fetches whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // ===== Triggers =====

    pub fn refresh(&mut self) -> TriggerOutcome {
        let outcome = self.timeline.trigger_forward();
        self.dispatch(&outcome);
        outcome
    }

    pub fn load_more(&mut self) -> TriggerOutcome {
        let outcome = self.timeline.trigger_backward();
        self.dispatch(&outcome);
        outcome
    }

    pub fn fill_gap(&mut self, gap_id: GapId) -> Result<TriggerOutcome, StoreError> {
        let outcome = self.timeline.request_gap_fill(gap_id)?;
        self.dispatch(&outcome);
        Ok(outcome)
    }

    pub fn handle_event(
        &mut self,
        event: TimelineEvent,
    ) -> Result<Option<TriggerOutcome>, StoreError> {
        let outcome = self.timeline.handle_event(event)?;
        if let Some(outcome) = &outcome {
            self.dispatch(outcome);
        }
        Ok(outcome)
    }

    /// Invalidates and aborts the fetch running in `direction`.
    pub fn cancel(&mut self, direction: Direction) -> Option<TaskId> {
        let cancelled = self.timeline.cancel(direction);
        if let Some((task_id, handle)) = self.in_flight.remove(&direction) {
            handle.abort();
            debug!(task = %task_id, %direction, "fetch task aborted");
        }
        cancelled
    }

    fn dispatch(&mut self, outcome: &TriggerOutcome) {
        if let TriggerOutcome::Issued(request) = outcome {
            self.spawn(request.clone());
        }
    }

    fn spawn(&mut self, request: PaginationRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let completion_tx = self.completion_tx.clone();
        let task_id = request.task_id;
        let direction = request.direction;

        let handle = tokio::spawn(async move {
            let completion = fetch_all(fetcher.as_ref(), &request).await;
            if completion_tx.send(completion).is_err() {
                debug!(task = %task_id, "runtime gone before fetch completed");
            }
        });

        if let Some((previous, handle)) = self.in_flight.insert(direction, (task_id, handle)) {
            debug!(task = %previous, "replacing finished fetch handle");
            handle.abort();
        }
    }

    // ===== Completions =====

    fn apply(&mut self, completion: FetchCompletion) -> CompletionReport {
        let direction = completion.direction;
        if self
            .in_flight
            .get(&direction)
            .is_some_and(|(task_id, _)| *task_id == completion.task_id)
        {
            self.in_flight.remove(&direction);
        }
        self.timeline.on_complete(completion)
    }

    /// Waits for the next completion and applies it. Returns `None` right
    /// away when nothing is in flight or queued.
    pub async fn next_completion(&mut self) -> Option<CompletionReport> {
        let completion = if self.in_flight.is_empty() {
            self.completion_rx.try_recv().ok()?
        } else {
            self.completion_rx.recv().await?
        };
        Some(self.apply(completion))
    }

    /// Applies every completion until no fetch is left running.
    pub async fn run_until_idle(&mut self) -> Vec<CompletionReport> {
        let mut reports = Vec::new();
        while let Some(report) = self.next_completion().await {
            reports.push(report);
        }
        reports
    }
}
