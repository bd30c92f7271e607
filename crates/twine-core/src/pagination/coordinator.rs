use std::fmt;

use tracing::{debug, info, warn};

use crate::models::{
    AccountId, Cursor, Direction, GapId, PaginationRequest, RequestTarget, TaskId,
};
use crate::pagination::fetch::{FetchCompletion, FetchError};
use crate::pagination::sink::PageSink;
use crate::store::{StoreError, TimelineStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchState {
    #[default]
    Idle,
    Fetching,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Issued(PaginationRequest),
    /// A request in this direction is still in flight
    Busy(TaskId),
    /// The last successful request already used these exact cursors
    Suppressed,
    /// No activated account to fetch for
    NoAccounts,
}

impl TriggerOutcome {
    pub fn request(&self) -> Option<&PaginationRequest> {
        match self {
            TriggerOutcome::Issued(request) => Some(request),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFailure {
    Fetch(FetchError),
    /// The page arrived but could not be merged
    Merge(String),
}

impl fmt::Display for AccountFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountFailure::Fetch(e) => write!(f, "fetch failed: {}", e),
            AccountFailure::Merge(e) => write!(f, "merge failed: {}", e),
        }
    }
}

/// What happened when a completion was handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub task_id: TaskId,
    pub direction: Direction,
    /// False when the completion was stale and ignored
    pub accepted: bool,
    pub new_count: usize,
    pub succeeded: Vec<AccountId>,
    pub failures: Vec<(AccountId, AccountFailure)>,
    pub state: FetchState,
}

impl CompletionReport {
    fn stale(task_id: TaskId, direction: Direction, state: FetchState) -> Self {
        Self {
            task_id,
            direction,
            accepted: false,
            new_count: 0,
            succeeded: Vec::new(),
            failures: Vec::new(),
            state,
        }
    }
}

#[derive(Debug, Default)]
struct Lane {
    state: FetchState,
    active: Option<PaginationRequest>,
    /// Cursors of the last page request in which every account succeeded
    last_success: Option<Vec<(AccountId, Cursor)>>,
}

/// Issues page requests for one timeline and keeps at most one in flight
/// per direction.
///
/// Task ids increase monotonically across both directions, so a completion
/// is current only when its id matches the lane's active request. Gap fills
/// travel in the `Older` lane.
#[derive(Debug)]
pub struct PaginationCoordinator {
    page_size: usize,
    last_task_id: u64,
    older: Lane,
    newer: Lane,
}

impl PaginationCoordinator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            last_task_id: 0,
            older: Lane::default(),
            newer: Lane::default(),
        }
    }

    fn lane(&self, direction: Direction) -> &Lane {
        match direction {
            Direction::Older => &self.older,
            Direction::Newer => &self.newer,
        }
    }

    fn lane_mut(&mut self, direction: Direction) -> &mut Lane {
        match direction {
            Direction::Older => &mut self.older,
            Direction::Newer => &mut self.newer,
        }
    }

    // ===== Getters =====

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn state(&self, direction: Direction) -> FetchState {
        self.lane(direction).state
    }

    pub fn active_request(&self, direction: Direction) -> Option<&PaginationRequest> {
        self.lane(direction).active.as_ref()
    }

    pub fn active_task(&self, direction: Direction) -> Option<TaskId> {
        self.active_request(direction).map(|r| r.task_id)
    }

    // ===== Triggers =====

    /// Requests the page below each account's oldest known status.
    pub fn trigger_backward(
        &mut self,
        accounts: &[AccountId],
        store: &TimelineStore,
    ) -> TriggerOutcome {
        let cursors = accounts
            .iter()
            .map(|id| (*id, Cursor::older_than(store.oldest_id(*id))))
            .collect();
        self.issue(Direction::Older, RequestTarget::Page, cursors)
    }

    /// Requests the page above each account's newest known status.
    pub fn trigger_forward(
        &mut self,
        accounts: &[AccountId],
        store: &TimelineStore,
    ) -> TriggerOutcome {
        let cursors = accounts
            .iter()
            .map(|id| (*id, Cursor::newer_than(store.newest_id(*id))))
            .collect();
        self.issue(Direction::Newer, RequestTarget::Page, cursors)
    }

    /// Requests the statuses missing from one gap, bounded by its markers.
    pub fn request_gap_fill(
        &mut self,
        gap_id: GapId,
        store: &TimelineStore,
    ) -> Result<TriggerOutcome, StoreError> {
        let gap = store.gap(gap_id).ok_or(StoreError::UnknownGap(gap_id))?;
        Ok(self.issue(
            Direction::Older,
            RequestTarget::Gap(gap_id),
            vec![(gap.account_id, gap.cursor())],
        ))
    }

    fn issue(
        &mut self,
        direction: Direction,
        target: RequestTarget,
        cursors: Vec<(AccountId, Cursor)>,
    ) -> TriggerOutcome {
        let lane = self.lane(direction);
        if let (FetchState::Fetching, Some(active)) = (lane.state, lane.active.as_ref()) {
            debug!(%direction, active = %active.task_id, "request rejected, already fetching");
            return TriggerOutcome::Busy(active.task_id);
        }
        if cursors.is_empty() {
            return TriggerOutcome::NoAccounts;
        }
        if target == RequestTarget::Page && lane.last_success.as_ref() == Some(&cursors) {
            debug!(%direction, "request suppressed, cursors unchanged");
            return TriggerOutcome::Suppressed;
        }

        self.last_task_id += 1;
        let request = PaginationRequest {
            task_id: TaskId(self.last_task_id),
            direction,
            target,
            page_size: self.page_size,
            cursors,
        };
        let lane = self.lane_mut(direction);
        lane.state = FetchState::Fetching;
        lane.active = Some(request.clone());
        info!(
            task = %request.task_id,
            %direction,
            accounts = request.cursors.len(),
            target = ?request.target,
            "pagination request issued"
        );
        TriggerOutcome::Issued(request)
    }

    /// Invalidates the in-flight request of `direction`. Its completion will
    /// be discarded when it arrives.
    pub fn cancel(&mut self, direction: Direction) -> Option<TaskId> {
        let lane = self.lane_mut(direction);
        let cancelled = lane.active.take().map(|r| r.task_id);
        if cancelled.is_some() {
            lane.state = FetchState::Idle;
            debug!(%direction, task = ?cancelled.map(|t| t.0), "pagination request cancelled");
        }
        cancelled
    }

    /// Forgets the cursors used by the last successful requests so the next
    /// trigger is never suppressed. Needed after the account set changes.
    pub fn forget_cursors(&mut self) {
        self.older.last_success = None;
        self.newer.last_success = None;
    }

    // ===== Completion =====

    /// Merges a completion into `sink` if it belongs to the active request.
    ///
    /// Every successful account is merged even when others failed. The lane
    /// goes back to `Idle` when at least one account made it, or to `Error`
    /// when all of them failed.
    pub fn on_complete(
        &mut self,
        sink: &mut dyn PageSink,
        completion: FetchCompletion,
    ) -> CompletionReport {
        let direction = completion.direction;
        let lane = self.lane_mut(direction);
        let is_current = lane
            .active
            .as_ref()
            .is_some_and(|r| r.task_id == completion.task_id);
        let active = if is_current { lane.active.take() } else { None };
        let Some(request) = active else {
            debug!(task = %completion.task_id, %direction, "stale completion discarded");
            return CompletionReport::stale(completion.task_id, direction, lane.state);
        };

        let mut report = CompletionReport {
            task_id: request.task_id,
            direction,
            accepted: true,
            new_count: 0,
            succeeded: Vec::new(),
            failures: Vec::new(),
            state: FetchState::Idle,
        };

        for (account_id, page) in completion.results {
            let Some(cursor) = request.cursor_for(account_id) else {
                warn!(task = %request.task_id, account = %account_id, "result for account not in request");
                continue;
            };
            let merged = match request.target {
                RequestTarget::Page => {
                    sink.apply_page(account_id, page.items, direction, &cursor, request.page_size)
                }
                RequestTarget::Gap(gap_id) => sink
                    .apply_gap_fill(gap_id, page.items, request.page_size)
                    .map(|resolution| resolution.new_count()),
            };
            match merged {
                Ok(new_count) => {
                    report.new_count += new_count;
                    report.succeeded.push(account_id);
                }
                Err(e) => {
                    warn!(task = %request.task_id, account = %account_id, error = %e, "merge failed");
                    report
                        .failures
                        .push((account_id, AccountFailure::Merge(e.to_string())));
                }
            }
        }
        for (account_id, error) in completion.errors {
            if request.cursor_for(account_id).is_none() {
                warn!(task = %request.task_id, account = %account_id, "error for account not in request");
                continue;
            }
            warn!(task = %request.task_id, account = %account_id, error = %error, "fetch failed");
            report.failures.push((account_id, AccountFailure::Fetch(error)));
        }

        let all_failed = report.succeeded.is_empty() && !report.failures.is_empty();
        report.state = if all_failed {
            FetchState::Error
        } else {
            FetchState::Idle
        };

        let lane = self.lane_mut(direction);
        lane.state = report.state;
        if request.target == RequestTarget::Page && report.failures.is_empty() {
            lane.last_success = Some(request.cursors);
        }

        info!(
            task = %report.task_id,
            %direction,
            new = report.new_count,
            failed = report.failures.len(),
            state = ?report.state,
            "pagination request completed"
        );
        report
    }
}
