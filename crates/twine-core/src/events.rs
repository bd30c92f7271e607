use crate::models::{AccountId, GapId, StatusKey, TimelineId};
use crate::pagination::CompletionReport;
use crate::store::TruncateReport;

/// Input from a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEvent {
    PullToRefresh,
    /// Explicit "load more" at the end of the list
    LoadMoreTapped,
    Scrolled {
        at_bottom: bool,
        visible_count: usize,
    },
    GapTapped(GapId),
}

/// Change notification pushed to every subscribed consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineUpdate {
    Restored { statuses: usize, gaps: usize },
    PageMerged(CompletionReport),
    Truncated(TruncateReport),
    StatusDeleted(StatusKey),
    AccountCleared { account_id: AccountId, removed: usize },
    AccountsChanged,
    FiltersChanged { version: u64 },
}

/// A presentation surface showing a timeline. It re-reads `Timeline::query`
/// when told something changed; it never touches the store directly.
pub trait TimelineConsumer {
    fn on_update(&mut self, timeline: &TimelineId, update: &TimelineUpdate);
}
