use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::gap::GapId;
use super::status::{StatusId, StatusItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward older statuses (load more, gap fill)
    Older,
    /// Toward newer statuses (refresh)
    Newer,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Older => write!(f, "older"),
            Direction::Newer => write!(f, "newer"),
        }
    }
}

/// Exclusive id window for a fetch. `None` leaves that side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub max_id: Option<StatusId>,
    pub since_id: Option<StatusId>,
}

impl Cursor {
    pub fn older_than(max_id: Option<StatusId>) -> Self {
        Self {
            max_id,
            since_id: None,
        }
    }

    pub fn newer_than(since_id: Option<StatusId>) -> Self {
        Self {
            max_id: None,
            since_id,
        }
    }

    pub fn admits(&self, status_id: StatusId) -> bool {
        self.max_id.map_or(true, |max| status_id < max)
            && self.since_id.map_or(true, |since| status_id > since)
    }

    /// True when at least one item sits at or below `since_id`, meaning the
    /// page reached back into already-known territory.
    pub fn reached_since(&self, items: &[StatusItem]) -> bool {
        self.since_id
            .is_some_and(|since| items.iter().any(|item| item.status_id <= since))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a completed fetch should be merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTarget {
    /// A regular page at the top or bottom of the timeline
    Page,
    /// The contents of one gap marker
    Gap(GapId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationRequest {
    pub task_id: TaskId,
    pub direction: Direction,
    pub target: RequestTarget,
    pub page_size: usize,
    pub cursors: Vec<(AccountId, Cursor)>,
}

impl PaginationRequest {
    pub fn cursor_for(&self, account_id: AccountId) -> Option<Cursor> {
        self.cursors
            .iter()
            .find(|(id, _)| *id == account_id)
            .map(|(_, cursor)| *cursor)
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.cursors.iter().map(|(id, _)| *id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_bounds_are_exclusive() {
        let cursor = Cursor {
            max_id: Some(StatusId(100)),
            since_id: Some(StatusId(50)),
        };
        assert!(cursor.admits(StatusId(99)));
        assert!(!cursor.admits(StatusId(100)));
        assert!(!cursor.admits(StatusId(50)));
        assert!(Cursor::default().admits(StatusId(1)));
    }

    #[test]
    fn test_cursor_for_unknown_account() {
        let request = PaginationRequest {
            task_id: TaskId(1),
            direction: Direction::Older,
            target: RequestTarget::Page,
            page_size: 20,
            cursors: vec![(AccountId(1), Cursor::older_than(Some(StatusId(10))))],
        };
        assert_eq!(
            request.cursor_for(AccountId(1)),
            Some(Cursor::older_than(Some(StatusId(10))))
        );
        assert_eq!(request.cursor_for(AccountId(2)), None);
    }
}
