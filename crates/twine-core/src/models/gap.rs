use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::pagination::Cursor;
use super::status::StatusId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GapId(pub u64);

impl fmt::Display for GapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An unfetched id range for one account.
///
/// Both bounds are exclusive: the missing statuses have ids strictly between
/// `lower` and `upper`. A gap without a lower bound is open-ended and covers
/// everything older than `upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapMarker {
    pub id: GapId,
    pub account_id: AccountId,
    pub upper: StatusId,
    pub lower: Option<StatusId>,
}

impl GapMarker {
    pub fn contains(&self, status_id: StatusId) -> bool {
        status_id < self.upper && self.lower.map_or(true, |lower| status_id > lower)
    }

    /// A bounded gap with no id strictly between its bounds.
    pub fn is_empty(&self) -> bool {
        match self.lower {
            Some(lower) => lower >= self.upper || self.upper.is_successor_of(lower),
            None => self.upper.0 == 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lower.is_none()
    }

    /// Cursor that fetches the statuses missing from this gap.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            max_id: Some(self.upper),
            since_id: self.lower,
        }
    }
}
