pub mod account;
pub mod filter_rule;
pub mod gap;
pub mod pagination;
pub mod status;

pub use account::{Account, AccountId};
pub use filter_rule::{FilterKind, FilterRule, FilterRuleError, RuleId};
pub use gap::{GapId, GapMarker};
pub use pagination::{Cursor, Direction, PaginationRequest, RequestTarget, TaskId};
pub use status::{RetweetOf, SortKey, StatusId, StatusItem, StatusKey};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a timeline kind (home, mentions, a list...). Persisted rows are
/// scoped by it so several timelines can share one database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineId(pub String);

impl TimelineId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn home() -> Self {
        Self::new("home")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
