use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::account::AccountId;

/// Upstream status id. Ids grow monotonically with time, so a higher id is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub u64);

impl StatusId {
    /// True when `self` directly follows `older` with no id in between.
    pub fn is_successor_of(self, older: StatusId) -> bool {
        older.0.checked_add(1) == Some(self.0)
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The status a retweet points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetweetOf {
    pub status_id: StatusId,
    pub user_screen_name: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusItem {
    pub account_id: AccountId,
    pub status_id: StatusId,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub user_screen_name: String,
    #[serde(default)]
    pub user_name: String,
    pub text_plain: String,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<StatusId>,
    #[serde(default)]
    pub retweet: Option<RetweetOf>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl StatusItem {
    pub fn key(&self) -> StatusKey {
        StatusKey {
            account_id: self.account_id,
            status_id: self.status_id,
        }
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey {
            status_id: self.status_id,
            timestamp: self.timestamp,
            account_id: self.account_id,
        }
    }

    pub fn is_retweet(&self) -> bool {
        self.retweet.is_some()
    }
}

/// Identity of a stored status: the same upstream status seen by two
/// accounts is stored twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusKey {
    pub account_id: AccountId,
    pub status_id: StatusId,
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.status_id)
    }
}

/// Position of a status in the merged timeline.
///
/// Sorting ascending yields timeline order: status id descending, then
/// timestamp descending, then account id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub status_id: StatusId,
    pub timestamp: i64,
    pub account_id: AccountId,
}

impl SortKey {
    pub fn status_key(&self) -> StatusKey {
        StatusKey {
            account_id: self.account_id,
            status_id: self.status_id,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .status_id
            .cmp(&self.status_id)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| self.account_id.cmp(&other.account_id))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(status_id: u64, timestamp: i64, account_id: u64) -> SortKey {
        SortKey {
            status_id: StatusId(status_id),
            timestamp,
            account_id: AccountId(account_id),
        }
    }

    #[test]
    fn test_sort_key_orders_newest_first() {
        let mut keys = vec![key(10, 1, 1), key(30, 3, 1), key(20, 2, 1)];
        keys.sort();
        let ids: Vec<u64> = keys.iter().map(|k| k.status_id.0).collect();
        assert_eq!(ids, vec![30, 20, 10]);
    }

    #[test]
    fn test_sort_key_ties_break_on_timestamp_then_account() {
        let mut keys = vec![key(10, 1, 2), key(10, 1, 1), key(10, 5, 3)];
        keys.sort();
        assert_eq!(keys, vec![key(10, 5, 3), key(10, 1, 1), key(10, 1, 2)]);
    }

    #[test]
    fn test_successor() {
        assert!(StatusId(11).is_successor_of(StatusId(10)));
        assert!(!StatusId(12).is_successor_of(StatusId(10)));
        assert!(!StatusId(0).is_successor_of(StatusId(u64::MAX)));
    }
}
