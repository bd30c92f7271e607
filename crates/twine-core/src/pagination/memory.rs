use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{AccountId, Cursor, Direction, StatusItem};
use crate::pagination::fetch::{FetchError, FetchedPage, StatusFetcher};

/// Upstream stand-in serving per-account timelines held in memory.
///
/// Paging follows the usual max/since contract: the newest `page_size`
/// statuses strictly inside the cursor window.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    timelines: RwLock<HashMap<AccountId, Vec<StatusItem>>>,
    failing: RwLock<HashSet<AccountId>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds statuses to an account's upstream timeline.
    pub fn publish(&self, account_id: AccountId, items: impl IntoIterator<Item = StatusItem>) {
        let mut timelines = self.timelines.write();
        let timeline = timelines.entry(account_id).or_default();
        for mut item in items {
            item.account_id = account_id;
            timeline.retain(|existing| existing.status_id != item.status_id);
            timeline.push(item);
        }
        timeline.sort_by(|a, b| b.status_id.cmp(&a.status_id));
    }

    pub fn set_failing(&self, account_id: AccountId, failing: bool) {
        let mut set = self.failing.write();
        if failing {
            set.insert(account_id);
        } else {
            set.remove(&account_id);
        }
    }

    /// Number of `fetch_statuses` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn upstream_len(&self, account_id: AccountId) -> usize {
        self.timelines.read().get(&account_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl StatusFetcher for MemoryFetcher {
    async fn fetch_statuses(
        &self,
        account_id: AccountId,
        cursor: Cursor,
        _direction: Direction,
        page_size: usize,
    ) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().contains(&account_id) {
            return Err(FetchError::Upstream {
                status: 503,
                message: format!("account {} unavailable", account_id),
            });
        }

        let timelines = self.timelines.read();
        let items: Vec<StatusItem> = timelines
            .get(&account_id)
            .map(|all| {
                all.iter()
                    .filter(|item| cursor.admits(item.status_id))
                    .take(page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let next_cursor = if items.len() >= page_size {
            items.last().map(|item| item.status_id)
        } else {
            None
        };
        Ok(FetchedPage { items, next_cursor })
    }
}
