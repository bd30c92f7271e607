use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::filter::CompiledFilter;
use crate::models::{
    AccountId, Cursor, Direction, GapId, GapMarker, SortKey, StatusId, StatusItem, StatusKey,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown gap {0}")]
    UnknownGap(GapId),
    #[error("persistence failed: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// A fetched page trimmed to its cursor window and stamped with the account
/// that fetched it.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub items: Vec<StatusItem>,
    /// The upstream returned at least as many items as were requested
    pub full: bool,
    /// Some raw item sat at or below the cursor's `since_id`
    pub reached_since: bool,
}

impl PreparedPage {
    /// `page_size` of `None` means the request size is unknown and the page
    /// is treated as full.
    pub fn new(
        account_id: AccountId,
        items: Vec<StatusItem>,
        cursor: &Cursor,
        page_size: Option<usize>,
    ) -> Self {
        let full = page_size.map_or(true, |size| items.len() >= size);
        let reached_since = cursor.reached_since(&items);
        let items = items
            .into_iter()
            .filter(|item| cursor.admits(item.status_id))
            .map(|mut item| {
                item.account_id = account_id;
                item
            })
            .collect();
        Self {
            items: collapse_retweets(items),
            full,
            reached_since,
        }
    }

    pub fn newest(&self) -> Option<StatusId> {
        self.items.iter().map(|i| i.status_id).max()
    }

    pub fn oldest(&self) -> Option<StatusId> {
        self.items.iter().map(|i| i.status_id).min()
    }
}

/// Drops statuses whose original was already seen earlier in the batch: a
/// retweet of a status in the batch, a second retweet of the same status, or
/// an exact duplicate id.
pub fn collapse_retweets(items: Vec<StatusItem>) -> Vec<StatusItem> {
    let mut seen: HashSet<StatusId> = HashSet::with_capacity(items.len());
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let original = item.retweet.as_ref().map(|r| r.status_id);
        if seen.contains(&item.status_id) || original.is_some_and(|id| seen.contains(&id)) {
            debug!(status_id = %item.status_id, "collapsed duplicate in batch");
            continue;
        }
        seen.insert(item.status_id);
        if let Some(id) = original {
            seen.insert(id);
        }
        kept.push(item);
    }
    kept
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapResolution {
    /// The fetched range reached the lower bound; the gap is gone
    Closed { new_count: usize },
    /// More remains; the gap now starts at the oldest fetched status
    Narrowed { gap: GapMarker, new_count: usize },
}

impl GapResolution {
    pub fn new_count(&self) -> usize {
        match self {
            GapResolution::Closed { new_count } | GapResolution::Narrowed { new_count, .. } => {
                *new_count
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncateReport {
    pub evicted: Vec<StatusKey>,
    /// Open gaps now marking where each affected account was cut
    pub trailing_gaps: Vec<GapId>,
}

/// One row of the merged timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEntry<'a> {
    Status(&'a StatusItem),
    Gap(&'a GapMarker),
}

impl<'a> TimelineEntry<'a> {
    pub fn as_status(&self) -> Option<&'a StatusItem> {
        match self {
            TimelineEntry::Status(item) => Some(item),
            TimelineEntry::Gap(_) => None,
        }
    }

    pub fn as_gap(&self) -> Option<&'a GapMarker> {
        match self {
            TimelineEntry::Gap(gap) => Some(gap),
            TimelineEntry::Status(_) => None,
        }
    }
}

/// Merged, ordered statuses of all accounts plus their gap markers.
#[derive(Debug, Default)]
pub struct TimelineStore {
    entries: BTreeMap<SortKey, StatusItem>,
    /// Per account: status id -> timestamp, enough to rebuild the sort key
    by_account: HashMap<AccountId, BTreeMap<StatusId, i64>>,
    gaps: BTreeMap<GapId, GapMarker>,
    next_gap_id: u64,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: StatusKey) -> Option<&StatusItem> {
        let timestamp = *self.by_account.get(&key.account_id)?.get(&key.status_id)?;
        self.entries.get(&SortKey {
            status_id: key.status_id,
            timestamp,
            account_id: key.account_id,
        })
    }

    pub fn contains(&self, key: StatusKey) -> bool {
        self.by_account
            .get(&key.account_id)
            .is_some_and(|ids| ids.contains_key(&key.status_id))
    }

    /// Every stored status in timeline order, ignoring activation and filters.
    pub fn statuses(&self) -> impl Iterator<Item = &StatusItem> {
        self.entries.values()
    }

    pub fn gap(&self, gap_id: GapId) -> Option<&GapMarker> {
        self.gaps.get(&gap_id)
    }

    pub fn gaps(&self) -> impl Iterator<Item = &GapMarker> {
        self.gaps.values()
    }

    pub fn gaps_for(&self, account_id: AccountId) -> Vec<GapMarker> {
        self.gaps
            .values()
            .filter(|g| g.account_id == account_id)
            .copied()
            .collect()
    }

    pub fn account_len(&self, account_id: AccountId) -> usize {
        self.by_account.get(&account_id).map_or(0, |ids| ids.len())
    }

    pub fn newest_id(&self, account_id: AccountId) -> Option<StatusId> {
        self.by_account
            .get(&account_id)?
            .keys()
            .next_back()
            .copied()
    }

    pub fn oldest_id(&self, account_id: AccountId) -> Option<StatusId> {
        self.by_account.get(&account_id)?.keys().next().copied()
    }

    fn newest_below(&self, account_id: AccountId, status_id: StatusId) -> Option<StatusId> {
        self.by_account
            .get(&account_id)?
            .range(..status_id)
            .next_back()
            .map(|(id, _)| *id)
    }

    fn oldest_above(&self, account_id: AccountId, status_id: StatusId) -> Option<StatusId> {
        self.by_account
            .get(&account_id)?
            .range((Bound::Excluded(status_id), Bound::Unbounded))
            .next()
            .map(|(id, _)| *id)
    }

    /// Any status of the account with an id in `low..=high`.
    fn has_item_in(&self, account_id: AccountId, low: StatusId, high: StatusId) -> bool {
        low <= high
            && self
                .by_account
                .get(&account_id)
                .is_some_and(|ids| ids.range(low..=high).next().is_some())
    }

    // ===== Merging =====

    /// Upserts `items` for `account_id` and returns how many were new.
    ///
    /// Statuses are deduplicated by account and id only; existing ones are
    /// replaced in place. Gaps that now contain a freshly inserted status are
    /// split around it.
    pub fn merge(&mut self, account_id: AccountId, items: Vec<StatusItem>) -> usize {
        let mut inserted = Vec::new();
        for mut item in items {
            item.account_id = account_id;
            let status_id = item.status_id;
            if self.upsert(item) {
                inserted.push(status_id);
            }
        }
        if !inserted.is_empty() {
            self.split_gaps(account_id, &inserted);
        }
        inserted.len()
    }

    /// Merges a page fetched with `cursor` and maintains gap markers around it.
    ///
    /// A full page of newer statuses that did not reach back to the previous
    /// newest status leaves a gap below it. A page of older statuses consumes
    /// the account's open trailing gap at the cursor, and gets a gap above it
    /// when the status it was anchored to has disappeared meanwhile. A short
    /// page of older statuses leaves an open gap below its oldest status; the
    /// next empty page at that cursor consumes it.
    pub fn merge_page(
        &mut self,
        account_id: AccountId,
        page: PreparedPage,
        direction: Direction,
        cursor: &Cursor,
    ) -> usize {
        let had_items = self.account_len(account_id) > 0;
        let newest = page.newest();
        let oldest = page.oldest();
        let full = page.full;
        let reached_since = page.reached_since;

        if direction == Direction::Older {
            if let Some(max_id) = cursor.max_id {
                self.gaps.retain(|_, g| {
                    !(g.account_id == account_id && g.is_open() && g.upper == max_id)
                });
            }
        }

        let new_count = self.merge(account_id, page.items);

        match direction {
            Direction::Newer => {
                if let (Some(oldest), true) = (oldest, had_items && full && !reached_since) {
                    if let Some(below) = self.newest_below(account_id, oldest) {
                        if !oldest.is_successor_of(below) {
                            self.insert_gap(account_id, oldest, Some(below));
                        }
                    }
                }
            }
            Direction::Older => {
                if let Some(newest) = newest {
                    if let Some(above) = self.oldest_above(account_id, newest) {
                        let anchored = cursor.max_id.is_some_and(|max_id| above <= max_id);
                        if !anchored && !above.is_successor_of(newest) {
                            self.insert_gap(account_id, above, Some(newest));
                        }
                    }
                }
                if let (Some(oldest), false) = (oldest, full || reached_since) {
                    if self.oldest_id(account_id) == Some(oldest) {
                        self.insert_gap(account_id, oldest, None);
                    }
                }
            }
        }

        new_count
    }

    /// Merges `items` fetched for a gap. The items are trimmed to the gap's
    /// bounds; without a page size the fetch is assumed to have been full.
    pub fn resolve_gap(
        &mut self,
        gap_id: GapId,
        items: Vec<StatusItem>,
    ) -> Result<GapResolution, StoreError> {
        let gap = *self.gap(gap_id).ok_or(StoreError::UnknownGap(gap_id))?;
        let page = PreparedPage::new(gap.account_id, items, &gap.cursor(), None);
        self.resolve_gap_page(gap_id, page)
    }

    /// Merges a page fetched with the gap's cursor. The gap closes when the
    /// page is empty, reached the lower bound, or ends right above it.
    /// Otherwise it keeps its id and narrows to start at the oldest fetched
    /// status, even when the page came back short.
    pub fn resolve_gap_page(
        &mut self,
        gap_id: GapId,
        page: PreparedPage,
    ) -> Result<GapResolution, StoreError> {
        let gap = self
            .gaps
            .remove(&gap_id)
            .ok_or(StoreError::UnknownGap(gap_id))?;
        let oldest = page.oldest();
        let adjacent = matches!(
            (oldest, gap.lower),
            (Some(oldest), Some(lower)) if oldest.is_successor_of(lower)
        );
        let closed = oldest.is_none() || page.reached_since || adjacent;

        let new_count = self.merge(gap.account_id, page.items);

        match oldest {
            Some(oldest) if !closed => {
                let narrowed = GapMarker {
                    upper: oldest,
                    ..gap
                };
                self.gaps.insert(gap_id, narrowed);
                self.coalesce_gaps(gap.account_id);
                debug!(gap = %gap_id, new_count, upper = %oldest, "gap narrowed");
                Ok(GapResolution::Narrowed {
                    gap: narrowed,
                    new_count,
                })
            }
            _ => {
                self.coalesce_gaps(gap.account_id);
                debug!(gap = %gap_id, new_count, "gap closed");
                Ok(GapResolution::Closed { new_count })
            }
        }
    }

    // ===== Gaps =====

    fn allocate_gap_id(&mut self) -> GapId {
        self.next_gap_id += 1;
        GapId(self.next_gap_id)
    }

    /// Records a gap between two known statuses, or below `upper` when
    /// `lower` is `None`. Returns the gap now covering that range, which may
    /// be an existing one it was merged into.
    pub fn insert_gap(
        &mut self,
        account_id: AccountId,
        upper: StatusId,
        lower: Option<StatusId>,
    ) -> Option<GapId> {
        let id = self.allocate_gap_id();
        let gap = GapMarker {
            id,
            account_id,
            upper,
            lower,
        };
        if gap.is_empty() {
            return None;
        }
        self.gaps.insert(id, gap);
        debug!(account = %account_id, gap = %id, upper = %upper, lower = ?lower.map(|l| l.0), "gap inserted");
        self.coalesce_gaps(account_id);
        self.gaps
            .values()
            .find(|g| {
                g.account_id == account_id
                    && g.upper >= upper
                    && g.lower.map_or(true, |l| l < upper)
            })
            .map(|g| g.id)
    }

    /// Re-inserts a persisted gap under its original id.
    pub fn restore_gap(&mut self, gap: GapMarker) {
        self.next_gap_id = self.next_gap_id.max(gap.id.0);
        if !gap.is_empty() {
            self.gaps.insert(gap.id, gap);
        }
    }

    /// Drops gaps with no room left between their bounds and merges gaps of
    /// the same account that overlap or touch with no known status between.
    pub fn coalesce_gaps(&mut self, account_id: AccountId) {
        let mut gaps = self.gaps_for(account_id);
        if gaps.is_empty() {
            return;
        }
        gaps.sort_by(|a, b| b.upper.cmp(&a.upper).then_with(|| a.id.cmp(&b.id)));
        for gap in &gaps {
            self.gaps.remove(&gap.id);
        }

        let mut kept: Vec<GapMarker> = Vec::with_capacity(gaps.len());
        for gap in gaps {
            if gap.is_empty() {
                continue;
            }
            if let Some(prev) = kept.last_mut() {
                let joins = match prev.lower {
                    None => true,
                    Some(prev_lower) => {
                        gap.upper > prev_lower
                            || !self.has_item_in(account_id, gap.upper, prev_lower)
                    }
                };
                if joins {
                    prev.lower = match (prev.lower, gap.lower) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        _ => None,
                    };
                    continue;
                }
            }
            kept.push(gap);
        }

        for gap in kept {
            self.gaps.insert(gap.id, gap);
        }
    }

    fn split_gaps(&mut self, account_id: AccountId, inserted: &[StatusId]) {
        let affected: Vec<GapMarker> = self
            .gaps
            .values()
            .filter(|g| g.account_id == account_id && inserted.iter().any(|id| g.contains(*id)))
            .copied()
            .collect();

        for gap in affected {
            let inside = inserted.iter().copied().filter(|id| gap.contains(*id));
            let (Some(newest), Some(oldest)) = (inside.clone().max(), inside.min()) else {
                continue;
            };
            self.gaps.remove(&gap.id);

            let upper_part = GapMarker {
                lower: Some(newest),
                ..gap
            };
            if !upper_part.is_empty() {
                self.gaps.insert(gap.id, upper_part);
            }

            let lower_id = self.allocate_gap_id();
            let lower_part = GapMarker {
                id: lower_id,
                upper: oldest,
                ..gap
            };
            if !lower_part.is_empty() {
                self.gaps.insert(lower_id, lower_part);
            }
            debug!(gap = %gap.id, newest = %newest, oldest = %oldest, "gap split by merged statuses");
        }
    }

    // ===== Removal =====

    fn upsert(&mut self, item: StatusItem) -> bool {
        let ids = self.by_account.entry(item.account_id).or_default();
        let previous = ids.insert(item.status_id, item.timestamp);
        if let Some(timestamp) = previous {
            self.entries.remove(&SortKey {
                timestamp,
                ..item.sort_key()
            });
        }
        self.entries.insert(item.sort_key(), item);
        previous.is_none()
    }

    fn remove_sort_key(&mut self, key: &SortKey) -> Option<StatusItem> {
        let item = self.entries.remove(key)?;
        if let Some(ids) = self.by_account.get_mut(&key.account_id) {
            ids.remove(&key.status_id);
            if ids.is_empty() {
                self.by_account.remove(&key.account_id);
            }
        }
        Some(item)
    }

    /// Keeps the newest `limit` statuses. Every account that lost statuses
    /// ends with an open gap right below its oldest remaining one.
    pub fn truncate(&mut self, limit: usize) -> TruncateReport {
        let mut report = TruncateReport::default();
        if self.entries.len() <= limit {
            return report;
        }

        let evicted: Vec<SortKey> = self.entries.keys().skip(limit).copied().collect();
        let mut touched = BTreeSet::new();
        for key in evicted {
            self.remove_sort_key(&key);
            touched.insert(key.account_id);
            report.evicted.push(key.status_key());
        }

        for account_id in touched {
            match self.oldest_id(account_id) {
                Some(tail) => {
                    if let Some(gap_id) = self.clamp_trailing_gap(account_id, tail) {
                        report.trailing_gaps.push(gap_id);
                    }
                }
                None => self.gaps.retain(|_, g| g.account_id != account_id),
            }
        }

        debug!(limit, evicted = report.evicted.len(), "timeline truncated");
        report
    }

    fn clamp_trailing_gap(&mut self, account_id: AccountId, tail: StatusId) -> Option<GapId> {
        self.gaps
            .retain(|_, g| g.account_id != account_id || g.upper >= tail);
        if let Some(gap) = self
            .gaps
            .values_mut()
            .find(|g| g.account_id == account_id && g.upper == tail)
        {
            gap.lower = None;
            return Some(gap.id);
        }
        self.insert_gap(account_id, tail, None)
    }

    /// Removes one status. Gaps that only it separated are merged.
    pub fn delete_status(&mut self, key: StatusKey) -> Option<StatusItem> {
        let timestamp = *self.by_account.get(&key.account_id)?.get(&key.status_id)?;
        let item = self.remove_sort_key(&SortKey {
            status_id: key.status_id,
            timestamp,
            account_id: key.account_id,
        })?;
        self.coalesce_gaps(key.account_id);
        Some(item)
    }

    /// Drops every status and gap of the account. Returns the number of
    /// statuses removed.
    pub fn remove_account(&mut self, account_id: AccountId) -> usize {
        self.gaps.retain(|_, g| g.account_id != account_id);
        let Some(ids) = self.by_account.remove(&account_id) else {
            return 0;
        };
        for (status_id, timestamp) in &ids {
            self.entries.remove(&SortKey {
                status_id: *status_id,
                timestamp: *timestamp,
                account_id,
            });
        }
        ids.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_account.clear();
        self.gaps.clear();
    }

    // ===== Query =====

    /// Lazily walks the visible timeline: statuses of activated accounts
    /// that pass `filter`, with gap markers placed right above the first
    /// older status. Gaps are never filtered.
    pub fn query(
        &self,
        activated: &[AccountId],
        filter: Option<Arc<CompiledFilter>>,
    ) -> TimelineQuery<'_> {
        let activated: HashSet<AccountId> = activated.iter().copied().collect();
        let mut gaps: Vec<&GapMarker> = self
            .gaps
            .values()
            .filter(|g| activated.contains(&g.account_id))
            .collect();
        gaps.sort_by(|a, b| {
            b.upper
                .cmp(&a.upper)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        TimelineQuery {
            statuses: self.entries.values(),
            gaps: gaps.into_iter().peekable(),
            activated,
            filter,
            pending: None,
            last_status_id: None,
        }
    }
}

pub struct TimelineQuery<'a> {
    statuses: std::collections::btree_map::Values<'a, SortKey, StatusItem>,
    gaps: std::iter::Peekable<std::vec::IntoIter<&'a GapMarker>>,
    activated: HashSet<AccountId>,
    filter: Option<Arc<CompiledFilter>>,
    pending: Option<&'a StatusItem>,
    last_status_id: Option<StatusId>,
}

impl<'a> TimelineQuery<'a> {
    fn next_visible_status(&mut self) -> Option<&'a StatusItem> {
        for item in self.statuses.by_ref() {
            if !self.activated.contains(&item.account_id) {
                continue;
            }
            // The same upstream status seen through several accounts is shown once
            if self.last_status_id == Some(item.status_id) {
                continue;
            }
            self.last_status_id = Some(item.status_id);
            if self.filter.as_ref().is_some_and(|f| !f.keep(item)) {
                continue;
            }
            return Some(item);
        }
        None
    }
}

impl<'a> Iterator for TimelineQuery<'a> {
    type Item = TimelineEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_none() {
            self.pending = self.next_visible_status();
        }
        let gap_first = match (self.pending, self.gaps.peek()) {
            (Some(item), Some(gap)) => gap.upper > item.status_id,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if gap_first {
            return self.gaps.next().map(TimelineEntry::Gap);
        }
        self.pending.take().map(TimelineEntry::Status)
    }
}
