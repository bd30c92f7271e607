use tracing::warn;

use crate::models::{AccountId, Cursor, Direction, GapId, StatusItem, TimelineId};
use crate::store::{
    GapResolution, PreparedPage, StatusRepository, StoreError, TimelineStore,
};

/// Where completed pages are merged. The coordinator only talks to this.
pub trait PageSink {
    fn apply_page(
        &mut self,
        account_id: AccountId,
        items: Vec<StatusItem>,
        direction: Direction,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<usize, StoreError>;

    fn apply_gap_fill(
        &mut self,
        gap_id: GapId,
        items: Vec<StatusItem>,
        page_size: usize,
    ) -> Result<GapResolution, StoreError>;
}

impl PageSink for TimelineStore {
    fn apply_page(
        &mut self,
        account_id: AccountId,
        items: Vec<StatusItem>,
        direction: Direction,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<usize, StoreError> {
        let page = PreparedPage::new(account_id, items, cursor, Some(page_size));
        Ok(self.merge_page(account_id, page, direction, cursor))
    }

    fn apply_gap_fill(
        &mut self,
        gap_id: GapId,
        items: Vec<StatusItem>,
        page_size: usize,
    ) -> Result<GapResolution, StoreError> {
        let gap = *self.gap(gap_id).ok_or(StoreError::UnknownGap(gap_id))?;
        let page = PreparedPage::new(gap.account_id, items, &gap.cursor(), Some(page_size));
        self.resolve_gap_page(gap_id, page)
    }
}

/// Writes each page through to the repository before merging it in memory.
/// A failed status write aborts that merge; a failed gap write is logged and
/// retried by the next merge of the account.
pub struct PersistentSink<'a> {
    store: &'a mut TimelineStore,
    repo: &'a dyn StatusRepository,
    timeline: &'a TimelineId,
}

impl<'a> PersistentSink<'a> {
    pub fn new(
        store: &'a mut TimelineStore,
        repo: &'a dyn StatusRepository,
        timeline: &'a TimelineId,
    ) -> Self {
        Self {
            store,
            repo,
            timeline,
        }
    }

    fn persist_gaps(&self, account_id: AccountId) {
        let gaps = self.store.gaps_for(account_id);
        if let Err(e) = self.repo.replace_gaps(self.timeline, account_id, &gaps) {
            warn!(timeline = %self.timeline, account = %account_id, error = %e, "failed to persist gaps");
        }
    }
}

impl PageSink for PersistentSink<'_> {
    fn apply_page(
        &mut self,
        account_id: AccountId,
        items: Vec<StatusItem>,
        direction: Direction,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<usize, StoreError> {
        let page = PreparedPage::new(account_id, items, cursor, Some(page_size));
        self.repo.upsert_statuses(self.timeline, &page.items)?;
        let new_count = self.store.merge_page(account_id, page, direction, cursor);
        self.persist_gaps(account_id);
        Ok(new_count)
    }

    fn apply_gap_fill(
        &mut self,
        gap_id: GapId,
        items: Vec<StatusItem>,
        page_size: usize,
    ) -> Result<GapResolution, StoreError> {
        let gap = *self.store.gap(gap_id).ok_or(StoreError::UnknownGap(gap_id))?;
        let page = PreparedPage::new(gap.account_id, items, &gap.cursor(), Some(page_size));
        self.repo.upsert_statuses(self.timeline, &page.items)?;
        let resolution = self.store.resolve_gap_page(gap_id, page)?;
        self.persist_gaps(gap.account_id);
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::make_test_page;
    use crate::models::{GapMarker, StatusId};
    use crate::store::{Database, StatusScope};
    use anyhow::anyhow;

    struct FailingRepo;

    impl StatusRepository for FailingRepo {
        fn load_statuses(
            &self,
            _: &TimelineId,
            _: &[AccountId],
            _: usize,
        ) -> anyhow::Result<Vec<StatusItem>> {
            Ok(vec![])
        }
        fn upsert_statuses(&self, _: &TimelineId, _: &[StatusItem]) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
        fn delete_statuses(&self, _: &TimelineId, _: &StatusScope) -> anyhow::Result<usize> {
            Ok(0)
        }
        fn load_gaps(&self, _: &TimelineId, _: &[AccountId]) -> anyhow::Result<Vec<GapMarker>> {
            Ok(vec![])
        }
        fn replace_gaps(&self, _: &TimelineId, _: AccountId, _: &[GapMarker]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_persistent_sink_writes_statuses_and_gaps() {
        let db = Database::open_in_memory().unwrap();
        let timeline = TimelineId::home();
        let mut store = TimelineStore::new();
        store.merge(AccountId(1), make_test_page(1, 1, 5));

        let cursor = Cursor::newer_than(Some(StatusId(5)));
        let mut sink = PersistentSink::new(&mut store, &db, &timeline);
        let new_count = sink
            .apply_page(AccountId(1), make_test_page(1, 50, 59), Direction::Newer, &cursor, 10)
            .unwrap();
        assert_eq!(new_count, 10);

        let stored = db.load_statuses(&timeline, &[AccountId(1)], 100).unwrap();
        assert_eq!(stored.len(), 10);
        let gaps = db.load_gaps(&timeline, &[AccountId(1)]).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].upper, StatusId(50));
        assert_eq!(gaps[0].lower, Some(StatusId(5)));
    }

    #[test]
    fn test_write_failure_leaves_store_untouched() {
        let timeline = TimelineId::home();
        let mut store = TimelineStore::new();
        let mut sink = PersistentSink::new(&mut store, &FailingRepo, &timeline);
        let result = sink.apply_page(
            AccountId(1),
            make_test_page(1, 1, 3),
            Direction::Older,
            &Cursor::default(),
            20,
        );
        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_gap_fill_through_memory_sink() {
        let mut store = TimelineStore::new();
        store.merge(AccountId(1), make_test_page(1, 100, 100));
        store.merge(AccountId(1), make_test_page(1, 50, 50));
        let gap_id = store
            .insert_gap(AccountId(1), StatusId(100), Some(StatusId(50)))
            .unwrap();

        let resolution = store
            .apply_gap_fill(gap_id, make_test_page(1, 51, 99), 100)
            .unwrap();
        assert_eq!(resolution, GapResolution::Closed { new_count: 49 });
        assert!(store.gap(gap_id).is_none());
    }
}
