use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TimelineConfig;
use crate::events::{TimelineConsumer, TimelineEvent, TimelineUpdate};
use crate::filter::{FilterEngine, FilterOptions};
use crate::models::{Account, AccountId, Direction, GapId, StatusId, StatusItem, StatusKey, TaskId, TimelineId};
use crate::pagination::{
    BottomTracker, CompletionReport, FetchCompletion, FetchState, PaginationCoordinator,
    PersistentSink, ScrollSample, TriggerOutcome,
};
use crate::store::{
    AccountSet, FilterRuleRepository, StatusRepository, StatusScope, StoreError, TimelineEntry,
    TimelineQuery, TimelineStore, TruncateReport,
};

/// One aggregated timeline: the accounts feeding it, its merged store, the
/// pagination state machine and the shared filter engine.
///
/// All mutation goes through `&mut self`, so merges happen one at a time on
/// whatever task owns the timeline.
pub struct Timeline {
    id: TimelineId,
    config: TimelineConfig,
    accounts: AccountSet,
    store: TimelineStore,
    coordinator: PaginationCoordinator,
    filters: FilterEngine,
    repository: Option<Arc<dyn StatusRepository>>,
    bottom: BottomTracker,
    consumers: Vec<Box<dyn TimelineConsumer>>,
}

impl Timeline {
    pub fn new(
        id: TimelineId,
        config: TimelineConfig,
        accounts: AccountSet,
        filters: FilterEngine,
    ) -> Self {
        let config = config.sanitized();
        Self {
            id,
            coordinator: PaginationCoordinator::new(config.page_size),
            config,
            accounts,
            store: TimelineStore::new(),
            filters,
            repository: None,
            bottom: BottomTracker::new(),
            consumers: Vec::new(),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn StatusRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    // ===== Getters =====

    pub fn id(&self) -> &TimelineId {
        &self.id
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountSet {
        &self.accounts
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    pub fn filters(&self) -> &FilterEngine {
        &self.filters
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            filter_retweets: self.config.filter_retweets,
        }
    }

    pub fn state(&self, direction: Direction) -> FetchState {
        self.coordinator.state(direction)
    }

    pub fn active_task(&self, direction: Direction) -> Option<TaskId> {
        self.coordinator.active_task(direction)
    }

    /// Visible rows, recomputed from current state on every call.
    pub fn query(&self) -> TimelineQuery<'_> {
        let filter = self
            .config
            .filters_enabled
            .then(|| self.filters.compile(self.filter_options()));
        self.store.query(&self.accounts.activated(), filter)
    }

    pub fn visible_statuses(&self) -> Vec<&StatusItem> {
        self.query().filter_map(|entry| entry.as_status()).collect()
    }

    pub fn visible_count(&self) -> usize {
        self.query()
            .filter(|entry| matches!(entry, TimelineEntry::Status(_)))
            .count()
    }

    // ===== Consumers =====

    pub fn subscribe(&mut self, consumer: Box<dyn TimelineConsumer>) {
        self.consumers.push(consumer);
    }

    fn notify(&mut self, update: TimelineUpdate) {
        for consumer in self.consumers.iter_mut() {
            consumer.on_update(&self.id, &update);
        }
    }

    // ===== Configuration =====

    pub fn set_config(&mut self, config: TimelineConfig) {
        let config = config.sanitized();
        self.coordinator.set_page_size(config.page_size);
        self.config = config;
    }

    /// Reloads mute rules from `repo` if they changed there.
    pub fn sync_filters(&mut self, repo: &dyn FilterRuleRepository) -> anyhow::Result<bool> {
        let changed = self.filters.sync_from(repo)?;
        if changed {
            let version = self.filters.version();
            self.notify(TimelineUpdate::FiltersChanged { version });
        }
        Ok(changed)
    }

    // ===== Persistence =====

    /// Rebuilds the in-memory store from the repository, newest first and
    /// capped at the retention limit. Every stored row comes back as is.
    /// Returns the number of statuses loaded.
    pub fn restore(&mut self) -> anyhow::Result<usize> {
        let Some(repo) = self.repository.clone() else {
            return Ok(0);
        };
        let activated = self.accounts.activated();
        let items = repo.load_statuses(&self.id, &activated, self.config.retention_limit)?;
        let gaps = repo.load_gaps(&self.id, &activated)?;

        let mut by_account: BTreeMap<AccountId, Vec<StatusItem>> = BTreeMap::new();
        for item in items {
            by_account.entry(item.account_id).or_default().push(item);
        }
        let mut statuses = 0;
        for (account_id, items) in by_account {
            statuses += self.store.merge(account_id, items);
        }
        let gap_count = gaps.len();
        for gap in gaps {
            self.store.restore_gap(gap);
        }

        info!(timeline = %self.id, statuses, gaps = gap_count, "timeline restored");
        self.notify(TimelineUpdate::Restored {
            statuses,
            gaps: gap_count,
        });
        Ok(statuses)
    }

    fn persist_gaps(&self, account_id: AccountId) {
        if let Some(repo) = &self.repository {
            let gaps = self.store.gaps_for(account_id);
            if let Err(e) = repo.replace_gaps(&self.id, account_id, &gaps) {
                warn!(timeline = %self.id, account = %account_id, error = %e, "failed to persist gaps");
            }
        }
    }

    // ===== Accounts =====

    pub fn add_account(&mut self, account: Account) {
        self.accounts.upsert(account);
        self.coordinator.forget_cursors();
        self.notify(TimelineUpdate::AccountsChanged);
    }

    /// Deactivating an account drops its statuses and gaps here and in the
    /// repository. Returns true when the flag changed.
    pub fn set_account_activated(
        &mut self,
        account_id: AccountId,
        activated: bool,
    ) -> Result<bool, StoreError> {
        if !self.accounts.set_activated(account_id, activated) {
            return Ok(false);
        }
        self.coordinator.forget_cursors();
        if !activated {
            self.clear_account(account_id)?;
        }
        self.notify(TimelineUpdate::AccountsChanged);
        Ok(true)
    }

    pub fn remove_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let Some(account) = self.accounts.remove(account_id) else {
            return Ok(None);
        };
        self.coordinator.forget_cursors();
        self.clear_account(account_id)?;
        self.notify(TimelineUpdate::AccountsChanged);
        Ok(Some(account))
    }

    fn clear_account(&mut self, account_id: AccountId) -> Result<(), StoreError> {
        if let Some(repo) = &self.repository {
            repo.delete_statuses(&self.id, &StatusScope::Account(account_id))?;
            repo.replace_gaps(&self.id, account_id, &[])?;
        }
        let removed = self.store.remove_account(account_id);
        debug!(timeline = %self.id, account = %account_id, removed, "account cleared");
        self.notify(TimelineUpdate::AccountCleared {
            account_id,
            removed,
        });
        Ok(())
    }

    // ===== Pagination =====

    pub fn trigger_backward(&mut self) -> TriggerOutcome {
        let accounts = self.accounts.activated();
        self.coordinator.trigger_backward(&accounts, &self.store)
    }

    pub fn trigger_forward(&mut self) -> TriggerOutcome {
        let accounts = self.accounts.activated();
        self.coordinator.trigger_forward(&accounts, &self.store)
    }

    pub fn request_gap_fill(&mut self, gap_id: GapId) -> Result<TriggerOutcome, StoreError> {
        self.coordinator.request_gap_fill(gap_id, &self.store)
    }

    /// Feeds a scroll position to the bottom trigger. Returns the trigger
    /// outcome when the list just reached its end and a load-more was due.
    pub fn on_scroll(&mut self, at_bottom: bool, visible_count: usize) -> Option<TriggerOutcome> {
        let sample = ScrollSample {
            at_bottom,
            visible_count,
            page_size: self.config.page_size,
            load_more_automatically: self.config.load_more_automatically,
            idle: self.coordinator.state(Direction::Older) == FetchState::Idle,
        };
        if self.bottom.observe(sample) {
            Some(self.trigger_backward())
        } else {
            None
        }
    }

    /// Maps a presentation event to the matching trigger. `None` means the
    /// event did not call for a fetch.
    pub fn handle_event(
        &mut self,
        event: TimelineEvent,
    ) -> Result<Option<TriggerOutcome>, StoreError> {
        match event {
            TimelineEvent::PullToRefresh => Ok(Some(self.trigger_forward())),
            TimelineEvent::LoadMoreTapped => Ok(Some(self.trigger_backward())),
            TimelineEvent::Scrolled {
                at_bottom,
                visible_count,
            } => Ok(self.on_scroll(at_bottom, visible_count)),
            TimelineEvent::GapTapped(gap_id) => self.request_gap_fill(gap_id).map(Some),
        }
    }

    pub fn cancel(&mut self, direction: Direction) -> Option<TaskId> {
        self.coordinator.cancel(direction)
    }

    /// Applies a finished fetch. Results for accounts deactivated while the
    /// fetch was running are dropped. A refresh that added statuses is
    /// followed by retention truncation.
    pub fn on_complete(&mut self, mut completion: FetchCompletion) -> CompletionReport {
        let accounts = &self.accounts;
        completion.results.retain(|(account_id, _)| {
            let keep = accounts.is_activated(*account_id);
            if !keep {
                debug!(account = %account_id, "dropping result for inactive account");
            }
            keep
        });

        let report = match &self.repository {
            Some(repo) => {
                let mut sink = PersistentSink::new(&mut self.store, repo.as_ref(), &self.id);
                self.coordinator.on_complete(&mut sink, completion)
            }
            None => self.coordinator.on_complete(&mut self.store, completion),
        };

        if report.accepted {
            self.notify(TimelineUpdate::PageMerged(report.clone()));
            if report.direction == Direction::Newer && report.new_count > 0 {
                self.enforce_retention();
            }
        }
        report
    }

    // ===== Store maintenance =====

    pub fn enforce_retention(&mut self) -> TruncateReport {
        self.truncate(self.config.retention_limit)
    }

    /// Keeps the newest `limit` statuses and mirrors the eviction to the
    /// repository.
    pub fn truncate(&mut self, limit: usize) -> TruncateReport {
        let report = self.store.truncate(limit);
        if report.evicted.is_empty() {
            return report;
        }
        if let Some(repo) = &self.repository {
            if let Err(e) = repo.delete_statuses(&self.id, &StatusScope::Many(report.evicted.clone())) {
                warn!(timeline = %self.id, error = %e, "failed to delete evicted statuses");
            }
        }
        let touched: BTreeSet<AccountId> = report.evicted.iter().map(|k| k.account_id).collect();
        for account_id in touched {
            self.persist_gaps(account_id);
        }
        self.notify(TimelineUpdate::Truncated(report.clone()));
        report
    }

    /// Deletes one status here and in the repository.
    pub fn delete_status(
        &mut self,
        account_id: AccountId,
        status_id: StatusId,
    ) -> Result<bool, StoreError> {
        let key = StatusKey {
            account_id,
            status_id,
        };
        if !self.store.contains(key) {
            return Ok(false);
        }
        if let Some(repo) = &self.repository {
            repo.delete_statuses(&self.id, &StatusScope::One(key))?;
        }
        self.store.delete_status(key);
        self.persist_gaps(account_id);
        self.notify(TimelineUpdate::StatusDeleted(key));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{make_test_page, make_test_status};
    use crate::models::{FilterRule, RetweetOf};
    use crate::store::Database;
    use parking_lot::Mutex;

    const A: AccountId = AccountId(1);
    const B: AccountId = AccountId(2);

    fn make_test_timeline(config: TimelineConfig) -> Timeline {
        let accounts = AccountSet::from_accounts([
            Account::new(A, "alice"),
            Account::new(B, "bob").deactivated(),
        ]);
        Timeline::new(TimelineId::home(), config, accounts, FilterEngine::new())
    }

    fn complete_with(timeline: &mut Timeline, outcome: TriggerOutcome, pages: Vec<(AccountId, Vec<StatusItem>)>) -> CompletionReport {
        let request = outcome.request().cloned().unwrap();
        let mut completion = FetchCompletion::new(request.task_id, request.direction);
        for (account_id, items) in pages {
            completion = completion.with_page(account_id, items);
        }
        timeline.on_complete(completion)
    }

    struct Recorder(Arc<Mutex<Vec<TimelineUpdate>>>);

    impl TimelineConsumer for Recorder {
        fn on_update(&mut self, _timeline: &TimelineId, update: &TimelineUpdate) {
            self.0.lock().push(update.clone());
        }
    }

    #[test]
    fn test_backward_fetches_only_activated_accounts() {
        let mut timeline = make_test_timeline(TimelineConfig::default());
        assert_eq!(timeline.accounts().activated(), vec![A]);

        let outcome = timeline.trigger_backward();
        assert_eq!(outcome.request().unwrap().account_ids(), vec![A]);
    }

    #[test]
    fn test_query_is_strictly_descending() {
        let mut timeline = make_test_timeline(TimelineConfig::default());
        timeline.set_account_activated(B, true).unwrap();
        let outcome = timeline.trigger_forward();
        complete_with(
            &mut timeline,
            outcome,
            vec![
                (A, vec![make_test_status(1, 5), make_test_status(1, 9), make_test_status(1, 7)]),
                (B, vec![make_test_status(2, 8), make_test_status(2, 6), make_test_status(2, 9)]),
            ],
        );

        let ids: Vec<StatusId> = timeline.visible_statuses().iter().map(|s| s.status_id).collect();
        assert!(ids.windows(2).all(|w| w[0] > w[1]), "not descending: {:?}", ids);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_muting_and_unmuting_a_user() {
        let config = TimelineConfig {
            filters_enabled: true,
            ..Default::default()
        };
        let mut timeline = make_test_timeline(config);
        let mut spam = make_test_status(1, 3);
        spam.user_screen_name = "spamuser".to_string();
        let outcome = timeline.trigger_forward();
        complete_with(
            &mut timeline,
            outcome,
            vec![(A, vec![make_test_status(1, 4), spam, make_test_status(1, 2)])],
        );
        assert_eq!(timeline.visible_count(), 3);

        let before = timeline.filters().version();
        let rule = timeline.filters().add_rule(FilterRule::user("spamuser"));
        assert!(timeline.filters().version() > before);
        assert_eq!(timeline.visible_count(), 2);
        assert!(timeline
            .visible_statuses()
            .iter()
            .all(|s| s.user_screen_name != "spamuser"));

        timeline.filters().remove_rule(rule);
        assert_eq!(timeline.visible_count(), 3);
        assert_eq!(timeline.store().len(), 3);
    }

    #[test]
    fn test_filters_disabled_ignores_rules() {
        let mut timeline = make_test_timeline(TimelineConfig::default());
        timeline.filters().add_rule(FilterRule::keyword("status"));
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 1, 3))]);
        assert_eq!(timeline.visible_count(), 3);
    }

    #[test]
    fn test_bottom_trigger_respects_config_and_edge() {
        let config = TimelineConfig {
            load_more_automatically: true,
            page_size: 2,
            ..Default::default()
        };
        let mut timeline = make_test_timeline(config);
        assert!(timeline.on_scroll(true, 1).is_none());
        assert!(timeline.on_scroll(false, 3).is_none());

        let outcome = timeline.on_scroll(true, 3).unwrap();
        assert!(outcome.request().is_some());
        // Still at the bottom: level does not re-trigger
        assert!(timeline.on_scroll(true, 3).is_none());
    }

    #[test]
    fn test_gap_tapped_requests_fill() {
        let mut timeline = make_test_timeline(TimelineConfig::default());
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 50, 50))]);
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 81, 100))]);

        let gap = *timeline.store().gaps().next().unwrap();
        let outcome = timeline
            .handle_event(TimelineEvent::GapTapped(gap.id))
            .unwrap()
            .unwrap();
        let report = complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 51, 80))]);
        assert_eq!(report.new_count, 30);
        assert_eq!(timeline.store().gaps().count(), 0);
    }

    #[test]
    fn test_deactivation_cascades_to_store_and_repository() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut timeline = make_test_timeline(TimelineConfig::default()).with_repository(db.clone());
        timeline.set_account_activated(B, true).unwrap();
        let outcome = timeline.trigger_forward();
        complete_with(
            &mut timeline,
            outcome,
            vec![(A, make_test_page(1, 1, 3)), (B, make_test_page(2, 4, 6))],
        );
        assert_eq!(db.load_statuses(&TimelineId::home(), &[A, B], 100).unwrap().len(), 6);

        assert!(timeline.set_account_activated(B, false).unwrap());
        assert_eq!(timeline.store().account_len(B), 0);
        assert_eq!(db.load_statuses(&TimelineId::home(), &[B], 100).unwrap().len(), 0);
        assert!(!timeline.set_account_activated(B, false).unwrap());
    }

    #[test]
    fn test_results_for_deactivated_account_are_dropped() {
        let mut timeline = make_test_timeline(TimelineConfig::default());
        timeline.set_account_activated(B, true).unwrap();
        let outcome = timeline.trigger_forward();
        timeline.set_account_activated(B, false).unwrap();
        complete_with(
            &mut timeline,
            outcome,
            vec![(A, make_test_page(1, 1, 2)), (B, make_test_page(2, 3, 4))],
        );
        assert_eq!(timeline.store().account_len(B), 0);
        assert_eq!(timeline.store().account_len(A), 2);
    }

    #[test]
    fn test_refresh_enforces_retention() {
        let config = TimelineConfig {
            retention_limit: 20,
            page_size: 20,
            ..Default::default()
        };
        let mut timeline = make_test_timeline(config);
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 1, 20))]);
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 21, 30))]);

        assert_eq!(timeline.store().len(), 20);
        assert_eq!(timeline.store().oldest_id(A), Some(StatusId(11)));
        let trailing: Vec<_> = timeline.store().gaps().filter(|g| g.is_open()).collect();
        assert_eq!(trailing.len(), 1);
        assert_eq!(trailing[0].upper, StatusId(11));
    }

    #[test]
    fn test_restore_rebuilds_from_repository() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        {
            let mut timeline = make_test_timeline(TimelineConfig::default()).with_repository(db.clone());
            let outcome = timeline.trigger_forward();
            complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 1, 5))]);
            timeline.truncate(3);
        }

        let mut timeline = make_test_timeline(TimelineConfig::default()).with_repository(db);
        assert_eq!(timeline.restore().unwrap(), 3);
        let rows: Vec<String> = timeline
            .query()
            .map(|e| match e {
                TimelineEntry::Status(s) => format!("S{}", s.status_id),
                TimelineEntry::Gap(g) => format!("GAP{}", g.upper),
            })
            .collect();
        assert_eq!(rows, vec!["S5", "S4", "S3", "GAP3"]);
    }

    #[test]
    fn test_delete_status_notifies_consumers() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let mut timeline = make_test_timeline(TimelineConfig::default());
        timeline.subscribe(Box::new(Recorder(updates.clone())));
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 1, 3))]);

        assert!(timeline.delete_status(A, StatusId(2)).unwrap());
        assert!(!timeline.delete_status(A, StatusId(2)).unwrap());
        assert_eq!(timeline.visible_count(), 2);

        let updates = updates.lock();
        assert!(matches!(updates[0], TimelineUpdate::PageMerged(_)));
        assert_eq!(
            updates.last(),
            Some(&TimelineUpdate::StatusDeleted(StatusKey {
                account_id: A,
                status_id: StatusId(2)
            }))
        );
    }

    #[test]
    fn test_sync_filters_from_repository() {
        let db = Database::open_in_memory().unwrap();
        let config = TimelineConfig {
            filters_enabled: true,
            ..Default::default()
        };
        let mut timeline = make_test_timeline(config);
        let outcome = timeline.trigger_forward();
        complete_with(&mut timeline, outcome, vec![(A, make_test_page(1, 1, 3))]);

        db.insert_rule(&FilterRule::keyword("status 2")).unwrap();
        assert!(timeline.sync_filters(&db).unwrap());
        assert_eq!(timeline.visible_count(), 2);
        assert!(!timeline.sync_filters(&db).unwrap());
    }

    #[test]
    fn test_restore_keeps_retweet_and_its_original() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        {
            let mut timeline = make_test_timeline(TimelineConfig::default()).with_repository(db.clone());
            let outcome = timeline.trigger_forward();
            complete_with(&mut timeline, outcome, vec![(A, vec![make_test_status(1, 10)])]);

            let mut retweet = make_test_status(1, 12);
            retweet.retweet = Some(RetweetOf {
                status_id: StatusId(10),
                user_screen_name: "user1".to_string(),
                source: None,
            });
            let outcome = timeline.trigger_forward();
            complete_with(&mut timeline, outcome, vec![(A, vec![retweet])]);
            assert_eq!(timeline.store().len(), 2);
        }

        let mut timeline = make_test_timeline(TimelineConfig::default()).with_repository(db.clone());
        assert_eq!(timeline.restore().unwrap(), 2);
        assert_eq!(timeline.store().len(), 2);

        // A second restart sees the same rows
        let mut again = make_test_timeline(TimelineConfig::default()).with_repository(db);
        assert_eq!(again.restore().unwrap(), 2);
    }

    #[test]
    fn test_retweet_option_stays_with_its_timeline() {
        let engine = FilterEngine::new();
        engine.add_rule(FilterRule::user("spamuser"));
        let accounts = || AccountSet::from_accounts([Account::new(A, "alice")]);
        let strict_config = TimelineConfig {
            filters_enabled: true,
            filter_retweets: true,
            ..Default::default()
        };
        let plain_config = TimelineConfig {
            filters_enabled: true,
            ..Default::default()
        };
        let mut strict = Timeline::new(TimelineId::home(), strict_config.clone(), accounts(), engine.clone());
        let version = engine.version();
        let mut plain = Timeline::new(TimelineId::new("mentions"), plain_config, accounts(), engine.clone());
        assert_eq!(engine.version(), version);

        let mut retweet = make_test_status(1, 5);
        retweet.retweet = Some(RetweetOf {
            status_id: StatusId(2),
            user_screen_name: "spamuser".to_string(),
            source: None,
        });
        for timeline in [&mut strict, &mut plain] {
            let outcome = timeline.trigger_forward();
            complete_with(timeline, outcome, vec![(A, vec![retweet.clone()])]);
        }

        assert_eq!(strict.visible_count(), 0);
        assert_eq!(plain.visible_count(), 1);

        plain.set_config(strict_config);
        assert_eq!(plain.visible_count(), 0);
        assert_eq!(engine.version(), version);
    }
}
