use anyhow::Result;

use crate::models::{
    AccountId, FilterRule, GapMarker, RuleId, StatusItem, StatusKey, TimelineId,
};

/// Which persisted statuses a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusScope {
    One(StatusKey),
    Many(Vec<StatusKey>),
    Account(AccountId),
    Timeline,
}

/// Durable storage of merged statuses and gap markers, scoped per timeline.
pub trait StatusRepository: Send + Sync {
    /// Newest-first statuses of the given accounts, at most `limit` rows.
    fn load_statuses(
        &self,
        timeline: &TimelineId,
        accounts: &[AccountId],
        limit: usize,
    ) -> Result<Vec<StatusItem>>;

    fn upsert_statuses(&self, timeline: &TimelineId, items: &[StatusItem]) -> Result<()>;

    /// Returns the number of rows removed.
    fn delete_statuses(&self, timeline: &TimelineId, scope: &StatusScope) -> Result<usize>;

    fn load_gaps(&self, timeline: &TimelineId, accounts: &[AccountId]) -> Result<Vec<GapMarker>>;

    /// Replaces every stored gap of `account_id` with `gaps`.
    fn replace_gaps(
        &self,
        timeline: &TimelineId,
        account_id: AccountId,
        gaps: &[GapMarker],
    ) -> Result<()>;
}

/// Durable mute rules. Every mutation bumps a version counter so readers can
/// tell whether their copy is stale.
pub trait FilterRuleRepository: Send + Sync {
    fn list_rules(&self) -> Result<Vec<(RuleId, FilterRule)>>;
    fn insert_rule(&self, rule: &FilterRule) -> Result<RuleId>;
    fn delete_rule(&self, id: RuleId) -> Result<bool>;
    fn rules_version(&self) -> Result<u64>;
}
