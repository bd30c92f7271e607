use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::debug;

use crate::filter::predicate::{CompiledFilter, FilterOptions};
use crate::models::{FilterRule, RuleId};
use crate::store::FilterRuleRepository;

#[derive(Debug, Default)]
struct FilterState {
    rules: BTreeMap<RuleId, FilterRule>,
    next_local_id: i64,
    version: u64,
    /// Rule version of the repository the rules were last loaded from
    synced_repo_version: Option<u64>,
    /// Predicates compiled from the current version, one per option set
    compiled: HashMap<FilterOptions, Arc<CompiledFilter>>,
}

impl FilterState {
    fn bump(&mut self) {
        self.version += 1;
        self.compiled.clear();
    }
}

/// Shared, versioned rule set. Clones share state, so one engine can serve
/// several timelines while rules are edited elsewhere. Per-timeline options
/// such as retweet matching are passed to `compile` and never stored here.
///
/// Readers only ever see a whole compiled rule set: mutations and
/// compilation both happen under the same lock.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    inner: Arc<RwLock<FilterState>>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    pub fn rules(&self) -> Vec<(RuleId, FilterRule)> {
        self.inner
            .read()
            .rules
            .iter()
            .map(|(id, rule)| (*id, rule.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rules.is_empty()
    }

    // ===== Mutations =====

    /// Adds an unpersisted rule under a locally assigned (negative) id.
    pub fn add_rule(&self, rule: FilterRule) -> RuleId {
        let mut state = self.inner.write();
        state.next_local_id -= 1;
        let id = RuleId(state.next_local_id);
        state.rules.insert(id, rule);
        state.bump();
        id
    }

    /// Adds or replaces a rule under an id assigned by persistence.
    pub fn insert_rule(&self, id: RuleId, rule: FilterRule) {
        let mut state = self.inner.write();
        state.rules.insert(id, rule);
        state.bump();
    }

    pub fn remove_rule(&self, id: RuleId) -> Option<FilterRule> {
        let mut state = self.inner.write();
        let removed = state.rules.remove(&id);
        if removed.is_some() {
            state.bump();
        }
        removed
    }

    pub fn replace_rules(&self, rules: impl IntoIterator<Item = (RuleId, FilterRule)>) {
        let mut state = self.inner.write();
        state.rules = rules.into_iter().collect();
        state.bump();
    }

    /// Reloads rules when the repository's version moved since the last sync.
    /// Returns true when the rule set was replaced.
    pub fn sync_from(&self, repo: &dyn FilterRuleRepository) -> anyhow::Result<bool> {
        let repo_version = repo.rules_version()?;
        if self.inner.read().synced_repo_version == Some(repo_version) {
            return Ok(false);
        }
        let rules = repo.list_rules()?;
        let mut state = self.inner.write();
        state.rules = rules.into_iter().collect();
        state.synced_repo_version = Some(repo_version);
        state.bump();
        debug!(repo_version, rules = state.rules.len(), "filter rules synced");
        Ok(true)
    }

    // ===== Compilation =====

    /// Compiled predicate for the current version, compiled at most once per
    /// version and option set.
    pub fn compile(&self, options: FilterOptions) -> Arc<CompiledFilter> {
        let state = self.inner.upgradable_read();
        if let Some(compiled) = state.compiled.get(&options) {
            return compiled.clone();
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let compiled = Arc::new(CompiledFilter::compile(
            state.rules.values(),
            options,
            state.version,
        ));
        debug!(version = state.version, ?options, "filter rules compiled");
        state.compiled.insert(options, compiled.clone());
        compiled
    }

    /// Returns a fresh predicate only when `seen_version` is stale.
    pub fn compile_if_stale(
        &self,
        seen_version: u64,
        options: FilterOptions,
    ) -> Option<Arc<CompiledFilter>> {
        if self.version() == seen_version {
            return None;
        }
        Some(self.compile(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::make_test_status;
    use crate::models::{RetweetOf, StatusId};
    use crate::store::Database;

    #[test]
    fn test_mutations_bump_version() {
        let engine = FilterEngine::new();
        assert_eq!(engine.version(), 0);

        let id = engine.add_rule(FilterRule::user("spamuser"));
        assert_eq!(engine.version(), 1);

        assert!(engine.remove_rule(id).is_some());
        assert_eq!(engine.version(), 2);

        assert!(engine.remove_rule(id).is_none());
        assert_eq!(engine.version(), 2);
    }

    #[test]
    fn test_compile_is_memoized_per_version() {
        let engine = FilterEngine::new();
        engine.add_rule(FilterRule::keyword("x"));

        let first = engine.compile(FilterOptions::default());
        let second = engine.compile(FilterOptions::default());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.version(), engine.version());

        engine.add_rule(FilterRule::keyword("y"));
        let third = engine.compile(FilterOptions::default());
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.version(), engine.version());
    }

    #[test]
    fn test_compile_if_stale() {
        let engine = FilterEngine::new();
        let options = FilterOptions::default();
        let compiled = engine.compile(options);
        assert!(engine.compile_if_stale(compiled.version(), options).is_none());

        engine.add_rule(FilterRule::user("a"));
        let fresh = engine.compile_if_stale(compiled.version(), options).unwrap();
        assert_eq!(fresh.version(), engine.version());
    }

    #[test]
    fn test_clones_share_rules() {
        let engine = FilterEngine::new();
        let other = engine.clone();
        other.add_rule(FilterRule::user("spamuser"));

        let mut item = make_test_status(1, 1);
        item.user_screen_name = "spamuser".to_string();
        assert!(!engine.compile(FilterOptions::default()).keep(&item));
    }

    #[test]
    fn test_options_are_per_caller() {
        let engine = FilterEngine::new();
        engine.add_rule(FilterRule::user("spamuser"));
        let version = engine.version();

        let mut item = make_test_status(1, 1);
        item.retweet = Some(RetweetOf {
            status_id: StatusId(0),
            user_screen_name: "spamuser".to_string(),
            source: None,
        });
        let strict = engine.compile(FilterOptions {
            filter_retweets: true,
        });
        let plain = engine.compile(FilterOptions::default());

        assert!(!strict.keep(&item));
        assert!(plain.keep(&item));
        assert_eq!(engine.version(), version);
        assert!(Arc::ptr_eq(
            &plain,
            &engine.compile(FilterOptions::default())
        ));
    }

    #[test]
    fn test_sync_from_repository_only_when_changed() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_rule(&FilterRule::user("spamuser")).unwrap();

        let engine = FilterEngine::new();
        assert!(engine.sync_from(&db).unwrap());
        assert_eq!(engine.rules(), vec![(id, FilterRule::user("spamuser"))]);
        let version = engine.version();

        assert!(!engine.sync_from(&db).unwrap());
        assert_eq!(engine.version(), version);

        db.delete_rule(id).unwrap();
        assert!(engine.sync_from(&db).unwrap());
        assert!(engine.is_empty());
        assert!(engine.version() > version);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_versions() {
        let engine = FilterEngine::new();
        let writer = engine.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..200 {
                writer.add_rule(FilterRule::keyword(format!("k{}", i)));
            }
        });
        for _ in 0..200 {
            let compiled = engine.compile(FilterOptions::default());
            let rules_at_compile = compiled.version();
            assert!(rules_at_compile <= engine.version());
        }
        handle.join().unwrap();
        assert_eq!(engine.compile(FilterOptions::default()).version(), 200);
    }
}
