use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;
use twine_core::config::{CoreConfig, TimelineConfig};
use twine_core::filter::FilterEngine;
use twine_core::models::{AccountId, FilterRule};
use twine_core::pagination::{MemoryFetcher, TriggerOutcome};
use twine_core::store::{Database, FilterRuleRepository};
use twine_core::{Timeline, TimelineRuntime};

use super::config::CliConfig;
use super::fixtures::Fixtures;
use super::protocol::{AccountsCommand, CliCommand, FiltersCommand};
use super::render::{self, EntryView};

/// One CLI invocation: a timeline restored from the database and driven
/// against the fixture fetcher.
pub struct Session {
    fixtures: Fixtures,
    db: Arc<Database>,
    runtime: TimelineRuntime<MemoryFetcher>,
}

impl Session {
    pub fn open(config: &CliConfig) -> Result<Self> {
        let core = CoreConfig::new(config.data_dir());
        let timeline_config = TimelineConfig::load(&core.config_path());
        let db = Arc::new(Database::open(core.db_path())?);

        let fixtures = Fixtures::new(config.fixtures_dir());
        let accounts = fixtures.load_accounts()?;
        let fetcher = Arc::new(fixtures.load_fetcher(&accounts)?);

        let mut timeline = Timeline::new(
            config.timeline_id(),
            timeline_config,
            accounts,
            FilterEngine::new(),
        )
        .with_repository(db.clone());
        timeline
            .sync_filters(db.as_ref())
            .context("Failed to load filter rules")?;
        let restored = timeline.restore().context("Failed to restore timeline")?;
        info!(
            timeline = %timeline.id(),
            restored,
            data_dir = %core.data_dir.display(),
            "session opened"
        );

        Ok(Self {
            fixtures,
            db,
            runtime: TimelineRuntime::new(timeline, fetcher),
        })
    }

    pub fn timeline(&self) -> &Timeline {
        self.runtime.timeline()
    }

    pub async fn execute(&mut self, command: CliCommand) -> Result<Value> {
        match command {
            CliCommand::Refresh => {
                let outcome = self.runtime.refresh();
                self.finish(outcome).await
            }
            CliCommand::LoadMore => {
                let outcome = self.runtime.load_more();
                self.finish(outcome).await
            }
            CliCommand::FillGap { gap_id } => {
                let outcome = self.runtime.fill_gap(gap_id)?;
                self.finish(outcome).await
            }
            CliCommand::Show { limit } => Ok(self.show(limit)),
            CliCommand::Truncate { limit } => {
                let timeline = self.runtime.timeline_mut();
                let limit = limit.unwrap_or(timeline.config().retention_limit);
                let report = timeline.truncate(limit);
                Ok(render::truncation(&report))
            }
            CliCommand::Delete {
                account_id,
                status_id,
            } => {
                let deleted = self
                    .runtime
                    .timeline_mut()
                    .delete_status(account_id, status_id)?;
                Ok(json!({ "deleted": deleted }))
            }
            CliCommand::Accounts(command) => self.accounts(command),
            CliCommand::Filters(command) => self.filters(command),
            CliCommand::Config => Ok(serde_json::to_value(self.timeline().config())?),
        }
    }

    async fn finish(&mut self, outcome: TriggerOutcome) -> Result<Value> {
        let reports: Vec<Value> = self
            .runtime
            .run_until_idle()
            .await
            .iter()
            .map(render::report)
            .collect();
        Ok(json!({
            "request": render::outcome(&outcome),
            "reports": reports,
            "stored": self.timeline().store().len(),
            "gaps": self.timeline().store().gaps().count(),
        }))
    }

    fn show(&self, limit: Option<usize>) -> Value {
        let timeline = self.timeline();
        let rows: Vec<EntryView> = timeline
            .query()
            .take(limit.unwrap_or(usize::MAX))
            .map(|entry| EntryView::from_entry(entry, timeline.accounts()))
            .collect();
        json!(rows)
    }

    fn accounts(&mut self, command: AccountsCommand) -> Result<Value> {
        let (account_id, activated) = match command {
            AccountsCommand::List => return Ok(self.list_accounts()),
            AccountsCommand::Activate(account_id) => (account_id, true),
            AccountsCommand::Deactivate(account_id) => (account_id, false),
        };
        self.require_account(account_id)?;
        let changed = self
            .runtime
            .timeline_mut()
            .set_account_activated(account_id, activated)?;
        if changed {
            self.fixtures.save_accounts(self.timeline().accounts())?;
        }
        Ok(json!({ "account_id": account_id.0, "activated": activated, "changed": changed }))
    }

    fn list_accounts(&self) -> Value {
        let timeline = self.timeline();
        let rows: Vec<Value> = timeline
            .accounts()
            .iter()
            .map(|account| {
                json!({
                    "account_id": account.account_id.0,
                    "screen_name": account.screen_name,
                    "activated": account.is_activated,
                    "color": account.color_hex(),
                    "stored": timeline.store().account_len(account.account_id),
                })
            })
            .collect();
        json!(rows)
    }

    fn require_account(&self, account_id: AccountId) -> Result<()> {
        if self.timeline().accounts().get(account_id).is_none() {
            bail!("unknown account {}", account_id);
        }
        Ok(())
    }

    fn filters(&mut self, command: FiltersCommand) -> Result<Value> {
        let result = match command {
            FiltersCommand::List => return Ok(render::rules(&self.db.list_rules()?)),
            FiltersCommand::Add { kind, value } => {
                let rule = FilterRule::new(kind, value);
                rule.normalized()?;
                let id = self.db.insert_rule(&rule)?;
                json!({ "id": id.0 })
            }
            FiltersCommand::Remove(id) => {
                let removed = self.db.delete_rule(id)?;
                json!({ "removed": removed })
            }
        };
        self.runtime.timeline_mut().sync_filters(self.db.as_ref())?;
        Ok(result)
    }
}
