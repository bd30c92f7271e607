use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::models::{
    AccountId, FilterKind, FilterRule, GapId, GapMarker, RuleId, StatusId, StatusItem,
    TimelineId,
};
use crate::store::repository::{FilterRuleRepository, StatusRepository, StatusScope};

const FILTER_VERSION_KEY: &str = "filter_rules_version";

/// SQLite-backed repository for statuses, gaps and mute rules.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// Private in-memory database, used in tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS statuses (
                timeline TEXT NOT NULL,
                account_id INTEGER NOT NULL,
                status_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (timeline, account_id, status_id)
            );
            CREATE INDEX IF NOT EXISTS idx_statuses_order
                ON statuses(timeline, status_id DESC, timestamp DESC);
            CREATE TABLE IF NOT EXISTS gaps (
                timeline TEXT NOT NULL,
                gap_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                upper_id INTEGER NOT NULL,
                lower_id INTEGER,
                PRIMARY KEY (timeline, gap_id)
            );
            CREATE TABLE IF NOT EXISTS filter_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn bump_filter_version(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, 1)
         ON CONFLICT(key) DO UPDATE SET value = value + 1",
        params![FILTER_VERSION_KEY],
    )?;
    Ok(())
}

fn delete_one(
    conn: &Connection,
    timeline: &TimelineId,
    account_id: AccountId,
    status_id: StatusId,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM statuses WHERE timeline = ?1 AND account_id = ?2 AND status_id = ?3",
        params![timeline.as_str(), account_id.0 as i64, status_id.0 as i64],
    )
}

impl StatusRepository for Database {
    fn load_statuses(
        &self,
        timeline: &TimelineId,
        accounts: &[AccountId],
        limit: usize,
    ) -> Result<Vec<StatusItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT account_id, body FROM statuses
             WHERE timeline = ?1
             ORDER BY status_id DESC, timestamp DESC, account_id ASC",
        )?;
        let rows = stmt.query_map(params![timeline.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (account_id, body) = row?;
            if !accounts.contains(&AccountId(account_id as u64)) {
                continue;
            }
            let item: StatusItem = serde_json::from_str(&body)
                .with_context(|| format!("decoding stored status for account {}", account_id))?;
            items.push(item);
            if items.len() >= limit {
                break;
            }
        }
        Ok(items)
    }

    fn upsert_statuses(&self, timeline: &TimelineId, items: &[StatusItem]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO statuses (timeline, account_id, status_id, timestamp, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(timeline, account_id, status_id)
                 DO UPDATE SET timestamp = excluded.timestamp, body = excluded.body",
            )?;
            for item in items {
                let body = serde_json::to_string(item)?;
                stmt.execute(params![
                    timeline.as_str(),
                    item.account_id.0 as i64,
                    item.status_id.0 as i64,
                    item.timestamp,
                    body
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_statuses(&self, timeline: &TimelineId, scope: &StatusScope) -> Result<usize> {
        let mut conn = self.conn.lock();
        let removed = match scope {
            StatusScope::One(key) => delete_one(&conn, timeline, key.account_id, key.status_id)?,
            StatusScope::Many(keys) => {
                let tx = conn.transaction()?;
                let mut removed = 0;
                for key in keys {
                    removed += delete_one(&tx, timeline, key.account_id, key.status_id)?;
                }
                tx.commit()?;
                removed
            }
            StatusScope::Account(account_id) => conn.execute(
                "DELETE FROM statuses WHERE timeline = ?1 AND account_id = ?2",
                params![timeline.as_str(), account_id.0 as i64],
            )?,
            StatusScope::Timeline => conn.execute(
                "DELETE FROM statuses WHERE timeline = ?1",
                params![timeline.as_str()],
            )?,
        };
        Ok(removed)
    }

    fn load_gaps(&self, timeline: &TimelineId, accounts: &[AccountId]) -> Result<Vec<GapMarker>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT gap_id, account_id, upper_id, lower_id FROM gaps
             WHERE timeline = ?1 ORDER BY gap_id",
        )?;
        let rows = stmt.query_map(params![timeline.as_str()], |row| {
            Ok(GapMarker {
                id: GapId(row.get::<_, i64>(0)? as u64),
                account_id: AccountId(row.get::<_, i64>(1)? as u64),
                upper: StatusId(row.get::<_, i64>(2)? as u64),
                lower: row.get::<_, Option<i64>>(3)?.map(|id| StatusId(id as u64)),
            })
        })?;

        let mut gaps = Vec::new();
        for gap in rows {
            let gap = gap?;
            if accounts.contains(&gap.account_id) {
                gaps.push(gap);
            }
        }
        Ok(gaps)
    }

    fn replace_gaps(
        &self,
        timeline: &TimelineId,
        account_id: AccountId,
        gaps: &[GapMarker],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM gaps WHERE timeline = ?1 AND account_id = ?2",
            params![timeline.as_str(), account_id.0 as i64],
        )?;
        for gap in gaps.iter().filter(|g| g.account_id == account_id) {
            tx.execute(
                "INSERT OR REPLACE INTO gaps (timeline, gap_id, account_id, upper_id, lower_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    timeline.as_str(),
                    gap.id.0 as i64,
                    account_id.0 as i64,
                    gap.upper.0 as i64,
                    gap.lower.map(|l| l.0 as i64)
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl FilterRuleRepository for Database {
    fn list_rules(&self) -> Result<Vec<(RuleId, FilterRule)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, kind, value FROM filter_rules ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, kind, value) = row?;
            match kind.parse::<FilterKind>() {
                Ok(kind) => rules.push((RuleId(id), FilterRule::new(kind, value))),
                Err(e) => tracing::warn!(rule = id, error = %e, "skipping stored filter rule"),
            }
        }
        Ok(rules)
    }

    fn insert_rule(&self, rule: &FilterRule) -> Result<RuleId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO filter_rules (kind, value) VALUES (?1, ?2)",
            params![rule.kind.as_str(), rule.value],
        )?;
        let id = tx.last_insert_rowid();
        bump_filter_version(&tx)?;
        tx.commit()?;
        Ok(RuleId(id))
    }

    fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM filter_rules WHERE id = ?1", params![id.0])?;
        if removed > 0 {
            bump_filter_version(&tx)?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    fn rules_version(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let version: Option<i64> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![FILTER_VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0) as u64)
    }
}
