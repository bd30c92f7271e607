use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use twine_core::models::{Account, AccountId, StatusItem};
use twine_core::pagination::MemoryFetcher;
use twine_core::store::AccountSet;

const ACCOUNTS_FILE: &str = "accounts.json";
const FAILING_FILE: &str = "failing.json";
const STATUSES_DIR: &str = "statuses";

/// JSON files standing in for the network: the signed-in accounts and, per
/// account, the statuses its upstream timeline holds.
///
/// ```text
/// fixtures/
///   accounts.json          [Account, ...]
///   failing.json           [account_id, ...]   (optional)
///   statuses/<id>.json     [StatusItem, ...]
/// ```
#[derive(Debug, Clone)]
pub struct Fixtures {
    dir: PathBuf,
}

impl Fixtures {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn accounts_path(&self) -> PathBuf {
        self.dir.join(ACCOUNTS_FILE)
    }

    fn statuses_path(&self, account_id: AccountId) -> PathBuf {
        self.dir.join(STATUSES_DIR).join(format!("{}.json", account_id))
    }

    pub fn load_accounts(&self) -> Result<AccountSet> {
        let accounts: Vec<Account> = read_json(&self.accounts_path())?;
        Ok(AccountSet::from_accounts(accounts))
    }

    /// Writes the account list back, keeping activation changes across runs.
    pub fn save_accounts(&self, accounts: &AccountSet) -> Result<()> {
        let list: Vec<&Account> = accounts.iter().collect();
        let json = serde_json::to_string_pretty(&list)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.accounts_path(), json)
            .with_context(|| format!("Failed to write {}", self.accounts_path().display()))
    }

    /// Builds a fetcher serving every account's fixture statuses. Accounts
    /// without a statuses file serve an empty timeline.
    pub fn load_fetcher(&self, accounts: &AccountSet) -> Result<MemoryFetcher> {
        let fetcher = MemoryFetcher::new();
        for account in accounts.iter() {
            let path = self.statuses_path(account.account_id);
            if !path.exists() {
                debug!(account = %account.account_id, "no fixture statuses");
                continue;
            }
            let items: Vec<StatusItem> = read_json(&path)?;
            fetcher.publish(account.account_id, items);
        }

        let failing_path = self.dir.join(FAILING_FILE);
        if failing_path.exists() {
            let failing: Vec<AccountId> = read_json(&failing_path)?;
            for account_id in failing {
                fetcher.set_failing(account_id, true);
            }
        }
        Ok(fetcher)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
