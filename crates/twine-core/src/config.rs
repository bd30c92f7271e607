use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::{
    CONFIG_FILE_NAME, DB_FILE_NAME, DEFAULT_PAGE_SIZE, DEFAULT_RETENTION_LIMIT, MAX_PAGE_SIZE,
};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new("twine_data")
    }
}

/// User-facing timeline settings, stored as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineConfig {
    /// Fire a load-more when the list is scrolled to its end
    pub load_more_automatically: bool,
    /// Statuses kept after a refresh completes
    pub retention_limit: usize,
    pub page_size: usize,
    pub filters_enabled: bool,
    /// Also test mute rules against the original author of a retweet
    pub filter_retweets: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            load_more_automatically: false,
            retention_limit: DEFAULT_RETENTION_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            filters_enabled: false,
            filter_retweets: false,
        }
    }
}

impl TimelineConfig {
    /// Reads the config file, falling back to defaults when it is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "invalid timeline config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::sanitized)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Clamps page size into `1..=MAX_PAGE_SIZE` and keeps at least one page
    /// worth of retention.
    pub fn sanitized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.retention_limit = self.retention_limit.max(self.page_size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = TimelineConfig::default();
        assert!(!config.load_more_automatically);
        assert_eq!(config.retention_limit, 100);
        assert_eq!(config.page_size, 20);
        assert!(!config.filters_enabled);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TimelineConfig::from_json(r#"{"loadMoreAutomatically": true}"#).unwrap();
        assert!(config.load_more_automatically);
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_sanitize_clamps_page_size() {
        let config = TimelineConfig::from_json(r#"{"pageSize": 0, "retentionLimit": 0}"#).unwrap();
        assert_eq!(config.page_size, 1);
        assert_eq!(config.retention_limit, 1);

        let config = TimelineConfig::from_json(r#"{"pageSize": 5000}"#).unwrap();
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.retention_limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = CoreConfig::new(dir.path()).config_path();
        let config = TimelineConfig {
            filters_enabled: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TimelineConfig::load(&path), config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = TimelineConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config, TimelineConfig::default());
    }
}
