use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use twine_core::models::TimelineId;

const APP_DIR_NAME: &str = "twine";
const DEFAULT_FIXTURES_DIR: &str = "fixtures";

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Directory holding the database and the timeline settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Directory with `accounts.json` and `statuses/<account>.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures_dir: Option<PathBuf>,

    /// Timeline to operate on (defaults to `home`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    /// Command-line values win over the file.
    pub fn merge_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        fixtures_dir: Option<PathBuf>,
        timeline: Option<String>,
    ) -> Self {
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        if fixtures_dir.is_some() {
            self.fixtures_dir = fixtures_dir;
        }
        if timeline.is_some() {
            self.timeline = timeline;
        }
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn fixtures_dir(&self) -> PathBuf {
        self.fixtures_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURES_DIR))
    }

    pub fn timeline_id(&self) -> TimelineId {
        self.timeline
            .as_deref()
            .map(TimelineId::new)
            .unwrap_or_else(TimelineId::home)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_dirs() {
        let json = r#"{"dataDir": "/tmp/twine", "fixturesDir": "/tmp/fx", "timeline": "mentions"}"#;
        let config = CliConfig::from_json(json).unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/twine"));
        assert_eq!(config.fixtures_dir(), PathBuf::from("/tmp/fx"));
        assert_eq!(config.timeline_id().as_str(), "mentions");
    }

    #[test]
    fn test_parse_config_minimal() {
        let config = CliConfig::from_json("{}").unwrap();
        assert!(config.data_dir.is_none());
        assert_eq!(config.timeline_id(), TimelineId::home());
        assert_eq!(config.fixtures_dir(), PathBuf::from("fixtures"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = CliConfig::from_json(r#"{"dataDir": "/a", "timeline": "home"}"#)
            .unwrap()
            .merge_overrides(Some(PathBuf::from("/b")), None, None);
        assert_eq!(config.data_dir(), PathBuf::from("/b"));
        assert_eq!(config.timeline_id().as_str(), "home");
    }
}
