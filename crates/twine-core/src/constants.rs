//! Application-wide constants
//!
//! Defaults shared by the core library and the CLI.

/// Statuses requested per account per fetch
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upstream timelines refuse larger pages
pub const MAX_PAGE_SIZE: usize = 200;

/// Statuses kept in the merged timeline after a refresh
pub const DEFAULT_RETENTION_LIMIT: usize = 100;

/// SQLite file inside the data directory
pub const DB_FILE_NAME: &str = "twine.db";

/// Config file inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Set to a path to mirror DEBUG-level logs into that file
pub const LOG_FILE_ENV: &str = "TWINE_LOG_FILE";

/// Default tracing directive when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";
