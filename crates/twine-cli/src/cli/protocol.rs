use serde::{Deserialize, Serialize};
use twine_core::models::{AccountId, FilterKind, GapId, RuleId, StatusId};

/// Result envelope printed for every command
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Fetch statuses newer than the newest known ones
    Refresh,
    /// Fetch statuses older than the oldest known ones
    LoadMore,
    /// Fetch the statuses missing from one gap
    FillGap { gap_id: GapId },
    /// Print the visible timeline
    Show { limit: Option<usize> },
    /// Keep only the newest statuses (retention limit when `None`)
    Truncate { limit: Option<usize> },
    /// Delete one stored status
    Delete {
        account_id: AccountId,
        status_id: StatusId,
    },
    Accounts(AccountsCommand),
    Filters(FiltersCommand),
    /// Print the effective timeline settings
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsCommand {
    List,
    Activate(AccountId),
    Deactivate(AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiltersCommand {
    List,
    Add { kind: FilterKind, value: String },
    Remove(RuleId),
}

impl CliCommand {
    /// Name used in log lines and error codes.
    pub fn method(&self) -> &'static str {
        match self {
            CliCommand::Refresh => "refresh",
            CliCommand::LoadMore => "load_more",
            CliCommand::FillGap { .. } => "fill_gap",
            CliCommand::Show { .. } => "show",
            CliCommand::Truncate { .. } => "truncate",
            CliCommand::Delete { .. } => "delete",
            CliCommand::Accounts(_) => "accounts",
            CliCommand::Filters(_) => "filters",
            CliCommand::Config => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_skips_result() {
        let json = serde_json::to_string(&Response::error("unknown_gap", "unknown gap 4")).unwrap();
        assert_eq!(
            json,
            r#"{"error":{"code":"unknown_gap","message":"unknown gap 4"}}"#
        );
    }

    #[test]
    fn test_method_names() {
        assert_eq!(CliCommand::FillGap { gap_id: GapId(3) }.method(), "fill_gap");
        assert_eq!(CliCommand::Filters(FiltersCommand::List).method(), "filters");
    }
}
