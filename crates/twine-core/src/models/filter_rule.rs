use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    User,
    Keyword,
    Source,
    Link,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::User => "user",
            FilterKind::Keyword => "keyword",
            FilterKind::Source => "source",
            FilterKind::Link => "link",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = FilterRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(FilterKind::User),
            "keyword" => Ok(FilterKind::Keyword),
            "source" => Ok(FilterKind::Source),
            "link" => Ok(FilterKind::Link),
            other => Err(FilterRuleError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterRuleError {
    #[error("unknown filter kind: {0}")]
    UnknownKind(String),
    #[error("{0} rule has an empty value")]
    Empty(FilterKind),
    #[error("invalid screen name: {0:?}")]
    InvalidScreenName(String),
    #[error("invalid link domain: {0:?}")]
    InvalidDomain(String),
}

/// A mute rule. Values are kept as entered and normalized at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterRule {
    pub kind: FilterKind,
    pub value: String,
}

impl FilterRule {
    pub fn new(kind: FilterKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn user(value: impl Into<String>) -> Self {
        Self::new(FilterKind::User, value)
    }

    pub fn keyword(value: impl Into<String>) -> Self {
        Self::new(FilterKind::Keyword, value)
    }

    pub fn source(value: impl Into<String>) -> Self {
        Self::new(FilterKind::Source, value)
    }

    pub fn link(value: impl Into<String>) -> Self {
        Self::new(FilterKind::Link, value)
    }

    /// Lowercased match value for this rule, or why the rule can never match.
    pub fn normalized(&self) -> Result<String, FilterRuleError> {
        let value = self.value.trim();
        if value.is_empty() {
            return Err(FilterRuleError::Empty(self.kind));
        }
        match self.kind {
            FilterKind::User => {
                let name = value.trim_start_matches('@');
                if name.is_empty() || name.chars().any(char::is_whitespace) {
                    return Err(FilterRuleError::InvalidScreenName(self.value.clone()));
                }
                Ok(name.to_lowercase())
            }
            FilterKind::Keyword | FilterKind::Source => Ok(value.to_lowercase()),
            FilterKind::Link => normalize_domain(value)
                .ok_or_else(|| FilterRuleError::InvalidDomain(self.value.clone())),
        }
    }
}

/// Accepts a bare domain (`example.com`) or a full URL and returns its host.
fn normalize_domain(value: &str) -> Option<String> {
    let parsed = url::Url::parse(value)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("http://{}", value)).ok())?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    if host.is_empty() || !host.contains(|c: char| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(host)
}
