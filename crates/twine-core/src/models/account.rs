use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a signed-in account. Upstream account ids are numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub screen_name: String,
    #[serde(default = "default_activated")]
    pub is_activated: bool,
    /// Packed 0xRRGGBB color used to tag statuses when several accounts are shown
    #[serde(default)]
    pub display_color: u32,
}

fn default_activated() -> bool {
    true
}

impl Account {
    pub fn new(account_id: AccountId, screen_name: impl Into<String>) -> Self {
        Self {
            account_id,
            screen_name: screen_name.into(),
            is_activated: true,
            display_color: 0,
        }
    }

    pub fn with_color(mut self, display_color: u32) -> Self {
        self.display_color = display_color;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_activated = false;
        self
    }

    /// Color formatted as `#rrggbb`.
    pub fn color_hex(&self) -> String {
        format!("#{:06x}", self.display_color & 0x00ff_ffff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_defaults_to_activated() {
        let account: Account =
            serde_json::from_str(r#"{"account_id": 7, "screen_name": "alice"}"#).unwrap();
        assert_eq!(account.account_id, AccountId(7));
        assert!(account.is_activated);
        assert_eq!(account.display_color, 0);
    }

    #[test]
    fn test_color_hex() {
        let account = Account::new(AccountId(1), "alice").with_color(0x00ff8800);
        assert_eq!(account.color_hex(), "#ff8800");
    }
}
