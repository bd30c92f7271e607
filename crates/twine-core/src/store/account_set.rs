use crate::models::{Account, AccountId};

/// Signed-in accounts in their configured order.
#[derive(Debug, Clone, Default)]
pub struct AccountSet {
    accounts: Vec<Account>,
}

impl AccountSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let mut set = Self::new();
        for account in accounts {
            set.upsert(account);
        }
        set
    }

    // ===== Getters =====

    pub fn get(&self, account_id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Activated account ids, in configured order.
    pub fn activated(&self) -> Vec<AccountId> {
        self.accounts
            .iter()
            .filter(|a| a.is_activated)
            .map(|a| a.account_id)
            .collect()
    }

    pub fn is_activated(&self, account_id: AccountId) -> bool {
        self.get(account_id).is_some_and(|a| a.is_activated)
    }

    pub fn color_of(&self, account_id: AccountId) -> Option<u32> {
        self.get(account_id).map(|a| a.display_color)
    }

    /// Account colors are only worth showing when statuses from several
    /// accounts are interleaved.
    pub fn show_account_color(&self) -> bool {
        self.accounts.iter().filter(|a| a.is_activated).count() > 1
    }

    // ===== Mutations =====

    /// Inserts a new account at the end or replaces an existing one in place.
    pub fn upsert(&mut self, account: Account) {
        match self
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account.account_id)
        {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    /// Returns true when the flag actually changed.
    pub fn set_activated(&mut self, account_id: AccountId, activated: bool) -> bool {
        match self.accounts.iter_mut().find(|a| a.account_id == account_id) {
            Some(account) if account.is_activated != activated => {
                account.is_activated = activated;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, account_id: AccountId) -> Option<Account> {
        let index = self
            .accounts
            .iter()
            .position(|a| a.account_id == account_id)?;
        Some(self.accounts.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_set() -> AccountSet {
        AccountSet::from_accounts([
            Account::new(AccountId(1), "alice").with_color(0xff0000),
            Account::new(AccountId(2), "bob").deactivated(),
            Account::new(AccountId(3), "carol"),
        ])
    }

    #[test]
    fn test_activated_preserves_order() {
        let set = make_test_set();
        assert_eq!(set.activated(), vec![AccountId(1), AccountId(3)]);
        assert!(set.is_activated(AccountId(1)));
        assert!(!set.is_activated(AccountId(2)));
        assert!(!set.is_activated(AccountId(99)));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut set = make_test_set();
        set.upsert(Account::new(AccountId(1), "alice2"));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().next().unwrap().screen_name, "alice2");
    }

    #[test]
    fn test_set_activated_reports_change() {
        let mut set = make_test_set();
        assert!(set.set_activated(AccountId(2), true));
        assert!(!set.set_activated(AccountId(2), true));
        assert!(!set.set_activated(AccountId(42), true));
        assert_eq!(set.activated().len(), 3);
    }

    #[test]
    fn test_show_account_color_needs_two_activated() {
        let mut set = make_test_set();
        assert!(set.show_account_color());
        set.set_activated(AccountId(3), false);
        assert!(!set.show_account_color());
        assert_eq!(set.color_of(AccountId(1)), Some(0xff0000));
    }

    #[test]
    fn test_remove() {
        let mut set = make_test_set();
        assert_eq!(set.remove(AccountId(2)).unwrap().screen_name, "bob");
        assert!(set.remove(AccountId(2)).is_none());
        assert_eq!(set.len(), 2);
    }
}
