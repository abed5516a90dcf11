use serde::Deserialize;

use super::txn::Account;

const DEFAULT_ASSET_ROOT: &str = "Assets:Bank:Revolut";

/// Maps a provider account (and/or currency) onto a ledger account.
///
/// A rule with both fields empty matches every leg.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountMapping {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    pub account: String,
}

impl AccountMapping {
    fn matches(&self, account_id: Option<&str>, currency: &str) -> bool {
        let id_ok = match (&self.account_id, account_id) {
            (None, _) => true,
            (Some(want), Some(got)) => want == got,
            (Some(_), None) => false,
        };
        let currency_ok = self
            .currency
            .as_deref()
            .map_or(true, |want| want.eq_ignore_ascii_case(currency));

        id_ok && currency_ok
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountMap {
    rules: Vec<AccountMapping>,
}

impl AccountMap {
    pub fn new(rules: Vec<AccountMapping>) -> Self {
        Self { rules }
    }

    /// First matching rule wins; unmatched legs land on
    /// `Assets:Bank:Revolut:<CURRENCY>`.
    pub fn resolve(&self, account_id: Option<&str>, currency: &str) -> Account {
        self.rules
            .iter()
            .find(|rule| rule.matches(account_id, currency))
            .map(|rule| Account(rule.account.clone()))
            .unwrap_or_else(|| {
                Account(format!("{}:{}", DEFAULT_ASSET_ROOT, currency.to_uppercase()))
            })
    }
}
