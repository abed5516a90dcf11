use crate::core::Account;
use crate::upstream::model::TransactionType;

const UNCATEGORIZED: &str = "Expenses:Unknown";

/// Matches when the record has type `kind` or its description contains any
/// of `keywords` (case-insensitive).
#[derive(Debug, Clone)]
struct Rule {
    kind: Option<TransactionType>,
    keywords: &'static [&'static str],
    account: &'static str,
}

impl Rule {
    fn matches(&self, kind: Option<&TransactionType>, description: &str) -> bool {
        let kind_ok = match (&self.kind, kind) {
            (Some(want), Some(got)) => got.as_str().eq_ignore_ascii_case(want.as_str()),
            _ => false,
        };

        kind_ok || self.keywords.iter().any(|w| description.contains(w))
    }
}

/// Picks the counter account for single-leg transactions. Rules are tried in
/// order and the first match wins.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<Rule>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule {
                    kind: Some(TransactionType::Transfer),
                    keywords: &[],
                    account: "Assets:Bank:Other",
                },
                Rule {
                    kind: Some(TransactionType::Fee),
                    keywords: &["fee", "charge"],
                    account: "Expenses:Banking:Fees",
                },
                Rule {
                    kind: None,
                    keywords: &["salary", "lön"],
                    account: "Income:Salary",
                },
                Rule {
                    kind: None,
                    keywords: &["restaurant", "lunch", "dinner"],
                    account: "Expenses:Food:Restaurant",
                },
                Rule {
                    kind: None,
                    keywords: &["hotel", "airbnb", "booking"],
                    account: "Expenses:Travel:Accommodation",
                },
            ],
        }
    }
}

impl Categorizer {
    pub fn categorize(&self, kind: Option<&TransactionType>, description: &str) -> Account {
        let description = description.to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.matches(kind, &description))
            .map_or_else(
                || Account(UNCATEGORIZED.to_string()),
                |rule| Account(rule.account.to_string()),
            )
    }
}
