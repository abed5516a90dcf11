use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rusty_money::iso::{self, Currency};
use thiserror::Error;
use tracing::debug;

use crate::core::{Account, AccountMap, LedgerEntry, Posting, Status};
use crate::rules::Categorizer;
use crate::upstream::model::{TransactionRecord, TransactionState};

const DEFAULT_NARRATION: &str = "Revolut Transaction";
const FEE_ACCOUNT: &str = "Expenses:Banking:Fees";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("transaction {id} has no legs")]
    NoLegs { id: String },
    #[error("transaction {id} has an unparseable date {value:?}")]
    InvalidDate { id: String, value: String },
    #[error("transaction {id} uses unknown currency {currency:?}")]
    UnknownCurrency { id: String, currency: String },
    #[error("record {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
}

impl TranslationError {
    pub fn record_id(&self) -> &str {
        match self {
            TranslationError::NoLegs { id }
            | TranslationError::InvalidDate { id, .. }
            | TranslationError::UnknownCurrency { id, .. }
            | TranslationError::Malformed { id, .. } => id,
        }
    }
}

/// Turns provider records into ledger entries. Pure apart from the read-only
/// account table and category rules, so records translate independently.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    accounts: AccountMap,
    categories: Categorizer,
}

impl Translator {
    pub fn new(accounts: AccountMap, categories: Categorizer) -> Self {
        Self {
            accounts,
            categories,
        }
    }

    /// Decodes and translates a raw JSON record. Pending records are skipped
    /// before decoding, whatever else they contain.
    pub fn translate_raw(
        &self,
        raw: &serde_json::Value,
    ) -> Result<Option<LedgerEntry>, TranslationError> {
        if raw.get("state").and_then(|s| s.as_str()) == Some("pending") {
            debug!(id = ?raw.get("id"), "skipping pending transaction");
            return Ok(None);
        }

        let record: TransactionRecord =
            serde_json::from_value(raw.clone()).map_err(|e| TranslationError::Malformed {
                id: raw
                    .get("id")
                    .and_then(|id| id.as_str())
                    .unwrap_or("<unknown>")
                    .to_string(),
                reason: e.to_string(),
            })?;

        self.translate(&record)
    }

    pub fn translate(
        &self,
        record: &TransactionRecord,
    ) -> Result<Option<LedgerEntry>, TranslationError> {
        if record.state == TransactionState::Pending {
            debug!(id = %record.id, "skipping pending transaction");
            return Ok(None);
        }

        let first = record.legs.first().ok_or_else(|| TranslationError::NoLegs {
            id: record.id.clone(),
        })?;

        let raw_date = record.completed_at.as_deref().unwrap_or(&record.created_at);
        let date = parse_date(raw_date).ok_or_else(|| TranslationError::InvalidDate {
            id: record.id.clone(),
            value: raw_date.to_string(),
        })?;

        let status = if record.state == TransactionState::Completed {
            Status::Cleared
        } else {
            Status::Pending
        };

        let narration = first
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_NARRATION.to_string());

        let mut postings = Vec::with_capacity(record.legs.len() + 1);
        let mut leg_total = Decimal::ZERO;
        for leg in &record.legs {
            let currency = find_currency(&leg.currency).ok_or_else(|| {
                TranslationError::UnknownCurrency {
                    id: record.id.clone(),
                    currency: leg.currency.clone(),
                }
            })?;

            let account = self.accounts.resolve(leg.account_id.as_deref(), &leg.currency);
            postings.push(Posting::new(account, leg.amount, currency));
            leg_total += leg.amount;

            if let Some(fee) = leg.fee.filter(|f| !f.is_zero()) {
                postings.push(Posting::new(Account(FEE_ACCOUNT.into()), fee, currency));
                leg_total += fee;
            }
        }

        if record.legs.len() == 1 {
            // Every posting so far shares the single leg's currency.
            let currency = postings[0].currency();
            let counter = self.categories.categorize(record.kind.as_ref(), &narration);
            postings.push(Posting::new(counter, -leg_total, currency));
        }

        let mut meta = vec![("revolut_id".to_string(), record.id.clone())];
        if let Some(name) = record
            .merchant
            .as_ref()
            .and_then(|m| m.name.as_deref())
            .filter(|n| !n.is_empty())
        {
            meta.push(("merchant".to_string(), name.to_string()));
        }
        if let Some(reference) = record.reference.as_deref().filter(|r| !r.is_empty()) {
            meta.push(("reference".to_string(), reference.to_string()));
        }

        let tags = record
            .kind
            .as_ref()
            .map(|k| k.tag())
            .filter(|t| !t.is_empty())
            .into_iter()
            .collect();

        Ok(Some(LedgerEntry {
            date,
            status,
            narration,
            tags,
            meta,
            postings,
        }))
    }
}

fn find_currency(code: &str) -> Option<&'static Currency> {
    iso::find(&code.to_uppercase())
}

/// Accepts RFC 3339 timestamps, naive timestamps with an optional trailing
/// `Z`, and bare dates.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    let naive = value.trim_end_matches(&['Z', 'z'][..]);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(naive, "%Y-%m-%d"))
        .ok()
}
