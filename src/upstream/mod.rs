pub mod model;
pub mod revolut;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use model::{Account, ExchangeRate};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] revolut_oauth::Error),
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

/// Which slice of the provider's ledger a batch pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Transactions,
    /// Transactions filtered server-side to `type=exchange`.
    Exchanges,
}

impl RecordKind {
    pub fn type_filter(&self) -> Option<&'static str> {
        match self {
            RecordKind::Transactions => None,
            RecordKind::Exchanges => Some("exchange"),
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            RecordKind::Transactions => "revolut_import",
            RecordKind::Exchanges => "revolut_exchanges",
        }
    }

    pub fn header_label(&self) -> &'static str {
        match self {
            RecordKind::Transactions => "Revolut Import",
            RecordKind::Exchanges => "Revolut Exchange Import",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            RecordKind::Transactions => "transactions",
            RecordKind::Exchanges => "exchanges",
        }
    }
}

#[async_trait]
pub trait AccountSource {
    async fn accounts(&mut self) -> Result<Vec<Account>, ApiError>;

    async fn rate(
        &mut self,
        from: &str,
        to: &str,
        amount: Option<Decimal>,
    ) -> Result<ExchangeRate, ApiError>;
}

/// Records are returned undecoded so one bad record cannot fail a batch.
#[async_trait]
pub trait TransactionSource {
    async fn records(
        &mut self,
        kind: RecordKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, ApiError>;
}
