use rust_decimal::Decimal;
use serde::Deserialize;

/// Transaction types reported by the provider. Unrecognised types are kept
/// verbatim so they still produce a tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TransactionType {
    Atm,
    CardPayment,
    CardRefund,
    CardChargeback,
    CardCredit,
    Exchange,
    Transfer,
    Loan,
    Fee,
    Refund,
    Topup,
    TopupReturn,
    Tax,
    TaxRefund,
    Other(String),
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "atm" => TransactionType::Atm,
            "card_payment" => TransactionType::CardPayment,
            "card_refund" => TransactionType::CardRefund,
            "card_chargeback" => TransactionType::CardChargeback,
            "card_credit" => TransactionType::CardCredit,
            "exchange" => TransactionType::Exchange,
            "transfer" => TransactionType::Transfer,
            "loan" => TransactionType::Loan,
            "fee" => TransactionType::Fee,
            "refund" => TransactionType::Refund,
            "topup" => TransactionType::Topup,
            "topup_return" => TransactionType::TopupReturn,
            "tax" => TransactionType::Tax,
            "tax_refund" => TransactionType::TaxRefund,
            _ => TransactionType::Other(value),
        }
    }
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Atm => "atm",
            TransactionType::CardPayment => "card_payment",
            TransactionType::CardRefund => "card_refund",
            TransactionType::CardChargeback => "card_chargeback",
            TransactionType::CardCredit => "card_credit",
            TransactionType::Exchange => "exchange",
            TransactionType::Transfer => "transfer",
            TransactionType::Loan => "loan",
            TransactionType::Fee => "fee",
            TransactionType::Refund => "refund",
            TransactionType::Topup => "topup",
            TransactionType::TopupReturn => "topup_return",
            TransactionType::Tax => "tax",
            TransactionType::TaxRefund => "tax_refund",
            TransactionType::Other(s) => s.as_str(),
        }
    }

    /// `card_payment` becomes the ledger tag `card-payment`.
    pub fn tag(&self) -> String {
        self.as_str().to_lowercase().replace('_', "-")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Completed,
    Declined,
    Failed,
    Reverted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Merchant {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Leg {
    pub account_id: Option<String>,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub currency: String,
    pub description: Option<String>,
}

/// A provider transaction or exchange, read-only to the translator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub state: TransactionState,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub reference: Option<String>,
    pub merchant: Option<Merchant>,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
    pub balance: Decimal,
    pub currency: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Amount {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExchangeRate {
    pub from: Amount,
    pub to: Amount,
    pub rate: Decimal,
}
