use std::fmt;

use chrono::naive::NaiveDate;
use rust_decimal::Decimal;
use rusty_money::{iso::Currency, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Cleared,
    Pending,
}

impl Status {
    pub fn flag(&self) -> char {
        match self {
            Status::Cleared => '*',
            Status::Pending => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account(pub String);

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub account: Account,
    pub units: Money<'static, Currency>,
}

impl Posting {
    /// Scales `amount` up to the currency's minor unit so `-150` SEK renders
    /// as `-150.00`. Extra precision is never dropped.
    pub fn new(account: Account, amount: Decimal, currency: &'static Currency) -> Self {
        let mut amount = amount.normalize();
        if amount.scale() < currency.exponent {
            amount.rescale(currency.exponent);
        }

        Self {
            account,
            units: Money::from_decimal(amount, currency),
        }
    }

    pub fn amount(&self) -> Decimal {
        *self.units.amount()
    }

    pub fn currency(&self) -> &'static Currency {
        self.units.currency()
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  {}  {} {}",
            self.account,
            self.units.amount(),
            self.currency().iso_alpha_code
        )
    }
}

/// A single balanced record in the plain-text ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub status: Status,
    pub narration: String,
    pub tags: Vec<String>,
    pub meta: Vec<(String, String)>,
    pub postings: Vec<Posting>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} \"{}\"",
            self.date.format("%Y-%m-%d"),
            self.status.flag(),
            escape(&self.narration)
        )?;
        for tag in &self.tags {
            write!(f, " #{}", tag)?;
        }
        writeln!(f)?;

        for (key, value) in &self.meta {
            writeln!(f, "  {}: \"{}\"", key, escape(value))?;
        }
        for posting in &self.postings {
            writeln!(f, "{}", posting)?;
        }

        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rusty_money::iso;

    use super::*;

    #[test]
    fn posting_pads_to_minor_units() {
        let tests = vec![
            ("-150", iso::SEK, "-150.00"),
            ("1150.5", iso::SEK, "1150.50"),
            ("12.345", iso::EUR, "12.345"),
            ("1000", iso::JPY, "1000"),
            ("-0.10", iso::USD, "-0.10"),
        ];

        for t in tests {
            let p = Posting::new(
                Account("Assets:Test".into()),
                Decimal::from_str(t.0).unwrap(),
                t.1,
            );
            assert_eq!(p.amount().to_string(), t.2);
        }
    }

    #[test]
    fn renders_entry_lines() {
        let entry = LedgerEntry {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: Status::Pending,
            narration: "Invoice \"42\"".into(),
            tags: vec!["card-payment".into()],
            meta: vec![("revolut_id".into(), "tx-1".into())],
            postings: vec![
                Posting::new(
                    Account("Assets:Bank:Revolut:SEK".into()),
                    Decimal::from_str("-99.5").unwrap(),
                    iso::SEK,
                ),
                Posting::new(
                    Account("Expenses:Unknown".into()),
                    Decimal::from_str("99.5").unwrap(),
                    iso::SEK,
                ),
            ],
        };

        assert_eq!(
            entry.to_string(),
            "2024-01-15 ! \"Invoice \\\"42\\\"\" #card-payment\n\
             \x20 revolut_id: \"tx-1\"\n\
             \x20 Assets:Bank:Revolut:SEK  -99.50 SEK\n\
             \x20 Expenses:Unknown  99.50 SEK\n"
        );
    }
}
