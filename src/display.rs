use std::io::Write;

use anyhow::Result;
use rust_decimal::Decimal;
use tabwriter::TabWriter;

use crate::upstream::model::{Account, ExchangeRate};

const HOME_CURRENCY: &str = "SEK";

/// Balances table with a subtotal for the home currency. Other currencies are
/// not converted.
pub fn print_balances<T: Write>(wr: T, accounts: &[Account]) -> Result<()> {
    let mut tw = TabWriter::new(wr);
    writeln!(tw, "\tAccount\tAccount ID\tBalance\tCurrency")?;

    let mut total = Decimal::ZERO;
    for account in accounts.iter() {
        let status = if account.state.as_deref() == Some("active") {
            "ok"
        } else {
            "!"
        };
        writeln!(
            tw,
            "{}\t{}\t{}\t{:.2}\t{}",
            status,
            account.name.as_deref().unwrap_or("Unknown"),
            account.id,
            account.balance,
            account.currency,
        )?;

        if account.currency.eq_ignore_ascii_case(HOME_CURRENCY) {
            total += account.balance;
        }
    }

    if total > Decimal::ZERO {
        writeln!(tw, "\tTotal ({})\t\t{:.2}\t{}", HOME_CURRENCY, total, HOME_CURRENCY)?;
    }

    tw.flush()?;

    Ok(())
}

pub fn print_connection<T: Write>(
    mut wr: T,
    accounts: &[Account],
    rate: Option<&ExchangeRate>,
) -> Result<()> {
    writeln!(wr, "Connection OK, found {} accounts", accounts.len())?;
    for account in accounts {
        writeln!(
            wr,
            "  {} ({})",
            account.name.as_deref().unwrap_or("Unknown"),
            account.currency
        )?;
    }

    match rate {
        Some(rate) => writeln!(
            wr,
            "Exchange rate OK, {}/{}: {} ({} {} = {} {})",
            rate.from.currency,
            rate.to.currency,
            rate.rate,
            rate.from.amount,
            rate.from.currency,
            rate.to.amount,
            rate.to.currency
        )?,
        None => writeln!(wr, "Exchange rate unavailable")?,
    }

    Ok(())
}
