use anyhow::Result;
use tracing::warn;

use crate::display::{print_balances, print_connection};
use crate::settings::Settings;
use crate::upstream::{revolut::RevolutClient, AccountSource};

fn client(settings: &Settings) -> Result<RevolutClient> {
    let auth = revolut_oauth::OAuthClient::new(settings.oauth_config())?;
    Ok(RevolutClient::new(auth)?)
}

async fn balances<S: AccountSource + Send>(source: &mut S) -> Result<()> {
    let accounts = source.accounts().await?;
    print_balances(std::io::stdout(), &accounts)?;

    Ok(())
}

/// Fetches accounts and probes the EUR/SEK rate. A failing rate lookup is
/// reported but does not fail the check.
async fn check<S: AccountSource + Send>(source: &mut S) -> Result<()> {
    let accounts = source.accounts().await?;
    let rate = match source.rate("EUR", "SEK", None).await {
        Ok(rate) => Some(rate),
        Err(e) => {
            warn!("exchange rate lookup failed: {}", e);
            None
        }
    };

    print_connection(std::io::stdout(), &accounts, rate.as_ref())
}

pub(crate) async fn run(settings: Settings) -> Result<()> {
    balances(&mut client(&settings)?).await
}

pub(crate) async fn run_check(settings: Settings) -> Result<()> {
    check(&mut client(&settings)?).await
}
