use anyhow::Result;
use clap::ArgMatches;
use revolut_oauth::{AuthState, OAuthClient};

use crate::settings::Settings;

fn print_status(client: &OAuthClient) {
    match (client.state(), client.token()) {
        (AuthState::Authenticated, Some(token)) => {
            let remaining = token.time_until_expiry();
            println!(
                "Authenticated, access token valid for {}m {}s",
                remaining / 60,
                remaining % 60
            );
        }
        (AuthState::Expired, Some(token)) => {
            let refresh = if token.refresh_token.is_some() {
                "run `auth refresh` or any API command to renew it"
            } else {
                "no refresh token stored, authorize again"
            };
            println!("Access token expired, {}", refresh);
        }
        _ => println!("Not authenticated, run `auth url` to start authorization"),
    }
    println!("Credential file: {}", client.config().token_file.display());
}

pub(crate) async fn run(matches: &ArgMatches, settings: Settings) -> Result<()> {
    let mut client = OAuthClient::new(settings.oauth_config())?;

    match matches.subcommand() {
        Some(("url", url_matches)) => {
            println!("{}", client.authorization_url(url_matches.value_of("scope"))?);
        }
        Some(("exchange", exchange_matches)) => {
            let code = exchange_matches
                .value_of("code")
                .ok_or_else(|| anyhow::anyhow!("authorization code is required"))?;
            client.exchange_code(code).await?;
            print_status(&client);
        }
        Some(("refresh", _)) => {
            client.refresh().await?;
            print_status(&client);
        }
        Some(("status", _)) => print_status(&client),
        Some(("logout", _)) => {
            client.logout()?;
            println!("Stored credential removed.");
        }
        Some(("rotate", _)) => {
            client.rotate_keys()?;
            println!(
                "New certificate written to {}, upload it before authorizing again.",
                client.keys().certificate_path().display()
            );
        }
        None => unreachable!("subcommand is required"),
        _ => unreachable!(),
    }

    Ok(())
}
