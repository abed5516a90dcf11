mod accounts;
mod auth;
mod core;
mod display;
mod init;
mod ledger;
mod rules;
mod settings;
mod txn;
mod upstream;

use anyhow::Result;
use clap::{arg, Command};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::settings::Settings;

static CLIENT_NAME: &str = "bursar";

async fn run() -> Result<()> {
    let app = Command::new(CLIENT_NAME)
        .about("The bursar utility pulls transactions from the Revolut Business API \
         and writes them out as Beancount ledger entries.")
        .version("0.1.0")
        .subcommand_required(true)
        .allow_external_subcommands(false)
        .arg(arg!(CONFIG: -c --config [FILE] "Sets a custom config file"))
        .arg(arg!(verbose: -v --verbose "Logs progress at info level"))
        .subcommand(Command::new("init")
            .about("Creates key material and prints the certificate and consent URL."))
        .subcommand(Command::new("auth")
            .subcommand_required(true)
            .about("Manages the stored OAuth credential.")
            .subcommand(Command::new("url")
                .about("Prints the consent page URL.")
                .arg(arg!(scope: --scope [SCOPE] "Requests a specific scope, e.g. READ.")))
            .subcommand(Command::new("exchange")
                .about("Exchanges an authorization code for an access token.")
                .arg(arg!(code: <CODE> "The code returned to the redirect URI.")))
            .subcommand(Command::new("refresh").about("Refreshes the access token now."))
            .subcommand(Command::new("status").about("Shows whether the stored credential is valid."))
            .subcommand(Command::new("logout").about("Removes the stored credential."))
            .subcommand(Command::new("rotate")
                .about("Generates a new key pair and certificate. The certificate must be uploaded again.")))
        .subcommand(Command::new("accounts").about("Prints account balances."))
        .subcommand(Command::new("check").about("Tests the API connection and exchange rate lookup."))
        .subcommand(Command::new("sync")
            .about("Pulls recent records and writes them to a new ledger file.")
            .arg(arg!(days: -d --days [N] "Days to look back, defaults to sync_days from the config."))
            .arg(arg!(kind: -k --kind [KIND] "Which records to pull.")
                .possible_values(["transactions", "exchanges", "all"])
                .default_value("transactions"))
            .arg(arg!(output: -o --output [FILE] "Writes to FILE instead of a timestamped file in ledger_dir.")));

    let matches = app.get_matches();

    let level = if matches.is_present("verbose") {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::new(matches.value_of("CONFIG"))?;

    match matches.subcommand() {
        Some(("init", _)) => init::run(settings).await?,
        Some(("auth", auth_matches)) => auth::run(auth_matches, settings).await?,
        Some(("accounts", _)) => accounts::run(settings).await?,
        Some(("check", _)) => accounts::run_check(settings).await?,
        Some(("sync", sync_matches)) => txn::run(sync_matches, settings).await?,
        None => unreachable!("subcommand is required"),
        _ => unreachable!(),
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}
