use anyhow::Result;
use revolut_oauth::OAuthClient;

use crate::settings::Settings;

/// Creates the key pair on first use and prints what the operator needs to
/// finish setup in the provider's console.
pub(crate) async fn run(settings: Settings) -> Result<()> {
    let client = OAuthClient::new(settings.oauth_config())?;
    let keys = client.keys();

    println!("Private key: {}", keys.private_key_path().display());
    println!("Certificate: {}", keys.certificate_path().display());
    println!();
    println!("Upload this certificate to the API settings of your business account:");
    println!();
    print!("{}", keys.public_certificate()?);
    println!();
    println!("Then open the consent page and pass the returned code to `auth exchange`:");
    println!("{}", client.authorization_url(None)?);

    Ok(())
}
