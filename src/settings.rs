use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use revolut_oauth::{CertificateSubject, OAuthConfig, AUDIENCE, PRODUCTION_URL, SANDBOX_URL};
use serde::Deserialize;
use thiserror::Error;

use crate::core::{AccountMap, AccountMapping};
use crate::ledger::Translator;
use crate::rules::Categorizer;
use crate::CLIENT_NAME;

const CONFIG_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "BURSAR";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("revolut.client_id is not set, add it to the config file or set BURSAR_REVOLUT__CLIENT_ID")]
    MissingClientId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ledger_dir: PathBuf,
    pub sync_days: i64,
    pub revolut: Revolut,
    #[serde(default)]
    pub accounts: Vec<AccountMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revolut {
    #[serde(default)]
    pub client_id: String,
    pub redirect_uri: String,
    pub sandbox: bool,
    pub base_url: Option<String>,
    pub cert_dir: PathBuf,
    pub token_file: PathBuf,
    pub organization: String,
    pub country: String,
    pub cert_validity_days: i64,
    pub timeout_secs: u64,
}

impl Settings {
    /// Defaults, then the TOML file, then `BURSAR_*` environment variables.
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigurationError> {
        Self::from_sources(config_path, environment())
    }

    fn from_sources(
        config_path: Option<&str>,
        env: Environment,
    ) -> Result<Self, ConfigurationError> {
        let subject = CertificateSubject::default();
        let mut s = Config::builder()
            .set_default("ledger_dir", default_ledger_dir())?
            .set_default("sync_days", 7)?
            .set_default("revolut.redirect_uri", "https://localhost:8080/callback")?
            .set_default("revolut.sandbox", false)?
            .set_default("revolut.cert_dir", default_revolut_path("certs"))?
            .set_default("revolut.token_file", default_revolut_path("tokens.json"))?
            .set_default("revolut.organization", subject.organization)?
            .set_default("revolut.country", subject.country)?
            .set_default("revolut.cert_validity_days", subject.validity_days)?
            .set_default("revolut.timeout_secs", 30)?;

        s = match config_path {
            Some(path) => s.add_source(File::new(path, FileFormat::Toml)),
            None => {
                s.add_source(File::new(&default_config_path(), FileFormat::Toml).required(false))
            }
        };

        let settings: Settings = s.add_source(env).build()?.try_deserialize()?;
        if settings.revolut.client_id.trim().is_empty() {
            return Err(ConfigurationError::MissingClientId);
        }

        Ok(settings)
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        let r = &self.revolut;
        let base_url = r.base_url.clone().unwrap_or_else(|| {
            if r.sandbox {
                SANDBOX_URL.to_string()
            } else {
                PRODUCTION_URL.to_string()
            }
        });

        OAuthConfig {
            client_id: r.client_id.clone(),
            redirect_uri: r.redirect_uri.clone(),
            base_url,
            audience: AUDIENCE.to_string(),
            cert_dir: r.cert_dir.clone(),
            token_file: r.token_file.clone(),
            subject: CertificateSubject {
                country: r.country.clone(),
                organization: r.organization.clone(),
                validity_days: r.cert_validity_days,
            },
            timeout: Duration::from_secs(r.timeout_secs),
        }
    }

    pub fn translator(&self) -> Translator {
        Translator::new(AccountMap::new(self.accounts.clone()), Categorizer::default())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn default_ledger_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()))
        .join(CLIENT_NAME)
        .join("ledger")
        .display()
        .to_string()
}

fn default_revolut_path(name: &str) -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()))
        .join(".revolut")
        .join(name)
        .display()
        .to_string()
}

pub(crate) fn default_config_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()))
        .join(CLIENT_NAME)
        .join(CONFIG_NAME)
        .display()
        .to_string()
}
