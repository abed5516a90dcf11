//! OAuth 2.0 client-credential lifecycle for the Revolut Business API.
//!
//! Authentication uses a self-signed certificate uploaded to the provider and
//! a JWT client assertion signed with its private key. Access tokens are
//! persisted between runs and refreshed lazily before they expire.

mod assertion;
mod keys;
mod store;
mod token;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub use assertion::{issuer_from_redirect_uri, AssertionSigner, Claims, ASSERTION_TYPE, DEFAULT_TTL_SECS};
pub use keys::{CertificateSubject, KeyMaterial};
pub use store::CredentialStore;
pub use token::{TokenData, EXPIRY_BUFFER_SECS};

pub const PRODUCTION_URL: &str = "https://b2b.revolut.com";
pub const SANDBOX_URL: &str = "https://sandbox-b2b.revolut.com";
pub const AUDIENCE: &str = "https://revolut.com";

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to sign client assertion: {0}")]
    Signing(String),
    #[error("failed to generate key material: {0}")]
    KeyGeneration(String),
    #[error("token endpoint rejected the request ({status}): {body}")]
    AuthExchange { status: u16, body: String },
    #[error("no refresh token available, run the full authorization again")]
    NoRefreshToken,
    #[error("access token has expired")]
    TokenExpired,
    #[error("no access token available, authorize first")]
    NotAuthenticated,
    #[error("unexpected token response: {0}")]
    InvalidTokenResponse(String),
    #[error(transparent)]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    /// Scheme and host of the API, e.g. [`PRODUCTION_URL`].
    pub base_url: String,
    pub audience: String,
    pub cert_dir: PathBuf,
    pub token_file: PathBuf,
    pub subject: CertificateSubject,
    pub timeout: Duration,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, cert_dir: PathBuf, token_file: PathBuf) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: "https://localhost:8080/callback".to_string(),
            base_url: PRODUCTION_URL.to_string(),
            audience: AUDIENCE.to_string(),
            cert_dir,
            token_file,
            subject: CertificateSubject::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/1.0/auth/token", self.base_url.trim_end_matches('/'))
    }

    pub fn consent_url(&self) -> String {
        format!("{}/app-confirm", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Expired,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

/// Drives the token state machine: code exchange, lazy refresh and logout.
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
    keys: KeyMaterial,
    store: CredentialStore,
    token: Option<TokenData>,
}

impl OAuthClient {
    /// Ensures key material exists and loads any persisted credential.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(Error::Configuration("client id must not be empty".into()));
        }
        issuer_from_redirect_uri(&config.redirect_uri)?;

        let keys = KeyMaterial::new(&config.cert_dir, config.subject.clone());
        keys.ensure()?;

        let store = CredentialStore::new(&config.token_file);
        let token = store.load();

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            http,
            keys,
            store,
            token,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    pub fn token(&self) -> Option<&TokenData> {
        self.token.as_ref()
    }

    pub fn state(&self) -> AuthState {
        match &self.token {
            None => AuthState::Unauthenticated,
            Some(t) if t.is_expired() => AuthState::Expired,
            Some(_) => AuthState::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }

    /// Consent page the operator opens to obtain an authorization code.
    pub fn authorization_url(&self, scope: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.consent_url())
            .map_err(|e| Error::Configuration(format!("invalid base url: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("response_type", "code");
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }

        Ok(url)
    }

    pub fn client_assertion(&self) -> Result<String> {
        let signer = AssertionSigner::from_pem(&self.keys.private_key_pem()?)?;
        let issuer = issuer_from_redirect_uri(&self.config.redirect_uri)?;

        signer.sign(
            &self.config.client_id,
            &self.config.audience,
            &issuer,
            DEFAULT_TTL_SECS,
            Utc::now(),
        )
    }

    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&mut self, authorization_code: &str) -> Result<&TokenData> {
        info!("exchanging authorization code for access token");
        let assertion = self.client_assertion()?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", authorization_code),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        let res = self.request_token(&form).await?;
        let token = TokenData::issue(
            res.access_token,
            res.refresh_token,
            res.token_type,
            res.expires_in,
            Utc::now(),
        )?;

        Ok(self.replace_token(token)?)
    }

    /// Trades the stored refresh token for a new access token. The previous
    /// refresh token is kept when the response carries none.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&mut self) -> Result<&TokenData> {
        let refresh_token = self
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(Error::NoRefreshToken)?;

        info!("refreshing access token");
        let assertion = self.client_assertion()?;
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        let res = self.request_token(&form).await?;
        let token = TokenData::issue(
            res.access_token,
            res.refresh_token.or(Some(refresh_token)),
            res.token_type,
            res.expires_in,
            Utc::now(),
        )?;

        let token = self.replace_token(token)?;
        info!(
            "access token refreshed, valid for {} min",
            token.time_until_expiry() / 60
        );
        Ok(token)
    }

    /// Returns a valid access token, refreshing first when `auto_refresh` is
    /// set and the current one is inside the expiry buffer.
    pub async fn access_token(&mut self, auto_refresh: bool) -> Result<String> {
        let expired = match &self.token {
            None => return Err(Error::NotAuthenticated),
            Some(t) => t.is_expired(),
        };

        if expired {
            if !auto_refresh {
                return Err(Error::TokenExpired);
            }
            info!("access token expired, refreshing");
            self.refresh().await?;
        }

        self.token
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(Error::NotAuthenticated)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        self.token = None;
        Ok(())
    }

    /// Replaces the key pair and certificate. The new certificate has to be
    /// uploaded before the next token request succeeds.
    pub fn rotate_keys(&self) -> Result<()> {
        self.keys.rotate()
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let res = self
            .http
            .post(self.config.token_url())
            .form(form)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token request rejected");
            return Err(Error::AuthExchange {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::InvalidTokenResponse(e.to_string()))
    }

    fn replace_token(&mut self, token: TokenData) -> Result<&TokenData> {
        self.store.save(&token)?;
        Ok(self.token.insert(token))
    }
}
