//! Client assertions: short-lived RS256 JWTs that stand in for a client
//! secret on the token endpoint.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::Error;

pub const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
}

/// Signs client assertions with the PEM-encoded RSA private key.
pub struct AssertionSigner {
    key: EncodingKey,
}

impl AssertionSigner {
    pub fn from_pem(private_key_pem: &str) -> Result<Self, Error> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::Signing(format!("malformed private key: {}", e)))?;

        Ok(Self { key })
    }

    pub fn sign(
        &self,
        client_id: &str,
        audience: &str,
        issuer: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let claims = Claims {
            iss: issuer.to_string(),
            sub: client_id.to_string(),
            aud: audience.to_string(),
            exp: now.timestamp() + ttl_secs,
        };

        let jwt = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| Error::Signing(e.to_string()))?;
        debug!("client assertion signed (exp in {}s)", ttl_secs);

        Ok(jwt)
    }
}

/// The assertion issuer is the bare host of the redirect URI: no scheme, no
/// port, no path.
pub fn issuer_from_redirect_uri(redirect_uri: &str) -> Result<String, Error> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| Error::Configuration(format!("invalid redirect uri {}: {}", redirect_uri, e)))?;

    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Configuration(format!("redirect uri {} has no host", redirect_uri)))
}
