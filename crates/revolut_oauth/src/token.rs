use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Seconds before `expires_at` at which a token is already treated as expired.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// An access/refresh token pair as persisted in the credential file.
///
/// Timestamps are held with millisecond precision so that the float epoch
/// representation on disk round-trips exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(with = "epoch_float")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "created_at", with = "epoch_float")]
    pub issued_at: DateTime<Utc>,
}

impl TokenData {
    /// Builds a token issued at `now` that lives for `expires_in` seconds.
    pub fn issue(
        access_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if expires_in <= 0 {
            return Err(Error::InvalidTokenResponse(format!(
                "expires_in must be positive, got {}",
                expires_in
            )));
        }

        let issued_at = now.trunc_subsecs(3);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::InvalidTokenResponse(format!("expires_in {} is out of range", expires_in))
            })?;

        Ok(Self {
            access_token,
            refresh_token,
            token_type,
            expires_at,
            issued_at,
        })
    }

    /// True iff `now >= expires_at - buffer`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        now >= self.expires_at - Duration::seconds(buffer_secs)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), EXPIRY_BUFFER_SECS)
    }

    /// Whole seconds left until `expires_at`, floored at zero.
    pub fn time_until_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn time_until_expiry(&self) -> i64 {
        self.time_until_expiry_at(Utc::now())
    }
}

/// Timestamps stored as fractional unix seconds.
mod epoch_float {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(dt.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() {
            return Err(de::Error::custom("timestamp must be finite"));
        }

        let millis = (secs * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", secs)))
    }
}
