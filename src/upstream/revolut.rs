use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use revolut_oauth::OAuthClient;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::model::{Account, ExchangeRate};
use super::{AccountSource, ApiError, RecordKind, TransactionSource};

/// Largest page the transactions endpoint serves.
pub const PAGE_SIZE: usize = 1000;

pub struct RevolutClient {
    http: reqwest::Client,
    api_url: String,
    auth: OAuthClient,
    page_size: usize,
}

impl RevolutClient {
    pub fn new(auth: OAuthClient) -> Result<Self, ApiError> {
        let config = auth.config();
        let api_url = format!("{}/api/1.0", config.base_url.trim_end_matches('/'));
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            api_url,
            auth,
            page_size: PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn auth(&self) -> &OAuthClient {
        &self.auth
    }

    /// Authenticated GET. An HTTP 401 triggers exactly one refresh and one
    /// retry; a second 401 is returned to the caller.
    #[tracing::instrument(skip(self, query))]
    async fn get<T: DeserializeOwned>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.api_url, path);
        let mut refreshed = false;

        loop {
            let token = self.auth.access_token(true).await?;
            let res = self
                .http
                .get(&url)
                .query(query)
                .bearer_auth(&token)
                .send()
                .await?;

            let status = res.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("request unauthorized, refreshing access token and retrying once");
                self.auth.refresh().await?;
                refreshed = true;
                continue;
            }

            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = res.text().await?;
            return serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()));
        }
    }
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn created_at(record: &serde_json::Value) -> Option<DateTime<Utc>> {
    record
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl AccountSource for RevolutClient {
    async fn accounts(&mut self) -> Result<Vec<Account>, ApiError> {
        self.get("/accounts", &[]).await
    }

    async fn rate(
        &mut self,
        from: &str,
        to: &str,
        amount: Option<Decimal>,
    ) -> Result<ExchangeRate, ApiError> {
        let mut query = vec![("from", from.to_string()), ("to", to.to_string())];
        if let Some(amount) = amount {
            query.push(("amount", amount.to_string()));
        }

        self.get("/rate", &query).await
    }
}

#[async_trait]
impl TransactionSource for RevolutClient {
    /// Walks backwards from `to` one page at a time. The provider returns
    /// newest first, so the next page ends at the oldest record seen.
    async fn records(
        &mut self,
        kind: RecordKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut upper = to;

        loop {
            let mut query = vec![
                ("from", timestamp(from)),
                ("to", timestamp(upper)),
                ("count", self.page_size.to_string()),
            ];
            if let Some(kind) = kind.type_filter() {
                query.push(("type", kind.to_string()));
            }

            let page: Vec<serde_json::Value> = self.get("/transactions", &query).await?;
            let full_page = page.len() >= self.page_size;
            let oldest = page.iter().filter_map(created_at).min();

            let mut added = 0;
            for record in page {
                let id = record.get("id").and_then(|v| v.as_str()).map(str::to_string);
                if let Some(id) = id {
                    if !seen.insert(id) {
                        continue;
                    }
                }
                records.push(record);
                added += 1;
            }
            debug!(added, upper = %timestamp(upper), "fetched page");

            match oldest {
                Some(oldest) if full_page && added > 0 && oldest < upper => upper = oldest,
                _ => break,
            }
        }

        info!(count = records.len(), kind = kind.noun(), "fetched records");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::OnceLock;

    use chrono::TimeZone;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use revolut_oauth::{CredentialStore, KeyMaterial, OAuthConfig, TokenData};
    use serde_json::json;

    use super::*;

    fn cert_dir() -> &'static Path {
        static DIR: OnceLock<PathBuf> = OnceLock::new();
        DIR.get_or_init(|| {
            let dir = tempfile::tempdir().unwrap().into_path();
            KeyMaterial::new(&dir, Default::default()).ensure().unwrap();
            dir
        })
    }

    fn client(server: &MockServer, dir: &Path) -> RevolutClient {
        let token_file = dir.join("tokens.json");
        let token = TokenData::issue(
            "old-access".into(),
            Some("refresh-1".into()),
            "bearer".into(),
            2400,
            Utc::now(),
        )
        .unwrap();
        CredentialStore::new(&token_file).save(&token).unwrap();

        let config = OAuthConfig {
            base_url: server.base_url(),
            ..OAuthConfig::new("client-123", cert_dir().to_path_buf(), token_file)
        };
        RevolutClient::new(OAuthClient::new(config).unwrap()).unwrap()
    }

    async fn token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/1.0/auth/token")
                    .body_includes("grant_type=refresh_token");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        json!({"access_token": "new-access", "token_type": "bearer", "expires_in": 2399})
                            .to_string(),
                    );
            })
            .await
    }

    #[tokio::test]
    async fn unauthorized_request_refreshes_once_and_retries() {
        let server = MockServer::start_async().await;
        let stale = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/accounts")
                    .header("authorization", "Bearer old-access");
                then.status(401).body("{\"message\":\"expired\"}");
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/accounts")
                    .header("authorization", "Bearer new-access");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        json!([{"id": "acc-1", "name": "Main", "balance": 1200.5, "currency": "SEK", "state": "active", "public": false}])
                            .to_string(),
                    );
            })
            .await;
        let refresh = token_endpoint(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let mut client = client(&server, dir.path());
        let accounts = client.accounts().await.unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].currency, "SEK");
        stale.assert_calls_async(1).await;
        refresh.assert_calls_async(1).await;
        fresh.assert_calls_async(1).await;
        assert_eq!(client.auth().token().unwrap().access_token, "new-access");
        assert_eq!(
            client.auth().token().unwrap().refresh_token.as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn second_unauthorized_is_propagated() {
        let server = MockServer::start_async().await;
        let accounts = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/1.0/accounts");
                then.status(401).body("unauthorized");
            })
            .await;
        let refresh = token_endpoint(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server, dir.path()).accounts().await.unwrap_err();

        assert!(matches!(err, ApiError::Status { status: 401, .. }));
        accounts.assert_calls_async(2).await;
        refresh.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let server = MockServer::start_async().await;
        let rate = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/rate")
                    .query_param("from", "EUR")
                    .query_param("to", "SEK");
                then.status(503).body("maintenance");
            })
            .await;
        let refresh = token_endpoint(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server, dir.path())
            .rate("EUR", "SEK", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Status { status: 503, ref body } if body == "maintenance"));
        rate.assert_calls_async(1).await;
        refresh.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn pages_backwards_and_drops_repeats() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/transactions")
                    .query_param("type", "exchange")
                    .query_param("count", "2")
                    .query_param("to", "2024-01-31T00:00:00Z");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        json!([
                            {"id": "tx-3", "created_at": "2024-01-20T09:00:00Z"},
                            {"id": "tx-2", "created_at": "2024-01-10T09:00:00Z"}
                        ])
                        .to_string(),
                    );
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/transactions")
                    .query_param("to", "2024-01-10T09:00:00Z");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        json!([
                            {"id": "tx-2", "created_at": "2024-01-10T09:00:00Z"},
                            {"id": "tx-1", "created_at": "2024-01-02T09:00:00Z"}
                        ])
                        .to_string(),
                    );
            })
            .await;
        let third = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/1.0/transactions")
                    .query_param("to", "2024-01-02T09:00:00Z");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("[]");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut client = client(&server, dir.path()).with_page_size(2);
        let records = client
            .records(
                RecordKind::Exchanges,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["tx-3", "tx-2", "tx-1"]);
        first.assert_calls_async(1).await;
        second.assert_calls_async(1).await;
        third.assert_calls_async(1).await;
    }
}
