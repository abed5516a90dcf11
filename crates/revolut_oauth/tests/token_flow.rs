use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use httpmock::Method::POST;
use httpmock::MockServer;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use revolut_oauth::{
    AssertionSigner, AuthState, Claims, CredentialStore, Error, OAuthClient, OAuthConfig, TokenData,
};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::json;

const TOKEN_PATH: &str = "/api/1.0/auth/token";

/// Key generation is slow, so every test signs with the same pair.
fn shared_cert_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap().into_path();
        revolut_oauth::KeyMaterial::new(&dir, Default::default())
            .ensure()
            .unwrap();
        dir
    })
}

fn test_config(base_url: String, token_file: PathBuf) -> OAuthConfig {
    OAuthConfig {
        base_url,
        redirect_uri: "https://books.example.se:8443/callback".to_string(),
        ..OAuthConfig::new("client-123", shared_cert_dir().to_path_buf(), token_file)
    }
}

fn stored_token(refresh_token: Option<&str>, issued: chrono::DateTime<Utc>) -> TokenData {
    TokenData::issue(
        "old-access".into(),
        refresh_token.map(str::to_string),
        "bearer".into(),
        2400,
        issued,
    )
    .unwrap()
}

#[tokio::test]
async fn exchange_code_stores_credential() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .body_includes("grant_type=authorization_code")
                .body_includes("code=oa_prod_code")
                .body_includes("client_assertion=");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "access_token": "new-access",
                        "token_type": "bearer",
                        "expires_in": 2399,
                        "refresh_token": "new-refresh"
                    })
                    .to_string(),
                );
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    let mut client = OAuthClient::new(test_config(server.base_url(), token_file.clone())).unwrap();
    assert_eq!(client.state(), AuthState::Unauthenticated);

    let token = client.exchange_code("oa_prod_code").await.unwrap().clone();
    mock.assert_async().await;

    assert_eq!(token.access_token, "new-access");
    assert_eq!(token.refresh_token.as_deref(), Some("new-refresh"));
    assert_eq!((token.expires_at - token.issued_at).num_seconds(), 2399);
    assert_eq!(client.state(), AuthState::Authenticated);
    assert_eq!(CredentialStore::new(token_file).load(), Some(token));
}

#[tokio::test]
async fn exchange_code_failure_is_auth_exchange_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(400).body("{\"error\":\"invalid_grant\"}");
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut client =
        OAuthClient::new(test_config(server.base_url(), dir.path().join("tokens.json"))).unwrap();

    let err = client.exchange_code("bad").await.unwrap_err();
    assert!(matches!(err, Error::AuthExchange { status: 400, ref body } if body.contains("invalid_grant")));
    assert!(client.token().is_none());
}

#[tokio::test]
async fn refresh_retains_previous_refresh_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .body_includes("grant_type=refresh_token")
                .body_includes("refresh_token=keep-me");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "access_token": "refreshed-access",
                        "token_type": "bearer",
                        "expires_in": 2399
                    })
                    .to_string(),
                );
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    CredentialStore::new(&token_file)
        .save(&stored_token(Some("keep-me"), Utc::now()))
        .unwrap();

    let mut client = OAuthClient::new(test_config(server.base_url(), token_file.clone())).unwrap();
    client.refresh().await.unwrap();
    mock.assert_async().await;

    let saved = CredentialStore::new(token_file).load().unwrap();
    assert_eq!(saved.access_token, "refreshed-access");
    assert_eq!(saved.refresh_token.as_deref(), Some("keep-me"));
}

#[tokio::test]
async fn refresh_without_refresh_token_leaves_store_untouched() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    CredentialStore::new(&token_file)
        .save(&stored_token(None, Utc::now()))
        .unwrap();
    let before = std::fs::read(&token_file).unwrap();

    let mut client = OAuthClient::new(test_config(server.base_url(), token_file.clone())).unwrap();
    let err = client.refresh().await.unwrap_err();

    assert!(matches!(err, Error::NoRefreshToken));
    assert_eq!(std::fs::read(&token_file).unwrap(), before);
    assert_eq!(client.token().unwrap().access_token, "old-access");
    mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_token_is_refreshed_on_access() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .body_includes("grant_type=refresh_token");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "access_token": "fresh-access",
                        "token_type": "bearer",
                        "expires_in": 2399,
                        "refresh_token": "rotated-refresh"
                    })
                    .to_string(),
                );
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    CredentialStore::new(&token_file)
        .save(&stored_token(Some("old-refresh"), Utc::now() - Duration::hours(1)))
        .unwrap();

    let mut client = OAuthClient::new(test_config(server.base_url(), token_file)).unwrap();
    assert_eq!(client.state(), AuthState::Expired);

    assert!(matches!(
        client.access_token(false).await,
        Err(Error::TokenExpired)
    ));
    mock.assert_calls_async(0).await;

    assert_eq!(client.access_token(true).await.unwrap(), "fresh-access");
    mock.assert_async().await;
    assert_eq!(
        client.token().unwrap().refresh_token.as_deref(),
        Some("rotated-refresh")
    );
}

#[tokio::test]
async fn access_token_without_credential_is_not_authenticated() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = OAuthClient::new(test_config(
        "http://127.0.0.1:9".to_string(),
        dir.path().join("tokens.json"),
    ))
    .unwrap();

    assert!(matches!(
        client.access_token(true).await,
        Err(Error::NotAuthenticated)
    ));
}

#[test]
fn logout_clears_credential() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    CredentialStore::new(&token_file)
        .save(&stored_token(Some("r"), Utc::now()))
        .unwrap();

    let mut client =
        OAuthClient::new(test_config("http://127.0.0.1:9".to_string(), token_file.clone())).unwrap();
    assert!(client.is_authenticated());

    client.logout().unwrap();
    client.logout().unwrap();

    assert!(!token_file.exists());
    assert_eq!(client.state(), AuthState::Unauthenticated);
}

#[test]
fn authorization_url_carries_client_and_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let client = OAuthClient::new(test_config(
        "https://sandbox-b2b.revolut.com".to_string(),
        dir.path().join("tokens.json"),
    ))
    .unwrap();

    let url = client.authorization_url(Some("READ,WRITE")).unwrap();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    assert_eq!(url.path(), "/app-confirm");
    assert!(pairs.contains(&("client_id".into(), "client-123".into())));
    assert!(pairs.contains(&(
        "redirect_uri".into(),
        "https://books.example.se:8443/callback".into()
    )));
    assert!(pairs.contains(&("response_type".into(), "code".into())));
    assert!(pairs.contains(&("scope".into(), "READ,WRITE".into())));
}

#[test]
fn empty_client_id_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = OAuthConfig {
        client_id: " ".into(),
        ..test_config("http://127.0.0.1:9".into(), dir.path().join("tokens.json"))
    };

    assert!(matches!(
        OAuthClient::new(config).err().unwrap(),
        Error::Configuration(_)
    ));
}

#[test]
fn signed_assertion_has_three_segments_and_verifies() {
    let key_pem = std::fs::read_to_string(shared_cert_dir().join("privatecert.pem")).unwrap();
    let signer = AssertionSigner::from_pem(&key_pem).unwrap();
    let now = Utc::now();

    let jwt = signer
        .sign("client-123", "https://revolut.com", "books.example.se", 300, now)
        .unwrap();

    let segments: Vec<&str> = jwt.split('.').collect();
    assert_eq!(segments.len(), 3);
    for segment in &segments {
        assert!(URL_SAFE_NO_PAD.decode(segment).is_ok());
    }

    let header: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
    assert_eq!(header["alg"], "RS256");
    assert_eq!(header["typ"], "JWT");

    let claims: Claims =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
    assert_eq!(
        claims,
        Claims {
            iss: "books.example.se".into(),
            sub: "client-123".into(),
            aud: "https://revolut.com".into(),
            exp: now.timestamp() + 300,
        }
    );

    let public_pem = rsa::RsaPrivateKey::from_pkcs8_pem(&key_pem)
        .unwrap()
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["https://revolut.com"]);
    let decoded = jsonwebtoken::decode::<Claims>(
        &jwt,
        &DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap();
    assert_eq!(decoded.claims.sub, "client-123");
}
