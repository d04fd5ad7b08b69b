use axum::http::{StatusCode, header};
use url::Url;

mod common;
use common::{ACCOUNT_ID, MockUpstream, TestApp, spawn_mock_upstream, test_config};

#[tokio::test]
async fn connect_redirects_to_consent_page() {
    let t = TestApp::new("oauth-connect").await;

    let (status, headers, _) = t.get("/ml/connect").await;
    assert!(status.is_redirection());

    let location = headers
        .get(header::LOCATION)
        .expect("missing location header")
        .to_str()
        .expect("location header was not utf-8");
    assert!(location.starts_with("http://auth.test/authorization"));

    let url = Url::parse(location).unwrap();
    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    assert_eq!(params.get("client_id").map(String::as_str), Some("123456"));
    assert_eq!(
        params.get("redirect_uri").map(String::as_str),
        Some("https://bot.example/ml/callback")
    );
    assert!(t.mock.requests().is_empty());
}

#[tokio::test]
async fn connect_without_client_config_is_a_diagnosed_500() {
    let (mock, base) = spawn_mock_upstream().await;
    let mut cfg = test_config("oauth-no-config", &base);
    cfg.ml_client_id = None;
    cfg.ml_redirect_uri = None;
    let t = TestApp::with_config(cfg, mock).await;

    let (status, _, body) = t.get("/ml/connect").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("MISSING_CONFIG"));
    assert!(body.contains("ML_CLIENT_ID"));
    assert!(body.contains("ML_REDIRECT_URI"));
    assert!(!body.contains("ML_CLIENT_SECRET"));

    let (status, _, _) = t.get("/ml/callback?code=TG-abc").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn callback_without_code_is_rejected() {
    let t = TestApp::new("oauth-no-code").await;

    let (status, _, body) = t.get("/ml/callback").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("AUTH_EXCHANGE_FAILED"));

    let (status, _, _) = t.get("/ml/callback?code=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = t.get("/ml/callback?error=access_denied").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.mock.requests().is_empty());
}

#[tokio::test]
async fn callback_stores_credential_and_rejects_replay() {
    let t = TestApp::new("oauth-callback").await;

    let (status, _, body) = t.get("/ml/callback?code=TG-abc123").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("42"));

    let exchanges = t.mock.token_requests("authorization_code");
    assert_eq!(exchanges.len(), 1);
    let form = exchanges[0].form();
    assert_eq!(form.get("code").map(String::as_str), Some("TG-abc123"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("123456"));
    assert_eq!(form.get("client_secret").map(String::as_str), Some("client-secret"));
    assert_eq!(
        form.get("redirect_uri").map(String::as_str),
        Some("https://bot.example/ml/callback")
    );

    let stored = t.storage().get_credential(ACCOUNT_ID).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-from-code");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-from-code"));
    assert!(stored.expires_at > chrono::Utc::now());

    // Same code inside the replay window never reaches the token endpoint.
    let (status, _, body) = t.get("/ml/callback?code=TG-abc123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("already used"));
    assert_eq!(t.mock.token_requests("authorization_code").len(), 1);
}

#[tokio::test]
async fn rejected_code_is_a_client_error() {
    let t = TestApp::new("oauth-bad-code").await;

    let (status, _, body) = t.get("/ml/callback?code=bad-code").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("AUTH_EXCHANGE_FAILED"));
    assert!(t.storage().get_credential(ACCOUNT_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn unreachable_token_endpoint_is_a_500() {
    let mock = MockUpstream::default();
    let base = Url::parse("http://127.0.0.1:9/").unwrap();
    let t = TestApp::with_config(test_config("oauth-unreachable", &base), mock).await;

    let (status, _, body) = t.get("/ml/callback?code=TG-unreachable").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body).unwrap().contains("INTERNAL_ERROR"));
}
