//! Shared fixtures: a recording mock of the token endpoint, marketplace API
//! and generation endpoint, plus isolated app states on temp SQLite files.
#![allow(dead_code)]

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::{Path, State},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration as ChronoDuration, Utc};
use ml_autoreply::config::Config;
use ml_autoreply::router::{AppState, app_router};
use ml_autoreply::{MlCredential, db::Storage};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

pub const ACCOUNT_ID: i64 = 42;
pub const ADMIN_KEY: &str = "admin-secret";
pub const GENERATED_TEXT: &str = "¡Hola! Sí, tenemos stock. Consultanos por WhatsApp.";

#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }
}

#[derive(Clone)]
pub struct MockUpstream {
    reqs: Arc<Mutex<Vec<Captured>>>,
    valid_tokens: Arc<Mutex<HashSet<String>>>,
    reject_everything: Arc<AtomicBool>,
    generation_fails: Arc<AtomicBool>,
    refresh_mode: Arc<Mutex<RefreshMode>>,
}

/// How the token endpoint answers `grant_type=refresh_token`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    #[default]
    Grant,
    InvalidGrant,
    NoAccessToken,
}

impl Default for MockUpstream {
    fn default() -> Self {
        let valid = ["access-from-code", "access-refreshed", "fresh-token"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            reqs: Arc::default(),
            valid_tokens: Arc::new(Mutex::new(valid)),
            reject_everything: Arc::default(),
            generation_fails: Arc::default(),
            refresh_mode: Arc::default(),
        }
    }
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<Captured> {
        self.reqs.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Captured> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn token_requests(&self, grant_type: &str) -> Vec<Captured> {
        self.requests_to(Method::POST, "/oauth/token")
            .into_iter()
            .filter(|r| r.form().get("grant_type").map(String::as_str) == Some(grant_type))
            .collect()
    }

    /// Every marketplace API call answers 401, whatever the token.
    pub fn reject_all_tokens(&self) {
        self.reject_everything.store(true, Ordering::SeqCst);
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn fail_generation(&self) {
        self.generation_fails.store(true, Ordering::SeqCst);
    }

    fn record(&self, method: Method, path: String, headers: &HeaderMap, body: &[u8]) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.reqs.lock().unwrap().push(Captured {
            method,
            path,
            authorization,
            body: body.to_vec(),
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if self.reject_everything.load(Ordering::SeqCst) {
            return false;
        }
        let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        self.valid_tokens.lock().unwrap().contains(token)
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "invalid access token", "error": "not_found", "status": 401})),
    )
        .into_response()
}

async fn token_endpoint(
    State(mock): State<MockUpstream>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record(Method::POST, "/oauth/token".into(), &headers, &body);
    let form: HashMap<String, String> = url::form_urlencoded::parse(&body).into_owned().collect();

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") if form.get("code").map(String::as_str) == Some("bad-code") => {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant", "error_description": "code expired"})),
            )
                .into_response()
        }
        Some("authorization_code") => Json(json!({
            "access_token": "access-from-code",
            "token_type": "bearer",
            "expires_in": 21600,
            "scope": "offline_access read write",
            "user_id": ACCOUNT_ID,
            "refresh_token": "refresh-from-code"
        }))
        .into_response(),
        Some("refresh_token") => refresh_response(*mock.refresh_mode.lock().unwrap()),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        )
            .into_response(),
    }
}

fn refresh_response(mode: RefreshMode) -> Response {
    match mode {
        // No new refresh token: the stored one must survive.
        RefreshMode::Grant => Json(json!({
            "access_token": "access-refreshed",
            "token_type": "bearer",
            "expires_in": 21600,
            "user_id": ACCOUNT_ID
        }))
        .into_response(),
        RefreshMode::InvalidGrant => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "refresh token revoked"})),
        )
            .into_response(),
        RefreshMode::NoAccessToken => Json(json!({
            "token_type": "bearer",
            "expires_in": 21600,
            "user_id": ACCOUNT_ID
        }))
        .into_response(),
    }
}

async fn question_endpoint(
    State(mock): State<MockUpstream>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    mock.record(Method::GET, format!("/questions/{id}"), &headers, &[]);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": id,
        "text": "¿Tenés stock del talle M?",
        "item_id": "MLA123",
        "seller_id": ACCOUNT_ID,
        "status": "UNANSWERED"
    }))
    .into_response()
}

async fn item_endpoint(
    State(mock): State<MockUpstream>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    mock.record(Method::GET, format!("/items/{id}"), &headers, &[]);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": id,
        "title": "Remera algodón peinado",
        "price": 8999.0,
        "currency_id": "ARS",
        "shipping": {"mode": "me2", "free_shipping": true},
        "variations": [{"id": 1}, {"id": 2}]
    }))
    .into_response()
}

async fn answers_endpoint(
    State(mock): State<MockUpstream>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record(Method::POST, "/answers".into(), &headers, &body);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    let submitted: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({
        "id": submitted["question_id"],
        "answer": {"text": submitted["text"], "status": "ACTIVE"}
    }))
    .into_response()
}

async fn generation_endpoint(
    State(mock): State<MockUpstream>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record(Method::POST, "/generate".into(), &headers, &body);
    if mock.generation_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Model is currently loading"})),
        )
            .into_response();
    }
    Json(json!([{"generated_text": GENERATED_TEXT}])).into_response()
}

pub async fn spawn_test_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{}", addr)).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

pub async fn spawn_mock_upstream() -> (MockUpstream, Url) {
    let mock = MockUpstream::default();
    let app = Router::new()
        .route("/oauth/token", post(token_endpoint))
        .route("/questions/{id}", get(question_endpoint))
        .route("/items/{id}", get(item_endpoint))
        .route("/answers", post(answers_endpoint))
        .route("/generate", post(generation_endpoint))
        .with_state(mock.clone());
    let base = spawn_test_server(app).await;
    (mock, base)
}

pub fn unique_sqlite_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "ml-autoreply-{prefix}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    temp_path
}

/// Fully configured settings pointing every upstream at `upstream`.
pub fn test_config(prefix: &str, upstream: &Url) -> Config {
    let db_path = unique_sqlite_path(prefix);
    Config {
        database_url: format!("sqlite:{}", db_path.display()),
        ml_client_id: Some("123456".into()),
        ml_client_secret: Some("client-secret".into()),
        ml_redirect_uri: Some(Url::parse("https://bot.example/ml/callback").unwrap()),
        ml_auth_url: Url::parse("http://auth.test/authorization").unwrap(),
        ml_token_url: upstream.join("/oauth/token").unwrap(),
        ml_api_url: upstream.clone(),
        hf_token: Some("hf-test-token".into()),
        generation_url: upstream.join("/generate").unwrap(),
        generation_rate_per_minute: 600,
        http_timeout_secs: 10,
        admin_key: Some(ADMIN_KEY.into()),
        ..Config::default()
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub mock: MockUpstream,
}

impl TestApp {
    pub async fn new(prefix: &str) -> Self {
        let (mock, base) = spawn_mock_upstream().await;
        Self::with_config(test_config(prefix, &base), mock).await
    }

    pub async fn with_config(cfg: Config, mock: MockUpstream) -> Self {
        let state = AppState::build(&cfg).await.expect("build app state");
        let app = app_router(state.clone());
        Self { app, state, mock }
    }

    pub fn storage(&self) -> &Storage {
        &self.state.storage
    }

    /// Store a credential for [`ACCOUNT_ID`] with the given access token.
    pub async fn seed_credential(&self, access_token: &str, refresh_token: Option<&str>) {
        let cred = MlCredential {
            account_id: ACCOUNT_ID,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now() + ChronoDuration::hours(6),
        };
        self.storage()
            .upsert_credential(&cred)
            .await
            .expect("seed credential");
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.expect("request failed");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        (status, headers, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, HeaderMap, Vec<u8>) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("failed to build request"),
        )
        .await
    }
}
