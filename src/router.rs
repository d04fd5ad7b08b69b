use crate::api::{AnswerGenerator, MlApiClient};
use crate::config::Config;
use crate::db::Storage;
use crate::error::AutoreplyError;
use crate::handlers::{admin, health, ml_oauth, webhook};
use crate::middleware::admin_auth::RequireAdminKey;
use crate::ml_oauth::OauthService;
use crate::service::replay_actor;
use crate::service::replay_guard::ReplayGuard;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, StatusCode, Version, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use base64::Engine as _;
use rand::RngCore;
use reqwest::header::HeaderValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const USER_AGENT_VALUE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub oauth: OauthService,
    pub api: MlApiClient,
    pub generator: AnswerGenerator,
    pub admin_key: Option<Arc<str>>,
}

impl AppState {
    /// Wire every component from `cfg`: outbound client, database, replay guard actor.
    pub async fn build(cfg: &Config) -> Result<Self, AutoreplyError> {
        let http = build_client(cfg)?;
        let storage = Storage::connect(
            &cfg.database_url,
            Duration::from_secs(cfg.db_connect_timeout_secs),
        )
        .await?;

        let replay = replay_actor::spawn(ReplayGuard::with_system_clock(
            Duration::from_secs(cfg.replay_window_secs),
            cfg.replay_capacity,
        ))
        .await?;

        let oauth = OauthService::new(cfg, http.clone(), storage.clone(), replay);
        let api = MlApiClient::new(
            http.clone(),
            cfg.ml_api_url.clone(),
            storage.clone(),
            oauth.clone(),
        );
        let generator = AnswerGenerator::new(cfg, http);

        Ok(Self {
            storage,
            oauth,
            api,
            generator,
            admin_key: cfg
                .admin_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        })
    }
}

fn build_client(cfg: &Config) -> Result<reqwest::Client, AutoreplyError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT_VALUE)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(cfg.http_timeout_secs));

    if let Some(proxy_url) = cfg.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }

    Ok(builder.build()?)
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    }

    resp
}

pub fn app_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/ml/questions/{question_id}/answer",
            post(admin::manual_answer),
        )
        .route("/ml/answers/{question_id}", get(admin::get_answer))
        .layer(middleware::from_extractor_with_state::<RequireAdminKey, _>(
            state.clone(),
        ));

    Router::new()
        .route("/", get(health::root))
        .route("/healthz", get(health::healthz))
        .route("/ml/connect", get(ml_oauth::connect))
        .route("/ml/callback", get(ml_oauth::callback))
        .route("/ml/webhook", post(webhook::receive))
        .merge(admin)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
