use axum::http::StatusCode;

/// GET / -> liveness text.
pub async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " is running")
}

/// GET /healthz
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
