use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

/// Upstream bodies are kept for diagnostics but never in full.
const BODY_PREVIEW_CHARS: usize = 512;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, ThisError)]
pub enum AutoreplyError {
    /// Bad, replayed or rejected authorization code.
    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    /// No refresh token stored for the account, or the provider returned no access token.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success status from the marketplace API after at most one refresh retry.
    #[error("Upstream error with status {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    /// Text generation failed; recovered by the generator, never surfaced to HTTP callers.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing configuration: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AutoreplyError {
    pub fn upstream(status: StatusCode, body: &str) -> Self {
        AutoreplyError::Upstream {
            status,
            body: preview(body),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AutoreplyError::AuthExchange(_) | AutoreplyError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            AutoreplyError::NotFound(_) => StatusCode::NOT_FOUND,
            AutoreplyError::Unauthorized => StatusCode::UNAUTHORIZED,
            AutoreplyError::Upstream { .. }
            | AutoreplyError::RefreshFailed(_)
            | AutoreplyError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            AutoreplyError::Generation(_)
            | AutoreplyError::MissingConfig(_)
            | AutoreplyError::Actor(_)
            | AutoreplyError::Database(_)
            | AutoreplyError::Json(_)
            | AutoreplyError::UrlParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AutoreplyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = match &self {
            AutoreplyError::AuthExchange(msg) => ApiErrorBody {
                code: "AUTH_EXCHANGE_FAILED".to_string(),
                message: msg.clone(),
            },
            AutoreplyError::InvalidPayload(msg) => ApiErrorBody {
                code: "INVALID_PAYLOAD".to_string(),
                message: msg.clone(),
            },
            AutoreplyError::NotFound(msg) => ApiErrorBody {
                code: "NOT_FOUND".to_string(),
                message: msg.clone(),
            },
            AutoreplyError::Unauthorized => ApiErrorBody {
                code: "UNAUTHORIZED".to_string(),
                message: "Invalid or missing admin key.".to_string(),
            },
            AutoreplyError::MissingConfig(keys) => ApiErrorBody {
                code: "MISSING_CONFIG".to_string(),
                message: format!("Server is missing OAuth configuration: {}", keys.join(", ")),
            },
            AutoreplyError::RefreshFailed(_) => ApiErrorBody {
                code: "REFRESH_FAILED".to_string(),
                message: "Could not refresh the account's access token.".to_string(),
            },
            AutoreplyError::Upstream { status, .. } => ApiErrorBody {
                code: "UPSTREAM_ERROR".to_string(),
                message: format!("Marketplace API answered {status}."),
            },
            AutoreplyError::Reqwest(_) => ApiErrorBody {
                code: "BAD_GATEWAY".to_string(),
                message: "Upstream service is unavailable.".to_string(),
            },
            _ => ApiErrorBody {
                code: "INTERNAL_ERROR".to_string(),
                message: "An internal server error occurred.".to_string(),
            },
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// Failure talking to the OAuth token endpoint, before it is given a meaning
/// (exchange vs refresh) by the caller.
#[derive(Debug, ThisError)]
pub enum OauthError {
    #[error("OAuth2 request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OAuth2 server response error: {error}")]
    ServerResponse { error: String },

    #[error("OAuth2 token endpoint parse error: {message}. Body: {body}")]
    Parse { message: String, body: String },

    #[error("OAuth2 unexpected error: {message}")]
    Other { message: String },
}

impl IsRetryable for OauthError {
    fn is_retryable(&self) -> bool {
        match self {
            OauthError::Request(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            OauthError::ServerResponse { .. } | OauthError::Parse { .. } => false,
            OauthError::Other { .. } => false,
        }
    }
}

type PkgsRequestTokenError = RequestTokenError<
    HttpClientError<ReqwestClientError>,
    StandardErrorResponse<BasicErrorResponseType>,
>;

impl From<PkgsRequestTokenError> for OauthError {
    fn from(e: PkgsRequestTokenError) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => OauthError::ServerResponse {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(wrapper) => match wrapper {
                HttpClientError::Reqwest(real_err) => OauthError::Request(*real_err),
                other => OauthError::Other {
                    message: format!("HttpClientError: {other:?}"),
                },
            },
            RequestTokenError::Parse(parse_err, body) => OauthError::Parse {
                message: parse_err.to_string(),
                body: preview(&String::from_utf8_lossy(&body)),
            },
            RequestTokenError::Other(s) => OauthError::Other { message: s },
        }
    }
}

fn preview(body: &str) -> String {
    body.char_indices()
        .nth(BODY_PREVIEW_CHARS)
        .map(|(idx, _)| format!("{}...<truncated>", &body[..idx]))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_flow_errors_map_to_client_errors() {
        assert_eq!(
            AutoreplyError::AuthExchange("replayed".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AutoreplyError::MissingConfig(vec!["ML_CLIENT_ID"]).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AutoreplyError::upstream(StatusCode::UNAUTHORIZED, "nope").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn upstream_body_is_truncated() {
        let long = "x".repeat(BODY_PREVIEW_CHARS * 2);
        let AutoreplyError::Upstream { body, .. } =
            AutoreplyError::upstream(StatusCode::BAD_REQUEST, &long)
        else {
            panic!("expected upstream error");
        };
        assert!(body.ends_with("...<truncated>"));
        assert!(body.len() < long.len());
    }

    #[test]
    fn server_side_oauth_errors_are_not_retried() {
        let err = OauthError::ServerResponse {
            error: "invalid_grant".into(),
        };
        assert!(!err.is_retryable());
    }
}
