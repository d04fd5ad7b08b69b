use crate::error::{ApiErrorBody, ApiErrorResponse, AutoreplyError};
use crate::router::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /ml/connect -> redirects to the marketplace consent page.
pub async fn connect(State(state): State<AppState>) -> Result<Redirect, AutoreplyError> {
    let url = state.oauth.authorize_url()?;
    info!("Dispatching OAuth redirect");
    Ok(Redirect::temporary(url.as_str()))
}

/// GET /ml/callback -> exchanges the authorization code and stores the credential.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(err) = query.error.as_deref() {
        let detail = query.error_description.as_deref().unwrap_or(err);
        return AutoreplyError::AuthExchange(format!("authorization denied: {detail}"))
            .into_response();
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.trim().is_empty()) else {
        return AutoreplyError::AuthExchange("missing `code` in callback".to_string())
            .into_response();
    };

    match state.oauth.exchange_code(code).await {
        Ok(credential) => {
            info!(account_id = credential.account_id, "OAuth callback stored credential");
            (
                StatusCode::OK,
                format!(
                    "Cuenta {} conectada. Ya podés cerrar esta ventana.",
                    credential.account_id
                ),
            )
                .into_response()
        }
        Err(e) if e.status_code().is_client_error() => {
            warn!(error = %e, "OAuth callback rejected");
            e.into_response()
        }
        Err(e @ AutoreplyError::MissingConfig(_)) => e.into_response(),
        Err(e) => {
            error!(error = %e, "OAuth callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiErrorResponse {
                    error: ApiErrorBody {
                        code: "INTERNAL_ERROR".to_string(),
                        message: "Could not complete the authorization.".to_string(),
                    },
                }),
            )
                .into_response()
        }
    }
}
