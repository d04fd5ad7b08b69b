use crate::middleware::webhook_payload::WebhookPayload;
use crate::router::AppState;
use crate::service::question_flow::{WebhookOutcome, process_notification};
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, error, warn};

/// POST /ml/webhook -> always acknowledged with 200; failures are logged and dropped.
pub async fn receive(
    State(state): State<AppState>,
    payload: WebhookPayload,
) -> (StatusCode, &'static str) {
    let notification = match payload {
        WebhookPayload::Parsed(n) => n,
        WebhookPayload::Malformed(reason) => {
            warn!(%reason, "unreadable webhook payload acknowledged");
            return (StatusCode::OK, "OK");
        }
    };

    match process_notification(&state, &notification).await {
        Ok(WebhookOutcome::Answered { question_id }) => {
            debug!(question_id, "webhook processed");
        }
        Ok(outcome) => {
            debug!(?outcome, "webhook acknowledged without action");
        }
        Err(e) => {
            error!(
                error = %e,
                topic = ?notification.topic(),
                resource = ?notification.resource,
                user_id = ?notification.user_id,
                "webhook processing failed"
            );
        }
    }
    (StatusCode::OK, "OK")
}
