use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use std::convert::Infallible;

use crate::types::ml::Notification;

/// Webhook body as far as it could be understood.
///
/// Never rejects: the notification contract expects a 200 even for bodies
/// we cannot read, so parse failures are handed to the handler to log.
#[derive(Debug)]
pub enum WebhookPayload {
    Parsed(Notification),
    Malformed(String),
}

impl<S> FromRequest<S> for WebhookPayload
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Senders are inconsistent about content-type, so read bytes and parse ourselves.
        let bytes = match Bytes::from_request(req, state).await {
            Ok(b) => b,
            Err(rejection) => return Ok(Self::Malformed(rejection.body_text())),
        };
        if bytes.is_empty() {
            return Ok(Self::Malformed("empty body".to_string()));
        }
        match serde_json::from_slice::<Notification>(&bytes) {
            Ok(n) => Ok(Self::Parsed(n)),
            Err(e) => Ok(Self::Malformed(e.to_string())),
        }
    }
}

