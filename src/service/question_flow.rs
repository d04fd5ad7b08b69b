use crate::api::AnswerContext;
use crate::api::generator::sanitize_answer;
use crate::db::{AnswerMode, DbAnswer};
use crate::error::AutoreplyError;
use crate::router::AppState;
use crate::types::ml::{AnswerSubmission, Notification};

use chrono::Utc;
use tracing::{debug, info};

/// Where a notification stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a question notification, or not addressed to a known account.
    Ignored { reason: &'static str },
    /// No stored credential for the account.
    NoCredential { account_id: i64 },
    Answered { question_id: i64 },
}

/// Run one question notification through fetch, generate, answer and record.
pub async fn process_notification(
    state: &AppState,
    notification: &Notification,
) -> Result<WebhookOutcome, AutoreplyError> {
    if !notification.is_question_topic() {
        debug!(topic = ?notification.topic(), "ignoring non-question notification");
        return Ok(WebhookOutcome::Ignored {
            reason: "topic is not a question notification",
        });
    }
    let Some(question_id) = notification.question_id() else {
        debug!(resource = ?notification.resource, "ignoring unrecognized resource");
        return Ok(WebhookOutcome::Ignored {
            reason: "resource is not a question path",
        });
    };
    let Some(account_id) = notification.user_id else {
        return Ok(WebhookOutcome::Ignored {
            reason: "notification carries no user_id",
        });
    };

    if state.storage.get_credential(account_id).await?.is_none() {
        info!(account_id, question_id, "no credential for account; skipping");
        return Ok(WebhookOutcome::NoCredential { account_id });
    }

    let question = state.api.get_question(account_id, question_id).await?;
    let item = state.api.get_item(account_id, &question.item_id).await?;

    let ctx = AnswerContext::from_listing(&question, &item);
    let text = state.generator.generate(&ctx).await;

    record_answer(state, account_id, question_id, &text, AnswerMode::Auto).await?;
    info!(account_id, question_id, item_id = %item.id, "question answered");
    Ok(WebhookOutcome::Answered { question_id })
}

/// Submit `text` as the answer to `question_id` and upsert its Answer Record.
pub async fn record_answer(
    state: &AppState,
    account_id: i64,
    question_id: i64,
    text: &str,
    mode: AnswerMode,
) -> Result<DbAnswer, AutoreplyError> {
    let text = sanitize_answer(text);
    if text.is_empty() {
        return Err(AutoreplyError::InvalidPayload("answer text is empty".into()));
    }

    state
        .api
        .post_answer(
            account_id,
            &AnswerSubmission {
                question_id,
                text: text.clone(),
            },
        )
        .await?;

    let answer = DbAnswer {
        question_id,
        ml_user_id: account_id,
        final_text: text,
        mode,
        answered_at: Utc::now(),
    };
    state.storage.upsert_answer(&answer).await?;
    Ok(answer)
}
