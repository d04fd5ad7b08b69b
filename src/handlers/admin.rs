use crate::db::{AnswerMode, DbAnswer};
use crate::error::AutoreplyError;
use crate::router::AppState;
use crate::service::question_flow::record_answer;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ManualAnswerBody {
    #[serde(deserialize_with = "crate::types::ml::deserialize_i64_lax")]
    pub user_id: i64,
    pub text: String,
}

/// POST /ml/questions/{question_id}/answer -> submit a hand-written answer.
pub async fn manual_answer(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    Json(body): Json<ManualAnswerBody>,
) -> Result<Json<DbAnswer>, AutoreplyError> {
    if question_id <= 0 {
        return Err(AutoreplyError::InvalidPayload(format!(
            "invalid question id {question_id}"
        )));
    }
    let answer = record_answer(
        &state,
        body.user_id,
        question_id,
        &body.text,
        AnswerMode::Manual,
    )
    .await?;
    info!(account_id = body.user_id, question_id, "manual answer submitted");
    Ok(Json(answer))
}

/// GET /ml/answers/{question_id}
pub async fn get_answer(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
) -> Result<Json<DbAnswer>, AutoreplyError> {
    state
        .storage
        .get_answer(question_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AutoreplyError::NotFound(format!("no answer recorded for question {question_id}"))
        })
}
