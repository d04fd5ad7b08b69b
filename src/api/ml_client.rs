use crate::db::Storage;
use crate::error::AutoreplyError;
use crate::ml_oauth::OauthService;
use crate::types::ml::{AnswerSubmission, Item, Question};

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// One marketplace API request, replayable as-is after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `questions/555`.
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Authenticated API Client.
///
/// Calls carry the account's stored access token. A 401 triggers exactly one
/// refresh and one retry of the identical request; anything non-2xx after
/// that surfaces as [`AutoreplyError::Upstream`].
#[derive(Clone)]
pub struct MlApiClient {
    http: reqwest::Client,
    base: Url,
    storage: Storage,
    oauth: OauthService,
}

impl MlApiClient {
    pub fn new(http: reqwest::Client, base: Url, storage: Storage, oauth: OauthService) -> Self {
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            http,
            base,
            storage,
            oauth,
        }
    }

    pub async fn call(&self, account_id: i64, req: &ApiRequest) -> Result<Value, AutoreplyError> {
        let token = self
            .storage
            .get_credential(account_id)
            .await?
            .map(|c| c.access_token)
            .ok_or_else(|| {
                AutoreplyError::NotFound(format!("no credential stored for account {account_id}"))
            })?;

        let resp = self.send(req, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::read_json(req, resp).await;
        }

        warn!(account_id, path = %req.path, "access token rejected; refreshing once");
        let token = self.oauth.refresh(account_id).await?;
        let resp = self.send(req, &token).await?;
        Self::read_json(req, resp).await
    }

    pub async fn get_question(
        &self,
        account_id: i64,
        question_id: i64,
    ) -> Result<Question, AutoreplyError> {
        let value = self
            .call(account_id, &ApiRequest::get(format!("questions/{question_id}")))
            .await?;
        Question::from_value(value)
    }

    pub async fn get_item(&self, account_id: i64, item_id: &str) -> Result<Item, AutoreplyError> {
        if item_id.is_empty()
            || !item_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AutoreplyError::InvalidPayload(format!(
                "refusing suspicious item id `{item_id}`"
            )));
        }
        let value = self
            .call(account_id, &ApiRequest::get(format!("items/{item_id}")))
            .await?;
        Item::from_value(value)
    }

    pub async fn post_answer(
        &self,
        account_id: i64,
        answer: &AnswerSubmission,
    ) -> Result<Value, AutoreplyError> {
        let body = serde_json::to_value(answer)?;
        self.call(account_id, &ApiRequest::post("answers", body)).await
    }

    async fn send(
        &self,
        req: &ApiRequest,
        token: &str,
    ) -> Result<reqwest::Response, AutoreplyError> {
        let url = self.base.join(req.path.trim_start_matches('/'))?;
        let mut builder = self
            .http
            .request(req.method.clone(), url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    async fn read_json(req: &ApiRequest, resp: reqwest::Response) -> Result<Value, AutoreplyError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!(%status, method = %req.method, path = %req.path, "marketplace API call failed");
            return Err(AutoreplyError::upstream(status, &text));
        }
        debug!(%status, method = %req.method, path = %req.path, "marketplace API call succeeded");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
