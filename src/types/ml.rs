//! Marketplace payloads: inbound notifications and the API responses the bot reads.

use crate::error::AutoreplyError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Topics that denote a new-question notification.
pub const QUESTION_TOPICS: &[&str] = &["questions", "questions_v2"];

/// Inbound webhook notification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Notification {
    #[serde(default)]
    pub topic: Option<String>,
    /// Some senders name the topic `type`; a few send both.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_i64_lax")]
    pub user_id: Option<i64>,
}

impl Notification {
    /// `topic`, falling back to `type` when `topic` is absent or blank.
    pub fn topic(&self) -> Option<&str> {
        [self.topic.as_deref(), self.kind.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
    }

    pub fn is_question_topic(&self) -> bool {
        self.topic()
            .is_some_and(|t| QUESTION_TOPICS.iter().any(|q| t.eq_ignore_ascii_case(q)))
    }

    /// Question id taken from the trailing segment of a `/questions/{id}` resource.
    pub fn question_id(&self) -> Option<i64> {
        self.resource.as_deref().and_then(question_id_from_resource)
    }
}

pub fn question_id_from_resource(resource: &str) -> Option<i64> {
    let path = resource.split(['?', '#']).next()?.trim().trim_end_matches('/');
    let mut segments = path.rsplit('/');
    let id = segments.next()?;
    if segments.next()? != "questions" {
        return None;
    }
    id.parse::<i64>().ok().filter(|id| *id > 0)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub item_id: String,
    #[serde(default)]
    pub seller_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Question {
    pub fn from_value(value: Value) -> Result<Self, AutoreplyError> {
        let q: Self = parse_upstream("question", value)?;
        if q.item_id.trim().is_empty() {
            return Err(AutoreplyError::InvalidPayload(format!(
                "question {} has no item_id",
                q.id
            )));
        }
        Ok(q)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Shipping {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub free_shipping: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub shipping: Option<Shipping>,
    #[serde(default)]
    pub variations: Option<Vec<Value>>,
}

impl Item {
    pub fn from_value(value: Value) -> Result<Self, AutoreplyError> {
        let item: Self = parse_upstream("item", value)?;
        if item.title.trim().is_empty() {
            return Err(AutoreplyError::InvalidPayload(format!(
                "item {} has an empty title",
                item.id
            )));
        }
        Ok(item)
    }

    /// Number of variations, only when the listing has any.
    pub fn variation_count(&self) -> Option<usize> {
        self.variations.as_ref().map(Vec::len).filter(|n| *n > 0)
    }
}

/// Body of `POST /answers`.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSubmission {
    pub question_id: i64,
    pub text: String,
}

fn parse_upstream<T: DeserializeOwned>(what: &str, value: Value) -> Result<T, AutoreplyError> {
    serde_json::from_value(value)
        .map_err(|e| AutoreplyError::InvalidPayload(format!("malformed {what} response: {e}")))
}

/// Account ids arrive as numbers from some senders and as strings from others.
pub(crate) fn deserialize_opt_i64_lax<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;

    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected an integer id")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("expected a numeric id string")),
        _ => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

pub(crate) fn deserialize_i64_lax<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_opt_i64_lax(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected an id, found null"))
}
