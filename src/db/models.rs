use crate::ml_oauth::credentials::MlCredential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbCredential {
    pub ml_user_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbCredential> for MlCredential {
    fn from(d: DbCredential) -> Self {
        MlCredential {
            account_id: d.ml_user_id,
            access_token: d.access_token,
            refresh_token: d.refresh_token,
            expires_at: d.expires_at,
        }
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    Auto,
    Manual,
}

impl AnswerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerMode::Auto => "auto",
            AnswerMode::Manual => "manual",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(AnswerMode::Auto),
            "manual" => Ok(AnswerMode::Manual),
            other => Err(format!("unknown answer mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbAnswer {
    pub question_id: i64,
    pub ml_user_id: i64,
    pub final_text: String,
    pub mode: AnswerMode,
    pub answered_at: DateTime<Utc>,
}
