use super::endpoints::TokenGrant;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential of one marketplace account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlCredential {
    pub account_id: i64,
    pub access_token: String,
    /// `None` when the provider did not hand out a (new) refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl MlCredential {
    /// Build a credential from a token grant.
    ///
    /// Expiry is `now + expires_in`, or `now + default_ttl` when the provider
    /// omits it. Returns `None` when the grant carries no usable access token.
    pub fn from_grant(
        account_id: i64,
        grant: TokenGrant,
        now: DateTime<Utc>,
        default_ttl: Duration,
    ) -> Option<Self> {
        if grant.access_token.trim().is_empty() {
            return None;
        }
        let ttl = grant
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or(default_ttl);

        Some(Self {
            account_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.trim().is_empty()),
            expires_at: now + ttl,
        })
    }
}
