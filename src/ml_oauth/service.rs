use super::credentials::MlCredential;
use super::endpoints::{MlOauthEndpoints, OauthSettings};
use crate::config::Config;
use crate::db::Storage;
use crate::error::{AutoreplyError, IsRetryable, OauthError};
use crate::service::replay_actor::ReplayGuardHandle;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use oauth2::AuthorizationCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
        .with_jitter()
}

/// OAuth Client: code exchange and refresh, writing through to the Token Store.
#[derive(Clone)]
pub struct OauthService {
    inner: Arc<OauthServiceInner>,
}

struct OauthServiceInner {
    settings: Result<OauthSettings, Vec<&'static str>>,
    http: reqwest::Client,
    storage: Storage,
    replay: ReplayGuardHandle,
    default_ttl: chrono::Duration,
}

impl OauthService {
    pub fn new(
        cfg: &Config,
        http: reqwest::Client,
        storage: Storage,
        replay: ReplayGuardHandle,
    ) -> Self {
        let settings = match OauthSettings::from_config(cfg) {
            Ok(s) => Ok(s),
            Err(AutoreplyError::MissingConfig(keys)) => {
                warn!(missing = ?keys, "OAuth client is not configured");
                Err(keys)
            }
            Err(e) => {
                warn!(error = %e, "OAuth client settings are invalid");
                Err(Vec::new())
            }
        };
        Self {
            inner: Arc::new(OauthServiceInner {
                settings,
                http,
                storage,
                replay,
                default_ttl: chrono::Duration::seconds(cfg.default_token_ttl_secs),
            }),
        }
    }

    fn settings(&self) -> Result<&OauthSettings, AutoreplyError> {
        self.inner
            .settings
            .as_ref()
            .map_err(|keys| AutoreplyError::MissingConfig(keys.clone()))
    }

    /// Consent page URL the connect route redirects to.
    pub fn authorize_url(&self) -> Result<Url, AutoreplyError> {
        let (url, _csrf) = MlOauthEndpoints::build_authorize_url(self.settings()?)?;
        Ok(url)
    }

    /// Exchange an authorization code and persist the resulting credential.
    ///
    /// A code seen within the replay window is rejected before the token endpoint is called.
    pub async fn exchange_code(&self, code: &str) -> Result<MlCredential, AutoreplyError> {
        let settings = self.settings()?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AutoreplyError::AuthExchange(
                "missing authorization code".to_string(),
            ));
        }

        if !self.inner.replay.register(code).await? {
            return Err(AutoreplyError::AuthExchange(
                "authorization code was already used".to_string(),
            ));
        }

        let grant = MlOauthEndpoints::exchange_authorization_code(
            settings,
            AuthorizationCode::new(code.to_string()),
            &self.inner.http,
        )
        .await
        .map_err(exchange_error)?;

        let account_id = grant.user_id.ok_or_else(|| {
            AutoreplyError::AuthExchange("token response carries no user_id".to_string())
        })?;

        let credential =
            MlCredential::from_grant(account_id, grant, Utc::now(), self.inner.default_ttl)
                .ok_or_else(|| {
                    AutoreplyError::AuthExchange("token response carries no access_token".into())
                })?;

        self.inner.storage.upsert_credential(&credential).await?;
        info!(account_id, "account connected");
        Ok(credential)
    }

    /// Mint a new access token from the stored refresh token and persist it.
    pub async fn refresh(&self, account_id: i64) -> Result<String, AutoreplyError> {
        let settings = self.settings()?;
        let refresh_token = self
            .inner
            .storage
            .get_credential(account_id)
            .await?
            .and_then(|c| c.refresh_token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AutoreplyError::NotFound(format!(
                    "no refresh token stored for account {account_id}"
                ))
            })?;

        let http = &self.inner.http;
        let grant = (|| async {
            MlOauthEndpoints::refresh_access_token(settings, &refresh_token, http).await
        })
        .retry(default_retry_policy())
        .when(|e: &OauthError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(account_id, "token refresh retrying after error {}, sleeping {:?}", err, dur);
        })
        .await
        .map_err(|e| AutoreplyError::RefreshFailed(e.to_string()))?;

        let credential =
            MlCredential::from_grant(account_id, grant, Utc::now(), self.inner.default_ttl)
                .ok_or_else(|| {
                    AutoreplyError::RefreshFailed("refresh response carries no access_token".into())
                })?;

        self.inner.storage.upsert_credential(&credential).await?;
        info!(account_id, "access token refreshed");
        Ok(credential.access_token)
    }
}

fn exchange_error(e: OauthError) -> AutoreplyError {
    match e {
        OauthError::Request(err) => AutoreplyError::Reqwest(err),
        other => AutoreplyError::AuthExchange(other.to_string()),
    }
}
