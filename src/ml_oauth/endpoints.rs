use crate::config::Config;
use crate::error::{AutoreplyError, OauthError};
use crate::types::ml::deserialize_opt_i64_lax;

use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret,
    CsrfToken, EndpointNotSet, EndpointSet, ExtraTokenFields, RedirectUrl, RefreshToken,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use url::Url;

/// OAuth application settings, validated out of [`Config`].
#[derive(Debug, Clone)]
pub struct OauthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_uri: Url,
}

impl OauthSettings {
    pub fn from_config(cfg: &Config) -> Result<Self, AutoreplyError> {
        let missing = cfg.missing_oauth_keys();
        match (&cfg.ml_client_id, &cfg.ml_client_secret, &cfg.ml_redirect_uri) {
            (Some(id), Some(secret), Some(redirect)) if missing.is_empty() => Ok(Self {
                client_id: id.clone(),
                client_secret: secret.clone(),
                auth_url: cfg.ml_auth_url.clone(),
                token_url: cfg.ml_token_url.clone(),
                redirect_uri: redirect.clone(),
            }),
            _ => Err(AutoreplyError::MissingConfig(missing)),
        }
    }
}

/// What the token endpoint handed out, independent of the oauth2 response type.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    /// Marketplace account the token belongs to.
    pub user_id: Option<i64>,
}

impl From<&MlTokenResponse> for TokenGrant {
    fn from(resp: &MlTokenResponse) -> Self {
        Self {
            access_token: resp.access_token().secret().to_string(),
            refresh_token: resp.refresh_token().map(|t| t.secret().to_string()),
            expires_in: resp.expires_in(),
            user_id: resp.extra_fields().user_id,
        }
    }
}

/// Stateless marketplace OAuth endpoints.
pub(crate) struct MlOauthEndpoints;

impl MlOauthEndpoints {
    /// Consent page URL carrying `client_id`, `redirect_uri` and a random `state`.
    pub(crate) fn build_authorize_url(
        settings: &OauthSettings,
    ) -> Result<(Url, CsrfToken), AutoreplyError> {
        let client = build_oauth2_client(settings)?;
        Ok(client.authorize_url(CsrfToken::new_random).url())
    }

    pub(crate) async fn exchange_authorization_code(
        settings: &OauthSettings,
        code: AuthorizationCode,
        http_client: &reqwest::Client,
    ) -> Result<TokenGrant, OauthError> {
        let client = build_oauth2_client(settings).map_err(|e| OauthError::Other {
            message: format!("failed to build oauth2 client: {e}"),
        })?;
        let token_result: MlTokenResponse =
            client.exchange_code(code).request_async(http_client).await?;
        info!("Authorization code exchanged successfully");
        Ok(TokenGrant::from(&token_result))
    }

    pub(crate) async fn refresh_access_token(
        settings: &OauthSettings,
        refresh_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<TokenGrant, OauthError> {
        let client = build_oauth2_client(settings).map_err(|e| OauthError::Other {
            message: format!("failed to build oauth2 client: {e}"),
        })?;
        let token_result: MlTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(http_client)
            .await?;
        Ok(TokenGrant::from(&token_result))
    }
}

/// The marketplace expects client credentials in the form body, not in Basic auth.
fn build_oauth2_client(settings: &OauthSettings) -> Result<MlOauth2Client, AutoreplyError> {
    let client = OAuth2Client::new(ClientId::new(settings.client_id.clone()))
        .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_auth_uri(AuthUrl::new(settings.auth_url.to_string())?)
        .set_token_uri(TokenUrl::new(settings.token_url.to_string())?)
        .set_redirect_uri(RedirectUrl::new(settings.redirect_uri.to_string())?);
    Ok(client)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct MlTokenFields {
    #[serde(default, deserialize_with = "deserialize_opt_i64_lax")]
    pub user_id: Option<i64>,
}
impl ExtraTokenFields for MlTokenFields {}

pub(crate) type MlTokenResponse = StandardTokenResponse<MlTokenFields, BasicTokenType>;

pub(crate) type MlOauth2Client = OAuth2Client<
    BasicErrorResponse,
    MlTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
