use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::LazyLock;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variables read on top of defaults and `config.toml`.
/// Matching is case-insensitive, so `DATABASE_URL` fills `database_url`.
const ENV_KEYS: &[&str] = &[
    "listen_addr",
    "port",
    "database_url",
    "db_connect_timeout_secs",
    "loglevel",
    "ml_client_id",
    "ml_client_secret",
    "ml_redirect_uri",
    "ml_auth_url",
    "ml_token_url",
    "ml_api_url",
    "hf_token",
    "generation_url",
    "generation_max_new_tokens",
    "generation_temperature",
    "generation_rate_per_minute",
    "replay_window_secs",
    "replay_capacity",
    "default_token_ttl_secs",
    "http_timeout_secs",
    "proxy",
    "admin_key",
];

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server listen address. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port. Env: `PORT`. Default: `3000`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database URL. Env: `DATABASE_URL`.
    pub database_url: String,

    /// Connection establishment timeout for the database pool.
    pub db_connect_timeout_secs: u64,

    /// Fallback log filter when `RUST_LOG` is not set.
    pub loglevel: String,

    /// OAuth application id issued by the marketplace.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub ml_client_id: Option<String>,

    /// OAuth application secret.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub ml_client_secret: Option<String>,

    /// Redirect URI registered for the OAuth application.
    #[serde(default)]
    pub ml_redirect_uri: Option<Url>,

    pub ml_auth_url: Url,
    pub ml_token_url: Url,
    pub ml_api_url: Url,

    /// Bearer token for the hosted text-generation endpoint.
    #[serde(default)]
    pub hf_token: Option<String>,

    pub generation_url: Url,
    pub generation_max_new_tokens: u32,
    pub generation_temperature: f32,

    /// Client-side quota for generation calls.
    pub generation_rate_per_minute: u32,

    /// How long a consumed authorization code is remembered.
    pub replay_window_secs: u64,

    /// Upper bound on remembered authorization codes.
    pub replay_capacity: usize,

    /// Access token lifetime assumed when the provider omits `expires_in`.
    pub default_token_ttl_secs: i64,

    pub http_timeout_secs: u64,

    /// Optional outbound proxy for every upstream call.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Enables the admin routes when set.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub admin_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            port: default_port(),
            database_url: "sqlite://data.db".to_string(),
            db_connect_timeout_secs: 10,
            loglevel: "info".to_string(),
            ml_client_id: None,
            ml_client_secret: None,
            ml_redirect_uri: None,
            ml_auth_url: parse_static("https://auth.mercadolibre.com.ar/authorization"),
            ml_token_url: parse_static("https://api.mercadolibre.com/oauth/token"),
            ml_api_url: parse_static("https://api.mercadolibre.com"),
            hf_token: None,
            generation_url: parse_static(
                "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2",
            ),
            generation_max_new_tokens: 180,
            generation_temperature: 0.4,
            generation_rate_per_minute: 30,
            replay_window_secs: 120,
            replay_capacity: 1024,
            default_token_ttl_secs: 6 * 60 * 60,
            http_timeout_secs: 60,
            proxy: None,
            admin_key: None,
        }
    }
}

impl Config {
    /// Builds a Figment that merges defaults, an optional `config.toml` and the environment.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::raw().only(ENV_KEYS))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Names of the OAuth settings required by the connect/callback routes that are absent.
    pub fn missing_oauth_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.ml_client_id.as_deref().is_none_or(str::is_empty) {
            missing.push("ML_CLIENT_ID");
        }
        if self.ml_client_secret.as_deref().is_none_or(str::is_empty) {
            missing.push("ML_CLIENT_SECRET");
        }
        if self.ml_redirect_uri.is_none() {
            missing.push("ML_REDIRECT_URI");
        }
        missing
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|err| panic!("failed to load configuration: {err}"))
});

// Client ids are numeric on the marketplace side; TOML users tend to write them unquoted.
fn deserialize_opt_string_lax<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;

    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        _ => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

fn default_port() -> u16 {
    3000
}

fn parse_static(raw: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| panic!("invalid built-in url {raw}: {e}"))
}
