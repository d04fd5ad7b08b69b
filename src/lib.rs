pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ml_oauth;
pub mod router;
pub mod service;
pub mod types;

pub use error::AutoreplyError;
pub use ml_oauth::{MlCredential, OauthService};
pub use router::{AppState, app_router};
