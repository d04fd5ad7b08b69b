pub mod credentials;
pub mod endpoints;
pub mod service;

pub use credentials::MlCredential;
pub use endpoints::{OauthSettings, TokenGrant};
pub use service::OauthService;
