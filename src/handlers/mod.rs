pub mod admin;
pub mod health;
pub mod ml_oauth;
pub mod webhook;
