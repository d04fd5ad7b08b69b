pub mod generator;
pub mod ml_client;

pub use generator::{AnswerContext, AnswerGenerator};
pub use ml_client::MlApiClient;
