//! Wire types of the hosted text-generation endpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub inputs: String,
    pub parameters: GenerationParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub return_full_text: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedText {
    pub generated_text: String,
}

/// The endpoint answers with a list for batched inputs and an object otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GenerationOutput {
    Many(Vec<GeneratedText>),
    One(GeneratedText),
}

impl GenerationOutput {
    pub fn into_text(self) -> Option<String> {
        match self {
            GenerationOutput::Many(v) => v.into_iter().next().map(|g| g.generated_text),
            GenerationOutput::One(g) => Some(g.generated_text),
        }
    }
}
