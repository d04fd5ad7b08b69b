use crate::config::Config;
use crate::error::AutoreplyError;
use crate::types::generation::{GenerationOutput, GenerationParameters, GenerationRequest};
use crate::types::ml::{Item, Question};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::fmt::Write as _;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Platform limit on answer length, in characters.
pub const MAX_ANSWER_CHARS: usize = 900;

/// Sent whenever generation is unavailable or returns nothing usable.
pub const FALLBACK_ANSWER: &str = "¡Hola! Gracias por tu consulta. Ya la estamos revisando y \
te respondemos a la brevedad por este medio. ¡Saludos!";

/// Off-platform contact channels; compound forms come before their parts.
const CONTACT_TERMS: &[&str] = &[
    "número de teléfono",
    "numero de telefono",
    "correo electrónico",
    "correo electronico",
    "whats app",
    "whatsapp",
    "telegram",
    "instagram",
    "facebook",
    "hotmail",
    "gmail",
    "e-mail",
    "email",
    "teléfono",
    "telefono",
];

const IN_PLATFORM_PHRASE: &str = "las preguntas de Mercado Libre";

const PROMPT_TEMPLATE: &str = "Sos el asistente de ventas de una tienda en Mercado Libre. \
Respondé la pregunta del comprador en español, de forma breve y cordial.
Reglas:
- No compartas datos de contacto ni sugieras hablar fuera de Mercado Libre.
- Usá solo la información de la publicación; si algo no figura, invitá a consultar de nuevo.
- Como máximo tres oraciones, sin saludo de despedida largo.
";

/// Structured context handed to the generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerContext {
    pub question: String,
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub shipping_mode: Option<String>,
    pub free_shipping: bool,
    pub variation_count: Option<usize>,
}

impl AnswerContext {
    pub fn from_listing(question: &Question, item: &Item) -> Self {
        let shipping = item.shipping.clone().unwrap_or_default();
        Self {
            question: question.text.trim().to_string(),
            title: item.title.trim().to_string(),
            price: item.price,
            currency: item.currency_id.clone(),
            shipping_mode: shipping.mode,
            free_shipping: shipping.free_shipping.unwrap_or(false),
            variation_count: item.variation_count(),
        }
    }
}

/// Answer Generator backed by a hosted text-generation endpoint.
#[derive(Clone)]
pub struct AnswerGenerator {
    inner: Arc<GeneratorInner>,
}

struct GeneratorInner {
    http: reqwest::Client,
    url: Url,
    token: Option<String>,
    max_new_tokens: u32,
    temperature: f32,
    limiter: DefaultDirectRateLimiter,
}

impl AnswerGenerator {
    pub fn new(cfg: &Config, http: reqwest::Client) -> Self {
        let per_minute = NonZeroU32::new(cfg.generation_rate_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(GeneratorInner {
                http,
                url: cfg.generation_url.clone(),
                token: cfg.hf_token.clone().filter(|t| !t.trim().is_empty()),
                max_new_tokens: cfg.generation_max_new_tokens,
                temperature: cfg.generation_temperature,
                limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            }),
        }
    }

    /// Generate a post-processed reply. Never fails: errors yield [`FALLBACK_ANSWER`].
    pub async fn generate(&self, ctx: &AnswerContext) -> String {
        match self.try_generate(ctx).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "generation failed; using fallback reply");
                FALLBACK_ANSWER.to_string()
            }
        }
    }

    async fn try_generate(&self, ctx: &AnswerContext) -> Result<String, AutoreplyError> {
        let inner = &self.inner;
        let token = inner
            .token
            .as_deref()
            .ok_or_else(|| AutoreplyError::Generation("no generation token configured".into()))?;

        let request = GenerationRequest {
            inputs: render_prompt(ctx),
            parameters: GenerationParameters {
                max_new_tokens: inner.max_new_tokens,
                temperature: inner.temperature,
                return_full_text: false,
            },
        };

        inner.limiter.until_ready().await;

        let resp = inner
            .http
            .post(inner.url.clone())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AutoreplyError::Generation(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AutoreplyError::Generation(format!("endpoint answered {status}")));
        }

        let output: GenerationOutput = resp
            .json()
            .await
            .map_err(|e| AutoreplyError::Generation(format!("unexpected response shape: {e}")))?;

        let raw = output
            .into_text()
            .ok_or_else(|| AutoreplyError::Generation("empty generation list".into()))?;
        let text = sanitize_answer(&raw);
        if text.is_empty() {
            return Err(AutoreplyError::Generation("blank generation".into()));
        }
        debug!(chars = text.chars().count(), "answer generated");
        Ok(text)
    }
}

/// Instructional template followed by the structured listing context.
pub fn render_prompt(ctx: &AnswerContext) -> String {
    let mut prompt = String::from(PROMPT_TEMPLATE);
    prompt.push('\n');
    let _ = writeln!(prompt, "Publicación: {}", ctx.title);
    match (ctx.price, ctx.currency.as_deref()) {
        (Some(price), Some(currency)) => {
            let _ = writeln!(prompt, "Precio: {price:.2} {currency}");
        }
        (Some(price), None) => {
            let _ = writeln!(prompt, "Precio: {price:.2}");
        }
        (None, _) => prompt.push_str("Precio: no informado\n"),
    }
    let mode = ctx.shipping_mode.as_deref().unwrap_or("no informado");
    if ctx.free_shipping {
        let _ = writeln!(prompt, "Envío: {mode} (gratis)");
    } else {
        let _ = writeln!(prompt, "Envío: {mode}");
    }
    if let Some(n) = ctx.variation_count {
        let _ = writeln!(prompt, "Variantes disponibles: {n}");
    }
    let _ = write!(prompt, "\nPregunta: {}\nRespuesta:", ctx.question);
    prompt
}

/// Replace off-platform contact terms and enforce the platform length limit.
pub fn sanitize_answer(text: &str) -> String {
    let mut out = text.trim().to_string();
    for term in CONTACT_TERMS {
        out = replace_case_insensitive(&out, term, IN_PLATFORM_PHRASE);
    }
    let truncated: String = out.chars().take(MAX_ANSWER_CHARS).collect();
    truncated.trim_end().to_string()
}

fn replace_case_insensitive(text: &str, term: &str, replacement: &str) -> String {
    let needle: Vec<char> = term.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        match match_len(&chars[i..], &needle) {
            Some(consumed) => {
                out.push_str(replacement);
                i += consumed;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

/// Number of chars of `haystack` matching `needle` (already lowercased) at its start.
fn match_len(haystack: &[char], needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (consumed, c) in haystack.iter().enumerate() {
        if matched == needle.len() {
            return Some(consumed);
        }
        for lc in c.to_lowercase() {
            if needle.get(matched) != Some(&lc) {
                return None;
            }
            matched += 1;
        }
    }
    (matched == needle.len()).then_some(haystack.len())
}
