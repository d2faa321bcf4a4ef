//! Article generation through the OpenAI Responses API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::application::generator::{
    ArticleGenerator, GenerationError, GenerationRequest, UnconfiguredGenerator,
};
use crate::config::GenerationSettings;

use super::error::InfraError;

const ARTICLE_STYLE_PROMPT: &str = "You are an expert in creating detailed articles for a wiki \
(at least 500 words). Only output the article text without any additional commentary. Be \
creative and dont hesitate to invent new information if necessary.";

const ARTICLE_FORMAT_PROMPT: &str = "Use HTML formatting to structure the article. Do not \
include any links or references to external sources. Do not define the html no <head> or \
<body> tags nor <html> or <!DOCTYPE html>, maximum size should be h2. Do not include the title \
of the article, start with the introduction.";

/// Upstream error bodies are cut to this many characters before logging.
const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct OpenAiGenerator {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(settings: &GenerationSettings, api_key: String) -> Result<Self, InfraError> {
        let endpoint = responses_endpoint(&settings.base_url)?;
        let client = Client::builder()
            .user_agent(concat!("infinitewiki/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: settings.model.clone(),
        })
    }
}

/// Pick the generator for the configured settings. Without an API key the
/// service still runs, serving only articles that already exist.
pub fn build_generator(
    settings: &GenerationSettings,
) -> Result<Arc<dyn ArticleGenerator>, InfraError> {
    match settings.api_key.clone() {
        Some(api_key) => {
            let generator = OpenAiGenerator::new(settings, api_key)?;
            info!(
                target = "infinitewiki::infra::openai",
                endpoint = %generator.endpoint,
                model = %generator.model,
                "article generation enabled"
            );
            Ok(Arc::new(generator))
        }
        None => {
            info!(
                target = "infinitewiki::infra::openai",
                "no generation API key configured; only stored articles will be served"
            );
            Ok(Arc::new(UnconfiguredGenerator))
        }
    }
}

#[async_trait]
impl ArticleGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let user_prompt = format!("Create a detailed article about {}.", request.title);
        let body = ResponsesRequest {
            model: &self.model,
            input: [
                InputMessage {
                    role: "system",
                    content: ARTICLE_STYLE_PROMPT,
                },
                InputMessage {
                    role: "system",
                    content: ARTICLE_FORMAT_PROMPT,
                },
                InputMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            max_output_tokens: request.max_output_tokens,
            user: &request.requested_by,
        };

        debug!(
            target = "infinitewiki::infra::openai",
            title = %request.title,
            model = %self.model,
            "requesting article"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, request))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|err| transport_error(err, request))?;

        if !status.is_success() {
            return Err(upstream_error(status, &payload));
        }

        extract_output_text(&payload)
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: [InputMessage<'a>; 3],
    max_output_tokens: u32,
    user: &'a str,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn responses_endpoint(base_url: &Url) -> Result<Url, InfraError> {
    let joined = format!("{}/responses", base_url.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|err| {
        InfraError::configuration(format!("invalid generation endpoint `{joined}`: {err}"))
    })
}

fn transport_error(err: reqwest::Error, request: &GenerationRequest) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(request.timeout)
    } else {
        GenerationError::Transport(err.to_string())
    }
}

fn upstream_error(status: StatusCode, payload: &str) -> GenerationError {
    let message = serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| payload.chars().take(MAX_ERROR_BODY_CHARS).collect());

    GenerationError::Upstream {
        status: status.as_u16(),
        message,
    }
}

/// Pull the generated text out of a Responses API payload: the
/// `output_text` convenience field when present, else every text part of
/// every output item joined by newlines.
fn extract_output_text(payload: &str) -> Result<String, GenerationError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| GenerationError::Malformed(format!("response is not JSON: {err}")))?;

    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::Malformed("output_text is empty".to_string()));
        }
        return Ok(trimmed.to_string());
    }

    let chunks: Vec<&str> = value
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();

    if chunks.is_empty() {
        return Err(GenerationError::Malformed(
            "response carries no output text".to_string(),
        ));
    }
    Ok(chunks.join("\n"))
}
