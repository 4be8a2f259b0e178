//! OpenAI Responses API backend.
//!
//! Wires the [`TextBackend`] trait to `POST {base_url}/responses`. Transport and
//! HTTP status failures are mapped onto [`GenerationError`] variants; the
//! generator turns those into per-prompt fallbacks.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::{GenerationError, GenerationRequest, TextBackend};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    tools: Vec<Tool>,
    max_output_tokens: u32,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                GenerationError::RequestFailed(format!("failed to create HTTP client: {e}"))
            })?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        info!(base_url = %base_url, api_key_set = !api_key.is_empty(), "Initialized OpenAiClient");
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }
}

fn map_http_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::RequestFailed(format!("request timeout: {error}"))
    } else if error.is_connect() {
        GenerationError::RequestFailed(format!("connection error: {error}"))
    } else {
        GenerationError::RequestFailed(format!("http error: {error}"))
    }
}

fn map_status(status: u16, body: String) -> GenerationError {
    match status {
        401 => GenerationError::AuthFailed(body),
        429 => GenerationError::RateLimited(body),
        404 => GenerationError::ModelNotFound(body),
        _ => GenerationError::RequestFailed(format!("status {status}: {body}")),
    }
}

/// Pull the answer text out of a Responses API payload.
///
/// Prefers a top-level `output_text`; otherwise concatenates every `output_text`
/// content part of the `output` message items.
pub fn extract_output_text(payload: &Value) -> Result<String, GenerationError> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    let output = payload
        .get("output")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::MalformedResponse("missing 'output' array".into()))?;

    let parts: Vec<&str> = output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if parts.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(parts.join(""))
}

#[async_trait]
impl TextBackend for OpenAiClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ResponsesRequest {
            model: &request.model,
            input: request
                .messages
                .iter()
                .map(|m| InputMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            tools: if request.web_search {
                vec![Tool {
                    kind: "web_search_preview",
                }]
            } else {
                Vec::new()
            },
            max_output_tokens: request.max_output_tokens,
        };

        let url = format!("{}/responses", self.base_url);
        debug!(url = %url, model = %request.model, web_search = request.web_search, "Sending generation request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            return Err(map_status(status.as_u16(), text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(format!("failed to parse response: {e}")))?;
        extract_output_text(&payload)
    }
}
