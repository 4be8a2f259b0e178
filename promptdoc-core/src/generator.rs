//! Document content generator: one leaf prompt in, one Markdown fragment out.
//!
//! Failures never escape this module. Whatever goes wrong with the backend call,
//! the caller receives a [`GenerationResult::Fallback`] carrying the prompt and a
//! visible notice, and the error is logged next to the prompt text.

use std::sync::Arc;
use tracing::{debug, error};

use crate::config::RunConfig;
use crate::contract::{
    ChatMessage, GenerationError, GenerationRequest, GenerationResult, TextBackend,
};

pub const FALLBACK_NOTICE: &str = "*Error generating content.*";
pub const DRY_RUN_PLACEHOLDER: &str = "_test placeholder_";
/// Joins consecutive blocks inside one document section.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

pub fn system_instruction(max_output_tokens: u32) -> String {
    format!(
        "Provide output in Markdown. \
         Use **bold** text for headers and no need for h1, h2, h3 headers. \
         Don't add line separators in response. \
         Aim at about {max_output_tokens} tokens."
    )
}

pub fn success_markdown(prompt: &str, response: &str) -> String {
    format!("Prompt: {prompt}\n\n{}", response.trim())
}

pub fn fallback_markdown(prompt: &str) -> String {
    format!("{prompt}\n\n{FALLBACK_NOTICE}")
}

pub fn placeholder_markdown(prompt: &str) -> String {
    format!("Prompt: {prompt}\n\n{DRY_RUN_PLACEHOLDER}")
}

/// Wraps a [`TextBackend`] with the request layout and the fallback policy.
pub struct ContentGenerator<B: ?Sized> {
    backend: Arc<B>,
    model: String,
    max_output_tokens: u32,
    use_web_search: bool,
}

impl<B> Clone for ContentGenerator<B>
where
    B: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            use_web_search: self.use_web_search,
        }
    }
}

impl<B> ContentGenerator<B>
where
    B: TextBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, config: &RunConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            use_web_search: config.use_web_search,
        }
    }

    pub fn build_request(&self, prompt: &str, system_override: Option<&str>) -> GenerationRequest {
        let mut messages = vec![ChatMessage::system(system_instruction(
            self.max_output_tokens,
        ))];
        if let Some(extra) = system_override {
            messages.push(ChatMessage::system(extra));
        }
        messages.push(ChatMessage::user(format!("{prompt}\n\n")));
        GenerationRequest {
            model: self.model.clone(),
            messages,
            web_search: self.use_web_search,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub async fn generate(&self, prompt: &str, system_override: Option<&str>) -> GenerationResult {
        let request = self.build_request(prompt, system_override);
        let outcome = match self.backend.complete(&request).await {
            Ok(text) if text.trim().is_empty() => Err(GenerationError::EmptyResponse),
            other => other,
        };
        match outcome {
            Ok(text) => {
                debug!(prompt = %prompt, chars = text.len(), "Generation succeeded");
                GenerationResult::Markdown(success_markdown(prompt, &text))
            }
            Err(e) => {
                error!(prompt = %prompt, error = %e, "AI request failed for prompt");
                GenerationResult::Fallback(fallback_markdown(prompt))
            }
        }
    }
}
