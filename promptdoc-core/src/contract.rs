//! # contract: the seams between the pipeline and its collaborators
//!
//! This module defines the two traits the pipeline is written against and the
//! plain data that crosses them:
//!
//! - [`TextBackend`]: one request/response round trip to a generative-text API.
//!   Implemented by [`crate::openai::OpenAiClient`] and by test doubles.
//! - [`DocumentWriter`]: serializes an assembled [`Document`] to a path.
//!   Implemented by [`crate::writer::FileWriter`] and by test doubles.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; the generated `MockTextBackend` and
//! `MockDocumentWriter` are exported under the default `test-export-mocks` feature
//! so integration tests and the CLI crate can use them.

use async_trait::async_trait;
use mockall::automock;
use std::fmt;
use std::path::Path;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything a backend needs for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Ask the backend to augment the answer with web search.
    pub web_search: bool,
    /// Output-length hint forwarded to the backend.
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// The user turn of the request, if any.
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    AuthFailed(String),
    RateLimited(String),
    ModelNotFound(String),
    RequestFailed(String),
    MalformedResponse(String),
    EmptyResponse,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::AuthFailed(m) => write!(f, "authentication failed: {m}"),
            GenerationError::RateLimited(m) => write!(f, "rate limit exceeded: {m}"),
            GenerationError::ModelNotFound(m) => write!(f, "model not found: {m}"),
            GenerationError::RequestFailed(m) => write!(f, "request failed: {m}"),
            GenerationError::MalformedResponse(m) => write!(f, "malformed response: {m}"),
            GenerationError::EmptyResponse => f.write_str("response contained no text"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Outcome of generating one leaf prompt. Both variants carry ready-to-embed Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Markdown(String),
    Fallback(String),
}

impl GenerationResult {
    pub fn text(&self) -> &str {
        match self {
            GenerationResult::Markdown(t) | GenerationResult::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GenerationResult::Fallback(_))
    }
}

/// Trait for a generative-text API: one blocking-in-spirit round trip per call.
///
/// Implementations are shared read-only across concurrent tasks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Send the request and return the plain response text.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Debug)]
pub enum WriteError {
    Io(std::io::Error),
    /// The document could not be laid out as a PDF.
    Pdf(String),
    /// The external converter was missing or exited unsuccessfully.
    Converter(String),
    EmptyDocument,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Io(e) => write!(f, "io error: {e}"),
            WriteError::Pdf(m) => write!(f, "pdf rendering failed: {m}"),
            WriteError::Converter(m) => write!(f, "document conversion failed: {m}"),
            WriteError::EmptyDocument => f.write_str("document has no sections"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Io(e)
    }
}

/// Trait for serializing an assembled document to disk.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DocumentWriter: Send + Sync {
    /// Write `document` to `path`, replacing anything already there.
    fn write(&self, document: &Document, path: &Path) -> Result<(), WriteError>;
}
