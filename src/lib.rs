//! Voice relay between a chat client and an OpenAI assistant.
//!
//! Inbound messages are transcribed, asked to a shared assistant on the user's
//! own thread, and the answer is synthesized back to speech. While answering,
//! the assistant may call `save_value` to record something it learned about
//! the user; those values are validated before they are stored.

use serde::Deserialize;

pub mod analytics;
pub mod api;
pub mod assistants;
pub mod audio;
pub mod bot;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod relay;
pub mod telegram;
pub mod users;

#[cfg(test)]
mod testing;

pub use api::AssistantApi;
pub use client::OpenAiClient;
pub use error::RelayError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenAiError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl OpenAiError {
    pub fn new(message: String, error_type: String) -> OpenAiError {
        OpenAiError {
            message,
            error_type,
            param: None,
            code: None,
        }
    }
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.error_type)
    }
}

impl std::error::Error for OpenAiError {}

impl From<reqwest::Error> for OpenAiError {
    fn from(value: reqwest::Error) -> Self {
        OpenAiError::new(value.to_string(), "transport".to_string())
    }
}

impl From<serde_json::Error> for OpenAiError {
    fn from(value: serde_json::Error) -> Self {
        OpenAiError::new(value.to_string(), "decode".to_string())
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

pub type ApiResponseOrError<T> = Result<T, OpenAiError>;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Credentials {
    api_key: String,
    base_url: String,
}

impl Credentials {
    /// Creates credentials with the given API key and base URL.
    ///
    /// If the base URL is empty, it will use the default.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            parse_base_url(base_url)
        };
        Self {
            api_key: api_key.into(),
            base_url,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn parse_base_url(mut value: String) -> String {
    if !value.ends_with('/') {
        value += "/";
    }
    value
}
