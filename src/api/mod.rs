use crate::config::ProviderConfig;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub mod gemini;
pub mod ollama;
pub mod openai_compat;

use crate::api::gemini::GeminiProvider;
use crate::api::ollama::OllamaProvider;
use crate::api::openai_compat::OpenAiCompatibleProvider;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("API response error: {0}")]
    Response(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

pub type AiStream = Pin<Box<dyn Stream<Item = Result<AiChunk, ApiError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiChunk {
    Content(String),
    Reasoning(String),
}

/// A generative backend able to answer a prompt in one piece or as a stream.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn check_availability(&self) -> Result<(), ApiError>;
    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError>;
    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError>;
}

pub fn create_provider(config: &ProviderConfig) -> Arc<dyn AiProvider> {
    match config.name.as_str() {
        "Gemini" => Arc::new(GeminiProvider::new(
            config.active_model.clone(),
            config.base_url.clone(),
            config.api_key.clone(),
        )),
        "Ollama" => Arc::new(OllamaProvider::new(
            config.active_model.clone(),
            config.base_url.clone(),
        )),
        _ => Arc::new(OpenAiCompatibleProvider::new(
            config.name.clone(),
            config.active_model.clone(),
            config.base_url.clone(),
            config.api_key.clone(),
        )),
    }
}

/// Re-frames a byte stream into complete text lines.
///
/// Network chunks respect neither line nor character boundaries, so raw
/// bytes are held back until a newline arrives and only whole lines are
/// decoded. A trailing unterminated line is emitted when the underlying
/// stream ends.
pub(crate) fn lines<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ApiError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ApiError> + Send,
{
    let framed = bytes
        .map(Some)
        .chain(futures::stream::once(async { None }))
        .scan(Vec::<u8>::new(), |pending, item| {
            let mut out = Vec::new();
            match item {
                Some(Ok(chunk)) => {
                    pending.extend_from_slice(chunk.as_ref());
                    while let Some(idx) = pending.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=idx).collect();
                        out.push(Ok(decode_line(&line)));
                    }
                }
                Some(Err(e)) => out.push(Err(e.into())),
                None => {
                    let tail = decode_line(&std::mem::take(pending));
                    if !tail.trim().is_empty() {
                        out.push(Ok(tail));
                    }
                }
            }
            futures::future::ready(Some(futures::stream::iter(out)))
        });
    framed.flatten()
}

fn decode_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Extracts the payload of a server-sent-events `data:` line.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}
