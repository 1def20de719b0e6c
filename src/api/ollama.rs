use crate::api::{lines, AiChunk, AiProvider, AiStream, ApiError, Message};
use crate::constants::{AI_REQUEST_TIMEOUT, AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub struct OllamaProvider {
    client: Client,
    pub model: String,
    pub base_url: String,
}

impl OllamaProvider {
    pub fn new(model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(AI_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            model,
            base_url,
        }
    }

    fn body(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": AI_TEMPERATURE,
                "top_p": AI_TOP_P
            }
        })
    }

    async fn post_chat(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&self.body(messages, stream))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Response(format!(
                "Ollama chat error ({}): {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaTags {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

fn parse_stream_line(line: &str) -> Option<Result<AiChunk, ApiError>> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<OllamaChatResponse>(line) {
        Ok(chunk) if chunk.message.content.is_empty() => None,
        Ok(chunk) => Some(Ok(AiChunk::Content(chunk.message.content))),
        Err(e) => Some(Err(ApiError::Stream(format!(
            "Failed to parse Ollama chunk: {}",
            e
        )))),
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::Response(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let tags: OllamaTags = response.json().await?;
        if tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)))
        {
            Ok(())
        } else {
            Err(ApiError::Response(format!(
                "Model {} not found in Ollama",
                self.model
            )))
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        let response = self.post_chat(&messages, false).await?;
        let body: OllamaChatResponse = response.json().await?;
        Ok(body.message.content)
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        let response = self.post_chat(&messages, true).await?;

        let stream = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}
