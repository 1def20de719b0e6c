use crate::api::{lines, sse_data, AiChunk, AiProvider, AiStream, ApiError, Message};
use crate::constants::{AI_REQUEST_TIMEOUT, AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

pub struct OpenAiCompatibleProvider {
    client: Client,
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: String, model: String, base_url: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(AI_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            name,
            model,
            base_url,
            api_key,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_completion(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": stream,
                "temperature": AI_TEMPERATURE,
                "top_p": AI_TOP_P
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Response(format!(
                "API error ({}): {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

fn parse_stream_line(line: &str) -> Vec<Result<AiChunk, ApiError>> {
    let mut chunks = Vec::new();
    let Some(json_str) = sse_data(line) else {
        return chunks;
    };
    match serde_json::from_str::<OpenAiStreamResponse>(json_str) {
        Ok(chunk) => {
            if let Some(choice) = chunk.choices.into_iter().next() {
                if let Some(reasoning) = choice.delta.reasoning_content {
                    chunks.push(Ok(AiChunk::Reasoning(reasoning)));
                }
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        chunks.push(Ok(AiChunk::Content(content)));
                    }
                }
            }
        }
        Err(e) => chunks.push(Err(ApiError::Stream(format!(
            "Failed to parse completion chunk: {}",
            e
        )))),
    }
    chunks
}

#[async_trait]
impl AiProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        if self.api_key.is_none() {
            return Err(ApiError::Config("API Key is missing".to_string()));
        }

        let url = format!("{}/models", self.base_url);
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Response(format!(
                "API returned status {}",
                response.status()
            )))
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        let response = self.post_completion(&messages, false).await?;
        let body: OpenAiResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ApiError::Response("Completion contained no text".to_string()))
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        let response = self.post_completion(&messages, true).await?;

        let stream = lines(response.bytes_stream())
            .map(|line| match line {
                Ok(line) => futures::stream::iter(parse_stream_line(&line)),
                Err(e) => futures::stream::iter(vec![Err(e)]),
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#;
        let chunks = parse_stream_line(line);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], Ok(AiChunk::Content(t)) if t == "lo"));
    }

    #[test]
    fn test_parse_reasoning_before_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"a","reasoning_content":"think"}}]}"#;
        let chunks = parse_stream_line(line);
        assert!(matches!(&chunks[0], Ok(AiChunk::Reasoning(t)) if t == "think"));
        assert!(matches!(&chunks[1], Ok(AiChunk::Content(t)) if t == "a"));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert!(parse_stream_line("data: [DONE]").is_empty());
        assert!(parse_stream_line(": keep-alive").is_empty());
        assert!(parse_stream_line(r#"data: {"choices":[]}"#).is_empty());
    }

    #[test]
    fn test_parse_malformed_is_error() {
        let chunks = parse_stream_line("data: {oops");
        assert!(matches!(&chunks[0], Err(ApiError::Stream(_))));
    }

    #[tokio::test]
    async fn test_check_availability_requires_key() {
        let provider = OpenAiCompatibleProvider::new(
            "OpenAI".into(),
            "gpt-4o".into(),
            "http://127.0.0.1:9".into(),
            None,
        );
        assert!(matches!(
            provider.check_availability().await,
            Err(ApiError::Config(_))
        ));
    }
}
