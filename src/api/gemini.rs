use crate::api::{lines, sse_data, AiChunk, AiProvider, AiStream, ApiError, Message, MessageRole};
use crate::constants::{AI_REQUEST_TIMEOUT, AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Google Gemini over the `generativelanguage` REST surface.
pub struct GeminiProvider {
    client: Client,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(model: String, base_url: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(AI_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            model,
            base_url,
            api_key,
        }
    }

    fn key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("API Key is missing".to_string()))
    }

    async fn post(&self, method: &str, messages: &[Message]) -> Result<reqwest::Response, ApiError> {
        let key = self.key()?;
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&request_body(messages))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Response(format!(
                "Gemini error ({}): {}",
                status, body
            )));
        }
        Ok(response)
    }
}

/// Gemini keeps system text out of `contents` and names the assistant `model`.
fn request_body(messages: &[Message]) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": AI_TEMPERATURE,
            "topP": AI_TOP_P
        }
    });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    body
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GenerateResponse {
    fn chunks(self) -> Vec<AiChunk> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| match (part.text, part.thought) {
                        (Some(text), true) => Some(AiChunk::Reasoning(text)),
                        (Some(text), false) if !text.is_empty() => Some(AiChunk::Content(text)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn text(self) -> String {
        self.chunks()
            .into_iter()
            .filter_map(|c| match c {
                AiChunk::Content(text) => Some(text),
                AiChunk::Reasoning(_) => None,
            })
            .collect()
    }
}

fn parse_stream_line(line: &str) -> Vec<Result<AiChunk, ApiError>> {
    let Some(data) = sse_data(line) else {
        return Vec::new();
    };
    match serde_json::from_str::<GenerateResponse>(data) {
        Ok(resp) => resp.chunks().into_iter().map(Ok).collect(),
        Err(e) => vec![Err(ApiError::Stream(format!(
            "Failed to parse Gemini chunk: {}",
            e
        )))],
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        let key = self.key()?;
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", key)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Response(format!(
                "Gemini returned status {}",
                response.status()
            )))
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        let response = self.post("generateContent", &messages).await?;
        let body: GenerateResponse = response.json().await?;
        let text = body.text();
        if text.is_empty() {
            return Err(ApiError::Response(
                "Gemini response contained no text".to_string(),
            ));
        }
        Ok(text)
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        let response = self
            .post("streamGenerateContent?alt=sse", &messages)
            .await?;

        let stream = lines(response.bytes_stream())
            .map(|line| match line {
                Ok(line) => futures::stream::iter(parse_stream_line(&line)),
                Err(e) => futures::stream::iter(vec![Err(e)]),
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
