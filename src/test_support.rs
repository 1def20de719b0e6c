//! Scripted in-process provider for unit tests.

use crate::api::{AiChunk, AiProvider, AiStream, ApiError, Message};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type Scripted<T> = Mutex<VecDeque<T>>;

/// Answers from queues filled by the test. Replies are taken in request
/// order, so the n-th request gets the n-th scripted reply no matter when it
/// resumes. A gated provider holds every request until `release` is called.
#[derive(Default)]
pub struct MockProvider {
    replies: Scripted<Result<String, String>>,
    streams: Scripted<Vec<Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn push_reply(&self, reply: Result<&str, &str>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string).map_err(str::to_string));
    }

    pub fn push_stream(&self, chunks: Vec<Result<&str, &str>>) {
        let chunks = chunks
            .into_iter()
            .map(|c| c.map(str::to_string).map_err(str::to_string))
            .collect();
        self.streams.lock().unwrap().push_back(chunks);
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn record(&self, messages: Vec<Message>) {
        self.requests.lock().unwrap().push(messages);
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        self.record(messages);
        let reply = self.replies.lock().unwrap().pop_front();
        self.wait_for_gate().await;
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(ApiError::Response(e)),
            None => Err(ApiError::Response("no scripted reply".into())),
        }
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        self.record(messages);
        let chunks = self.streams.lock().unwrap().pop_front();
        self.wait_for_gate().await;
        let chunks = chunks.ok_or_else(|| ApiError::Stream("no scripted stream".into()))?;
        let items: Vec<Result<AiChunk, ApiError>> = chunks
            .into_iter()
            .map(|c| c.map(AiChunk::Content).map_err(ApiError::Stream))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
