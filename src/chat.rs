//! Chat transcript and the consumer that folds a reply stream into it.

use crate::dispatcher::ServiceError;
use crate::constants::CHAT_GREETING;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Speaker,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Model,
            text: text.into(),
        }
    }
}

/// Session-local conversation shown in the chat panel.
///
/// Only the message being streamed into is ever rewritten; everything
/// before it is fixed once appended.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript opened by the assistant's greeting.
    pub fn with_greeting() -> Self {
        Self {
            messages: vec![ChatMessage::model(CHAT_GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Appends a message and returns its index.
    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    fn rewrite_last(&mut self, text: &str) -> Option<usize> {
        let idx = self.messages.len().checked_sub(1)?;
        self.messages[idx].text.clear();
        self.messages[idx].text.push_str(text);
        Some(idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream ran dry; this is the full reply.
    Settled(String),
    /// The stream broke; the message was appended as its own turn.
    Failed(String),
}

/// Drains `stream` into `transcript`.
///
/// The first chunk opens a new model message; every chunk rewrites that
/// message with the running buffer and calls `publish` with its index. A
/// failure leaves the partial message as is and appends the error text as a
/// separate model turn.
pub async fn consume_reply<S, F>(stream: S, transcript: &RefCell<Transcript>, mut publish: F) -> StreamOutcome
where
    S: Stream<Item = Result<String, ServiceError>>,
    F: FnMut(usize, &ChatMessage),
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = String::new();
    let mut opened = false;

    while let Some(item) = stream.next().await {
        let mut current = transcript.borrow_mut();
        match item {
            Ok(chunk) => {
                if !opened {
                    current.push(ChatMessage::model(String::new()));
                    opened = true;
                }
                buffer.push_str(&chunk);
                if let Some(idx) = current.rewrite_last(&buffer) {
                    publish(idx, &current.messages()[idx]);
                }
            }
            Err(e) => {
                let idx = current.push(ChatMessage::model(e.message.clone()));
                publish(idx, &current.messages()[idx]);
                return StreamOutcome::Failed(e.message);
            }
        }
    }

    tracing::debug!("Reply settled ({} chars)", buffer.len());
    StreamOutcome::Settled(buffer)
}
