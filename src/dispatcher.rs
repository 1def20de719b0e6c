//! Outbound requests for the three operation classes.
//!
//! Every backend fault is folded into a single [`ServiceError`] carrying a
//! message fit for display. No retries happen here.

use crate::api::{AiChunk, AiProvider, AiStream, Message};
use crate::chat::{ChatMessage, Speaker};
use crate::constants::{
    correction_prompt, enhancement_prompt, CHAT_SYSTEM_INSTRUCTION, CHAT_UNAVAILABLE_MESSAGE,
    CORRECT_FAILED_MESSAGE, ENHANCE_FAILED_MESSAGE,
};
use crate::tone::Tone;
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Reply text, one increment at a time.
pub type ChunkStream = LocalBoxStream<'static, Result<String, ServiceError>>;

/// Conversation context accumulated across chat turns.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: u64,
    system_instruction: String,
    context: Vec<Message>,
}

impl ChatSession {
    pub fn new(id: u64, system_instruction: impl Into<String>) -> Self {
        Self {
            id,
            system_instruction: system_instruction.into(),
            context: Vec::new(),
        }
    }

    /// Starts a session from an on-screen transcript. Leading model turns
    /// (the greeting) are not part of the conversation proper.
    pub fn seeded(id: u64, system_instruction: impl Into<String>, transcript: &[ChatMessage]) -> Self {
        let mut session = Self::new(id, system_instruction);
        session.context = transcript
            .iter()
            .skip_while(|m| m.role == Speaker::Model)
            .map(|m| match m.role {
                Speaker::User => Message::user(m.text.clone()),
                Speaker::Model => Message::assistant(m.text.clone()),
            })
            .collect();
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &[Message] {
        &self.context
    }

    fn request(&self, new_message: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.context.len() + 2);
        messages.push(Message::system(self.system_instruction.clone()));
        messages.extend(self.context.iter().cloned());
        messages.push(Message::user(new_message));
        messages
    }

    fn commit(&mut self, user: String, reply: String) {
        self.context.push(Message::user(user));
        self.context.push(Message::assistant(reply));
    }
}

type SessionSlot = Rc<RefCell<Option<ChatSession>>>;

pub struct Dispatcher {
    provider: Arc<dyn AiProvider>,
    system_instruction: String,
    session: SessionSlot,
    next_session_id: Cell<u64>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self::with_system_instruction(provider, CHAT_SYSTEM_INSTRUCTION)
    }

    pub fn with_system_instruction(provider: Arc<dyn AiProvider>, instruction: impl Into<String>) -> Self {
        Self {
            provider,
            system_instruction: instruction.into(),
            session: Rc::new(RefCell::new(None)),
            next_session_id: Cell::new(1),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn check_availability(&self) -> Result<(), ServiceError> {
        self.provider.check_availability().await.map_err(|e| {
            tracing::warn!("{} is not available: {}", self.provider.name(), e);
            ServiceError::new(e.to_string())
        })
    }

    pub async fn correct(&self, text: &str) -> Result<String, ServiceError> {
        let messages = vec![Message::user(correction_prompt(text))];
        match self.provider.complete(messages).await {
            Ok(reply) => Ok(normalize_reply(text, reply)),
            Err(e) => {
                tracing::error!("Error in correct: {}", e);
                Err(ServiceError::new(CORRECT_FAILED_MESSAGE))
            }
        }
    }

    pub async fn enhance(&self, text: &str, tone: Tone) -> Result<String, ServiceError> {
        let messages = vec![Message::user(enhancement_prompt(text, tone.label()))];
        match self.provider.complete(messages).await {
            Ok(reply) => Ok(normalize_reply(text, reply)),
            Err(e) => {
                tracing::error!("Error in enhance ({}): {}", tone, e);
                Err(ServiceError::new(ENHANCE_FAILED_MESSAGE))
            }
        }
    }

    /// Opens a reply stream for `new_message` within the current session,
    /// creating the session from `transcript` if none exists yet.
    ///
    /// The exchange joins the session context only once the stream ends
    /// cleanly.
    pub async fn chat(&self, transcript: &[ChatMessage], new_message: &str) -> Result<ChunkStream, ServiceError> {
        let (session_id, messages) = {
            let mut slot = self.session.borrow_mut();
            let session = slot.get_or_insert_with(|| {
                let id = self.next_session_id.replace(self.next_session_id.get() + 1);
                tracing::debug!("Creating chat session {}", id);
                ChatSession::seeded(id, self.system_instruction.clone(), transcript)
            });
            (session.id(), session.request(new_message))
        };

        let inner = self.provider.chat_stream(messages).await.map_err(|e| {
            tracing::error!("Error in chat: {}", e);
            ServiceError::new(CHAT_UNAVAILABLE_MESSAGE)
        })?;

        Ok(settle_into_session(
            inner,
            self.session.clone(),
            session_id,
            new_message.to_string(),
        ))
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.borrow().as_ref().map(ChatSession::id)
    }

    pub fn session_context(&self) -> Vec<Message> {
        self.session
            .borrow()
            .as_ref()
            .map(|s| s.context().to_vec())
            .unwrap_or_default()
    }

    /// Drops the current session; the next chat starts a fresh one.
    pub fn reset_session(&self) {
        if let Some(old) = self.session.borrow_mut().take() {
            tracing::debug!("Reset chat session {}", old.id());
        }
    }
}

/// Models often append a newline the user never typed.
fn normalize_reply(input: &str, reply: String) -> String {
    if input.ends_with('\n') {
        reply
    } else {
        reply.trim_end_matches(['\n', '\r']).to_string()
    }
}

struct Settling {
    inner: AiStream,
    session: SessionSlot,
    session_id: u64,
    user: String,
    reply: String,
    failed: bool,
}

impl Settling {
    fn commit(self) {
        let mut slot = self.session.borrow_mut();
        match slot.as_mut() {
            Some(session) if session.id() == self.session_id => session.commit(self.user, self.reply),
            _ => tracing::debug!("Chat session {} was reset mid-reply", self.session_id),
        }
    }
}

fn settle_into_session(inner: AiStream, session: SessionSlot, session_id: u64, user: String) -> ChunkStream {
    let state = Settling {
        inner,
        session,
        session_id,
        user,
        reply: String::new(),
        failed: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            let next = state.inner.next().await;
            match next {
                Some(Ok(AiChunk::Content(text))) => {
                    state.reply.push_str(&text);
                    return Some((Ok(text), state));
                }
                Some(Ok(AiChunk::Reasoning(thought))) => {
                    tracing::debug!("Reasoning chunk ({} chars)", thought.len());
                }
                Some(Err(e)) => {
                    tracing::error!("Chat stream failed: {}", e);
                    state.failed = true;
                    return Some((Err(ServiceError::new(CHAT_UNAVAILABLE_MESSAGE)), state));
                }
                None => {
                    state.commit();
                    return None;
                }
            }
        }
    })
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MessageRole;
    use crate::test_support::MockProvider;

    #[tokio::test]
    async fn test_correct_returns_reply_without_trailing_newline() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Ok("I am here.\n"));
        let dispatcher = Dispatcher::new(provider.clone());
        assert_eq!(dispatcher.correct("i am here").await.unwrap(), "I am here.");
        let sent = provider.requests();
        assert!(sent[0][0].content.contains("\"i am here\""));
    }

    #[tokio::test]
    async fn test_enhance_prompt_mentions_tone() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Ok("Dear Sir"));
        let dispatcher = Dispatcher::new(provider.clone());
        dispatcher.enhance("hey", Tone::Formal).await.unwrap();
        assert!(provider.requests()[0][0].content.contains("more formal tone"));
    }

    #[tokio::test]
    async fn test_failures_map_to_fixed_messages() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Err("401 unauthorized"));
        provider.push_reply(Err("timeout"));
        let dispatcher = Dispatcher::new(provider);
        assert_eq!(
            dispatcher.correct("x").await.unwrap_err().message,
            CORRECT_FAILED_MESSAGE
        );
        assert_eq!(
            dispatcher.enhance("x", Tone::Casual).await.unwrap_err().message,
            ENHANCE_FAILED_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_session_is_lazy_and_accumulates() {
        let provider = Arc::new(MockProvider::new());
        provider.push_stream(vec![Ok("Hi"), Ok("!")]);
        provider.push_stream(vec![Ok("Sure")]);
        let dispatcher = Dispatcher::new(provider.clone());
        assert_eq!(dispatcher.session_id(), None);

        let greeting = vec![ChatMessage::model("Hello!")];
        let reply: Vec<_> = dispatcher.chat(&greeting, "hello").await.unwrap().collect().await;
        assert_eq!(reply, vec![Ok("Hi".to_string()), Ok("!".to_string())]);
        let first_id = dispatcher.session_id().unwrap();

        let _: Vec<_> = dispatcher.chat(&[], "again").await.unwrap().collect().await;
        assert_eq!(dispatcher.session_id(), Some(first_id));

        let second = &provider.requests()[1];
        let roles: Vec<MessageRole> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(second[2].content, "Hi!");
    }

    #[tokio::test]
    async fn test_failed_stream_is_not_committed() {
        let provider = Arc::new(MockProvider::new());
        provider.push_stream(vec![Ok("par"), Err("connection reset")]);
        let dispatcher = Dispatcher::new(provider);
        let items: Vec<_> = dispatcher.chat(&[], "q").await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(ServiceError::new(CHAT_UNAVAILABLE_MESSAGE)));
        assert!(dispatcher.session_context().is_empty());
    }

    #[tokio::test]
    async fn test_reset_session_starts_fresh() {
        let provider = Arc::new(MockProvider::new());
        provider.push_stream(vec![Ok("a")]);
        provider.push_stream(vec![Ok("b")]);
        let dispatcher = Dispatcher::new(provider.clone());

        let _: Vec<_> = dispatcher.chat(&[], "one").await.unwrap().collect().await;
        let first = dispatcher.session_id();
        dispatcher.reset_session();
        assert_eq!(dispatcher.session_id(), None);

        let _: Vec<_> = dispatcher.chat(&[], "two").await.unwrap().collect().await;
        assert_ne!(dispatcher.session_id(), first);
        assert_eq!(provider.requests()[1].len(), 2);
    }

    #[tokio::test]
    async fn test_stream_open_failure() {
        let provider = Arc::new(MockProvider::new());
        let dispatcher = Dispatcher::new(provider);
        let err = dispatcher.chat(&[], "q").await.err().unwrap();
        assert_eq!(err.message, CHAT_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_seeded_session_skips_greeting() {
        let transcript = vec![
            ChatMessage::model("Hello!"),
            ChatMessage::user("hi"),
            ChatMessage::model("hey"),
        ];
        let session = ChatSession::seeded(1, "sys", &transcript);
        assert_eq!(session.context().len(), 2);
        assert_eq!(session.context()[0], Message::user("hi"));
    }
}
