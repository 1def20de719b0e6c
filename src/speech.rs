//! Single-shot dictation on top of a platform speech recognizer.
//!
//! The platform reports back through `on_start`, `on_result`, `on_error`
//! and `on_end`. `on_end` is not guaranteed after an error, so `on_error`
//! resets the listening state itself.

use crate::constants::{
    SPEECH_ERROR_CLEAR_DELAY, SPEECH_LANGUAGE, SPEECH_START_FAILED_MESSAGE,
    SPEECH_UNSUPPORTED_MESSAGE,
};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{capability} is not available on this platform")]
pub struct UnsupportedCapabilityError {
    pub capability: &'static str,
}

/// Platform capability. Implementations deliver events back to
/// [`SpeechInput`] asynchronously.
pub trait SpeechRecognizer {
    fn is_supported(&self) -> bool;
    fn start(&mut self, language: &str) -> anyhow::Result<()>;
    fn stop(&mut self);
}

#[derive(Debug)]
struct TimedError {
    message: String,
    expires_at: Instant,
}

pub struct SpeechInput<R> {
    recognizer: R,
    listening: bool,
    session_open: bool,
    error: Option<TimedError>,
}

impl<R: SpeechRecognizer> SpeechInput<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            listening: false,
            session_open: false,
            error: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// The current error, until it clears itself.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|e| Instant::now() < e.expires_at)
            .map(|e| e.message.as_str())
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    fn raise(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.error = Some(TimedError {
            message,
            expires_at: Instant::now() + SPEECH_ERROR_CLEAR_DELAY,
        });
    }

    /// Starts a listening session, or stops the open one.
    pub fn toggle_listening(&mut self) -> Result<(), UnsupportedCapabilityError> {
        self.error = None;

        if self.listening || self.session_open {
            self.recognizer.stop();
            return Ok(());
        }

        if !self.recognizer.is_supported() {
            self.raise(SPEECH_UNSUPPORTED_MESSAGE);
            return Err(UnsupportedCapabilityError {
                capability: "Speech recognition",
            });
        }

        match self.recognizer.start(SPEECH_LANGUAGE) {
            Ok(()) => self.session_open = true,
            Err(e) => {
                tracing::error!("Failed to start speech recognition: {}", e);
                self.raise(SPEECH_START_FAILED_MESSAGE);
            }
        }
        Ok(())
    }

    pub fn on_start(&mut self) {
        self.listening = true;
        self.error = None;
    }

    pub fn on_end(&mut self) {
        self.listening = false;
        self.session_open = false;
    }

    pub fn on_error(&mut self, code: &str) {
        self.raise(format!(
            "Speech recognition failed: {}. Please try again.",
            code
        ));
        self.listening = false;
        self.session_open = false;
    }

    /// Returns the transcript to deliver, if it has any content.
    pub fn on_result(&mut self, transcript: &str) -> Option<String> {
        let trimmed = transcript.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
