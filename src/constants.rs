//! Application-wide constants for myth-rs.
//!
//! Centralizes store keys, prompt templates and user-facing messages so the
//! rest of the codebase stays free of magic strings.

use std::time::Duration;

// ============================================================================
// Application Identity
// ============================================================================

/// Application name shown in the terminal front-end.
pub const APP_NAME: &str = "Myth AI Writing Assistant";

/// Directory name used under the platform config and data directories.
pub const APP_DIR_NAME: &str = "myth-rs";

// ============================================================================
// Persistent Store
// ============================================================================

/// Store key holding the JSON array of history entries.
pub const HISTORY_STORE_KEY: &str = "writing-assistant-history";

/// Store key holding the persisted theme literal.
pub const THEME_STORE_KEY: &str = "theme";

// ============================================================================
// AI Client
// ============================================================================

/// Default model used by the Gemini provider.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Base URL for the Gemini REST API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Base URL for a local Ollama daemon.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Environment variables consulted for a missing API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY"];

/// HTTP request timeout for AI operations.
pub const AI_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature. Low values keep rewrites close to the input.
pub const AI_TEMPERATURE: f32 = 0.3;

/// Nucleus sampling parameter.
pub const AI_TOP_P: f32 = 0.9;

// ============================================================================
// Prompts
// ============================================================================

/// System instruction for the conversational session.
pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are Myth AI, a helpful and friendly writing assistant. \
Your goal is to help users improve their writing, answer questions, and brainstorm ideas. \
Keep your responses concise and clear.";

/// First message of every chat transcript.
pub const CHAT_GREETING: &str = "Hello! I'm Myth AI. How can I help you with your writing today?";

pub fn correction_prompt(text: &str) -> String {
    format!(
        "Please correct the grammar and spelling in the following text. \
         Only return the corrected text, without any explanation, preamble, or markdown formatting. \
         Text: \"{}\"",
        text
    )
}

pub fn enhancement_prompt(text: &str, tone_label: &str) -> String {
    format!(
        "Rewrite the following text to have a more {} tone. \
         Only return the rewritten text, without any explanation, preamble, or markdown formatting. \
         Text: \"{}\"",
        tone_label.to_lowercase(),
        text
    )
}

// ============================================================================
// User-facing Messages
// ============================================================================

pub const CORRECT_FAILED_MESSAGE: &str =
    "The AI service failed to correct the text. Please check your connection and try again.";

pub const ENHANCE_FAILED_MESSAGE: &str =
    "The AI service failed to enhance the text. Please check your connection and try again.";

pub const CHAT_UNAVAILABLE_MESSAGE: &str =
    "The AI chat service is unavailable. Please try again in a moment.";

/// Shown when a failure carries no message of its own.
pub const UNKNOWN_CORRECTION_ERROR: &str = "An unknown error occurred during correction.";

pub const UNKNOWN_CHAT_ERROR: &str = "An unknown error occurred. Please try again.";

// ============================================================================
// Speech Input
// ============================================================================

/// How long a speech error stays visible before clearing itself.
pub const SPEECH_ERROR_CLEAR_DELAY: Duration = Duration::from_secs(5);

pub const SPEECH_UNSUPPORTED_MESSAGE: &str =
    "Speech Recognition API is not supported on this platform.";

pub const SPEECH_START_FAILED_MESSAGE: &str =
    "Could not start listening. Please grant microphone permission.";

/// Recognition language requested from the platform.
pub const SPEECH_LANGUAGE: &str = "en-US";
