//! Core of the Myth AI writing assistant: grammar correction, tone rewriting,
//! streamed chat and a persisted history of applied operations.

pub mod api;
pub mod chat;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod dispatcher;
pub mod events;
pub mod find;
pub mod format;
pub mod history;
pub mod keys;
pub mod ops;
pub mod speech;
pub mod store;
pub mod theme;
pub mod tone;

#[cfg(test)]
mod test_support;

pub use coordinator::{ChatOutcome, Coordinator, OperationOutcome, ToolbarState};
pub use dispatcher::ServiceError;
pub use events::CoordinatorEvent;
pub use speech::UnsupportedCapabilityError;
