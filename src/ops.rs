//! In-flight tracking for the three asynchronous operation classes.
//!
//! Each class moves `Idle -> Pending -> Idle`. Entering `Pending` hands out
//! a [`PendingGuard`]; dropping the guard is the only way back to `Idle`,
//! so every exit path (success, failure, a cancelled future) releases it.

use crate::events::{CoordinatorEvent, EventBus};
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Correct,
    Enhance,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpState {
    #[default]
    Idle,
    Pending,
}

/// Point-in-time view of all three flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub correcting: bool,
    pub enhancing: bool,
    pub chatting: bool,
}

pub struct OperationFlags {
    correct: Cell<OpState>,
    enhance: Cell<OpState>,
    chat: Cell<OpState>,
    events: EventBus,
}

impl OperationFlags {
    pub fn new(events: EventBus) -> Self {
        Self {
            correct: Cell::new(OpState::Idle),
            enhance: Cell::new(OpState::Idle),
            chat: Cell::new(OpState::Idle),
            events,
        }
    }

    fn cell(&self, kind: OperationKind) -> &Cell<OpState> {
        match kind {
            OperationKind::Correct => &self.correct,
            OperationKind::Enhance => &self.enhance,
            OperationKind::Chat => &self.chat,
        }
    }

    pub fn state(&self, kind: OperationKind) -> OpState {
        self.cell(kind).get()
    }

    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.state(kind) == OpState::Pending
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            correcting: self.is_pending(OperationKind::Correct),
            enhancing: self.is_pending(OperationKind::Enhance),
            chatting: self.is_pending(OperationKind::Chat),
        }
    }

    /// Marks `kind` pending, or returns `None` if it already is.
    pub fn try_begin(&self, kind: OperationKind) -> Option<PendingGuard<'_>> {
        let cell = self.cell(kind);
        if cell.get() == OpState::Pending {
            return None;
        }
        cell.set(OpState::Pending);
        self.events.publish(CoordinatorEvent::OperationChanged {
            kind,
            state: OpState::Pending,
        });
        Some(PendingGuard { flags: self, kind })
    }
}

#[must_use = "the operation is released as soon as the guard drops"]
pub struct PendingGuard<'a> {
    flags: &'a OperationFlags,
    kind: OperationKind,
}

impl PendingGuard<'_> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flags.cell(self.kind).set(OpState::Idle);
        self.flags.events.publish(CoordinatorEvent::OperationChanged {
            kind: self.kind,
            state: OpState::Idle,
        });
    }
}
