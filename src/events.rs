use crate::chat::ChatMessage;
use crate::format::Selection;
use crate::keys::Surfaces;
use crate::ops::{OpState, OperationKind};
use crate::theme::Theme;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// State changes a front-end re-renders on.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    TextReplaced(String),
    SelectionChanged(Option<Selection>),
    OperationChanged { kind: OperationKind, state: OpState },
    HistoryChanged { len: usize },
    TranscriptUpdated { index: usize, message: ChatMessage },
    ErrorChanged(Option<String>),
    SurfacesChanged(Surfaces),
    ThemeChanged(Theme),
}

/// Fan-out to any number of subscribers. Closed receivers are pruned on
/// the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Rc<RefCell<Vec<UnboundedSender<CoordinatorEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<CoordinatorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    pub fn publish(&self, event: CoordinatorEvent) {
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
