//! The interaction core: canonical document text, selection, the three
//! operation flags, history, chat transcript and the open surfaces.
//!
//! All methods take `&self`; state lives behind `Cell`/`RefCell` so a
//! correction and an enhancement can be awaited side by side on one thread.
//! No `RefCell` borrow is ever held across an `.await`.

use crate::api::AiProvider;
use crate::chat::{consume_reply, ChatMessage, StreamOutcome, Transcript};
use crate::constants::{THEME_STORE_KEY, UNKNOWN_CHAT_ERROR, UNKNOWN_CORRECTION_ERROR};
use crate::dispatcher::{Dispatcher, ServiceError};
use crate::events::{CoordinatorEvent, EventBus};
use crate::find::FindReplace;
use crate::format::{apply_format, Formatting, Selection};
use crate::history::{HistoryEntry, HistoryLog};
use crate::keys::{route, KeyAction, KeyChord, RouterContext, Surfaces};
use crate::ops::{FlagSnapshot, OperationFlags, OperationKind};
use crate::store::StoreAdapter;
use crate::theme::Theme;
use crate::tone::Tone;
use chrono::Utc;
use std::cell::{Cell, Ref, RefCell};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// How a correction or enhancement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Blank text, or the same operation already in flight. Nothing was sent.
    Rejected,
    /// The backend returned the text as it was.
    Unchanged,
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Rejected,
    Replied(String),
    Failed(String),
}

/// Which toolbar controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolbarState {
    pub can_correct: bool,
    pub can_enhance: bool,
    pub can_format: bool,
}

#[derive(Debug, Default)]
struct Document {
    text: String,
    selection: Option<Selection>,
}

pub struct Coordinator {
    dispatcher: Dispatcher,
    document: RefCell<Document>,
    flags: OperationFlags,
    error: RefCell<Option<String>>,
    history: RefCell<HistoryLog>,
    transcript: RefCell<Transcript>,
    // error_visible is derived from `error`, the other three live here
    panels: Cell<Surfaces>,
    theme: Cell<Theme>,
    find: RefCell<FindReplace>,
    store: StoreAdapter,
    events: EventBus,
}

impl Coordinator {
    pub fn new(provider: Arc<dyn AiProvider>, store: StoreAdapter, history_limit: Option<usize>) -> Self {
        let events = EventBus::new();
        let theme = store.get(THEME_STORE_KEY, Theme::default());
        Self {
            dispatcher: Dispatcher::new(provider),
            document: RefCell::new(Document::default()),
            flags: OperationFlags::new(events.clone()),
            error: RefCell::new(None),
            history: RefCell::new(HistoryLog::load(store.clone(), history_limit)),
            transcript: RefCell::new(Transcript::with_greeting()),
            panels: Cell::new(Surfaces::default()),
            theme: Cell::new(theme),
            find: RefCell::new(FindReplace::new()),
            store,
            events,
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn provider_name(&self) -> &str {
        self.dispatcher.provider_name()
    }

    /// Probes the backend once; a failure is only logged.
    pub async fn check_backend(&self) -> bool {
        self.dispatcher.check_availability().await.is_ok()
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn text(&self) -> String {
        self.document.borrow().text.clone()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.document.borrow().selection
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn history(&self) -> Ref<'_, HistoryLog> {
        self.history.borrow()
    }

    pub fn transcript(&self) -> Ref<'_, Transcript> {
        self.transcript.borrow()
    }

    pub fn flags(&self) -> FlagSnapshot {
        self.flags.snapshot()
    }

    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.flags.is_pending(kind)
    }

    pub fn theme(&self) -> Theme {
        self.theme.get()
    }

    pub fn surfaces(&self) -> Surfaces {
        Surfaces {
            error_visible: self.error.borrow().is_some(),
            ..self.panels.get()
        }
    }

    fn has_text(&self) -> bool {
        !self.document.borrow().text.trim().is_empty()
    }

    fn has_selection(&self) -> bool {
        self.selection().is_some_and(|s| !s.is_empty())
    }

    pub fn toolbar(&self) -> ToolbarState {
        let flags = self.flags.snapshot();
        let has_text = self.has_text();
        ToolbarState {
            can_correct: has_text && !flags.correcting,
            can_enhance: has_text && !flags.enhancing,
            can_format: self.has_selection() && !flags.correcting && !flags.enhancing,
        }
    }

    // ------------------------------------------------------------------
    // Document
    // ------------------------------------------------------------------

    /// A direct user edit. The selection survives only if it still fits.
    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        let selection = {
            let mut doc = self.document.borrow_mut();
            let char_len = text.chars().count();
            doc.text = text.clone();
            if doc.selection.is_some_and(|s| !s.fits(char_len)) {
                doc.selection = None;
            }
            doc.selection
        };
        self.find.borrow_mut().refresh(&text);
        self.events.publish(CoordinatorEvent::TextReplaced(text));
        if selection.is_none() {
            self.events.publish(CoordinatorEvent::SelectionChanged(None));
        }
    }

    /// Records the widget's selection. Out-of-range ranges are discarded.
    pub fn select(&self, selection: Option<Selection>) {
        let selection = {
            let mut doc = self.document.borrow_mut();
            let char_len = doc.text.chars().count();
            doc.selection = selection.filter(|s| s.fits(char_len));
            doc.selection
        };
        self.events.publish(CoordinatorEvent::SelectionChanged(selection));
    }

    /// Wholesale replacement; old offsets no longer apply.
    fn replace_document(&self, text: String) {
        {
            let mut doc = self.document.borrow_mut();
            doc.text = text.clone();
            doc.selection = None;
        }
        self.find.borrow_mut().refresh(&text);
        self.events.publish(CoordinatorEvent::TextReplaced(text));
        self.events.publish(CoordinatorEvent::SelectionChanged(None));
    }

    /// Appends a dictated transcript, separated from existing text by a space.
    pub fn append_dictation(&self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        let current = self.text();
        let text = if current.is_empty() {
            transcript.to_string()
        } else {
            format!("{} {}", current, transcript)
        };
        self.set_text(text);
    }

    // ------------------------------------------------------------------
    // Errors and surfaces
    // ------------------------------------------------------------------

    fn set_error(&self, message: Option<String>) {
        let changed = *self.error.borrow() != message;
        if changed {
            *self.error.borrow_mut() = message.clone();
            self.events.publish(CoordinatorEvent::ErrorChanged(message));
            self.events.publish(CoordinatorEvent::SurfacesChanged(self.surfaces()));
        }
    }

    pub fn dismiss_error(&self) {
        self.set_error(None);
    }

    fn update_panels(&self, f: impl FnOnce(&mut Surfaces)) {
        let mut panels = self.panels.get();
        f(&mut panels);
        if panels != self.panels.get() {
            self.panels.set(panels);
            self.events.publish(CoordinatorEvent::SurfacesChanged(self.surfaces()));
        }
    }

    pub fn open_history(&self) {
        self.update_panels(|s| s.history_open = true);
    }

    pub fn close_history(&self) {
        self.update_panels(|s| s.history_open = false);
    }

    pub fn toggle_tone_menu(&self) {
        self.update_panels(|s| s.tone_menu_open = !s.tone_menu_open);
    }

    pub fn close_tone_menu(&self) {
        self.update_panels(|s| s.tone_menu_open = false);
    }

    pub fn toggle_chat(&self) {
        self.update_panels(|s| s.chat_open = !s.chat_open);
    }

    pub fn close_chat(&self) {
        self.update_panels(|s| s.chat_open = false);
    }

    pub fn toggle_theme(&self) -> Theme {
        let theme = self.theme.get().toggled();
        self.theme.set(theme);
        self.store.set(THEME_STORE_KEY, &theme);
        self.events.publish(CoordinatorEvent::ThemeChanged(theme));
        theme
    }

    // ------------------------------------------------------------------
    // Correct / enhance
    // ------------------------------------------------------------------

    pub async fn correct(&self) -> OperationOutcome {
        let input = self.text();
        if input.trim().is_empty() {
            return OperationOutcome::Rejected;
        }
        let Some(_guard) = self.flags.try_begin(OperationKind::Correct) else {
            tracing::warn!("Correction already in progress");
            return OperationOutcome::Rejected;
        };
        self.set_error(None);

        match self.dispatcher.correct(&input).await {
            Ok(result) => self.settle(&input, result, |original, result| {
                HistoryEntry::correction(original, result, Utc::now())
            }),
            Err(e) => self.fail(e, "correct"),
        }
    }

    /// Rewrites the document in `tone`. Choosing a tone closes the menu.
    pub async fn enhance(&self, tone: Tone) -> OperationOutcome {
        self.close_tone_menu();
        let input = self.text();
        if input.trim().is_empty() {
            return OperationOutcome::Rejected;
        }
        let Some(_guard) = self.flags.try_begin(OperationKind::Enhance) else {
            tracing::warn!("Enhancement already in progress");
            return OperationOutcome::Rejected;
        };
        self.set_error(None);

        match self.dispatcher.enhance(&input, tone).await {
            Ok(result) => self.settle(&input, result, |original, result| {
                HistoryEntry::enhancement(original, result, tone, Utc::now())
            }),
            Err(e) => self.fail(e, "enhance"),
        }
    }

    fn settle(
        &self,
        input: &str,
        result: String,
        entry: impl FnOnce(&str, &str) -> HistoryEntry,
    ) -> OperationOutcome {
        if result == input {
            tracing::info!("Backend returned the text unchanged");
            return OperationOutcome::Unchanged;
        }
        let len = {
            let mut history = self.history.borrow_mut();
            let entry = entry(input, &result);
            tracing::info!("Applied {:?} {}", entry.kind, entry.id);
            history.prepend(entry);
            history.len()
        };
        self.events.publish(CoordinatorEvent::HistoryChanged { len });
        self.replace_document(result);
        OperationOutcome::Applied
    }

    fn fail(&self, error: ServiceError, op: &str) -> OperationOutcome {
        let message = if error.message.is_empty() {
            UNKNOWN_CORRECTION_ERROR.to_string()
        } else {
            error.message
        };
        tracing::error!("{} failed: {}", op, message);
        self.set_error(Some(message.clone()));
        OperationOutcome::Failed(message)
    }

    // ------------------------------------------------------------------
    // Formatting and history
    // ------------------------------------------------------------------

    /// Wraps the selection in `kind`'s markers. False when there is nothing
    /// selected.
    pub fn format(&self, kind: Formatting) -> bool {
        let (text, selection) = {
            let doc = self.document.borrow();
            let Some(selection) = doc.selection else {
                return false;
            };
            match apply_format(&doc.text, selection, kind) {
                Some(applied) => applied,
                None => return false,
            }
        };
        {
            let mut doc = self.document.borrow_mut();
            doc.text = text.clone();
            doc.selection = Some(selection);
        }
        self.find.borrow_mut().refresh(&text);
        self.events.publish(CoordinatorEvent::TextReplaced(text));
        self.events.publish(CoordinatorEvent::SelectionChanged(Some(selection)));
        true
    }

    /// Restores an entry's result and closes the history panel.
    pub fn apply_history(&self, id: &str) -> bool {
        let result = self.history.borrow().get(id).map(|e| e.result.clone());
        match result {
            Some(result) => {
                self.replace_document(result);
                self.close_history();
                true
            }
            None => {
                tracing::warn!("No history entry with id {}", id);
                false
            }
        }
    }

    pub fn clear_history(&self) {
        self.history.borrow_mut().clear();
        tracing::info!("History cleared");
        self.events.publish(CoordinatorEvent::HistoryChanged { len: 0 });
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub async fn send_chat(&self, input: &str) -> ChatOutcome {
        let message = input.trim();
        if message.is_empty() {
            return ChatOutcome::Rejected;
        }
        let Some(_guard) = self.flags.try_begin(OperationKind::Chat) else {
            return ChatOutcome::Rejected;
        };

        let prior = self.transcript.borrow().messages().to_vec();
        self.push_turn(ChatMessage::user(message));

        let stream = match self.dispatcher.chat(&prior, message).await {
            Ok(stream) => stream,
            Err(e) => {
                let text = if e.message.is_empty() {
                    UNKNOWN_CHAT_ERROR.to_string()
                } else {
                    e.message
                };
                self.push_turn(ChatMessage::model(text.clone()));
                return ChatOutcome::Failed(text);
            }
        };

        let outcome = consume_reply(stream, &self.transcript, |index, message| {
            self.events.publish(CoordinatorEvent::TranscriptUpdated {
                index,
                message: message.clone(),
            });
        })
        .await;

        match outcome {
            StreamOutcome::Settled(reply) => ChatOutcome::Replied(reply),
            StreamOutcome::Failed(message) => ChatOutcome::Failed(message),
        }
    }

    fn push_turn(&self, message: ChatMessage) {
        let index = self.transcript.borrow_mut().push(message.clone());
        self.events
            .publish(CoordinatorEvent::TranscriptUpdated { index, message });
    }

    /// Starts a new conversation. Refused while a reply is streaming.
    pub fn reset_chat(&self) -> bool {
        if self.flags.is_pending(OperationKind::Chat) {
            return false;
        }
        self.dispatcher.reset_session();
        *self.transcript.borrow_mut() = Transcript::with_greeting();
        if let Some(greeting) = self.transcript.borrow().last() {
            self.events.publish(CoordinatorEvent::TranscriptUpdated {
                index: 0,
                message: greeting.clone(),
            });
        }
        true
    }

    // ------------------------------------------------------------------
    // Find & replace
    // ------------------------------------------------------------------

    pub fn search(&self, query: &str) -> Option<Selection> {
        let text = self.text();
        let found = self.find.borrow_mut().set_query(query, &text);
        if found.is_some() {
            self.select(found);
        }
        found
    }

    pub fn find_next(&self) -> Option<Selection> {
        let found = self.find.borrow_mut().find_next();
        if found.is_some() {
            self.select(found);
        }
        found
    }

    pub fn find_prev(&self) -> Option<Selection> {
        let found = self.find.borrow_mut().find_prev();
        if found.is_some() {
            self.select(found);
        }
        found
    }

    pub fn set_replacement(&self, replacement: &str) {
        self.find.borrow_mut().set_replacement(replacement);
    }

    pub fn find_position(&self) -> String {
        self.find.borrow().position_label()
    }

    pub fn replace_current(&self) -> bool {
        let text = self.text();
        let replaced = self.find.borrow_mut().replace(&text);
        match replaced {
            Some(out) => {
                self.replace_document(out);
                true
            }
            None => false,
        }
    }

    pub fn replace_all(&self) -> usize {
        let text = self.text();
        let replaced = self.find.borrow_mut().replace_all(&text);
        match replaced {
            Some((out, count)) => {
                tracing::info!("Replaced {} matches", count);
                self.replace_document(out);
                count
            }
            None => 0,
        }
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    pub fn router_context(&self) -> RouterContext {
        RouterContext {
            surfaces: self.surfaces(),
            has_text: self.has_text(),
            has_selection: self.has_selection(),
        }
    }

    /// Routes `chord` and runs the resulting action. Returns whether the
    /// platform's default handling must be suppressed.
    pub async fn handle_key(&self, chord: KeyChord) -> bool {
        let routed = route(&chord, &self.router_context());
        match routed.action {
            Some(KeyAction::DismissError) => self.dismiss_error(),
            Some(KeyAction::CloseHistory) => self.close_history(),
            Some(KeyAction::CloseToneMenu) => self.close_tone_menu(),
            Some(KeyAction::CloseChat) => self.close_chat(),
            Some(KeyAction::Correct) => {
                self.correct().await;
            }
            Some(KeyAction::ToggleToneMenu) => self.toggle_tone_menu(),
            Some(KeyAction::Format(kind)) => {
                self.format(kind);
            }
            None => {}
        }
        routed.prevent_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CHAT_GREETING, CHAT_UNAVAILABLE_MESSAGE, CORRECT_FAILED_MESSAGE};
    use crate::history::EntryKind;
    use crate::store::MemoryStore;
    use crate::test_support::MockProvider;
    use std::rc::Rc;

    fn setup(provider: MockProvider) -> (Arc<MockProvider>, Coordinator) {
        let provider = Arc::new(provider);
        let store = StoreAdapter::new(Rc::new(MemoryStore::new()));
        let coordinator = Coordinator::new(provider.clone(), store, None);
        (provider, coordinator)
    }

    fn drain(rx: &mut UnboundedReceiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_correct_applies_and_records_history() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Ok("I am here."));
        c.set_text("i am here");
        c.select(Selection::new(0, 1));

        assert_eq!(c.correct().await, OperationOutcome::Applied);
        assert_eq!(c.text(), "I am here.");
        assert_eq!(c.selection(), None);

        let history = c.history();
        assert_eq!(history.len(), 1);
        let entry = &history.entries()[0];
        assert_eq!(entry.kind, EntryKind::Correction);
        assert_eq!(entry.original, "i am here");
        assert_eq!(entry.result, "I am here.");
    }

    #[tokio::test]
    async fn test_unchanged_result_is_a_no_op() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Ok("All good.\n"));
        c.set_text("All good.");
        let mut rx = c.subscribe();

        assert_eq!(c.correct().await, OperationOutcome::Unchanged);
        assert_eq!(c.text(), "All good.");
        assert!(c.history().is_empty());
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CoordinatorEvent::TextReplaced(_) | CoordinatorEvent::HistoryChanged { .. })));
    }

    #[tokio::test]
    async fn test_unchanged_enhancement_is_a_no_op() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Ok("Thank you."));
        c.set_text("Thank you.");
        c.select(Selection::new(0, 5));
        let mut rx = c.subscribe();

        assert_eq!(c.enhance(Tone::Friendly).await, OperationOutcome::Unchanged);
        assert_eq!(c.text(), "Thank you.");
        assert_eq!(c.selection(), Selection::new(0, 5));
        assert!(c.history().is_empty());
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CoordinatorEvent::TextReplaced(_) | CoordinatorEvent::HistoryChanged { .. })));
    }

    #[tokio::test]
    async fn test_failed_persistence_keeps_session_state() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Ok("Their house."));
        let backend = Rc::new(MemoryStore::with_quota(8));
        let c = Coordinator::new(provider.clone(), StoreAdapter::new(backend.clone()), None);
        c.set_text("there house");

        assert_eq!(c.correct().await, OperationOutcome::Applied);
        assert_eq!(c.text(), "Their house.");
        assert_eq!(c.history().len(), 1);
        assert_eq!(c.history().entries()[0].original, "there house");
        assert_eq!(c.error(), None);

        let reloaded = Coordinator::new(provider, StoreAdapter::new(backend), None);
        assert!(reloaded.history().is_empty());
    }

    #[tokio::test]
    async fn test_zero_history_limit_still_applies() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Ok("Fine."));
        let store = StoreAdapter::new(Rc::new(MemoryStore::new()));
        let c = Coordinator::new(provider, store, Some(0));
        c.set_text("fine");

        assert_eq!(c.correct().await, OperationOutcome::Applied);
        assert_eq!(c.text(), "Fine.");
        assert!(c.history().is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_sends_nothing() {
        let (provider, c) = setup(MockProvider::new());
        c.set_text("   \n");
        assert_eq!(c.correct().await, OperationOutcome::Rejected);
        assert_eq!(c.enhance(Tone::Casual).await, OperationOutcome::Rejected);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_flag_is_reset_after_every_failure() {
        let (provider, c) = setup(MockProvider::new());
        c.set_text("draft");
        for _ in 0..100 {
            provider.push_reply(Err("503"));
            assert_eq!(
                c.correct().await,
                OperationOutcome::Failed(CORRECT_FAILED_MESSAGE.to_string())
            );
            assert!(!c.is_pending(OperationKind::Correct));
        }
        assert_eq!(c.text(), "draft");
        assert!(c.history().is_empty());
        assert_eq!(c.error().as_deref(), Some(CORRECT_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_flag_is_pending_only_while_in_flight() {
        let (provider, c) = setup(MockProvider::gated());
        provider.push_reply(Ok("Done."));
        c.set_text("done");
        assert!(!c.is_pending(OperationKind::Correct));

        let (outcome, ()) = futures::join!(c.correct(), async {
            assert!(c.is_pending(OperationKind::Correct));
            provider.release(1);
        });
        assert_eq!(outcome, OperationOutcome::Applied);
        assert!(!c.is_pending(OperationKind::Correct));
    }

    #[tokio::test]
    async fn test_enhance_reentry_issues_one_request() {
        let (provider, c) = setup(MockProvider::gated());
        provider.push_reply(Ok("Kind regards."));
        c.set_text("bye");

        let (first, second, ()) = futures::join!(
            c.enhance(Tone::Formal),
            c.enhance(Tone::Formal),
            async { provider.release(1) }
        );
        assert_eq!(first, OperationOutcome::Applied);
        assert_eq!(second, OperationOutcome::Rejected);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_correct_and_enhance_run_side_by_side() {
        let (provider, c) = setup(MockProvider::gated());
        provider.push_reply(Ok("Draft."));
        provider.push_reply(Ok("A polished draft."));
        c.set_text("draft");

        let (a, b, ()) = futures::join!(c.correct(), c.enhance(Tone::Professional), async {
            let flags = c.flags();
            assert!(flags.correcting && flags.enhancing);
            assert!(!c.toolbar().can_format);
            provider.release(2);
        });
        assert_eq!(a, OperationOutcome::Applied);
        assert_eq!(b, OperationOutcome::Applied);
        assert_eq!(c.flags(), FlagSnapshot::default());

        let history = c.history();
        assert_eq!(history.len(), 2);
        assert!(history.entries().iter().all(|e| e.original == "draft"));
        assert!(["Draft.", "A polished draft."].contains(&c.text().as_str()));
    }

    #[tokio::test]
    async fn test_dropped_operation_releases_flag() {
        let (_provider, c) = setup(MockProvider::gated());
        c.set_text("text");
        {
            let mut pending = std::pin::pin!(c.correct());
            assert!(futures::poll!(pending.as_mut()).is_pending());
            assert!(c.is_pending(OperationKind::Correct));
        }
        assert!(!c.is_pending(OperationKind::Correct));
    }

    #[tokio::test]
    async fn test_enhance_records_tone_and_closes_menu() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Ok("Yo!"));
        c.set_text("Hello.");
        c.toggle_tone_menu();
        assert!(c.surfaces().tone_menu_open);

        assert_eq!(c.enhance(Tone::Casual).await, OperationOutcome::Applied);
        assert!(!c.surfaces().tone_menu_open);
        assert_eq!(c.history().entries()[0].tone, Some(Tone::Casual));
    }

    #[test]
    fn test_format_wraps_selection() {
        let (_provider, c) = setup(MockProvider::new());
        c.set_text("a cat");
        c.select(Selection::new(2, 5));
        assert!(c.format(Formatting::Bold));
        assert_eq!(c.text(), "a **cat**");
        assert_eq!(c.selection(), Selection::new(2, 9));
        assert!(c.history().is_empty());
    }

    #[test]
    fn test_format_without_selection_does_nothing() {
        let (_provider, c) = setup(MockProvider::new());
        c.set_text("a cat");
        assert!(!c.format(Formatting::Italic));
        assert_eq!(c.text(), "a cat");
    }

    #[test]
    fn test_out_of_range_selection_is_dropped() {
        let (_provider, c) = setup(MockProvider::new());
        c.set_text("abc");
        c.select(Selection::new(1, 9));
        assert_eq!(c.selection(), None);
        c.select(Selection::new(1, 3));
        c.set_text("a");
        assert_eq!(c.selection(), None);
    }

    #[tokio::test]
    async fn test_apply_history_restores_result() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Ok("Fixed."));
        c.set_text("fixd");
        c.correct().await;
        let id = c.history().entries()[0].id.clone();

        c.set_text("something else");
        c.open_history();
        assert!(c.apply_history(&id));
        assert_eq!(c.text(), "Fixed.");
        assert!(!c.surfaces().history_open);
        assert_eq!(c.history().len(), 1);
        assert!(!c.apply_history("missing"));
    }

    #[tokio::test]
    async fn test_history_and_theme_survive_restart() {
        let provider = Arc::new(MockProvider::new());
        provider.push_reply(Ok("Better."));
        let backend = Rc::new(MemoryStore::new());

        let first = Coordinator::new(provider.clone(), StoreAdapter::new(backend.clone()), None);
        first.set_text("beter");
        first.correct().await;
        assert_eq!(first.toggle_theme(), Theme::Light);

        let second = Coordinator::new(provider.clone(), StoreAdapter::new(backend.clone()), None);
        assert_eq!(second.history().len(), 1);
        assert_eq!(second.theme(), Theme::Light);

        second.clear_history();
        let third = Coordinator::new(provider, StoreAdapter::new(backend), None);
        assert!(third.history().is_empty());
    }

    #[tokio::test]
    async fn test_escape_closes_one_surface_at_a_time() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_reply(Err("offline"));
        c.set_text("x");
        c.correct().await;
        c.open_history();
        assert!(c.surfaces().error_visible);

        assert!(!c.handle_key(KeyChord::escape()).await);
        assert!(!c.surfaces().error_visible);
        assert!(c.surfaces().history_open);

        c.handle_key(KeyChord::escape()).await;
        assert!(!c.surfaces().history_open);
    }

    #[tokio::test]
    async fn test_correct_chord_on_blank_text_is_absorbed() {
        let (provider, c) = setup(MockProvider::new());
        assert!(c.handle_key(KeyChord::ctrl('e')).await);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_format_chord_ignores_pending_operations() {
        let (_provider, c) = setup(MockProvider::gated());
        c.set_text("word");
        c.select(Selection::new(0, 4));
        let mut pending = std::pin::pin!(c.correct());
        assert!(futures::poll!(pending.as_mut()).is_pending());

        assert!(!c.toolbar().can_format);
        assert!(c.handle_key(KeyChord::ctrl('u')).await);
        assert_eq!(c.text(), "__word__");
    }

    #[tokio::test]
    async fn test_chat_stream_progresses_transcript() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_stream(vec![Ok("Hel"), Ok("lo"), Ok(" there")]);
        let mut rx = c.subscribe();

        assert_eq!(c.send_chat(" hi ").await, ChatOutcome::Replied("Hello there".into()));

        let updates: Vec<(usize, String)> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                CoordinatorEvent::TranscriptUpdated { index, message } => Some((index, message.text)),
                _ => None,
            })
            .collect();
        assert_eq!(
            updates,
            vec![
                (1, "hi".to_string()),
                (2, "Hel".to_string()),
                (2, "Hello".to_string()),
                (2, "Hello there".to_string())
            ]
        );
        let transcript = c.transcript();
        assert_eq!(transcript.messages()[0], ChatMessage::model(CHAT_GREETING));
        assert_eq!(transcript.last(), Some(&ChatMessage::model("Hello there")));
        assert!(!c.is_pending(OperationKind::Chat));
    }

    #[tokio::test]
    async fn test_chat_failure_becomes_a_turn() {
        let (provider, c) = setup(MockProvider::new());
        provider.push_stream(vec![Ok("par"), Err("reset")]);
        assert_eq!(
            c.send_chat("q").await,
            ChatOutcome::Failed(CHAT_UNAVAILABLE_MESSAGE.to_string())
        );
        assert_eq!(c.send_chat("again").await, ChatOutcome::Failed(CHAT_UNAVAILABLE_MESSAGE.to_string()));

        let transcript = c.transcript();
        assert_eq!(transcript.last(), Some(&ChatMessage::model(CHAT_UNAVAILABLE_MESSAGE)));
        assert_eq!(c.error(), None);
    }

    #[tokio::test]
    async fn test_blank_chat_and_reset() {
        let (provider, c) = setup(MockProvider::new());
        assert_eq!(c.send_chat("  ").await, ChatOutcome::Rejected);
        provider.push_stream(vec![Ok("ok")]);
        c.send_chat("hello").await;
        assert_eq!(c.transcript().len(), 3);

        assert!(c.reset_chat());
        assert_eq!(c.transcript().len(), 1);
    }

    #[test]
    fn test_find_selects_and_replace_all_skips_history() {
        let (_provider, c) = setup(MockProvider::new());
        c.set_text("the cat and the hat");
        assert_eq!(c.search("THE"), Selection::new(0, 3));
        assert_eq!(c.selection(), Selection::new(0, 3));
        assert_eq!(c.find_next(), Selection::new(12, 15));
        assert_eq!(c.find_position(), "2 / 2");

        c.set_replacement("a");
        assert_eq!(c.replace_all(), 2);
        assert_eq!(c.text(), "a cat and a hat");
        assert_eq!(c.selection(), None);
        assert!(c.history().is_empty());
    }

    #[test]
    fn test_dictation_is_space_separated() {
        let (_provider, c) = setup(MockProvider::new());
        c.append_dictation(" hello ");
        c.append_dictation("world");
        c.append_dictation("   ");
        assert_eq!(c.text(), "hello world");
    }
}
