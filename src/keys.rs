//! Translation of key chords into coordinator actions.
//!
//! Routing is a pure function of the chord and a snapshot of what is open,
//! so it can be exercised without a coordinator or a terminal.

use crate::format::Formatting;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyChord {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            key: Key::Char(c),
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        }
    }

    pub fn ctrl_shift(c: char) -> Self {
        Self {
            key: Key::Char(c),
            modifiers: Modifiers {
                ctrl: true,
                shift: true,
                ..Modifiers::default()
            },
        }
    }

    pub fn escape() -> Self {
        Self::plain(Key::Escape)
    }

    /// Ctrl on Linux/Windows, Cmd on macOS.
    fn command(&self) -> bool {
        self.modifiers.ctrl || self.modifiers.meta
    }
}

/// Dismissable surfaces, listed in cancel priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Surfaces {
    pub error_visible: bool,
    pub history_open: bool,
    pub tone_menu_open: bool,
    pub chat_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterContext {
    pub surfaces: Surfaces,
    pub has_text: bool,
    pub has_selection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    DismissError,
    CloseHistory,
    CloseToneMenu,
    CloseChat,
    Correct,
    ToggleToneMenu,
    Format(Formatting),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Routed {
    pub action: Option<KeyAction>,
    /// The platform's own handling of the chord must be suppressed.
    pub prevent_default: bool,
}

impl Routed {
    fn ignored() -> Self {
        Self::default()
    }

    fn absorbed(action: Option<KeyAction>) -> Self {
        Self {
            action,
            prevent_default: true,
        }
    }
}

pub fn route(chord: &KeyChord, ctx: &RouterContext) -> Routed {
    if chord.key == Key::Escape {
        let s = &ctx.surfaces;
        let action = if s.error_visible {
            Some(KeyAction::DismissError)
        } else if s.history_open {
            Some(KeyAction::CloseHistory)
        } else if s.tone_menu_open {
            Some(KeyAction::CloseToneMenu)
        } else if s.chat_open {
            Some(KeyAction::CloseChat)
        } else {
            None
        };
        return Routed {
            action,
            prevent_default: false,
        };
    }

    if !chord.command() {
        return Routed::ignored();
    }

    let Key::Char(c) = chord.key else {
        return Routed::ignored();
    };

    match c.to_ascii_lowercase() {
        'e' if chord.modifiers.shift => {
            Routed::absorbed(ctx.has_text.then_some(KeyAction::ToggleToneMenu))
        }
        'e' => Routed::absorbed(ctx.has_text.then_some(KeyAction::Correct)),
        'b' => format_chord(ctx, Formatting::Bold),
        'i' => format_chord(ctx, Formatting::Italic),
        'u' => format_chord(ctx, Formatting::Underline),
        _ => Routed::ignored(),
    }
}

fn format_chord(ctx: &RouterContext, kind: Formatting) -> Routed {
    Routed::absorbed(ctx.has_selection.then_some(KeyAction::Format(kind)))
}
