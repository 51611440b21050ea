//! Per-frame input capture.
//!
//! The host fills these queues each frame (typed codepoints, named key
//! events, mouse cell position); the tool runtime reads them through the
//! frame context. The engine only owns rotation of the previous-frame
//! cursor snapshot and end-of-frame cleanup.

/// Discrete named key presses for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyEvents {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub home: bool,
    pub end: bool,
    pub backspace: bool,
    pub delete: bool,
    pub enter: bool,
    pub escape: bool,
    pub c: bool,
    pub v: bool,
    pub x: bool,
    pub a: bool,
}

/// Modifier state for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mods {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub superkey: bool,
}

/// Resolved clipboard/selection hotkeys (already keymap-evaluated by the host).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hotkeys {
    pub copy: bool,
    pub cut: bool,
    pub paste: bool,
    pub select_all: bool,
    pub cancel: bool,
    pub delete_selection: bool,
}

/// Mouse position in cell coordinates. `half_y` addresses half-cell rows
/// (`2*row`, plus one when the pointer is in the bottom half), which block
/// tools use for pseudo-pixel painting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorState {
    pub valid: bool,
    pub x: i32,
    pub y: i32,
    pub half_y: i32,
    pub left: bool,
    pub right: bool,
}

/// Everything the tool runtime can observe about input this frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// UTF-8 codepoints produced by text input this frame, in order.
    pub typed: Vec<char>,
    pub keys: KeyEvents,
    pub mods: Mods,
    pub hotkeys: Hotkeys,
    /// Keymap action ids pressed this frame.
    pub actions: Vec<String>,
    pub cursor: CursorState,
    pub cursor_prev: CursorState,
    pub focused: bool,
}

impl FrameInput {
    /// Start a new frame: the current cursor becomes the previous-frame
    /// snapshot and the per-frame event queues reset. Host code then fills
    /// the new state before the tool runs.
    pub fn begin_frame(&mut self) {
        self.cursor_prev = self.cursor;
        self.typed.clear();
        self.keys = KeyEvents::default();
        self.hotkeys = Hotkeys::default();
        self.actions.clear();
    }

    /// Queue one typed codepoint.
    pub fn push_typed(&mut self, cp: char) {
        self.typed.push(cp);
    }

    /// Whether any mouse button is held (keeps the undo capture scope open
    /// across a drag gesture).
    pub fn any_button_down(&self) -> bool {
        self.cursor.left || self.cursor.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_frame_rotates_cursor_and_clears_events() {
        let mut input = FrameInput::default();
        input.cursor = CursorState { valid: true, x: 4, y: 2, half_y: 5, left: true, right: false };
        input.push_typed('q');
        input.keys.enter = true;
        input.actions.push("nav.home".into());

        input.begin_frame();

        assert_eq!(input.cursor_prev.x, 4);
        assert_eq!(input.cursor_prev.half_y, 5);
        assert!(input.cursor_prev.left);
        assert!(input.typed.is_empty());
        assert!(!input.keys.enter);
        assert!(input.actions.is_empty());
    }
}
