//! Built-in default actions. User overrides merge onto these by id.

use crate::{Action, KeyBinding};

fn action(id: &str, title: &str, category: &str, bindings: Vec<KeyBinding>) -> Action {
    Action {
        id: id.to_string(),
        title: title.to_string(),
        category: category.to_string(),
        description: String::new(),
        bindings,
    }
}

/// The default action set: caret navigation, editing, selection, clipboard
/// and history.
pub fn default_actions() -> Vec<Action> {
    vec![
        // Navigation (repeat so held arrows keep moving the caret).
        action(
            "nav.caret_left",
            "Caret left",
            "Navigation",
            vec![KeyBinding::new("Left").with_context("canvas").repeating()],
        ),
        action(
            "nav.caret_right",
            "Caret right",
            "Navigation",
            vec![KeyBinding::new("Right").with_context("canvas").repeating()],
        ),
        action(
            "nav.caret_up",
            "Caret up",
            "Navigation",
            vec![KeyBinding::new("Up").with_context("canvas").repeating()],
        ),
        action(
            "nav.caret_down",
            "Caret down",
            "Navigation",
            vec![KeyBinding::new("Down").with_context("canvas").repeating()],
        ),
        action(
            "nav.home",
            "Start of row",
            "Navigation",
            vec![KeyBinding::new("Home").with_context("canvas")],
        ),
        action(
            "nav.end",
            "End of row",
            "Navigation",
            vec![KeyBinding::new("End").with_context("canvas")],
        ),
        // Editing.
        action(
            "editor.backspace",
            "Backspace",
            "Editing",
            vec![KeyBinding::new("Backspace").with_context("editor").repeating()],
        ),
        action(
            "editor.delete_forward",
            "Delete forward",
            "Editing",
            vec![KeyBinding::new("Delete").with_context("editor").repeating()],
        ),
        action(
            "editor.new_line",
            "New line",
            "Editing",
            vec![KeyBinding::new("Enter").with_context("editor")],
        ),
        // Selection.
        action(
            "selection.select_all",
            "Select all",
            "Selection",
            vec![KeyBinding::new("Ctrl+A").with_context("canvas")],
        ),
        action(
            "selection.delete",
            "Delete selection",
            "Selection",
            vec![KeyBinding::new("Delete").with_context("selection")],
        ),
        action(
            "selection.clear_or_cancel",
            "Deselect / cancel move",
            "Selection",
            vec![KeyBinding::new("Escape")],
        ),
        // Clipboard.
        action(
            "clipboard.copy",
            "Copy",
            "Clipboard",
            vec![KeyBinding::new("Ctrl+C").with_context("canvas")],
        ),
        action(
            "clipboard.cut",
            "Cut",
            "Clipboard",
            vec![KeyBinding::new("Ctrl+X").with_context("canvas")],
        ),
        action(
            "clipboard.paste",
            "Paste",
            "Clipboard",
            vec![KeyBinding::new("Ctrl+V").with_context("canvas")],
        ),
        // History.
        action(
            "history.undo",
            "Undo",
            "History",
            vec![KeyBinding::new("Ctrl+Z")],
        ),
        action(
            "history.redo",
            "Redo",
            "History",
            vec![KeyBinding::new("Ctrl+Shift+Z"), KeyBinding::new("Ctrl+Y")],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let actions = default_actions();
        let ids: HashSet<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids.len(), actions.len());
    }

    #[test]
    fn every_default_chord_parses() {
        for a in default_actions() {
            for b in &a.bindings {
                assert!(crate::parse_chord(&b.chord).is_ok(), "{}: {}", a.id, b.chord);
            }
        }
    }
}
