//! Chord parsing: `[mod+]*key` into a normalized, matchable form.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChordError {
    #[error("empty chord")]
    Empty,
    #[error("unknown key token '{0}'")]
    UnknownKey(String),
    #[error("chord has no key, only modifiers")]
    ModifiersOnly,
    #[error("duplicate key token '{0}'")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mods {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub superkey: bool,
}

/// Named non-character keys addressable in chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Escape,
    Tab,
    Space,
    Enter,
}

/// A single key position. Characters are stored lowercase; the Shift
/// modifier is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Char(char),
    /// F1..F24.
    Function(u8),
    Named(NamedKey),
}

/// A parsed, normalized chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedChord {
    pub mods: Mods,
    pub key: KeyToken,
}

impl ParsedChord {
    /// Exact modifier match plus key equality. `Enter` matches both the
    /// main and keypad enter because hosts normalize them into one token.
    pub fn matches(&self, key: KeyToken, mods: Mods) -> bool {
        self.mods == mods && self.key == key
    }
}

fn parse_named(token: &str) -> Option<NamedKey> {
    Some(match token {
        "left" => NamedKey::Left,
        "right" => NamedKey::Right,
        "up" => NamedKey::Up,
        "down" => NamedKey::Down,
        "home" => NamedKey::Home,
        "end" => NamedKey::End,
        "pageup" => NamedKey::PageUp,
        "pagedown" => NamedKey::PageDown,
        "insert" => NamedKey::Insert,
        "delete" | "del" => NamedKey::Delete,
        "backspace" => NamedKey::Backspace,
        "escape" | "esc" => NamedKey::Escape,
        "tab" => NamedKey::Tab,
        "space" => NamedKey::Space,
        "enter" | "return" => NamedKey::Enter,
        _ => return None,
    })
}

fn parse_punctuation(token: &str) -> Option<char> {
    Some(match token {
        "minus" => '-',
        "plus" => '+',
        "equals" | "equal" => '=',
        "comma" => ',',
        "period" | "dot" => '.',
        "slash" => '/',
        "backslash" => '\\',
        "semicolon" => ';',
        "apostrophe" | "quote" => '\'',
        "grave" | "backtick" => '`',
        "leftbracket" => '[',
        "rightbracket" => ']',
        _ => return None,
    })
}

/// Parse a chord like `Ctrl+Shift+Z`, `Alt+B`, `Left` or `F1`.
///
/// Modifier tokens: Ctrl, Shift, Alt, and Super with Cmd/Meta/Win aliases.
/// Key tokens: a single character, `F1`..`F24`, a named key, or a
/// punctuation name (for punctuation that cannot appear literally, like
/// `Plus`).
pub fn parse_chord(chord: &str) -> Result<ParsedChord, ChordError> {
    let trimmed = chord.trim();
    if trimmed.is_empty() {
        return Err(ChordError::Empty);
    }

    let mut mods = Mods::default();
    let mut key: Option<KeyToken> = None;

    for raw in trimmed.split('+') {
        let token = raw.trim();
        if token.is_empty() {
            // A literal '+' key must be written as "Plus".
            return Err(ChordError::UnknownKey(trimmed.to_string()));
        }
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "ctrl" | "control" => mods.ctrl = true,
            "shift" => mods.shift = true,
            "alt" | "option" => mods.alt = true,
            "super" | "cmd" | "meta" | "win" => mods.superkey = true,
            _ => {
                let parsed = if let Some(named) = parse_named(&lower) {
                    KeyToken::Named(named)
                } else if let Some(ch) = parse_punctuation(&lower) {
                    KeyToken::Char(ch)
                } else if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok())
                    && (1..=24).contains(&n)
                {
                    KeyToken::Function(n)
                } else if lower.chars().count() == 1 {
                    KeyToken::Char(lower.chars().next().ok_or(ChordError::Empty)?)
                } else {
                    return Err(ChordError::UnknownKey(token.to_string()));
                };
                set_key(&mut key, parsed, token)?;
            }
        }
    }

    let key = key.ok_or(ChordError::ModifiersOnly)?;
    Ok(ParsedChord { mods, key })
}

fn set_key(slot: &mut Option<KeyToken>, key: KeyToken, token: &str) -> Result<(), ChordError> {
    if slot.is_some() {
        return Err(ChordError::DuplicateKey(token.to_string()));
    }
    *slot = Some(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_modifier_combinations() {
        let c = parse_chord("Ctrl+Shift+Z").unwrap();
        assert_eq!(c.mods, Mods { ctrl: true, shift: true, ..Mods::default() });
        assert_eq!(c.key, KeyToken::Char('z'));
    }

    #[test]
    fn super_aliases_all_parse() {
        for chord in ["Super+S", "Cmd+S", "Meta+S", "Win+S"] {
            let c = parse_chord(chord).unwrap();
            assert!(c.mods.superkey, "{chord}");
            assert_eq!(c.key, KeyToken::Char('s'));
        }
    }

    #[test]
    fn named_and_function_keys() {
        assert_eq!(parse_chord("Left").unwrap().key, KeyToken::Named(NamedKey::Left));
        assert_eq!(parse_chord("PageDown").unwrap().key, KeyToken::Named(NamedKey::PageDown));
        assert_eq!(parse_chord("F12").unwrap().key, KeyToken::Function(12));
        assert_eq!(parse_chord("Return").unwrap().key, KeyToken::Named(NamedKey::Enter));
    }

    #[test]
    fn punctuation_names() {
        assert_eq!(parse_chord("Ctrl+Plus").unwrap().key, KeyToken::Char('+'));
        assert_eq!(parse_chord("Ctrl+Minus").unwrap().key, KeyToken::Char('-'));
        assert_eq!(parse_chord("Ctrl+Period").unwrap().key, KeyToken::Char('.'));
    }

    #[test]
    fn errors_are_descriptive() {
        assert_eq!(parse_chord(""), Err(ChordError::Empty));
        assert_eq!(parse_chord("Ctrl+Shift"), Err(ChordError::ModifiersOnly));
        assert_eq!(parse_chord("Ctrl+Frobnicate"), Err(ChordError::UnknownKey("Frobnicate".into())));
        assert_eq!(parse_chord("A+B"), Err(ChordError::DuplicateKey("B".into())));
    }

    #[test]
    fn matching_requires_exact_mods() {
        let c = parse_chord("Ctrl+C").unwrap();
        assert!(c.matches(KeyToken::Char('c'), Mods { ctrl: true, ..Mods::default() }));
        assert!(!c.matches(
            KeyToken::Char('c'),
            Mods { ctrl: true, shift: true, ..Mods::default() }
        ));
        assert!(!c.matches(KeyToken::Char('c'), Mods::default()));
    }

    #[test]
    fn f_numbers_out_of_range_are_unknown() {
        assert!(matches!(parse_chord("F25"), Err(ChordError::UnknownKey(_))));
        assert!(matches!(parse_chord("F0"), Err(ChordError::UnknownKey(_))));
    }
}
