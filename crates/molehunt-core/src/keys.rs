//! Key combo parsing for input-action jump steps.
//!
//! A key string is one or more space-separated chords. Each chord is an
//! optional list of modifiers joined to a key with `+`:
//!
//! - `Enter`, `F5`, `a`
//! - `Ctrl+S`, `Alt+Tab`, `Ctrl+Shift+Escape`
//! - `Ctrl+K Ctrl+S` (two chords pressed one after the other)

use serde::{Deserialize, Serialize};

/// Keys with a name rather than a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKey {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Up,
    Down,
    Left,
    Right,
    /// Function key F1..=F12.
    F(u8),
}

/// The non-modifier part of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

/// Modifier keys held while the chord's key is clicked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift || self.meta)
    }
}

/// One key press with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub modifiers: Modifiers,
    pub key: Key,
}

/// Resolve a key name (case insensitive) to a named key.
///
/// Note: Internal function. Use `parse_key_sequence` for the public API.
fn named_key(key: &str) -> Option<Key> {
    let key_lower = key.to_lowercase();

    let named = match key_lower.as_str() {
        "enter" | "return" => NamedKey::Enter,
        "tab" => NamedKey::Tab,
        "escape" | "esc" => NamedKey::Escape,
        "backspace" => NamedKey::Backspace,
        "delete" | "del" => NamedKey::Delete,
        "space" => NamedKey::Space,
        // Named alias for literal + (useful since + is the combo separator)
        "plus" => return Some(Key::Char('+')),

        "home" => NamedKey::Home,
        "end" => NamedKey::End,
        "pageup" | "pgup" => NamedKey::PageUp,
        "pagedown" | "pgdn" => NamedKey::PageDown,
        "insert" | "ins" => NamedKey::Insert,

        "up" | "arrowup" => NamedKey::Up,
        "down" | "arrowdown" => NamedKey::Down,
        "left" | "arrowleft" => NamedKey::Left,
        "right" | "arrowright" => NamedKey::Right,

        other => {
            let n = other.strip_prefix('f')?.parse::<u8>().ok()?;
            if !(1..=12).contains(&n) {
                return None;
            }
            NamedKey::F(n)
        }
    };

    Some(Key::Named(named))
}

/// Parse a single chord like "Ctrl+C", "Alt+F4" or "Enter".
///
/// Note: Internal function. Use `parse_key_sequence` for the public API.
fn parse_key_chord(chord: &str) -> Option<KeyChord> {
    // A lone "+" is the plus key, not an empty combo
    if chord == "+" {
        return Some(KeyChord {
            modifiers: Modifiers::default(),
            key: Key::Char('+'),
        });
    }

    let mut modifiers = Modifiers::default();
    let mut key_part = "";

    for part in chord.split('+') {
        match part.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "alt" | "option" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "meta" | "win" | "super" | "cmd" => modifiers.meta = true,
            _ => {
                // Two non-modifier parts ("A+B") is not a chord
                if !key_part.is_empty() {
                    return None;
                }
                key_part = part;
            }
        }
    }

    if key_part.is_empty() {
        return None;
    }

    if let Some(key) = named_key(key_part) {
        return Some(KeyChord { modifiers, key });
    }

    let mut chars = key_part.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(KeyChord {
            modifiers,
            key: Key::Char(c.to_ascii_lowercase()),
        }),
        _ => None,
    }
}

/// Parse a key sequence like "Ctrl+K Ctrl+S" into chords.
///
/// Returns None when the sequence is empty or any chord is unknown, so a
/// malformed string never sends a partial sequence.
///
/// # Examples
///
/// ```
/// use molehunt_core::keys::parse_key_sequence;
///
/// let seq = parse_key_sequence("Ctrl+K Ctrl+S").unwrap();
/// assert_eq!(seq.len(), 2);
///
/// assert!(parse_key_sequence("Ctrl+NotAKey").is_none());
/// ```
pub fn parse_key_sequence(sequence: &str) -> Option<Vec<KeyChord>> {
    let parts: Vec<&str> = sequence.split_whitespace().collect();

    if parts.is_empty() {
        return None;
    }

    parts.into_iter().map(parse_key_chord).collect()
}
