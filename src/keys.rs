//! Keyboard definitions used for `Input.dispatchKeyEvent` synthesis.
//!
//! Named keys carry the USB/DOM `code` and windows virtual key code the
//! protocol expects. Printable characters are derived on the fly.

use phf::phf_map;

/// CDP modifier bitmask values
pub const MODIFIER_ALT: i64 = 1;
pub const MODIFIER_CONTROL: i64 = 2;
pub const MODIFIER_META: i64 = 4;
pub const MODIFIER_SHIFT: i64 = 8;

/// A modifier key held during a combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alt,
    Control,
    Meta,
    Shift,
}

impl Modifier {
    /// The CDP `modifiers` bit for this key: Alt=1, Ctrl=2, Meta=4, Shift=8
    pub fn bit(self) -> i64 {
        match self {
            Modifier::Alt => MODIFIER_ALT,
            Modifier::Control => MODIFIER_CONTROL,
            Modifier::Meta => MODIFIER_META,
            Modifier::Shift => MODIFIER_SHIFT,
        }
    }

    /// Parse a user-facing modifier token.
    ///
    /// `cmd`/`command` resolve to Meta on macOS and Control elsewhere, so the
    /// same combo string works across hosts.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "alt" | "option" => Some(Modifier::Alt),
            "ctrl" | "control" => Some(Modifier::Control),
            "meta" => Some(Modifier::Meta),
            "win" | "windows" => Some(Modifier::Meta),
            "cmd" | "command" => {
                if cfg!(target_os = "macos") {
                    Some(Modifier::Meta)
                } else {
                    Some(Modifier::Control)
                }
            }
            "shift" => Some(Modifier::Shift),
            _ => None,
        }
    }

    pub fn key_definition(self) -> Key {
        match self {
            Modifier::Alt => Key::named("Alt", "AltLeft", 18),
            Modifier::Control => Key::named("Control", "ControlLeft", 17),
            Modifier::Meta => Key::named("Meta", "MetaLeft", 91),
            Modifier::Shift => Key::named("Shift", "ShiftLeft", 16),
        }
    }
}

/// Sum of the `bit()`s of all held modifiers
pub fn modifier_bits(modifiers: &[Modifier]) -> i64 {
    modifiers.iter().fold(0, |acc, m| acc | m.bit())
}

/// A statically known key definition
#[derive(Debug, Clone, Copy)]
pub struct KeyDefinition {
    pub key: &'static str,
    pub code: &'static str,
    pub key_code: i64,
    pub text: Option<&'static str>,
}

static NAMED_KEYS: phf::Map<&'static str, KeyDefinition> = phf_map! {
    "Enter" => KeyDefinition { key: "Enter", code: "Enter", key_code: 13, text: Some("\r") },
    "Tab" => KeyDefinition { key: "Tab", code: "Tab", key_code: 9, text: None },
    "Backspace" => KeyDefinition { key: "Backspace", code: "Backspace", key_code: 8, text: None },
    "Escape" => KeyDefinition { key: "Escape", code: "Escape", key_code: 27, text: None },
    "Delete" => KeyDefinition { key: "Delete", code: "Delete", key_code: 46, text: None },
    "ArrowLeft" => KeyDefinition { key: "ArrowLeft", code: "ArrowLeft", key_code: 37, text: None },
    "ArrowUp" => KeyDefinition { key: "ArrowUp", code: "ArrowUp", key_code: 38, text: None },
    "ArrowRight" => KeyDefinition { key: "ArrowRight", code: "ArrowRight", key_code: 39, text: None },
    "ArrowDown" => KeyDefinition { key: "ArrowDown", code: "ArrowDown", key_code: 40, text: None },
    "Home" => KeyDefinition { key: "Home", code: "Home", key_code: 36, text: None },
    "End" => KeyDefinition { key: "End", code: "End", key_code: 35, text: None },
    "PageUp" => KeyDefinition { key: "PageUp", code: "PageUp", key_code: 33, text: None },
    "PageDown" => KeyDefinition { key: "PageDown", code: "PageDown", key_code: 34, text: None },
    "Insert" => KeyDefinition { key: "Insert", code: "Insert", key_code: 45, text: None },
    "Space" => KeyDefinition { key: " ", code: "Space", key_code: 32, text: Some(" ") },
    "F1" => KeyDefinition { key: "F1", code: "F1", key_code: 112, text: None },
    "F2" => KeyDefinition { key: "F2", code: "F2", key_code: 113, text: None },
    "F3" => KeyDefinition { key: "F3", code: "F3", key_code: 114, text: None },
    "F4" => KeyDefinition { key: "F4", code: "F4", key_code: 115, text: None },
    "F5" => KeyDefinition { key: "F5", code: "F5", key_code: 116, text: None },
    "F6" => KeyDefinition { key: "F6", code: "F6", key_code: 117, text: None },
    "F7" => KeyDefinition { key: "F7", code: "F7", key_code: 118, text: None },
    "F8" => KeyDefinition { key: "F8", code: "F8", key_code: 119, text: None },
    "F9" => KeyDefinition { key: "F9", code: "F9", key_code: 120, text: None },
    "F10" => KeyDefinition { key: "F10", code: "F10", key_code: 121, text: None },
    "F11" => KeyDefinition { key: "F11", code: "F11", key_code: 122, text: None },
    "F12" => KeyDefinition { key: "F12", code: "F12", key_code: 123, text: None },
    "Shift" => KeyDefinition { key: "Shift", code: "ShiftLeft", key_code: 16, text: None },
    "Control" => KeyDefinition { key: "Control", code: "ControlLeft", key_code: 17, text: None },
    "Alt" => KeyDefinition { key: "Alt", code: "AltLeft", key_code: 18, text: None },
    "Meta" => KeyDefinition { key: "Meta", code: "MetaLeft", key_code: 91, text: None },
};

/// A resolved key, either from the named table or derived from a printable
/// character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub key: String,
    pub code: String,
    pub key_code: i64,
    pub text: Option<String>,
}

impl Key {
    fn named(key: &str, code: &str, key_code: i64) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: None,
        }
    }

    /// Whether this is a single printable character
    pub fn is_printable(&self) -> bool {
        self.text.is_some() && self.key.chars().count() == 1
    }
}

impl From<&KeyDefinition> for Key {
    fn from(def: &KeyDefinition) -> Self {
        Self {
            key: def.key.to_string(),
            code: def.code.to_string(),
            key_code: def.key_code,
            text: def.text.map(str::to_string),
        }
    }
}

/// Resolve a key token to its definition.
///
/// Named keys (`"Enter"`, `"ArrowDown"`, ...) come from the static table,
/// single characters are derived from their ascii layout position.
pub fn key_definition(token: &str) -> Option<Key> {
    if let Some(def) = NAMED_KEYS.get(token) {
        return Some(def.into());
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(char_definition(c)),
        _ => None,
    }
}

/// Key definition for a printable character
pub fn char_definition(c: char) -> Key {
    let text = c.to_string();
    let (code, key_code) = match c {
        'a'..='z' => (format!("Key{}", c.to_ascii_uppercase()), c.to_ascii_uppercase() as i64),
        'A'..='Z' => (format!("Key{c}"), c as i64),
        '0'..='9' => (format!("Digit{c}"), c as i64),
        ' ' => ("Space".to_string(), 32),
        ';' | ':' => ("Semicolon".to_string(), 186),
        '=' | '+' => ("Equal".to_string(), 187),
        ',' | '<' => ("Comma".to_string(), 188),
        '-' | '_' => ("Minus".to_string(), 189),
        '.' | '>' => ("Period".to_string(), 190),
        '/' | '?' => ("Slash".to_string(), 191),
        '`' | '~' => ("Backquote".to_string(), 192),
        '[' | '{' => ("BracketLeft".to_string(), 219),
        '\\' | '|' => ("Backslash".to_string(), 220),
        ']' | '}' => ("BracketRight".to_string(), 221),
        '\'' | '"' => ("Quote".to_string(), 222),
        '!' => ("Digit1".to_string(), 49),
        '@' => ("Digit2".to_string(), 50),
        '#' => ("Digit3".to_string(), 51),
        '$' => ("Digit4".to_string(), 52),
        '%' => ("Digit5".to_string(), 53),
        '^' => ("Digit6".to_string(), 54),
        '&' => ("Digit7".to_string(), 55),
        '*' => ("Digit8".to_string(), 56),
        '(' => ("Digit9".to_string(), 57),
        ')' => ("Digit0".to_string(), 48),
        '\n' | '\r' => ("Enter".to_string(), 13),
        // layout position unknown, let the browser sort it out from `text`
        _ => (String::new(), 0),
    };
    Key {
        key: text.clone(),
        code,
        key_code,
        text: Some(text),
    }
}

/// A parsed key combination like `"Cmd+Shift+A"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    /// Modifiers in the order they appear in the combo string
    pub modifiers: Vec<Modifier>,
    /// The main key token, resolved last
    pub key: Key,
}

/// Parse a `+`-separated combination.
///
/// A trailing empty segment means the `+` character itself is the main key,
/// so `"+"` and `"Shift++"` both resolve to the plus key.
pub fn parse_combo(combo: &str) -> Option<KeyCombo> {
    if combo.is_empty() {
        return None;
    }
    let parts: Vec<&str> = combo.split('+').collect();

    let (main, modifier_parts) = if parts.len() >= 2 && parts[parts.len() - 1].is_empty() {
        // `split` yields a trailing empty segment when the string ends in '+'
        ("+", &parts[..parts.len() - 2])
    } else {
        (parts[parts.len() - 1], &parts[..parts.len() - 1])
    };

    let mut modifiers = Vec::with_capacity(modifier_parts.len());
    for token in modifier_parts {
        modifiers.push(Modifier::from_token(token)?);
    }

    let key = key_definition(main)?;
    Some(KeyCombo { modifiers, key })
}

/// Editing commands macOS routes through the renderer instead of key events.
///
/// Only consulted when Meta is held; empty on other hosts.
pub fn editing_commands(modifiers: &[Modifier], key: &Key) -> Vec<String> {
    if !cfg!(target_os = "macos") || !modifiers.contains(&Modifier::Meta) {
        return Vec::new();
    }
    let cmd = match key.key.to_ascii_lowercase().as_str() {
        "a" => Some("selectAll"),
        "c" => Some("copy"),
        "x" => Some("cut"),
        "v" => Some("paste"),
        "z" => Some("undo"),
        _ => None,
    };
    cmd.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_resolve() {
        let enter = key_definition("Enter").unwrap();
        assert_eq!(enter.key, "Enter");
        assert_eq!(enter.key_code, 13);
        assert_eq!(enter.text.as_deref(), Some("\r"));

        let down = key_definition("ArrowDown").unwrap();
        assert_eq!(down.code, "ArrowDown");
        assert!(down.text.is_none());
    }

    #[test]
    fn char_keys_resolve() {
        let a = key_definition("a").unwrap();
        assert_eq!(a.code, "KeyA");
        assert_eq!(a.key_code, 65);
        assert_eq!(a.text.as_deref(), Some("a"));

        let five = key_definition("5").unwrap();
        assert_eq!(five.code, "Digit5");
        assert_eq!(five.key_code, 53);
    }

    #[test]
    fn combo_parses_modifiers_in_order() {
        let combo = parse_combo("Ctrl+Shift+A").unwrap();
        assert_eq!(combo.modifiers, vec![Modifier::Control, Modifier::Shift]);
        assert_eq!(combo.key.key, "A");
    }

    #[test]
    fn plus_is_a_key_not_an_empty_combo() {
        let combo = parse_combo("+").unwrap();
        assert!(combo.modifiers.is_empty());
        assert_eq!(combo.key.key, "+");
        assert_eq!(combo.key.code, "Equal");

        let combo = parse_combo("Shift++").unwrap();
        assert_eq!(combo.modifiers, vec![Modifier::Shift]);
        assert_eq!(combo.key.key, "+");
    }

    #[test]
    fn unknown_modifier_rejected() {
        assert!(parse_combo("Hyper+A").is_none());
    }

    #[test]
    fn modifier_bitmask_matches_protocol() {
        assert_eq!(modifier_bits(&[Modifier::Alt]), 1);
        assert_eq!(modifier_bits(&[Modifier::Control]), 2);
        assert_eq!(modifier_bits(&[Modifier::Meta]), 4);
        assert_eq!(modifier_bits(&[Modifier::Shift]), 8);
        assert_eq!(
            modifier_bits(&[Modifier::Control, Modifier::Shift]),
            2 | 8
        );
    }

    #[test]
    fn cmd_normalizes_per_host() {
        let expected = if cfg!(target_os = "macos") {
            Modifier::Meta
        } else {
            Modifier::Control
        };
        assert_eq!(Modifier::from_token("cmd"), Some(expected));
        assert_eq!(Modifier::from_token("command"), Some(expected));
        assert_eq!(Modifier::from_token("win"), Some(Modifier::Meta));
        assert_eq!(Modifier::from_token("option"), Some(Modifier::Alt));
    }
}
