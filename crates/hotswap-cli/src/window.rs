//! Trigger window state and its toggle key

use std::fmt;

/// A key combination such as `alt+p`
///
/// Modifiers are order-insensitive; `option` is accepted for `alt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    modifiers: Vec<String>,
    key: String,
}

impl KeyChord {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parts: Vec<String> = input
            .split('+')
            .map(|p| p.trim().to_lowercase())
            .collect();

        let key = parts.pop().filter(|k| !k.is_empty()).ok_or_else(|| {
            format!("key combination `{}` has no key", input)
        })?;

        let mut modifiers = Vec::with_capacity(parts.len());
        for part in parts {
            let modifier = match part.as_str() {
                "alt" | "option" => "alt",
                "ctrl" | "control" => "ctrl",
                "shift" => "shift",
                "cmd" | "super" | "meta" => "super",
                other => return Err(format!("unknown modifier `{}`", other)),
            };
            modifiers.push(modifier.to_string());
        }
        modifiers.sort();
        modifiers.dedup();

        Ok(Self { modifiers, key })
    }

    /// Whether a typed console line spells this chord
    pub fn matches(&self, input: &str) -> bool {
        KeyChord::parse(input).is_ok_and(|chord| chord == *self)
    }
}

impl Default for KeyChord {
    fn default() -> Self {
        Self {
            modifiers: vec!["alt".to_string()],
            key: "p".to_string(),
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier)?;
        }
        write!(f, "{}", self.key)
    }
}

/// Visibility of the trigger panel
#[derive(Debug, Clone)]
pub struct TriggerWindow {
    chord: KeyChord,
    visible: bool,
}

impl TriggerWindow {
    /// Opened at startup
    pub fn new(chord: KeyChord) -> Self {
        Self {
            chord,
            visible: true,
        }
    }

    pub fn chord(&self) -> &KeyChord {
        &self.chord
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Flip visibility, returning the new state
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }
}
