//! Keyboard shortcut parsing, matching and dispatch.
//!
//! A shortcut string holds `;`-separated alternatives, each a `+`-separated
//! list of tokens. `ALT`, `CTRL`, `META` and `SHIFT` set modifiers, `PLUS`
//! stands for a literal `+` key, and any other token is the key itself.
//! Tokens are case-insensitive. A binding matches an event only when all
//! four modifier flags are equal and the keys are equal.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{OptionsError, Result};
use crate::manifest::OptionType;
use crate::options::OptionsStore;

/// A key press as delivered by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    /// The event originated in an editable text field.
    #[serde(default)]
    pub from_text_input: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn in_text_input(mut self) -> Self {
        self.from_text_input = true;
        self
    }
}

/// One key binding: a key plus the exact modifier set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    /// Uppercased key name.
    pub key: String,
}

impl Shortcut {
    pub fn parse(binding: &str) -> Result<Self> {
        let mut shortcut = Shortcut {
            alt: false,
            ctrl: false,
            meta: false,
            shift: false,
            key: String::new(),
        };
        let mut key = None;
        for token in binding.trim().to_uppercase().split('+') {
            match token.trim() {
                "" => {}
                "ALT" => shortcut.alt = true,
                "CTRL" => shortcut.ctrl = true,
                "META" => shortcut.meta = true,
                "SHIFT" => shortcut.shift = true,
                "PLUS" => key = Some("+".to_string()),
                other => key = Some(other.to_string()),
            }
        }
        shortcut.key = key.ok_or_else(|| {
            OptionsError::InvalidShortcut(format!("no key in binding {:?}", binding))
        })?;
        Ok(shortcut)
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.alt == self.alt
            && event.ctrl == self.ctrl
            && event.meta == self.meta
            && event.shift == self.shift
            && event.key.to_uppercase() == self.key
    }
}

impl FromStr for Shortcut {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self> {
        Shortcut::parse(s)
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("CTRL");
        }
        if self.alt {
            parts.push("ALT");
        }
        if self.meta {
            parts.push("META");
        }
        if self.shift {
            parts.push("SHIFT");
        }
        let key = if self.key == "+" { "PLUS" } else { self.key.as_str() };
        parts.push(key);
        f.write_str(&parts.join("+"))
    }
}

/// Alternative bindings for one action, OR'd together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutSet {
    bindings: Vec<Shortcut>,
}

impl ShortcutSet {
    /// Parse a `;`-separated list of bindings. Empty alternatives are
    /// ignored; any alternative without a key fails the whole set.
    pub fn parse(text: &str) -> Result<Self> {
        let mut set = ShortcutSet::default();
        set.extend_from(text)?;
        Ok(set)
    }

    fn extend_from(&mut self, text: &str) -> Result<()> {
        let parsed = text
            .split(';')
            .filter(|alt| !alt.trim().is_empty())
            .map(Shortcut::parse)
            .collect::<Result<Vec<_>>>()?;
        for shortcut in parsed {
            if !self.bindings.contains(&shortcut) {
                self.bindings.push(shortcut);
            }
        }
        Ok(())
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.bindings.iter().any(|s| s.matches(event))
    }

    pub fn bindings(&self) -> &[Shortcut] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// What the host should do after a key press was dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// Actions that fired, in registration order.
    pub actions: Vec<String>,
}

impl KeyOutcome {
    /// The host should prevent the default action and stop propagation.
    pub fn handled(&self) -> bool {
        !self.actions.is_empty()
    }
}

type ActionListener = Arc<dyn Fn(&str, &KeyEvent) + Send + Sync>;

/// Maps action names to shortcut sets and invokes listeners on key presses.
#[derive(Default)]
pub struct ShortcutDispatcher {
    shortcuts: RwLock<Vec<(String, ShortcutSet)>>,
    listeners: RwLock<Vec<(String, ActionListener)>>,
}

impl ShortcutDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every binding with the given `(action, shortcut)` pairs.
    /// Pairs that fail to parse are skipped with a warning.
    pub fn set_shortcuts<I, A, S>(&self, shortcuts: I)
    where
        I: IntoIterator<Item = (A, S)>,
        A: Into<String>,
        S: AsRef<str>,
    {
        self.shortcuts.write().clear();
        for (action, shortcut) in shortcuts {
            let action = action.into();
            if let Err(e) = self.add_shortcut(&action, shortcut.as_ref()) {
                warn!("ignoring shortcut for {}: {}", action, e);
            }
        }
    }

    /// Replace the bindings of one action.
    pub fn set_shortcut(&self, action: &str, shortcut: &str) -> Result<()> {
        let set = ShortcutSet::parse(shortcut)?;
        let mut shortcuts = self.shortcuts.write();
        match shortcuts.iter_mut().find(|(name, _)| name == action) {
            Some((_, existing)) => *existing = set,
            None => shortcuts.push((action.to_string(), set)),
        }
        Ok(())
    }

    /// Add alternative bindings to an action, keeping the existing ones.
    pub fn add_shortcut(&self, action: &str, shortcut: &str) -> Result<()> {
        let mut shortcuts = self.shortcuts.write();
        match shortcuts.iter_mut().find(|(name, _)| name == action) {
            Some((_, existing)) => existing.extend_from(shortcut)?,
            None => shortcuts.push((action.to_string(), ShortcutSet::parse(shortcut)?)),
        }
        Ok(())
    }

    pub fn remove_shortcut(&self, action: &str) -> bool {
        let mut shortcuts = self.shortcuts.write();
        let before = shortcuts.len();
        shortcuts.retain(|(name, _)| name != action);
        shortcuts.len() != before
    }

    pub fn shortcut(&self, action: &str) -> Option<ShortcutSet> {
        self.shortcuts
            .read()
            .iter()
            .find(|(name, _)| name == action)
            .map(|(_, set)| set.clone())
    }

    /// Invoke `listener` whenever `action` fires.
    pub fn subscribe<F>(&self, action: &str, listener: F)
    where
        F: Fn(&str, &KeyEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .push((action.to_string(), Arc::new(listener)));
    }

    /// Dispatch a key press. Presses inside text inputs are ignored.
    pub fn handle_key_down(&self, event: &KeyEvent) -> KeyOutcome {
        if event.from_text_input {
            return KeyOutcome::default();
        }

        let actions: Vec<String> = self
            .shortcuts
            .read()
            .iter()
            .filter(|(_, set)| set.matches(event))
            .map(|(name, _)| name.clone())
            .collect();

        for action in &actions {
            debug!("shortcut fired: {}", action);
            let bound: Vec<ActionListener> = self
                .listeners
                .read()
                .iter()
                .filter(|(name, _)| name == action)
                .map(|(_, l)| Arc::clone(l))
                .collect();
            for listener in bound {
                listener(action, event);
            }
        }

        KeyOutcome { actions }
    }

    /// Bind every shortcut-typed option, using the option name as the
    /// action name and its current value as the shortcut string.
    pub async fn load_from_options(&self, options: &OptionsStore) {
        for (name, value) in options.get_options_by_type(OptionType::Shortcut).await {
            match value.as_ref().and_then(|v| v.as_str()) {
                Some(text) => {
                    if let Err(e) = self.set_shortcut(&name, text) {
                        warn!("ignoring shortcut option {}: {}", name, e);
                    }
                }
                None => {
                    self.remove_shortcut(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_modifiers() {
        let s = Shortcut::parse("ctrl+shift+s").unwrap();
        assert!(s.ctrl && s.shift);
        assert!(!s.alt && !s.meta);
        assert_eq!(s.key, "S");
    }

    #[test]
    fn test_plus_escape() {
        let s = Shortcut::parse("CTRL+PLUS").unwrap();
        assert_eq!(s.key, "+");
        assert!(s.matches(&KeyEvent::new("+").ctrl()));
        assert_eq!(s.to_string(), "CTRL+PLUS");
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            Shortcut::parse("ctrl+shift"),
            Err(OptionsError::InvalidShortcut(_))
        ));
        assert!(ShortcutSet::parse("ctrl+a;alt").is_err());
    }

    #[test]
    fn test_match_requires_exact_modifiers() {
        let s = Shortcut::parse("ctrl+shift+s").unwrap();
        assert!(s.matches(&KeyEvent::new("s").ctrl().shift()));
        assert!(s.matches(&KeyEvent::new("S").ctrl().shift()));
        assert!(!s.matches(&KeyEvent::new("s").ctrl().shift().meta()));
        assert!(!s.matches(&KeyEvent::new("s").ctrl()));
        assert!(!s.matches(&KeyEvent::new("d").ctrl().shift()));
    }

    #[test]
    fn test_alternatives_are_ored() {
        let set = ShortcutSet::parse("ctrl+z; meta+z").unwrap();
        assert_eq!(set.bindings().len(), 2);
        assert!(set.matches(&KeyEvent::new("z").ctrl()));
        assert!(set.matches(&KeyEvent::new("z").meta()));
        assert!(!set.matches(&KeyEvent::new("z")));
    }

    #[test]
    fn test_dispatch_fires_once_per_action() {
        let dispatcher = ShortcutDispatcher::new();
        dispatcher.add_shortcut("save", "ctrl+s").unwrap();
        dispatcher.add_shortcut("save", "CTRL+S").unwrap();
        dispatcher.add_shortcut("undo", "ctrl+z").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        dispatcher.subscribe("save", move |action, _| {
            assert_eq!(action, "save");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = dispatcher.handle_key_down(&KeyEvent::new("s").ctrl());
        assert!(outcome.handled());
        assert_eq!(outcome.actions, vec!["save".to_string()]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_input_events_ignored() {
        let dispatcher = ShortcutDispatcher::new();
        dispatcher.add_shortcut("save", "ctrl+s").unwrap();

        let outcome = dispatcher.handle_key_down(&KeyEvent::new("s").ctrl().in_text_input());
        assert!(!outcome.handled());
    }

    #[test]
    fn test_set_shortcut_replaces() {
        let dispatcher = ShortcutDispatcher::new();
        dispatcher.add_shortcut("save", "ctrl+s").unwrap();
        dispatcher.set_shortcut("save", "alt+s").unwrap();

        assert!(!dispatcher.handle_key_down(&KeyEvent::new("s").ctrl()).handled());
        assert!(dispatcher.handle_key_down(&KeyEvent::new("s").alt()).handled());
    }

    #[test]
    fn test_set_shortcuts_clears_and_skips_invalid() {
        let dispatcher = ShortcutDispatcher::new();
        dispatcher.add_shortcut("old", "f1").unwrap();
        dispatcher.set_shortcuts(vec![("save", "ctrl+s"), ("broken", "ctrl")]);

        assert!(dispatcher.shortcut("old").is_none());
        assert!(dispatcher.shortcut("broken").is_none());
        assert!(dispatcher.shortcut("save").is_some());
    }

    #[tokio::test]
    async fn test_load_from_options() {
        use crate::manifest::{Manifest, ManifestSource, OptionEntry};
        use crate::memory::MemoryStore;
        use serde_json::json;

        let store = OptionsStore::new(Arc::new(MemoryStore::new()));
        let manifest = Manifest {
            categories: Vec::new(),
            options: vec![
                OptionEntry::new("keys.save", OptionType::Shortcut, json!("ctrl+s")),
                OptionEntry::new("keys.zoom", OptionType::Shortcut, json!("ctrl+PLUS;ctrl+=")),
                OptionEntry::new("ui.width", OptionType::Integer, json!(3)),
            ],
        };
        store.init(ManifestSource::Inline(manifest)).await.unwrap();
        store.set_item("keys.save", json!("alt+s")).await;

        let dispatcher = ShortcutDispatcher::new();
        dispatcher.load_from_options(&store).await;

        assert!(dispatcher.handle_key_down(&KeyEvent::new("s").alt()).handled());
        assert!(!dispatcher.handle_key_down(&KeyEvent::new("s").ctrl()).handled());
        assert_eq!(
            dispatcher.handle_key_down(&KeyEvent::new("+").ctrl()).actions,
            vec!["keys.zoom".to_string()]
        );
        assert!(dispatcher.shortcut("ui.width").is_none());
    }
}
