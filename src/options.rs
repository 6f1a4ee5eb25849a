//! The options store: declared defaults, persisted overrides and change
//! notification.
//!
//! Reads prefer the persisted value, then the declared default. Writes go
//! to the backend first; only a successful write updates the cache and
//! announces the change. Failures are logged and swallowed so a broken
//! backend degrades to defaults instead of failing callers.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::category::CategoryIndex;
use crate::codec::codec_for;
use crate::error::{OptionsError, Result};
use crate::manifest::{ManifestSource, OptionDefinition, OptionEntry, OptionType};
use crate::store::KeyValueStore;
use crate::watch::{ChangeEvent, ChangeNotifier, SubscriptionId, WatchStream};

#[derive(Default)]
struct State {
    definitions: HashMap<String, OptionDefinition>,
    /// Values written through this store, keyed like `definitions`.
    values: HashMap<String, Value>,
    categories: CategoryIndex,
    filter: String,
}

/// Registry of typed options backed by a [`KeyValueStore`].
///
/// Construct one per process and share it by reference (usually in an
/// `Arc`). All methods take `&self`.
pub struct OptionsStore {
    backend: Arc<dyn KeyValueStore>,
    state: Mutex<State>,
    notifier: ChangeNotifier,
    ready: watch::Sender<bool>,
    verbose: bool,
}

impl OptionsStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            backend,
            state: Mutex::new(State::default()),
            notifier: ChangeNotifier::default(),
            ready,
            verbose: false,
        }
    }

    /// Log swallowed failures at error level instead of debug.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Buffer size of each [`WatchStream`].
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.notifier = ChangeNotifier::new(capacity);
        self
    }

    fn report(&self, context: &str, name: &str, err: &OptionsError) {
        if self.verbose {
            error!("{} {}: {}", context, name, err);
        } else {
            debug!("{} {}: {}", context, name, err);
        }
    }

    // -- initialization -----------------------------------------------------

    /// Load a manifest and register its categories and options.
    ///
    /// Categories are registered first, then the catch-all empty category,
    /// then the options. Waiters on [`get_option`](Self::get_option) and
    /// friends are released once this completes. If loading fails the
    /// error is returned and waiters stay parked.
    pub async fn init(&self, source: ManifestSource) -> Result<()> {
        let manifest = source.load().await?;

        {
            let mut state = self.state.lock();
            for category in &manifest.categories {
                state.categories.add_category(category);
            }
            state.categories.add_category("");
        }

        let count = manifest.options.len();
        for entry in manifest.options {
            self.add_option(entry).await;
        }

        self.ready.send_replace(true);
        info!("Options store initialized with {} options", count);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Register a category outside of `init`.
    pub fn add_category(&self, name: &str) {
        self.state.lock().categories.add_category(name);
    }

    // -- registration -------------------------------------------------------

    /// Register or update an option, then make sure the backend holds a
    /// value for it.
    ///
    /// A persisted value that does not fit the declared type is replaced by
    /// the default.
    pub async fn add_option(&self, entry: OptionEntry) {
        if entry.name.is_empty() {
            return;
        }
        let name = entry.name.to_lowercase();

        let def = {
            let mut state = self.state.lock();
            let def = state
                .definitions
                .entry(name.clone())
                .or_insert_with(|| OptionDefinition::new(&name));
            def.merge(&entry);
            let def = def.clone();
            if !state.categories.has_category("") {
                state.categories.add_category("");
            }
            state.categories.invalidate();
            def
        };

        let keep = match self.read_persisted(&name).await {
            Some(value) => {
                let valid = codec_for(def.option_type).validate(&def, &value);
                if !valid {
                    debug!(
                        "persisted value {} for {} is not a valid {}, restoring default",
                        value, name, def.option_type
                    );
                }
                valid
            }
            None => false,
        };
        if !keep {
            if let Some(default) = def.default {
                self.set_item(&name, default).await;
            }
        }
    }

    // -- values -------------------------------------------------------------

    /// Read the backend and bring the cache in line with it. Falls back to
    /// the cache when the backend cannot be reached.
    async fn read_persisted(&self, name: &str) -> Option<Value> {
        let stored = match self.backend.get(name).await {
            Ok(Some(entry)) if !entry.value.is_empty() => match entry.value_json::<Value>() {
                Ok(value) => Some(value),
                Err(e) => {
                    self.report("discarding unreadable value for", name, &e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                self.report("failed to read", name, &e);
                return self.state.lock().values.get(name).cloned();
            }
        };

        let mut state = self.state.lock();
        match &stored {
            Some(value) => {
                state.values.insert(name.to_string(), value.clone());
            }
            None => {
                state.values.remove(name);
            }
        }
        stored
    }

    /// Current value: the persisted one, else the declared default, else
    /// `None`. While the backend cannot be read, the last value written
    /// through this store stands in for the persisted one.
    pub async fn get_item(&self, name: &str) -> Option<Value> {
        let name = name.to_lowercase();
        if let Some(value) = self.read_persisted(&name).await {
            return Some(value);
        }
        self.state
            .lock()
            .definitions
            .get(&name)
            .and_then(|def| def.default.clone())
    }

    /// Persist a value and announce it.
    ///
    /// Returns true when the value changed. Writing the value already
    /// stored does nothing; a failed backend write leaves everything as it
    /// was.
    pub async fn set_item(&self, name: &str, value: Value) -> bool {
        let name = name.to_lowercase();

        if self.read_persisted(&name).await.as_ref() == Some(&value) {
            return false;
        }

        let text = match serde_json::to_string(&value) {
            Ok(text) => text,
            Err(e) => {
                self.report("failed to serialize", &name, &e.into());
                return false;
            }
        };
        if let Err(e) = self.backend.set(&name, text).await {
            self.report("failed to persist", &name, &e);
            return false;
        }

        self.state.lock().values.insert(name.clone(), value.clone());
        self.notifier.notify(&ChangeEvent::new(name, value));
        true
    }

    fn is_map_option(&self, name: &str) -> bool {
        self.state
            .lock()
            .definitions
            .get(name)
            .map_or(false, |def| def.option_type == OptionType::Map)
    }

    async fn current_map(&self, name: &str) -> Map<String, Value> {
        match self.get_item(name).await {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub async fn get_sub_item(&self, name: &str, sub_name: &str) -> Option<Value> {
        match self.get_item(name).await {
            Some(Value::Object(map)) => map.get(sub_name).cloned(),
            _ => None,
        }
    }

    /// Set one key inside a `map` option. No-op for other types.
    pub async fn set_sub_item(&self, name: &str, sub_name: &str, value: Value) -> bool {
        let name = name.to_lowercase();
        if !self.is_map_option(&name) {
            return false;
        }
        let mut map = self.current_map(&name).await;
        if map.get(sub_name) == Some(&value) {
            return false;
        }
        map.insert(sub_name.to_string(), value);
        self.set_item(&name, Value::Object(map)).await
    }

    /// Remove one key from a `map` option. No-op for other types or absent
    /// keys.
    pub async fn remove_sub_item(&self, name: &str, sub_name: &str) -> bool {
        let name = name.to_lowercase();
        if !self.is_map_option(&name) {
            return false;
        }
        let mut map = self.current_map(&name).await;
        if map.remove(sub_name).is_none() {
            return false;
        }
        self.set_item(&name, Value::Object(map)).await
    }

    /// Parse UI text with the option's codec and store the result.
    ///
    /// Rejected input leaves the stored value untouched.
    pub async fn set_from_input(&self, name: &str, text: &str) -> Result<bool> {
        let def = self
            .definition(name)
            .ok_or_else(|| OptionsError::UnknownOption(name.to_string()))?;
        let value = codec_for(def.option_type).parse(&def, text)?;
        Ok(self.set_item(&def.name, value).await)
    }

    // -- reset and removal --------------------------------------------------

    /// Restore the declared default. Returns true if the value changed.
    pub async fn reset_item(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let default = match self.definition(&name).and_then(|def| def.default) {
            Some(default) => default,
            None => return false,
        };
        if self.get_item(&name).await.as_ref() == Some(&default) {
            return false;
        }
        self.set_item(&name, default).await
    }

    pub async fn reset_items<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = 0;
        for name in names {
            if self.reset_item(name.as_ref()).await {
                changed += 1;
            }
        }
        changed
    }

    /// Reset every registered option, each with its own notification.
    pub async fn reset_all_items(&self) -> usize {
        let names = self.option_names();
        self.reset_items(names).await
    }

    /// Forget an option entirely. Does not announce a change.
    pub async fn remove_item(&self, name: &str) {
        let name = name.to_lowercase();
        {
            let mut state = self.state.lock();
            state.definitions.remove(&name);
            state.values.remove(&name);
            state.categories.invalidate();
        }
        if let Err(e) = self.backend.remove(&name).await {
            self.report("failed to remove", &name, &e);
        }
    }

    /// Drop every definition, cached value and persisted entry.
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.definitions.clear();
            state.values.clear();
            state.categories.invalidate();
        }
        if let Err(e) = self.backend.clear().await {
            self.report("failed to clear", "backend", &e);
        }
    }

    // -- definitions --------------------------------------------------------

    /// Definition of a registered option, without waiting for `init`.
    pub fn definition(&self, name: &str) -> Option<OptionDefinition> {
        self.state
            .lock()
            .definitions
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Registered option names, sorted.
    pub fn option_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().definitions.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_option(&self, name: &str) -> Option<OptionDefinition> {
        self.wait_ready().await;
        self.definition(name)
    }

    pub async fn get_option_type(&self, name: &str) -> Option<OptionType> {
        self.wait_ready().await;
        self.definition(name).map(|def| def.option_type)
    }

    /// Choices of a `list` option.
    pub async fn get_list(&self, name: &str) -> Option<Vec<String>> {
        self.wait_ready().await;
        self.definition(name)
            .filter(|def| def.option_type == OptionType::List)
            .map(|def| def.choices)
    }

    /// Every option of a type with its current value, sorted by name.
    pub async fn get_options_by_type(&self, option_type: OptionType) -> Vec<(String, Option<Value>)> {
        self.wait_ready().await;
        let names: Vec<String> = {
            let state = self.state.lock();
            let mut names: Vec<String> = state
                .definitions
                .values()
                .filter(|def| def.option_type == option_type)
                .map(|def| def.name.clone())
                .collect();
            names.sort();
            names
        };
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let value = self.get_item(&name).await;
            out.push((name, value));
        }
        out
    }

    // -- categories and filtering -------------------------------------------

    /// Categories in registration order with their sorted option names.
    pub fn categories(&self) -> Vec<(String, Vec<String>)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.categories.refresh(state.definitions.keys());
        state
            .categories
            .partitions()
            .map(|(name, members)| (name.to_string(), members.to_vec()))
            .collect()
    }

    pub fn category_of(&self, name: &str) -> Option<String> {
        let state = self.state.lock();
        let name = name.to_lowercase();
        if !state.definitions.contains_key(&name) {
            return None;
        }
        state.categories.resolve(&name).map(str::to_string)
    }

    /// Set the filter text and return the option names it lets through.
    pub fn filter(&self, text: &str) -> Vec<String> {
        self.state.lock().filter = text.to_lowercase();
        self.option_names()
            .into_iter()
            .filter(|name| self.is_visible(name))
            .collect()
    }

    /// Whether an option passes the current filter.
    pub fn is_visible(&self, name: &str) -> bool {
        let state = self.state.lock();
        state.filter.is_empty() || name.to_lowercase().contains(&state.filter)
    }

    // -- notification -------------------------------------------------------

    /// Call `listener` for changes on a scope: an option name, `prefix.*`
    /// or `*`.
    pub fn subscribe<F>(&self, pattern: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(pattern, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn watch(&self, pattern: &str) -> WatchStream {
        self.notifier.watch(pattern)
    }
}
