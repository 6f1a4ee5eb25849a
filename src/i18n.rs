//! String tables and placeholder formatting for UI text.
//!
//! Each language is one JSON file `{ "lang", "authors", "strings" }`, read
//! from `{path}/{lang}.json` on disk or over HTTP. Loads are shared: any
//! number of callers waiting on the same language trigger one read.

use parking_lot::{Mutex, RwLock};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, warn};

use crate::error::{OptionsError, Result};

pub const DEFAULT_LANG: &str = "english";
pub const DEFAULT_PATH: &str = "./json/i18n/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationFile {
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub strings: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I18nEvent {
    TranslationsLoaded { lang: String },
    LangChanged { old: String, new: String },
}

/// Where translation files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationSource {
    Dir(PathBuf),
    Url(String),
}

impl TranslationSource {
    /// `http://` and `https://` locations are fetched, anything else is a
    /// directory.
    pub fn from_location(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            TranslationSource::Url(location.to_string())
        } else {
            TranslationSource::Dir(PathBuf::from(location))
        }
    }

    async fn fetch(&self, lang: &str) -> Result<TranslationFile> {
        let text = match self {
            TranslationSource::Dir(dir) => {
                let path = dir.join(format!("{}.json", lang));
                debug!("Reading translations from {:?}", path);
                tokio::fs::read_to_string(&path).await?
            }
            TranslationSource::Url(base) => {
                let url = format!("{}/{}.json", base.trim_end_matches('/'), lang);
                debug!("Fetching translations from {}", url);
                reqwest::get(&url).await?.error_for_status()?.text().await?
            }
        };
        let mut file: TranslationFile = serde_json::from_str(&text)?;
        if file.lang != lang {
            debug!("{}.json declares lang {:?}, filing it under {}", lang, file.lang, lang);
            file.lang = lang.to_string();
        }
        Ok(file)
    }
}

pub struct Translator {
    source: TranslationSource,
    lang: RwLock<String>,
    translations: RwLock<HashMap<String, TranslationFile>>,
    loads: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
    events: broadcast::Sender<I18nEvent>,
}

impl Translator {
    pub fn new(source: TranslationSource, lang: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            source,
            lang: RwLock::new(lang.into()),
            translations: RwLock::new(HashMap::new()),
            loads: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<I18nEvent> {
        self.events.subscribe()
    }

    pub fn lang(&self) -> String {
        self.lang.read().clone()
    }

    /// Register an already-parsed translation file.
    pub fn add_translations(&self, file: TranslationFile) {
        let lang = file.lang.clone();
        self.translations.write().insert(lang.clone(), file);
        let _ = self.events.send(I18nEvent::TranslationsLoaded { lang });
    }

    pub fn has_lang(&self, lang: &str) -> bool {
        self.translations.read().contains_key(lang)
    }

    /// Load a language unless it is already present.
    pub async fn load_lang(&self, lang: &str) -> Result<()> {
        if self.has_lang(lang) {
            return Ok(());
        }
        let cell = Arc::clone(self.loads.lock().entry(lang.to_string()).or_default());
        cell.get_or_try_init(|| async {
            let file = self.source.fetch(lang).await?;
            self.add_translations(file);
            Ok::<(), OptionsError>(())
        })
        .await?;
        Ok(())
    }

    /// Switch language, loading its strings if needed. Returns false if the
    /// language was already active.
    pub async fn set_lang(&self, lang: &str) -> bool {
        let old = {
            let mut current = self.lang.write();
            if *current == lang {
                return false;
            }
            std::mem::replace(&mut *current, lang.to_string())
        };
        let _ = self.events.send(I18nEvent::LangChanged {
            old,
            new: lang.to_string(),
        });
        if !lang.is_empty() {
            if let Err(e) = self.load_lang(lang).await {
                warn!("failed to load translations for {}: {}", lang, e);
            }
        }
        true
    }

    /// Translated string for `key`, or `key` itself when no translation is
    /// available.
    pub fn get_string(&self, key: &str) -> String {
        let lang = self.lang.read();
        if lang.is_empty() {
            return key.to_string();
        }
        let translations = self.translations.read();
        match translations.get(lang.as_str()) {
            Some(file) => match file.strings.get(key) {
                Some(s) => s.clone(),
                None => {
                    warn!("Missing translation for key {}", key);
                    key.to_string()
                }
            },
            None => key.to_string(),
        }
    }

    /// Translate `key` and substitute `${name}` placeholders, matching
    /// names case-insensitively.
    pub fn format_string(&self, key: &str, values: &Map<String, Value>) -> String {
        let mut out = self.get_string(key);
        for (name, value) in values {
            let pattern = format!(r"(?i)\$\{{{}\}}", regex::escape(name));
            let re = match Regex::new(&pattern) {
                Ok(re) => re,
                Err(e) => {
                    warn!("bad placeholder {}: {}", name, e);
                    continue;
                }
            };
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = re.replace_all(&out, NoExpand(&replacement)).into_owned();
        }
        out
    }

    /// Render a `{ "innerHTML": key, "values": {..} }` descriptor. Explicit
    /// `values` take precedence over the descriptor's own.
    pub fn render_descriptor(
        &self,
        descriptor: &Value,
        values: Option<&Map<String, Value>>,
    ) -> Option<String> {
        let key = descriptor.get("innerHTML")?.as_str()?;
        let empty = Map::new();
        let values = values
            .or_else(|| descriptor.get("values").and_then(Value::as_object))
            .unwrap_or(&empty);
        Some(self.format_string(key, values))
    }

    pub fn authors(&self) -> Vec<String> {
        let lang = self.lang.read();
        self.translations
            .read()
            .get(lang.as_str())
            .map(|file| file.authors.clone())
            .unwrap_or_default()
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(TranslationSource::Dir(PathBuf::from(DEFAULT_PATH)), DEFAULT_LANG)
    }
}
