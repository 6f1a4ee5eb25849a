//! TOML configuration for wiring the store and its helpers together.
//!
//! ```toml
//! verbose = true
//! manifest = "assets/options.json"
//!
//! [backend]
//! kind = "sqlite"
//! path = "options.db"
//!
//! [i18n]
//! path = "assets/i18n"
//! lang = "english"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::i18n::{TranslationSource, Translator, DEFAULT_LANG, DEFAULT_PATH};
use crate::manifest::ManifestSource;
use crate::memory::MemoryStore;
use crate::options::OptionsStore;
use crate::sqlite::SqliteStore;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Log swallowed storage failures at error level.
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Manifest URL or file path.
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub i18n: I18nConfig,
}

fn default_channel_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        quota_bytes: Option<usize>,
    },
    Sqlite {
        path: PathBuf,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory { quota_bytes: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I18nConfig {
    #[serde(default = "default_i18n_path")]
    pub path: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_i18n_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            path: default_i18n_path(),
            lang: default_lang(),
        }
    }
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            channel_capacity: default_channel_capacity(),
            backend: BackendConfig::default(),
            manifest: None,
            i18n: I18nConfig::default(),
        }
    }
}

impl OptionsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading options config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub async fn open_backend(&self) -> Result<Arc<dyn KeyValueStore>> {
        let backend: Arc<dyn KeyValueStore> = match &self.backend {
            BackendConfig::Memory { quota_bytes: None } => Arc::new(MemoryStore::new()),
            BackendConfig::Memory {
                quota_bytes: Some(quota),
            } => Arc::new(MemoryStore::with_quota(*quota)),
            BackendConfig::Sqlite { path } => Arc::new(SqliteStore::open(path).await?),
        };
        Ok(backend)
    }

    pub fn manifest_source(&self) -> Option<ManifestSource> {
        self.manifest.as_ref().map(|location| {
            if location.starts_with("http://") || location.starts_with("https://") {
                ManifestSource::Url(location.clone())
            } else {
                ManifestSource::Path(PathBuf::from(location))
            }
        })
    }

    /// Open the backend and build a store. `init` is left to the caller.
    pub async fn build_store(&self) -> Result<OptionsStore> {
        let backend = self.open_backend().await?;
        Ok(OptionsStore::new(backend)
            .with_verbose(self.verbose)
            .with_channel_capacity(self.channel_capacity))
    }

    pub fn translator(&self) -> Translator {
        Translator::new(
            TranslationSource::from_location(&self.i18n.path),
            self.i18n.lang.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OptionsError;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = OptionsConfig::from_toml_str("").unwrap();
        assert_eq!(config, OptionsConfig::default());
        assert!(config.manifest_source().is_none());
    }

    #[test]
    fn test_parse_sqlite_backend() {
        let config = OptionsConfig::from_toml_str(
            r#"
            verbose = true
            manifest = "https://example.com/options.json"

            [backend]
            kind = "sqlite"
            path = "/tmp/options.db"

            [i18n]
            lang = "french"
            "#,
        )
        .unwrap();

        assert!(config.verbose);
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite {
                path: PathBuf::from("/tmp/options.db")
            }
        );
        assert!(matches!(config.manifest_source(), Some(ManifestSource::Url(_))));
        assert_eq!(config.i18n.lang, "french");
        assert_eq!(config.i18n.path, DEFAULT_PATH);
    }

    #[test]
    fn test_bad_toml() {
        let err = OptionsConfig::from_toml_str("backend = 3").unwrap_err();
        assert!(matches!(err, OptionsError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_store_with_quota() {
        let config = OptionsConfig::from_toml_str(
            r#"
            [backend]
            kind = "memory"
            quota_bytes = 32
            "#,
        )
        .unwrap();
        let store = config.build_store().await.unwrap();

        assert!(store.set_item("a", json!(1)).await);
        assert!(!store.set_item("b", json!("x".repeat(64))).await);
    }

    #[tokio::test]
    async fn test_load_from_file_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("opts.db");
        let path = dir.path().join("options.toml");
        std::fs::write(
            &path,
            format!("[backend]\nkind = \"sqlite\"\npath = {:?}\n", db.display().to_string()),
        )
        .unwrap();

        let config = OptionsConfig::load(&path).unwrap();
        let store = config.build_store().await.unwrap();
        store.set_item("ui.width", json!(3)).await;
        assert_eq!(store.get_item("ui.width").await, Some(json!(3)));
    }
}
