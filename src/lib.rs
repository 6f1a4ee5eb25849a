//! # options-store
//!
//! Persisted user options with hierarchical change notification, plus the
//! headless helpers a UI built on top of them needs.
//!
//! - **Options**: typed definitions with defaults, overrides persisted to a
//!   [`KeyValueStore`], prefix categories and a name filter
//! - **Notifications**: a change to `a.b.c` is announced on `a.b.c`, `a.b.*`,
//!   `a.*` and `*`, in that order
//! - **Input codecs**: per-type parsing of UI text into stored values
//! - **Shortcuts**: `ctrl+shift+s;meta+s` parsing and key dispatch
//! - **Translations** and **toast notifications**
//!
//! ## Backends
//!
//! - [`SqliteStore`]: Embedded SQLite database, survives restarts
//! - [`MemoryStore`]: In-memory store with an optional byte quota
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use options_store::{Manifest, ManifestSource, MemoryStore, OptionEntry, OptionType, OptionsStore};
//!
//! #[tokio::main]
//! async fn main() -> options_store::Result<()> {
//!     let store = OptionsStore::new(Arc::new(MemoryStore::new()));
//!
//!     store
//!         .init(ManifestSource::Inline(Manifest {
//!             categories: vec!["ui".to_string()],
//!             options: vec![OptionEntry::new("ui.panel.width", OptionType::Integer, json!(300))],
//!         }))
//!         .await?;
//!
//!     store.subscribe("ui.*", |event| {
//!         println!("{} is now {}", event.name, event.value);
//!     });
//!
//!     store.set_item("ui.panel.width", json!(420)).await;
//!     assert_eq!(store.get_item("ui.panel.width").await, Some(json!(420)));
//!
//!     Ok(())
//! }
//! ```

pub mod category;
pub mod codec;
pub mod config;
pub mod error;
pub mod i18n;
pub mod manifest;
pub mod memory;
pub mod notification;
pub mod options;
pub mod panel;
pub mod shortcut;
pub mod sqlite;
pub mod store;
pub mod watch;

// Re-export main types
pub use codec::{codec_for, InputCodec};
pub use config::{BackendConfig, OptionsConfig};
pub use error::{OptionsError, Result};
pub use i18n::{I18nEvent, TranslationFile, TranslationSource, Translator};
pub use manifest::{Manifest, ManifestSource, OptionDefinition, OptionEntry, OptionType};
pub use memory::MemoryStore;
pub use notification::{Notification, NotificationEvent, NotificationKind, NotificationManager};
pub use options::OptionsStore;
pub use panel::{panel_rows, OptionRow};
pub use shortcut::{KeyEvent, KeyOutcome, Shortcut, ShortcutDispatcher, ShortcutSet};
pub use sqlite::SqliteStore;
pub use store::{Entry, KeyValueStore, MAX_KEY_LENGTH};
pub use watch::{change_scopes, ChangeEvent, SubscriptionId, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{OptionsError, Result};
    pub use crate::manifest::{Manifest, ManifestSource, OptionEntry, OptionType};
    pub use crate::memory::MemoryStore;
    pub use crate::options::OptionsStore;
    pub use crate::sqlite::SqliteStore;
    pub use crate::store::KeyValueStore;
    pub use crate::watch::ChangeEvent;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sqlite_backed_store() {
        let backend = Arc::new(SqliteStore::in_memory().await.unwrap());
        let store = OptionsStore::new(backend);
        store
            .add_option(OptionEntry::new("ui.width", OptionType::Integer, json!(10)))
            .await;

        assert_eq!(store.get_item("ui.width").await, Some(json!(10)));
        store.set_item("ui.width", json!(11)).await;
        assert_eq!(store.get_item("ui.width").await, Some(json!(11)));
    }

    #[tokio::test]
    async fn test_stores_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<MemoryStore>();
        assert_send_sync::<SqliteStore>();
        assert_send_sync::<OptionsStore>();
        assert_send_sync::<Translator>();
        assert_send_sync::<NotificationManager>();
        assert_send_sync::<ShortcutDispatcher>();
    }
}
