//! Headless model of the options management panel.
//!
//! A renderer walks [`panel_rows`] to draw one row per editable option,
//! grouped by category, and writes edits back through
//! [`OptionsStore::set_from_input`]. The reset button of a row is shown when
//! `modified` is set; rows hidden by the filter have `visible` cleared.

use serde::Serialize;
use serde_json::Value;

use crate::codec::codec_for;
use crate::manifest::OptionType;
use crate::options::OptionsStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionRow {
    pub name: String,
    pub category: String,
    pub option_type: OptionType,
    /// Default rendered with the type's codec.
    pub default_text: String,
    pub value: Option<Value>,
    /// Current value rendered with the type's codec.
    pub value_text: String,
    /// Current value differs from the default.
    pub modified: bool,
    pub visible: bool,
    /// Key/value pairs of a `map` option, sorted by key.
    pub entries: Vec<(String, Value)>,
}

/// Rows for every editable option, in category order.
pub async fn panel_rows(store: &OptionsStore) -> Vec<OptionRow> {
    let mut rows = Vec::new();
    for (category, names) in store.categories() {
        for name in names {
            let def = match store.definition(&name) {
                Some(def) if def.editable => def,
                _ => continue,
            };
            let codec = codec_for(def.option_type);
            let value = store.get_item(&name).await;

            let entries = match (&value, def.option_type) {
                (Some(Value::Object(map)), OptionType::Map) => {
                    let mut entries: Vec<(String, Value)> =
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                    entries
                }
                _ => Vec::new(),
            };

            rows.push(OptionRow {
                default_text: def.default.as_ref().map(|v| codec.format(v)).unwrap_or_default(),
                value_text: value.as_ref().map(|v| codec.format(v)).unwrap_or_default(),
                modified: value != def.default,
                visible: store.is_visible(&name),
                category: category.clone(),
                option_type: def.option_type,
                entries,
                value,
                name,
            });
        }
    }
    rows
}
