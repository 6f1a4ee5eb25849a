//! Option definitions and the manifest that declares them.
//!
//! A manifest is JSON of the shape
//! `{ "categories": [..], "options": [{ "name", "type", "default", "datalist", "editable" }] }`.
//! Entries without a name are skipped with a warning. A malformed field is
//! dropped with a warning while the rest of its entry still loads; fields
//! that are absent are simply not merged into the definition.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{OptionsError, Result};

/// Declared type of an option. Selects the input codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Object,
    List,
    Map,
    Vec2,
    Shortcut,
    Color,
}

impl OptionType {
    pub const ALL: [OptionType; 10] = [
        OptionType::String,
        OptionType::Number,
        OptionType::Integer,
        OptionType::Boolean,
        OptionType::Object,
        OptionType::List,
        OptionType::Map,
        OptionType::Vec2,
        OptionType::Shortcut,
        OptionType::Color,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::String => "string",
            OptionType::Number => "number",
            OptionType::Integer => "integer",
            OptionType::Boolean => "boolean",
            OptionType::Object => "object",
            OptionType::List => "list",
            OptionType::Map => "map",
            OptionType::Vec2 => "vec2",
            OptionType::Shortcut => "shortcut",
            OptionType::Color => "color",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionType {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        OptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| OptionsError::Manifest(format!("unknown option type: {}", s)))
    }
}

/// Keeps an explicit JSON `null` as `Some(Value::Null)`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One option entry as written in a manifest or passed to `add_option`.
///
/// Every field except the name is optional; absent fields leave an existing
/// definition untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub option_type: Option<OptionType>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datalist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
}

impl OptionEntry {
    pub fn new(name: impl Into<String>, option_type: OptionType, default: Value) -> Self {
        Self {
            name: name.into(),
            option_type: Some(option_type),
            default: Some(default),
            ..Self::default()
        }
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datalist = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = Some(false);
        self
    }
}

/// A registered option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDefinition {
    /// Lowercase, dot-delimited name.
    pub name: String,
    pub option_type: OptionType,
    /// `None` when no default was ever declared.
    pub default: Option<Value>,
    /// Allowed values for `list` options.
    pub choices: Vec<String>,
    pub editable: bool,
}

impl OptionDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            option_type: OptionType::default(),
            default: None,
            choices: Vec::new(),
            editable: true,
        }
    }

    /// Overwrite the fields present in `entry`, last write wins per field.
    pub fn merge(&mut self, entry: &OptionEntry) {
        if let Some(option_type) = entry.option_type {
            self.option_type = option_type;
        }
        if let Some(default) = &entry.default {
            self.default = Some(default.clone());
        }
        if let Some(datalist) = &entry.datalist {
            self.choices = datalist.clone();
        }
        if let Some(editable) = entry.editable {
            self.editable = editable;
        }
    }
}

/// Declarative description of categories and options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub options: Vec<OptionEntry>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    categories: Vec<Value>,
    #[serde(default)]
    options: Vec<Value>,
}

/// Decode one field of an option entry, dropping it if it has the wrong shape.
fn field<T: DeserializeOwned>(name: &str, key: &str, value: Option<Value>) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("ignoring malformed {} of option {}: {}", key, name, e);
            None
        }
    }
}

fn entry_from_value(value: Value) -> Option<OptionEntry> {
    let mut fields: serde_json::Map<String, Value> = match value {
        Value::Object(fields) => fields,
        other => {
            warn!("skipping option entry that is not an object: {}", other);
            return None;
        }
    };

    let name = match fields.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => {
            warn!("skipping option without a name");
            return None;
        }
    };

    let option_type = match fields.remove("type") {
        Some(Value::String(text)) => match text.parse::<OptionType>() {
            Ok(option_type) => Some(option_type),
            Err(e) => {
                warn!("ignoring type of option {}: {}", name, e);
                None
            }
        },
        Some(other) => {
            warn!("ignoring non-string type {} of option {}", other, name);
            None
        }
        None => None,
    };

    Some(OptionEntry {
        option_type,
        default: fields.remove("default"),
        datalist: field(&name, "datalist", fields.remove("datalist")),
        editable: field(&name, "editable", fields.remove("editable")),
        name,
    })
}

impl Manifest {
    /// Decode a manifest, skipping entries without a name and fields that
    /// are not well-formed.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(text)
            .map_err(|e| OptionsError::Manifest(format!("malformed manifest: {}", e)))?;

        let categories = raw
            .categories
            .into_iter()
            .filter_map(|c| match c {
                Value::String(s) => Some(s),
                other => {
                    warn!("skipping non-string category {}", other);
                    None
                }
            })
            .collect();

        let options = raw.options.into_iter().filter_map(entry_from_value).collect();

        Ok(Self {
            categories,
            options,
        })
    }
}

/// Where `OptionsStore::init` reads its manifest from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// Fetched with an HTTP GET.
    Url(String),
    /// Read from the local filesystem.
    Path(PathBuf),
    /// Already in memory.
    Inline(Manifest),
}

impl ManifestSource {
    pub async fn load(self) -> Result<Manifest> {
        match self {
            ManifestSource::Url(url) => {
                debug!("Fetching manifest from {}", url);
                let text = reqwest::get(&url)
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Manifest::from_json_str(&text)
            }
            ManifestSource::Path(path) => {
                debug!("Reading manifest from {:?}", path);
                let text = tokio::fs::read_to_string(&path).await?;
                Manifest::from_json_str(&text)
            }
            ManifestSource::Inline(manifest) => Ok(manifest),
        }
    }
}
