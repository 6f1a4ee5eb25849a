//! Per-type input codecs.
//!
//! A management UI hands back raw text; the codec for the option's type
//! turns it into a JSON value, renders stored values for display and checks
//! that a value has the right shape. Parse failures are returned so the
//! caller can leave the stored value untouched.

use serde_json::{Number, Value};

use crate::error::{OptionsError, Result};
use crate::manifest::{OptionDefinition, OptionType};
use crate::shortcut::ShortcutSet;

pub trait InputCodec: Send + Sync {
    /// Turn UI text into a value for `def`.
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value>;

    /// Render a stored value as UI text.
    fn format(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Whether a stored value has the shape this type expects.
    fn validate(&self, def: &OptionDefinition, value: &Value) -> bool;
}

/// Whole numbers stay integers so `"30"` equals a declared default of `30`.
fn parse_number(def: &OptionDefinition, text: &str) -> Result<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::from(n));
    }
    let n: f64 = text
        .parse()
        .map_err(|_| OptionsError::invalid_input(&def.name, format!("{:?} is not a number", text)))?;
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| OptionsError::invalid_input(&def.name, "number must be finite"))
}

struct TextCodec;
struct NumberCodec;
struct IntegerCodec;
struct BooleanCodec;
struct ObjectCodec;
struct MapCodec;
struct ListCodec;
struct Vec2Codec;
struct ShortcutCodec;

/// Codec for a declared option type.
pub fn codec_for(option_type: OptionType) -> &'static dyn InputCodec {
    match option_type {
        OptionType::String | OptionType::Color => &TextCodec,
        OptionType::Number => &NumberCodec,
        OptionType::Integer => &IntegerCodec,
        OptionType::Boolean => &BooleanCodec,
        OptionType::Object => &ObjectCodec,
        OptionType::Map => &MapCodec,
        OptionType::List => &ListCodec,
        OptionType::Vec2 => &Vec2Codec,
        OptionType::Shortcut => &ShortcutCodec,
    }
}

impl InputCodec for TextCodec {
    fn parse(&self, _def: &OptionDefinition, text: &str) -> Result<Value> {
        Ok(Value::String(text.to_string()))
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value.is_string() || value.is_null()
    }
}

impl InputCodec for NumberCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        parse_number(def, text)
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value.is_number() || value.is_null()
    }
}

impl InputCodec for IntegerCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        let n: i64 = text.parse().map_err(|_| {
            OptionsError::invalid_input(&def.name, format!("{:?} is not an integer", text))
        })?;
        Ok(Value::from(n))
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value.is_i64() || value.is_u64() || value.is_null()
    }
}

impl InputCodec for BooleanCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        match text.trim().to_lowercase().as_str() {
            "true" | "on" | "1" | "checked" => Ok(Value::Bool(true)),
            "false" | "off" | "0" | "" => Ok(Value::Bool(false)),
            other => Err(OptionsError::invalid_input(
                &def.name,
                format!("{:?} is not a boolean", other),
            )),
        }
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value.is_boolean()
    }
}

impl InputCodec for ObjectCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        serde_json::from_str(text)
            .map_err(|e| OptionsError::invalid_input(&def.name, format!("malformed JSON: {}", e)))
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _def: &OptionDefinition, _value: &Value) -> bool {
        true
    }
}

impl InputCodec for MapCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        let value = ObjectCodec.parse(def, text)?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(OptionsError::invalid_input(&def.name, "expected a JSON object"))
        }
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value.is_object()
    }
}

impl InputCodec for ListCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        if def.choices.is_empty() || def.choices.iter().any(|c| c == text) {
            Ok(Value::String(text.to_string()))
        } else {
            Err(OptionsError::invalid_input(
                &def.name,
                format!("{:?} is not one of {:?}", text, def.choices),
            ))
        }
    }

    fn validate(&self, def: &OptionDefinition, value: &Value) -> bool {
        match value.as_str() {
            Some(s) => def.choices.is_empty() || def.choices.iter().any(|c| c == s),
            None => false,
        }
    }
}

impl InputCodec for Vec2Codec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(OptionsError::invalid_input(
                &def.name,
                "expected two comma-separated numbers",
            ));
        }
        let mut out = Vec::with_capacity(2);
        for part in parts {
            out.push(parse_number(def, part)?);
        }
        Ok(Value::Array(out))
    }

    fn format(&self, value: &Value) -> String {
        match value.as_array() {
            Some(items) => items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
            None => String::new(),
        }
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        matches!(value.as_array(), Some(items) if items.len() == 2 && items.iter().all(Value::is_number))
    }
}

impl InputCodec for ShortcutCodec {
    fn parse(&self, def: &OptionDefinition, text: &str) -> Result<Value> {
        let set = ShortcutSet::parse(text)
            .map_err(|e| OptionsError::invalid_input(&def.name, e.to_string()))?;
        if set.is_empty() {
            return Err(OptionsError::invalid_input(&def.name, "empty shortcut"));
        }
        Ok(Value::String(text.trim().to_string()))
    }

    fn validate(&self, _def: &OptionDefinition, value: &Value) -> bool {
        value
            .as_str()
            .map(|s| ShortcutSet::parse(s).map(|set| !set.is_empty()).unwrap_or(false))
            .unwrap_or(false)
    }
}
