//! Transform stage: capability source text to executable module body.
//!
//! Capability sources are TOML modules:
//!
//! ```toml
//! interface = 1
//! default = "convert"
//!
//! [exports.convert]
//! kernel = "csv-to-json"
//! title = "CSV to JSON"
//!
//! [exports.convert.options]
//! delimiter = ";"
//! ```
//!
//! The transform lowers them to canonical JSON, which is what the
//! activation stage imports.

use serde_json::{Map, Number, Value};

use crate::error::TransformError;

/// Lowers raw capability source into module text.
///
/// Implementations must be pure.
pub trait SourceTransform: Send + Sync {
    /// Lower `source`. `filename` is used for diagnostics only.
    fn transform(&self, source: &str, filename: &str) -> Result<String, TransformError>;
}

/// The default transform for TOML capability modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestTransform;

impl ManifestTransform {
    pub fn new() -> Self {
        Self
    }
}

impl SourceTransform for ManifestTransform {
    fn transform(&self, source: &str, filename: &str) -> Result<String, TransformError> {
        let table: toml::Table = toml::from_str(source)
            .map_err(|e| TransformError::new(filename, e.message().to_string()))?;

        check_shape(&table).map_err(|message| TransformError::new(filename, message))?;

        let mut body = Map::new();
        for (key, value) in table {
            let lowered = lower(value, &key).map_err(|m| TransformError::new(filename, m))?;
            body.insert(key, lowered);
        }

        serde_json::to_string(&Value::Object(body))
            .map_err(|e| TransformError::new(filename, e.to_string()))
    }
}

fn check_shape(table: &toml::Table) -> Result<(), String> {
    if let Some(interface) = table.get("interface") {
        match interface.as_integer() {
            Some(v) if v >= 0 => {}
            _ => return Err("`interface` must be a non-negative integer".to_string()),
        }
    }

    if let Some(default) = table.get("default") {
        if !default.is_str() {
            return Err("`default` must name an export".to_string());
        }
    }

    if let Some(exports) = table.get("exports") {
        let exports = exports
            .as_table()
            .ok_or_else(|| "`exports` must be a table".to_string())?;
        for (name, export) in exports {
            if !export.is_table() {
                return Err(format!("export `{name}` must be a table"));
            }
        }
    }

    Ok(())
}

fn lower(value: toml::Value, path: &str) -> Result<Value, String> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("`{path}` is not a finite number"))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| lower(item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => {
            let mut map = Map::new();
            for (key, item) in table {
                let lowered = lower(item, &format!("{path}.{key}"))?;
                map.insert(key, lowered);
            }
            Value::Object(map)
        }
    })
}
