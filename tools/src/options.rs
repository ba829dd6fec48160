//! Decoding kernel options.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode an export's options; a missing table means all defaults.
pub(crate) fn parse_options<T>(options: &Value) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone()).map_err(|e| format!("invalid options: {e}"))
}
