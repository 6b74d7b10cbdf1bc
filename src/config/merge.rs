//! Deep merge for configuration trees.
//!
//! Maps merge key by key; every other value, lists included, replaces the
//! existing value entirely. Keys the overlay does not mention are kept.

use serde_json::Value;

/// Deep merge `overlay` onto `base`, with `overlay` taking precedence.
///
/// - Objects on both sides are merged recursively
/// - Anything else in `overlay` (arrays, scalars, null, type mismatches)
///   replaces the base value wholesale
///
/// # Example
/// ```
/// use serde_json::json;
/// use ribbon_display::config::deep_merge;
///
/// let base = json!({
///     "weather": { "units": "imperial", "latitude": 37.7 },
///     "terminal": { "colors": ["a", "b", "c"] }
/// });
/// let overlay = json!({
///     "weather": { "units": "metric" },
///     "terminal": { "colors": ["z"] }
/// });
/// let merged = deep_merge(base, overlay);
/// assert_eq!(merged["weather"]["latitude"], json!(37.7));
/// assert_eq!(merged["terminal"]["colors"], json!(["z"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Human-readable JSON kind, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
