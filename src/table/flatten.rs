//! Flattener
//!
//! Turns one nested resource document into a flat `path -> string` row.
//!
//! - Scalars are emitted under their joined path; `null` becomes `""`.
//! - Nested objects (and maps) are emitted twice: once as a JSON blob under
//!   their own path, and once per child under `path_child`.
//! - Arrays, of scalars or of objects, are emitted once as a JSON string.
//!   Array elements are never exploded into index-suffixed keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flattened resource: joined path (or column name) to string value
pub type FlatRow = BTreeMap<String, String>;

/// Fixed rendering for every RFC 3339 timestamp found in a resource
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Key used when the resource itself is a scalar
const ROOT_KEY: &str = "value";

/// How object keys become path segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    /// Keep keys exactly as the API returns them
    AsIs,
    /// `backendAddressPools` -> `backend_address_pools`
    #[default]
    SnakeCase,
}

/// Naming convention and shape rules for one flatten call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenOptions {
    pub key_style: KeyStyle,
    /// Object keys whose children are hoisted to the parent level
    /// (the object is still emitted as a blob under its own key)
    pub inline_keys: Vec<String>,
    pub separator: String,
    /// Re-render RFC 3339 strings with [`TIMESTAMP_FORMAT`] in UTC
    pub normalize_timestamps: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            key_style: KeyStyle::default(),
            inline_keys: Vec::new(),
            separator: "_".to_string(),
            normalize_timestamps: true,
        }
    }
}

/// Anything that can be turned into a generic resource tree
///
/// Implemented for every `Serialize` type, so typed SDK models and raw
/// `serde_json::Value` responses go through the same flattening path.
pub trait Flatten {
    fn to_raw(&self) -> Result<Value, serde_json::Error>;

    fn flatten(&self, options: &FlattenOptions) -> Result<FlatRow, serde_json::Error> {
        Ok(flatten(&self.to_raw()?, options))
    }
}

impl<T: Serialize + ?Sized> Flatten for T {
    fn to_raw(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Flatten one resource into a row holding every path present in it
pub fn flatten(resource: &Value, options: &FlattenOptions) -> FlatRow {
    let mut row = FlatRow::new();
    match resource {
        Value::Object(map) => walk_object(map, None, options, &mut row),
        other => {
            row.insert(ROOT_KEY.to_string(), render_leaf(other, options));
        }
    }
    row
}

fn walk_object(
    map: &Map<String, Value>,
    prefix: Option<&str>,
    options: &FlattenOptions,
    row: &mut FlatRow,
) {
    // Hoisted children go first so that direct fields win on collision.
    for (key, value) in map {
        if let (true, Value::Object(child)) = (is_inline(key, options), value) {
            walk_object(child, prefix, options, row);
        }
    }

    for (key, value) in map {
        let path = join(prefix, &segment(key, options.key_style), &options.separator);
        match value {
            Value::Object(child) => {
                row.insert(path.clone(), value.to_string());
                if !is_inline(key, options) {
                    walk_object(child, Some(&path), options, row);
                }
            }
            leaf => {
                row.insert(path, render_leaf(leaf, options));
            }
        }
    }
}

fn is_inline(key: &str, options: &FlattenOptions) -> bool {
    options.inline_keys.iter().any(|k| k == key)
}

fn join(prefix: Option<&str>, segment: &str, separator: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}{}", prefix, separator, segment),
        None => segment.to_string(),
    }
}

fn segment(key: &str, style: KeyStyle) -> String {
    match style {
        KeyStyle::AsIs => key.to_string(),
        KeyStyle::SnakeCase => to_snake_case(key),
    }
}

fn render_leaf(value: &Value, options: &FlattenOptions) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if options.normalize_timestamps => {
            normalize_timestamp(s).unwrap_or_else(|| s.clone())
        }
        Value::String(s) => s.clone(),
        // Arrays of scalars and arrays of objects alike stay one JSON column
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Render an RFC 3339 timestamp in the fixed UTC format
pub fn normalize_timestamp(s: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string())
}

/// Convert a camelCase / PascalCase key to snake_case
///
/// Acronym runs stay together: `frontendIPConfigurations` -> `frontend_ip_configurations`.
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '.' {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
