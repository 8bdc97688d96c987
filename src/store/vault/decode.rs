//! Typed decoding of KV engine responses.
//!
//! Walks the expected nested shape and reports the offending path on a
//! mismatch instead of falling through to empty values.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::{ConnectionError, Result};

/// Vault-side view of a connection secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvSecret {
    pub custom_meta: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
    /// Last observed version; only KV v2 has one. Never set by callers.
    pub(crate) version: Option<u64>,
}

impl KvSecret {
    pub fn new(data: BTreeMap<String, String>, custom_meta: BTreeMap<String, String>) -> Self {
        Self { custom_meta, data, version: None }
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// CAS token for the next write: the observed version, or 0 if none.
    pub fn cas(&self) -> u64 {
        self.version.unwrap_or(0)
    }
}

/// Decode the `data` block of a KV v1 read: a flat string map.
pub fn decode_v1(data: &Value) -> Result<KvSecret> {
    Ok(KvSecret { data: string_map(data, "data")?, ..Default::default() })
}

/// Decode the `data` block of a KV v2 read.
///
/// Either `data` or `metadata` may be null or absent; a secret can exist with
/// only one of them depending on its lifecycle stage.
pub fn decode_v2(data: &Value) -> Result<KvSecret> {
    let root = object(data, "data")?;

    let values = match root.get("data") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(value) => string_map(value, "data.data")?,
    };

    let (version, custom_meta) = match root.get("metadata") {
        None | Some(Value::Null) => (None, BTreeMap::new()),
        Some(value) => {
            let metadata = object(value, "data.metadata")?;
            let version = match metadata.get("version") {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.as_u64().ok_or_else(|| {
                    ConnectionError::malformed(
                        "data.metadata.version",
                        format!("expected a non-negative integer, got {}", type_name(v)),
                    )
                })?),
            };
            let custom_meta = match metadata.get("custom_metadata") {
                None | Some(Value::Null) => BTreeMap::new(),
                Some(v) => string_map(v, "data.metadata.custom_metadata")?,
            };
            (version, custom_meta)
        }
    };

    Ok(KvSecret { custom_meta, data: values, version })
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        ConnectionError::malformed(path, format!("expected an object, got {}", type_name(value)))
    })
}

fn string_map(value: &Value, path: &str) -> Result<BTreeMap<String, String>> {
    object(value, path)?
        .iter()
        .map(|(key, v)| match v {
            Value::String(s) => Ok((key.clone(), s.clone())),
            other => Err(ConnectionError::malformed(
                format!("{}.{}", path, key),
                format!("expected a string, got {}", type_name(other)),
            )),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
