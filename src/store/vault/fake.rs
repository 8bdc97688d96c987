//! In-memory KV engine used by the Vault store tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::logical::LogicalClient;
use crate::errors::{ConnectionError, Result};

#[derive(Default)]
struct Entry {
    data: Option<Value>,
    version: u64,
    custom_metadata: Option<Value>,
}

#[derive(Default)]
struct State {
    v1: HashMap<String, Value>,
    v2: HashMap<String, Entry>,
    writes: Vec<(String, Value)>,
    deletes: Vec<String>,
}

enum Target {
    V1(String),
    V2Data(String),
    V2Metadata(String),
}

fn target(path: &str) -> Target {
    let (mount, rest) = path.split_once('/').unwrap_or((path, ""));
    if let Some(key) = rest.strip_prefix("data/") {
        Target::V2Data(format!("{}/{}", mount, key))
    } else if let Some(key) = rest.strip_prefix("metadata/") {
        Target::V2Metadata(format!("{}/{}", mount, key))
    } else {
        Target::V1(path.to_string())
    }
}

/// Emulates KV v1 and v2 mounts, including v2 check-and-set.
#[derive(Default)]
pub struct FakeVault {
    state: Mutex<State>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw v1 value at `path`.
    pub fn seed(&self, path: &str, value: Value) {
        self.state.lock().unwrap().v1.insert(path.to_string(), value);
    }

    /// Seed a v2 secret under `<mount>/<key>`.
    pub fn seed_v2(&self, key: &str, data: Value, version: u64, custom_metadata: Value) {
        self.state.lock().unwrap().v2.insert(
            key.to_string(),
            Entry { data: Some(data), version, custom_metadata: Some(custom_metadata) },
        );
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl LogicalClient for FakeVault {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        let state = self.state.lock().unwrap();
        Ok(match target(path) {
            Target::V1(path) => state.v1.get(&path).cloned(),
            Target::V2Data(key) => state.v2.get(&key).map(|entry| {
                json!({
                    "data": entry.data.clone().unwrap_or(Value::Null),
                    "metadata": {
                        "version": entry.version,
                        "custom_metadata": entry.custom_metadata.clone().unwrap_or(Value::Null),
                    }
                })
            }),
            Target::V2Metadata(_) => None,
        })
    }

    async fn write(&self, path: &str, body: Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.writes.push((path.to_string(), body.clone()));
        match target(path) {
            Target::V1(path) => {
                state.v1.insert(path, body);
            }
            Target::V2Data(key) => {
                let entry = state.v2.entry(key).or_default();
                let cas = body["options"]["cas"].as_u64();
                if cas.is_some_and(|cas| cas != entry.version) {
                    return Err(ConnectionError::backend(
                        400,
                        "check-and-set parameter did not match the current version",
                    ));
                }
                entry.data = Some(body["data"].clone());
                entry.version += 1;
            }
            Target::V2Metadata(key) => {
                state.v2.entry(key).or_default().custom_metadata =
                    Some(body["custom_metadata"].clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(path.to_string());
        match target(path) {
            Target::V1(path) => {
                state.v1.remove(&path);
            }
            Target::V2Metadata(key) => {
                state.v2.remove(&key);
            }
            Target::V2Data(key) => {
                if let Some(entry) = state.v2.get_mut(&key) {
                    entry.data = None;
                }
            }
        }
        Ok(())
    }
}
