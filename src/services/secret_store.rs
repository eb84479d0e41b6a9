//! Secret store boundary.
//!
//! `get_secret` never fails: an absent or unreadable secret is an empty map.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> HashMap<String, String>;
}

/// Reads `{dir}/{name}.json`. A JSON object is flattened to strings; any other
/// content is returned as `{"secret": <contents>}`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> HashMap<String, String> {
        // Secret names may look like paths ("prod/bitget"); keep them inside `dir`
        let file_name = format!("{}.json", name.replace(['/', '\\'], "_"));
        let path = self.dir.join(file_name);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Secret {} not readable at {}: {}", name, path.display(), e);
                return HashMap::new();
            }
        };

        parse_secret(&raw)
    }
}

fn parse_secret(raw: &str) -> HashMap<String, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect(),
        _ if raw.trim().is_empty() => HashMap::new(),
        _ => HashMap::from([("secret".to_string(), raw.trim().to_string())]),
    }
}

/// In-process secret store
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, value: HashMap<String, String>) {
        self.secrets.write().insert(name.to_string(), value);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> HashMap<String, String> {
        self.secrets.read().get(name).cloned().unwrap_or_default()
    }
}
