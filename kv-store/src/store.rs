//! The key/value store trait and an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{KvError, Result};

/// JSON values keyed by `(tool, key)`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key` for `tool`, if any.
    async fn get(&self, tool: &str, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, tool: &str, key: &str, value: Value) -> Result<()>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, tool: &str, key: &str) -> Result<bool>;

    /// All keys for `tool`, sorted.
    async fn keys(&self, tool: &str) -> Result<Vec<String>>;
}

/// Reject names that cannot be used as a tool namespace or key.
pub(crate) fn check_name(name: &str) -> Result<()> {
    let bad = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(KvError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    tools: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, tool: &str, key: &str) -> Result<Option<Value>> {
        check_name(tool)?;
        check_name(key)?;
        let tools = self.tools.read().await;
        Ok(tools.get(tool).and_then(|entries| entries.get(key)).cloned())
    }

    async fn set(&self, tool: &str, key: &str, value: Value) -> Result<()> {
        check_name(tool)?;
        check_name(key)?;
        self.tools
            .write()
            .await
            .entry(tool.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, tool: &str, key: &str) -> Result<bool> {
        check_name(tool)?;
        check_name(key)?;
        let mut tools = self.tools.write().await;
        Ok(tools
            .get_mut(tool)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    async fn keys(&self, tool: &str) -> Result<Vec<String>> {
        check_name(tool)?;
        let tools = self.tools.read().await;
        Ok(tools
            .get(tool)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_check_name() {
        assert!(check_name("prompt-analyzer").is_ok());
        assert!(check_name("goal").is_ok());
        for bad in ["", "  ", ".hidden", "a/b", "a\\b", "tab\there"] {
            assert!(check_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("tool", "k").await.unwrap(), None);

        store.set("tool", "k", json!({ "a": 1 })).await.unwrap();
        store.set("tool", "b", json!("x")).await.unwrap();
        store.set("other", "k", json!(2)).await.unwrap();

        assert_eq!(store.get("tool", "k").await.unwrap(), Some(json!({ "a": 1 })));
        assert_eq!(store.keys("tool").await.unwrap(), vec!["b", "k"]);

        assert!(store.delete("tool", "k").await.unwrap());
        assert!(!store.delete("tool", "k").await.unwrap());
        assert_eq!(store.get("other", "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_memory_rejects_bad_names() {
        let store = MemoryKvStore::new();
        let err = store.set("../escape", "k", json!(1)).await.unwrap_err();
        assert!(matches!(err, KvError::InvalidName(_)));
    }
}
