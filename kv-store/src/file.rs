//! File-backed key/value store.
//!
//! Each tool gets one JSON object file, `<root>/<tool>.json`. Writes go to a
//! temp file first and are renamed into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{KvError, Result};
use crate::store::{KeyValueStore, check_name};

/// Store that persists every tool's entries to disk.
pub struct FileKvStore {
    root: PathBuf,

    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileKvStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| KvError::storage(&root, e))?;
        debug!("Opened key/value store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tool_path(&self, tool: &str) -> PathBuf {
        self.root.join(format!("{tool}.json"))
    }

    async fn read_tool(&self, tool: &str) -> Result<Map<String, Value>> {
        let path = self.tool_path(tool);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(KvError::storage(&path, e)),
        };

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(entries) => Ok(entries),
            other => Err(KvError::Corrupt {
                tool: tool.to_string(),
                message: format!("expected an object, found {other}"),
            }),
        }
    }

    async fn write_tool(&self, tool: &str, entries: &Map<String, Value>) -> Result<()> {
        let path = self.tool_path(tool);
        let content = serde_json::to_string_pretty(entries)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| KvError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| KvError::storage(&path, e))?;

        debug!("Saved {} entries for {tool}", entries.len());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get(&self, tool: &str, key: &str) -> Result<Option<Value>> {
        check_name(tool)?;
        check_name(key)?;
        Ok(self.read_tool(tool).await?.remove(key))
    }

    async fn set(&self, tool: &str, key: &str, value: Value) -> Result<()> {
        check_name(tool)?;
        check_name(key)?;
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_tool(tool).await?;
        entries.insert(key.to_string(), value);
        self.write_tool(tool, &entries).await
    }

    async fn delete(&self, tool: &str, key: &str) -> Result<bool> {
        check_name(tool)?;
        check_name(key)?;
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_tool(tool).await?;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.write_tool(tool, &entries).await?;
        Ok(true)
    }

    async fn keys(&self, tool: &str) -> Result<Vec<String>> {
        check_name(tool)?;
        let mut keys: Vec<String> = self.read_tool(tool).await?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        let store = FileKvStore::open(temp_dir.path()).await.unwrap();
        store.set("markdown-notes", "theme", json!("dark")).await.unwrap();
        drop(store);

        let store = FileKvStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            store.get("markdown-notes", "theme").await.unwrap(),
            Some(json!("dark"))
        );
        assert!(temp_dir.path().join("markdown-notes.json").exists());
        assert!(!temp_dir.path().join("markdown-notes.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_tool_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKvStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(store.get("nothing", "here").await.unwrap(), None);
        assert!(store.keys("nothing").await.unwrap().is_empty());
        assert!(!store.delete("nothing", "here").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKvStore::open(temp_dir.path().join("nested")).await.unwrap();

        store.set("t", "b", json!(2)).await.unwrap();
        store.set("t", "a", json!(1)).await.unwrap();
        assert_eq!(store.keys("t").await.unwrap(), vec!["a", "b"]);

        assert!(store.delete("t", "a").await.unwrap());
        assert_eq!(store.keys("t").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("bad.json"), "[1, 2]").unwrap();

        let store = FileKvStore::open(temp_dir.path()).await.unwrap();
        let err = store.get("bad", "k").await.unwrap_err();
        assert!(matches!(err, KvError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_sets_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileKvStore::open(temp_dir.path()).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.set("t", &format!("k{i}"), json!(i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.keys("t").await.unwrap().len(), 8);
    }
}
