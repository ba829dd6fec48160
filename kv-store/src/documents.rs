//! Saved tool documents and per-tool settings.
//!
//! `DocumentRepository` layers the data a tool saves on top of any
//! [`KeyValueStore`]. Documents live in a reserved namespace keyed by id;
//! settings live in the owning tool's namespace.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{KvError, Result};
use crate::store::KeyValueStore;

/// Namespace holding every document.
pub const DOCUMENTS_NAMESPACE: &str = "_documents";

/// A document saved by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDocument {
    pub id: String,
    pub tool: String,
    pub title: String,

    /// JSON or Markdown, depending on the tool.
    pub content: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`DocumentRepository::upsert_document`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// Existing id to update; a new one is generated when unset.
    pub id: Option<String>,
    pub tool: String,
    pub title: String,
    pub content: String,
}

impl DocumentDraft {
    pub fn new(
        tool: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            tool: tool.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Documents and settings for all tools.
#[derive(Clone)]
pub struct DocumentRepository {
    store: Arc<dyn KeyValueStore>,
}

impl DocumentRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Documents, newest first, optionally only those of `tool`.
    pub async fn list_documents(&self, tool: Option<&str>) -> Result<Vec<ToolDocument>> {
        let mut documents = Vec::new();
        for id in self.store.keys(DOCUMENTS_NAMESPACE).await? {
            match self.get_document(&id).await {
                Ok(Some(document)) => {
                    if tool.is_none_or(|tool| document.tool == tool) {
                        documents.push(document);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable document {id}: {e}"),
            }
        }
        documents.sort_by_key(|document| std::cmp::Reverse(document.updated_at));
        Ok(documents)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<ToolDocument>> {
        let Some(value) = self.store.get(DOCUMENTS_NAMESPACE, id).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Create or update a document. `created_at` is kept on update.
    pub async fn upsert_document(&self, draft: DocumentDraft) -> Result<ToolDocument> {
        check_tool(&draft.tool)?;
        let now = Utc::now();

        let (id, created_at) = match draft.id {
            Some(id) => {
                let created_at = self
                    .get_document(&id)
                    .await?
                    .map_or(now, |existing| existing.created_at);
                (id, created_at)
            }
            None => (Uuid::new_v4().to_string(), now),
        };

        let document = ToolDocument {
            id,
            tool: draft.tool,
            title: draft.title,
            content: draft.content,
            created_at,
            updated_at: now,
        };
        self.store
            .set(
                DOCUMENTS_NAMESPACE,
                &document.id,
                serde_json::to_value(&document)?,
            )
            .await?;
        debug!("Saved document {} for {}", document.id, document.tool);
        Ok(document)
    }

    /// Delete a document. Deleting a missing id is not an error.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        if !self.store.delete(DOCUMENTS_NAMESPACE, id).await? {
            debug!("Document {id} was already gone");
        }
        Ok(())
    }

    pub async fn get_setting(&self, tool: &str, key: &str) -> Result<Option<Value>> {
        check_tool(tool)?;
        self.store.get(tool, key).await
    }

    pub async fn set_setting(&self, tool: &str, key: &str, value: Value) -> Result<()> {
        check_tool(tool)?;
        self.store.set(tool, key, value).await
    }
}

/// Tool names may not use the reserved `_` prefix.
fn check_tool(tool: &str) -> Result<()> {
    if tool.starts_with('_') {
        return Err(KvError::InvalidName(tool.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn repo() -> DocumentRepository {
        DocumentRepository::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let repo = repo();
        let created = repo
            .upsert_document(DocumentDraft::new("markdown-notes", "Notes", "# hi"))
            .await
            .unwrap();
        assert!(Uuid::parse_str(&created.id).is_ok());
        assert_eq!(created.created_at, created.updated_at);

        let updated = repo
            .upsert_document(
                DocumentDraft::new("markdown-notes", "Notes v2", "# hello").with_id(&created.id),
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        let fetched = repo.get_document(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_filter() {
        let repo = repo();
        let first = repo
            .upsert_document(DocumentDraft::new("csv-to-json", "a", "[]"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo
            .upsert_document(DocumentDraft::new("markdown-notes", "b", "x"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let third = repo
            .upsert_document(DocumentDraft::new("csv-to-json", "c", "[]"))
            .await
            .unwrap();

        let ids: Vec<_> = repo
            .list_documents(None)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![third.id.clone(), second.id, first.id.clone()]);

        let csv: Vec<_> = repo
            .list_documents(Some("csv-to-json"))
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(csv, vec![third.id, first.id]);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let repo = repo();
        let doc = repo
            .upsert_document(DocumentDraft::new("t", "x", "y"))
            .await
            .unwrap();
        repo.delete_document(&doc.id).await.unwrap();
        assert_eq!(repo.get_document(&doc.id).await.unwrap(), None);
        repo.delete_document(&doc.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_settings() {
        let repo = repo();
        assert_eq!(repo.get_setting("prompt-analyzer", "goal").await.unwrap(), None);

        repo.set_setting("prompt-analyzer", "goal", json!("Write a haiku"))
            .await
            .unwrap();
        assert_eq!(
            repo.get_setting("prompt-analyzer", "goal").await.unwrap(),
            Some(json!("Write a haiku"))
        );

        let err = repo
            .set_setting(DOCUMENTS_NAMESPACE, "x", json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidName(_)));
    }
}
