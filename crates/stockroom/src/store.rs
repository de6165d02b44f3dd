//! Local storage for record documents
//!
//! This module provides the `Store` struct which persists Automerge documents
//! on disk, one file per record.
//!
//! ## Features
//!
//! - **Atomic writes**: Documents are written to a temp file first, then renamed
//!   to prevent corruption on crash.
//! - **Collections**: Document names are path-like (`items/{id}`), so a
//!   collection is simply a name prefix and a directory on disk.

use std::path::{Path, PathBuf};

use automerge::AutoCommit;
use tracing::{debug, info};

use crate::config::Config;
use crate::doc::Document;
use crate::error::{Error, Result};

/// Local storage for record documents
///
/// Documents are Automerge files stored in `{storage_path}/docs/`.
///
/// ## Atomic Writes
///
/// All document writes are atomic: data is first written to a `.tmp` file,
/// then renamed to the final path. This prevents corruption if the process
/// crashes during a write.
///
/// ## Document Names
///
/// Names are `/`-separated segments of ASCII letters, digits, `-` and `_`.
/// Anything else (empty segments, `..`, absolute paths) is rejected before
/// touching the filesystem.
pub struct Store {
    /// Path to the documents directory
    docs_path: PathBuf,
}

impl Store {
    /// Create a new store from config
    pub fn new(config: &Config) -> Result<Self> {
        let docs_path = config.docs_path();

        std::fs::create_dir_all(&docs_path)
            .map_err(|e| Error::storage(format!("failed to create docs directory: {e}")))?;

        Ok(Self { docs_path })
    }

    /// Load an existing document, or `None` if there is no such document
    pub async fn load_doc(&self, name: &str) -> Result<Option<Document>> {
        validate_doc_name(name)?;

        let path = self.doc_path(name);
        if !path.exists() {
            debug!(name, "Document not found");
            return Ok(None);
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to read document {name}: {e}")))?;
        let doc = AutoCommit::load(&bytes)
            .map_err(|e| Error::storage(format!("failed to load document {name}: {e}")))?;

        Ok(Some(Document::new(name.to_string(), path, doc)))
    }

    /// Create an in-memory handle for a document that does not exist yet.
    ///
    /// Nothing is written until the handle is saved. Fails if a document with
    /// this name already exists.
    pub async fn create_doc(&self, name: &str) -> Result<Document> {
        validate_doc_name(name)?;

        let path = self.doc_path(name);
        if path.exists() {
            return Err(Error::document(format!("document already exists: {name}")));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("failed to create doc directory: {e}")))?;
        }

        debug!(name, path = %path.display(), "Creating document");
        Ok(Document::new(name.to_string(), path, AutoCommit::new()))
    }

    /// Check whether a document exists on disk
    pub fn doc_exists(&self, name: &str) -> bool {
        validate_doc_name(name).is_ok() && self.doc_path(name).exists()
    }

    /// Save a document atomically
    ///
    /// Writes to a temp file first, then renames to prevent corruption on crash.
    pub async fn save_doc_atomic(&self, doc: &Document) -> Result<()> {
        let path = doc.path();
        let temp_path = path.with_extension("automerge.tmp");

        debug!(name = doc.name(), "Saving document atomically");

        let bytes = doc.save_bytes();

        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| Error::storage(format!("failed to write temp file: {e}")))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| Error::storage(format!("failed to rename temp file: {e}")))?;

        Ok(())
    }

    /// List document names with the given prefix
    pub fn list_docs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut docs = Vec::new();
        self.list_docs_recursive(&self.docs_path, prefix, &mut docs)?;
        docs.sort();
        Ok(docs)
    }

    /// Delete a document from disk
    ///
    /// Returns `Ok(false)` if the document didn't exist.
    pub async fn delete_doc(&self, name: &str) -> Result<bool> {
        validate_doc_name(name)?;

        let path = self.doc_path(name);
        debug!(name, path = %path.display(), "Deleting document");

        let existed = path.exists();
        if existed {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| Error::storage(format!("failed to delete document: {e}")))?;
            info!(name, "Document deleted");
        }

        let temp_path = path.with_extension("automerge.tmp");
        if temp_path.is_file() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }

        Ok(existed)
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Recursively list documents
    fn list_docs_recursive(&self, dir: &Path, prefix: &str, docs: &mut Vec<String>) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }

        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::storage(format!("failed to read directory: {e}")))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| Error::storage(format!("failed to read directory entry: {e}")))?;
            let path = entry.path();

            if path.is_dir() {
                self.list_docs_recursive(&path, prefix, docs)?;
            } else if path.extension().is_some_and(|ext| ext == "automerge") {
                if let Some(name) = self.path_to_doc_name(&path) {
                    if name.starts_with(prefix) {
                        docs.push(name);
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert a file path to a document name
    fn path_to_doc_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.docs_path).ok()?;
        let name = relative.to_str()?;
        Some(name.trim_end_matches(".automerge").replace('\\', "/"))
    }

    /// Get the path for a document
    fn doc_path(&self, name: &str) -> PathBuf {
        self.docs_path.join(format!("{name}.automerge"))
    }
}

/// Reject names that could escape the docs directory
fn validate_doc_name(name: &str) -> Result<()> {
    let valid_segment = |segment: &str| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };

    if name.split('/').all(valid_segment) {
        Ok(())
    } else {
        Err(Error::document(format!("invalid document name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(temp_dir.path());
        let store = Store::new(&config).unwrap();
        (temp_dir, store)
    }

    async fn save(store: &Store, name: &str, record: JsonValue) {
        let doc = store.create_doc(name).await.unwrap();
        doc.write_record(&record).unwrap();
        store.save_doc_atomic(&doc).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_and_load_doc() {
        let (_dir, store) = create_test_store();

        save(&store, "items/a", json!({ "name": "Bur", "quantity": 3 })).await;

        let doc = store.load_doc("items/a").await.unwrap().unwrap();
        assert_eq!(doc.name(), "items/a");
        let loaded: JsonValue = doc.read_record().unwrap();
        assert_eq!(loaded["quantity"], 3);
    }

    #[tokio::test]
    async fn test_load_missing_doc_is_none() {
        let (_dir, store) = create_test_store();
        assert!(store.load_doc("items/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_doc_is_not_persisted_until_saved() {
        let (_dir, store) = create_test_store();

        let doc = store.create_doc("items/a").await.unwrap();
        assert!(!store.doc_exists("items/a"));

        doc.write_record(&json!({ "name": "Bur" })).unwrap();
        store.save_doc_atomic(&doc).await.unwrap();
        assert!(store.doc_exists("items/a"));

        assert!(store.create_doc("items/a").await.is_err());
    }

    #[tokio::test]
    async fn test_list_docs() {
        let (_dir, store) = create_test_store();

        save(&store, "notes/a", json!({})).await;
        save(&store, "notes/b", json!({})).await;
        save(&store, "tasks/c", json!({})).await;

        let notes = store.list_docs("notes/").unwrap();
        assert_eq!(notes, vec!["notes/a", "notes/b"]);

        let all = store.list_docs("").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_atomic_write_creates_no_temp_file() {
        let (dir, store) = create_test_store();

        save(&store, "items/x", json!({ "quantity": 3 })).await;

        assert!(dir.path().join("docs/items/x.automerge").exists());
        assert!(!dir.path().join("docs/items/x.automerge.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_version() {
        let (dir, store) = create_test_store();

        save(&store, "items/x", json!({ "quantity": 3 })).await;
        let doc = store.load_doc("items/x").await.unwrap().unwrap();
        doc.write_record(&json!({ "quantity": 9 })).unwrap();

        std::fs::create_dir(dir.path().join("docs/items/x.automerge.tmp")).unwrap();
        assert!(matches!(
            store.save_doc_atomic(&doc).await,
            Err(Error::Storage(_))
        ));

        let stored: JsonValue = store
            .load_doc("items/x")
            .await
            .unwrap()
            .unwrap()
            .read_record()
            .unwrap();
        assert_eq!(stored["quantity"], 3);
    }

    #[tokio::test]
    async fn test_delete_doc() {
        let (_dir, store) = create_test_store();

        save(&store, "items/x", json!({})).await;
        assert!(store.delete_doc("items/x").await.unwrap());
        assert!(!store.doc_exists("items/x"));

        assert!(!store.delete_doc("items/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let (_dir, store) = create_test_store();

        assert!(store.create_doc("../escape").await.is_err());
        assert!(store.create_doc("items//x").await.is_err());
        assert!(store.load_doc("items/x.y").await.is_err());
        assert!(store.delete_doc("").await.is_err());
        assert!(!store.doc_exists("/etc/passwd"));
    }
}
