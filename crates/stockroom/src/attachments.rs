//! Content-addressed storage for item images
//!
//! Attachments are stored as plain files named by the hex BLAKE3 hash of
//! their content under `{storage_path}/attachments/`. Identical uploads are
//! deduplicated for free, and a record only needs to keep the hash.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Content-addressed attachment store
pub struct AttachmentStore {
    /// Root directory holding the attachment files
    root_path: PathBuf,
    /// Largest accepted attachment
    max_bytes: u64,
}

impl AttachmentStore {
    /// Create an attachment store at the given path
    pub async fn new(root_path: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        tokio::fs::create_dir_all(&root_path)
            .await
            .map_err(|e| Error::attachment(format!("failed to create attachments directory: {e}")))?;

        info!(path = %root_path.display(), max_bytes, "Attachment store initialized");

        Ok(Self {
            root_path,
            max_bytes,
        })
    }

    /// Store bytes and return their BLAKE3 hash
    ///
    /// Storing the same content twice is a no-op that returns the same hash.
    pub async fn store_bytes(&self, data: impl Into<Bytes>) -> Result<String> {
        let data: Bytes = data.into();

        if data.is_empty() {
            return Err(Error::validation("attachment is empty"));
        }
        if data.len() as u64 > self.max_bytes {
            return Err(Error::validation(format!(
                "attachment is {} bytes; the limit is {}",
                data.len(),
                self.max_bytes
            )));
        }

        let hash = blake3::hash(&data).to_hex().to_string();
        let path = self.root_path.join(&hash);

        if path.exists() {
            debug!(hash = %hash, "Attachment already stored");
            return Ok(hash);
        }

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &data)
            .await
            .map_err(|e| Error::attachment(format!("failed to write attachment: {e}")))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::attachment(format!("failed to rename attachment: {e}")))?;

        info!(hash = %hash, size = data.len(), "Attachment stored");
        Ok(hash)
    }

    /// Get attachment content
    pub async fn get_bytes(&self, hash: &str) -> Result<Bytes> {
        let path = self.path_for(hash)?;

        if !path.exists() {
            return Err(Error::not_found(format!("attachment {hash}")));
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::attachment(format!("failed to read attachment: {e}")))?;

        if !validate_attachment(&data, hash) {
            return Err(Error::attachment(format!("attachment {hash} is corrupt")));
        }

        Ok(Bytes::from(data))
    }

    /// Check if an attachment exists
    pub fn has(&self, hash: &str) -> bool {
        self.path_for(hash).is_ok_and(|path| path.exists())
    }

    /// Remove an attachment; returns whether it existed
    pub async fn remove(&self, hash: &str) -> Result<bool> {
        let path = self.path_for(hash)?;
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::attachment(format!("failed to remove attachment: {e}")))?;
        debug!(hash = %hash, "Attachment removed");
        Ok(true)
    }

    /// Path of an attachment, rejecting anything that is not a hex BLAKE3 hash
    fn path_for(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation(format!(
                "invalid attachment hash: expected 64 hex chars, got {hash:?}"
            )));
        }
        Ok(self.root_path.join(hash.to_ascii_lowercase()))
    }
}

/// Check attachment data against its expected BLAKE3 hash
pub fn validate_attachment(data: &[u8], expected_hash: &str) -> bool {
    blake3::hash(data)
        .to_hex()
        .as_str()
        .eq_ignore_ascii_case(expected_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store(max_bytes: u64) -> (TempDir, AttachmentStore) {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path().join("attachments"), max_bytes)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (_dir, store) = create_test_store(1024).await;

        let hash = store.store_bytes(&b"jpeg bytes"[..]).await.unwrap();
        assert_eq!(hash.len(), 64);
        assert!(store.has(&hash));
        assert_eq!(&store.get_bytes(&hash).await.unwrap()[..], b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_deduplication() {
        let (dir, store) = create_test_store(1024).await;

        let a = store.store_bytes(vec![1u8, 2, 3]).await.unwrap();
        let b = store.store_bytes(vec![1u8, 2, 3]).await.unwrap();
        assert_eq!(a, b);

        let files = std::fs::read_dir(dir.path().join("attachments")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_size_limit_and_empty() {
        let (_dir, store) = create_test_store(4).await;

        assert!(matches!(
            store.store_bytes(vec![0u8; 5]).await,
            Err(Error::Validation(_))
        ));
        assert!(store.store_bytes(Vec::<u8>::new()).await.is_err());
        assert!(store.store_bytes(vec![0u8; 4]).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_hash() {
        let (_dir, store) = create_test_store(1024).await;

        let missing = "a".repeat(64);
        assert!(matches!(
            store.get_bytes(&missing).await,
            Err(Error::NotFound(_))
        ));
        assert!(!store.has("../../etc/passwd"));
        assert!(store.get_bytes("zz").await.is_err());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = create_test_store(1024).await;

        let hash = store.store_bytes(&b"x"[..]).await.unwrap();
        assert!(store.remove(&hash).await.unwrap());
        assert!(!store.has(&hash));
        assert!(!store.remove(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_detected() {
        let (dir, store) = create_test_store(1024).await;

        let hash = store.store_bytes(&b"original"[..]).await.unwrap();
        std::fs::write(dir.path().join("attachments").join(&hash), b"tampered").unwrap();
        assert!(matches!(
            store.get_bytes(&hash).await,
            Err(Error::Attachment(_))
        ));
    }

    #[test]
    fn test_validate_attachment() {
        let hash = blake3::hash(b"data").to_hex().to_string();
        assert!(validate_attachment(b"data", &hash));
        assert!(!validate_attachment(b"other", &hash));
    }
}
