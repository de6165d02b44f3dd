//! Configuration for the inventory service.
//!
//! This module provides the [`Config`] struct for configuring an [`Inventory`](crate::Inventory).
//! Configuration includes the storage path, barcode provider endpoints and
//! attachment limits.
//!
//! # Example
//!
//! ```rust
//! use stockroom::Config;
//!
//! // Simple configuration with just a storage path
//! let config = Config::new("/path/to/storage");
//!
//! // Full configuration with builder pattern
//! let config = Config::new("/path/to/storage")
//!     .with_lookup_timeout(10)
//!     .with_barcode_lookup(false)
//!     .with_max_attachment_bytes(2 * 1024 * 1024);
//!
//! // Default configuration (uses platform-specific data directory)
//! let config = Config::default();
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::{
    DEFAULT_LOOKUP_TIMEOUT_SECS, DEFAULT_MAX_ATTACHMENT_BYTES, DEFAULT_OPENFOODFACTS_URL,
    DEFAULT_UPCITEMDB_URL,
};

/// Configuration for the inventory service.
///
/// # Storage Layout
///
/// When opened, the service creates the following directory structure:
///
/// ```text
/// {storage_path}/
/// ├── config.toml       # Optional configuration file
/// ├── docs/             # Automerge documents, one per record
/// │   ├── _index.automerge
/// │   ├── practices/*.automerge
/// │   ├── items/*.automerge
/// │   └── ...
/// └── attachments/      # Content-addressed item images
/// ```
///
/// # Defaults
///
/// - `storage_path`: Platform-specific data directory + "stockroom"
/// - `barcode_lookup_enabled`: `true`
/// - `upcitemdb_url`: `https://api.upcitemdb.com`
/// - `openfoodfacts_url`: `https://world.openfoodfacts.org`
/// - `lookup_timeout_secs`: 5 seconds
/// - `max_attachment_bytes`: 5 MiB
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to store data (documents and attachments).
    ///
    /// This directory will be created if it doesn't exist.
    pub storage_path: PathBuf,

    /// Whether to query external barcode providers.
    ///
    /// When disabled only the practice's own inventory is searched.
    pub barcode_lookup_enabled: bool,

    /// Base URL of the UPCitemdb API (first provider in the chain).
    pub upcitemdb_url: String,

    /// Base URL of the Open Food Facts API (fallback provider).
    pub openfoodfacts_url: String,

    /// Per-request timeout for barcode providers, in seconds.
    pub lookup_timeout_secs: u64,

    /// Largest image accepted as an item attachment.
    pub max_attachment_bytes: u64,
}

impl Config {
    /// Create a new configuration with the given storage path
    #[must_use]
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            barcode_lookup_enabled: true,
            upcitemdb_url: DEFAULT_UPCITEMDB_URL.to_string(),
            openfoodfacts_url: DEFAULT_OPENFOODFACTS_URL.to_string(),
            lookup_timeout_secs: DEFAULT_LOOKUP_TIMEOUT_SECS,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded configuration file");
        config.validate()?;
        Ok(config)
    }

    /// Load `{storage_path}/config.toml` if present, otherwise keep `self`.
    ///
    /// The storage path of `self` always wins over the one in the file.
    pub fn merge_file(self) -> Result<Self> {
        let path = self.config_file_path();
        if !path.exists() {
            return Ok(self);
        }
        let mut loaded = Self::load(&path)?;
        loaded.storage_path = self.storage_path;
        Ok(loaded)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lookup_timeout_secs == 0 {
            return Err(Error::config("lookup_timeout_secs must be greater than zero"));
        }
        if self.max_attachment_bytes == 0 {
            return Err(Error::config("max_attachment_bytes must be greater than zero"));
        }
        Ok(())
    }

    /// Enable or disable external barcode providers
    #[must_use]
    pub const fn with_barcode_lookup(mut self, enabled: bool) -> Self {
        self.barcode_lookup_enabled = enabled;
        self
    }

    /// Set the UPCitemdb base URL
    #[must_use]
    pub fn with_upcitemdb_url(mut self, url: impl Into<String>) -> Self {
        self.upcitemdb_url = url.into();
        self
    }

    /// Set the Open Food Facts base URL
    #[must_use]
    pub fn with_openfoodfacts_url(mut self, url: impl Into<String>) -> Self {
        self.openfoodfacts_url = url.into();
        self
    }

    /// Set the barcode provider timeout
    #[must_use]
    pub const fn with_lookup_timeout(mut self, secs: u64) -> Self {
        self.lookup_timeout_secs = secs;
        self
    }

    /// Set the attachment size cap
    #[must_use]
    pub const fn with_max_attachment_bytes(mut self, bytes: u64) -> Self {
        self.max_attachment_bytes = bytes;
        self
    }

    /// Get the default storage path
    #[must_use]
    pub fn default_storage_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stockroom")
    }

    /// Path to the documents directory
    #[must_use]
    pub fn docs_path(&self) -> PathBuf {
        self.storage_path.join("docs")
    }

    /// Path to the attachments directory
    #[must_use]
    pub fn attachments_path(&self) -> PathBuf {
        self.storage_path.join("attachments")
    }

    /// Path to the configuration file
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.storage_path.join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::default_storage_path())
    }
}
