//! Error types for Stockroom.
//!
//! This module defines the [`enum@Error`] enum and [`Result`] type alias used throughout
//! the Stockroom library.
//!
//! # Error Categories
//!
//! - [`Error::Init`] - Service initialization failures
//! - [`Error::Document`] - Document encoding/decoding
//! - [`Error::Storage`] - Filesystem operations
//! - [`Error::Attachment`] - Attachment (image) storage
//! - [`Error::NotFound`] - A record does not exist
//! - [`Error::Unauthorized`] - The principal does not own the record
//! - [`Error::Validation`] - Rejected input
//! - [`Error::InsufficientStock`] - A deduction would take stock below zero
//! - [`Error::Lookup`] - Barcode provider failures
//! - [`Error::Config`] - Configuration issues
//!
//! # Example
//!
//! ```rust,no_run
//! use stockroom::{Config, Error, Inventory, Principal};
//!
//! # async fn example() -> stockroom::Result<()> {
//! let inventory = Inventory::open(Config::default()).await?;
//! let principal = Principal::new("user-1");
//!
//! match inventory.get_item(&principal, "missing").await {
//!     Ok(item) => println!("{} in stock", item.quantity),
//!     Err(Error::NotFound(msg)) => eprintln!("no such item: {msg}"),
//!     Err(Error::Unauthorized(msg)) => eprintln!("denied: {msg}"),
//!     Err(e) => eprintln!("other error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Stockroom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Stockroom operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Failed to initialize the inventory service
    #[error("initialization failed: {0}")]
    Init(Arc<str>),

    /// Document operation failed
    #[error("document error: {0}")]
    Document(Arc<str>),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(Arc<str>),

    /// Attachment operation failed
    #[error("attachment error: {0}")]
    Attachment(Arc<str>),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(Arc<str>),

    /// Principal is not allowed to touch the record
    #[error("not authorized: {0}")]
    Unauthorized(Arc<str>),

    /// Input was rejected
    #[error("invalid input: {0}")]
    Validation(Arc<str>),

    /// Not enough stock to complete a deduction
    #[error("insufficient stock for {item}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Item name
        item: Arc<str>,
        /// Quantity requested
        requested: u32,
        /// Quantity on hand
        available: u32,
    },

    /// Barcode lookup failed
    #[error("barcode lookup failed: {0}")]
    Lookup(Arc<str>),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(Arc<str>),
}

impl Error {
    /// Create an initialization error
    #[inline]
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(Arc::from(msg.into()))
    }

    /// Create a document error
    #[inline]
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(Arc::from(msg.into()))
    }

    /// Create a storage error
    #[inline]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(Arc::from(msg.into()))
    }

    /// Create an attachment error
    #[inline]
    pub fn attachment(msg: impl Into<String>) -> Self {
        Self::Attachment(Arc::from(msg.into()))
    }

    /// Create a not-found error
    #[inline]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(Arc::from(msg.into()))
    }

    /// Create an unauthorized error
    #[inline]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(Arc::from(msg.into()))
    }

    /// Create a validation error
    #[inline]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(Arc::from(msg.into()))
    }

    /// Create an insufficient-stock error
    #[inline]
    pub fn insufficient_stock(item: impl Into<String>, requested: u32, available: u32) -> Self {
        Self::InsufficientStock {
            item: Arc::from(item.into()),
            requested,
            available,
        }
    }

    /// Create a lookup error
    #[inline]
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(Arc::from(msg.into()))
    }

    /// Create a configuration error
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(Arc::from(msg.into()))
    }

    /// Whether this error means the record is absent
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
