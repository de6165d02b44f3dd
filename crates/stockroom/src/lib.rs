//! # Stockroom - inventory for dental practices
//!
//! Stockroom keeps track of what a dental practice has on its shelves: stock
//! items and their locations, treatment kits, a shopping list and the history
//! of every stock movement. Each record belongs to a practice, and every
//! operation checks that the requesting user may touch it.
//!
//! ## Features
//!
//! - **Ownership-scoped access**: records are stamped with their owning practice
//!   (or user), and reads and writes are refused for anyone else.
//! - **Stock transfers**: move quantity between practices or locations with a
//!   shared movement record on both sides.
//! - **Low stock**: items at or below their minimum level feed the shopping list.
//! - **Barcode lookup**: scanned codes resolve against the practice's own stock
//!   first, then a chain of external product databases.
//! - **Local storage**: one Automerge document per record, written atomically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stockroom::{Config, Inventory, MovementKind, NewItem, NewPractice, Principal};
//!
//! #[tokio::main]
//! async fn main() -> stockroom::Result<()> {
//!     let inventory = Inventory::open(Config::new("/path/to/storage")).await?;
//!     let alice = Principal::new("alice");
//!
//!     let practice = inventory
//!         .create_practice(&alice, NewPractice::named("Harbour Dental"))
//!         .await?;
//!     let gloves = inventory
//!         .create_item(&alice, &practice.id, NewItem::new("Nitrile gloves", 12, 10))
//!         .await?;
//!
//!     // Three boxes used in surgery this morning
//!     let gloves = inventory
//!         .adjust_quantity(&alice, &gloves.id, -3, MovementKind::Usage, None)
//!         .await?;
//!     assert!(gloves.is_low_stock());
//!
//!     // Put every low item on the shopping list
//!     let added = inventory.populate_from_low_stock(&alice, &practice.id).await?;
//!     println!("{} items to reorder", added.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Configuration for the inventory service
//! - [`inventory`]: The [`Inventory`] service
//! - [`ownership`]: [`Principal`] and the ownership checks
//! - [`model`]: Record types
//! - [`barcode`]: Barcode normalization and the provider chain
//! - [`error`]: Error types and Result alias
//!
//! ## Storage Modules
//!
//! - [`store`]: Document persistence with atomic writes
//! - [`doc`]: Document handle for whole-record read/write
//! - [`collection`]: Typed collections of records
//! - [`attachments`]: Content-addressed item images

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

// =============================================================================
// Public modules
// =============================================================================

pub mod barcode;
pub mod config;
pub mod error;
pub mod inventory;
pub mod model;
pub mod ownership;

// =============================================================================
// Storage modules
// =============================================================================

pub mod attachments;
pub mod collection;
pub mod doc;
pub mod store;

// =============================================================================
// Public re-exports
// =============================================================================

pub use barcode::{BarcodeLookup, BarcodeProvider, ProductInfo};
pub use config::Config;
pub use error::{Error, Result};
pub use inventory::{BarcodeMatch, Inventory, TransferOutcome, TransferRequest};
pub use model::{
    InventoryItem, ItemFilter, ItemPatch, Kit, KitComponent, KitPatch, KitShortfall, Location,
    LocationPatch, MovementFilter, MovementKind, NewItem, NewKit, NewLocation, NewPractice,
    NewShoppingEntry, Practice, PracticePatch, ShoppingEntryPatch, ShoppingListEntry,
    StockMovement,
};
pub use ownership::Principal;

// =============================================================================
// Constants
// =============================================================================

/// Default base URL of the UPCitemdb API.
///
/// Can be configured via [`Config::with_upcitemdb_url`].
pub const DEFAULT_UPCITEMDB_URL: &str = "https://api.upcitemdb.com";

/// Default base URL of the Open Food Facts API.
///
/// Can be configured via [`Config::with_openfoodfacts_url`].
pub const DEFAULT_OPENFOODFACTS_URL: &str = "https://world.openfoodfacts.org";

/// Default per-request timeout for barcode providers, in seconds.
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Default size cap for item images (5 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;
