//! Record types stored by the inventory service.
//!
//! Every record is one document in the [`Store`](crate::store::Store), named
//! `{collection}/{id}`. Each record type names its collection and its
//! ownership field through the [`Record`] trait:
//!
//! - [`Practice`] is owned by a user (`user_id`)
//! - everything else is owned by a practice (`practice_id`)

mod item;
mod kit;
mod location;
mod movement;
mod practice;
mod shopping;

use serde::{de::DeserializeOwned, Serialize};

pub use item::{InventoryItem, ItemFilter, ItemPatch, NewItem};
pub use kit::{Kit, KitComponent, KitPatch, KitShortfall, NewKit};
pub use location::{Location, LocationPatch, NewLocation};
pub use movement::{MovementFilter, MovementKind, StockMovement};
pub use practice::{NewPractice, Practice, PracticePatch};
pub use shopping::{NewShoppingEntry, ShoppingEntryPatch, ShoppingListEntry};

/// The ownership field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRef<'a> {
    /// Owned directly by a user account
    User(&'a str),
    /// Owned by a practice
    Practice(&'a str),
}

/// A typed document stored in a named collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection (document name prefix) holding this record type
    const COLLECTION: &'static str;

    /// Record identifier
    fn id(&self) -> &str;

    /// Ownership field, or `None` if the record carries no owner
    fn owner(&self) -> Option<OwnerRef<'_>>;

    /// Document name for a record id
    fn doc_name(id: &str) -> String {
        format!("{}/{id}", Self::COLLECTION)
    }
}

/// Generate a fresh record id
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// `None` for empty or whitespace-only strings, trimmed otherwise
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reject empty or whitespace-only required names
pub(crate) fn required_name(field: &str, value: &str) -> crate::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_doc_name_safe() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_id());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Room 2 ".into())), Some("Room 2".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_required_name() {
        assert_eq!(required_name("name", " Gloves ").unwrap(), "Gloves");
        assert!(required_name("name", "  ").is_err());
    }
}
