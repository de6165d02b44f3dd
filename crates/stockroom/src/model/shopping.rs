use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, OwnerRef, Record};
use crate::error::{Error, Result};

/// An entry on a practice's shopping list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListEntry {
    /// Record id
    pub id: String,
    /// Owning practice
    pub practice_id: String,
    /// Linked inventory item, if the entry restocks one
    #[serde(default)]
    pub item_id: Option<String>,
    /// Display name
    pub name: String,
    /// Units to buy
    pub quantity: u32,
    /// Whether the entry has been bought
    #[serde(default)]
    pub purchased: bool,
    /// When the entry was marked purchased
    #[serde(default)]
    pub purchased_at: Option<DateTime<Utc>>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Record for ShoppingListEntry {
    const COLLECTION: &'static str = "shopping";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.practice_id.is_empty()).then_some(OwnerRef::Practice(&self.practice_id))
    }
}

/// Input for adding a shopping list entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewShoppingEntry {
    /// Display name; defaults to the linked item's name when empty
    #[serde(default)]
    pub name: String,
    /// Linked inventory item
    #[serde(default)]
    pub item_id: Option<String>,
    /// Units to buy
    pub quantity: u32,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewShoppingEntry {
    pub(crate) fn into_entry(self, id: String, practice_id: String) -> Result<ShoppingListEntry> {
        if self.quantity == 0 {
            return Err(Error::validation("shopping list quantity must be at least 1"));
        }
        let now = Utc::now();
        Ok(ShoppingListEntry {
            id,
            practice_id,
            item_id: non_blank(self.item_id),
            name: super::required_name("shopping list entry name", &self.name)?,
            quantity: self.quantity,
            purchased: false,
            purchased_at: None,
            notes: non_blank(self.notes),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a shopping list entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShoppingEntryPatch {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New quantity
    #[serde(default)]
    pub quantity: Option<u32>,
    /// New notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl ShoppingEntryPatch {
    pub(crate) fn apply(self, entry: &mut ShoppingListEntry) -> Result<()> {
        if let Some(name) = self.name {
            entry.name = super::required_name("shopping list entry name", &name)?;
        }
        if let Some(quantity) = self.quantity {
            if quantity == 0 {
                return Err(Error::validation("shopping list quantity must be at least 1"));
            }
            entry.quantity = quantity;
        }
        if self.notes.is_some() {
            entry.notes = non_blank(self.notes);
        }
        Ok(())
    }
}
