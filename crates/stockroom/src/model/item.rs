use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, OwnerRef, Record};
use crate::barcode::canonical_barcode;
use crate::error::{Error, Result};

/// A stock item held by a practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Record id
    pub id: String,
    /// Owning practice
    pub practice_id: String,
    /// Location within the practice, if assigned
    #[serde(default)]
    pub location_id: Option<String>,
    /// Display name
    pub name: String,
    /// Category (e.g. "Consumables", "Endodontics")
    #[serde(default)]
    pub category: Option<String>,
    /// Barcode, stored without spaces or dashes
    #[serde(default)]
    pub barcode: Option<String>,
    /// Unit of issue (box, pack, piece)
    #[serde(default)]
    pub unit: Option<String>,
    /// Quantity on hand
    pub quantity: u32,
    /// Level at or below which the item counts as low stock
    pub min_stock_level: u32,
    /// Price per unit
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// Supplier name
    #[serde(default)]
    pub supplier: Option<String>,
    /// Expiry date of the current batch
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Attachment hash of the item photo
    #[serde(default)]
    pub image: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Whether the quantity is at or below the minimum stock level
    #[must_use]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }

    /// Quantity to order to bring the item comfortably above its minimum
    #[must_use]
    pub fn reorder_quantity(&self) -> u32 {
        self.min_stock_level
            .saturating_mul(2)
            .saturating_sub(self.quantity)
            .max(1)
    }

    /// Whether this item matches a barcode (compared without separators)
    #[must_use]
    pub fn has_barcode(&self, code: &str) -> bool {
        let wanted = canonical_barcode(code);
        !wanted.is_empty() && self.barcode.as_deref() == Some(wanted.as_str())
    }
}

impl Record for InventoryItem {
    const COLLECTION: &'static str = "items";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.practice_id.is_empty()).then_some(OwnerRef::Practice(&self.practice_id))
    }
}

/// Input for creating an item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItem {
    /// Display name
    pub name: String,
    /// Location within the practice
    #[serde(default)]
    pub location_id: Option<String>,
    /// Category
    #[serde(default)]
    pub category: Option<String>,
    /// Barcode
    #[serde(default)]
    pub barcode: Option<String>,
    /// Unit of issue
    #[serde(default)]
    pub unit: Option<String>,
    /// Opening quantity
    #[serde(default)]
    pub quantity: u32,
    /// Minimum stock level
    #[serde(default)]
    pub min_stock_level: u32,
    /// Price per unit
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// Supplier name
    #[serde(default)]
    pub supplier: Option<String>,
    /// Expiry date
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewItem {
    /// Item input with a name, quantity and minimum stock level
    pub fn new(name: impl Into<String>, quantity: u32, min_stock_level: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            min_stock_level,
            ..Self::default()
        }
    }

    /// Set the barcode
    #[must_use]
    pub fn with_barcode(mut self, code: impl Into<String>) -> Self {
        self.barcode = Some(code.into());
        self
    }

    /// Set the location
    #[must_use]
    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    /// Set the category
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub(crate) fn into_item(self, id: String, practice_id: String) -> Result<InventoryItem> {
        validate_price(self.unit_price)?;
        let now = Utc::now();
        Ok(InventoryItem {
            id,
            practice_id,
            location_id: non_blank(self.location_id),
            name: super::required_name("item name", &self.name)?,
            category: non_blank(self.category),
            barcode: normalized_barcode(self.barcode),
            unit: non_blank(self.unit),
            quantity: self.quantity,
            min_stock_level: self.min_stock_level,
            unit_price: self.unit_price,
            supplier: non_blank(self.supplier),
            expiry_date: self.expiry_date,
            image: None,
            notes: non_blank(self.notes),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of an item.
///
/// Quantity is not patchable: use `adjust_quantity`/`set_quantity` so the
/// change is recorded in the movement history. For optional text fields an
/// empty string clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New location (empty string unassigns)
    #[serde(default)]
    pub location_id: Option<String>,
    /// New category
    #[serde(default)]
    pub category: Option<String>,
    /// New barcode
    #[serde(default)]
    pub barcode: Option<String>,
    /// New unit
    #[serde(default)]
    pub unit: Option<String>,
    /// New minimum stock level
    #[serde(default)]
    pub min_stock_level: Option<u32>,
    /// New unit price
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// New supplier
    #[serde(default)]
    pub supplier: Option<String>,
    /// New expiry date
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// New notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl ItemPatch {
    /// The location the patch moves the item to, if it sets one
    pub(crate) fn target_location(&self) -> Option<&str> {
        self.location_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub(crate) fn apply(self, item: &mut InventoryItem) -> Result<()> {
        if let Some(name) = self.name {
            item.name = super::required_name("item name", &name)?;
        }
        if self.location_id.is_some() {
            item.location_id = non_blank(self.location_id);
        }
        if self.category.is_some() {
            item.category = non_blank(self.category);
        }
        if self.barcode.is_some() {
            item.barcode = normalized_barcode(self.barcode);
        }
        if self.unit.is_some() {
            item.unit = non_blank(self.unit);
        }
        if let Some(level) = self.min_stock_level {
            item.min_stock_level = level;
        }
        if self.unit_price.is_some() {
            validate_price(self.unit_price)?;
            item.unit_price = self.unit_price;
        }
        if self.supplier.is_some() {
            item.supplier = non_blank(self.supplier);
        }
        if self.expiry_date.is_some() {
            item.expiry_date = self.expiry_date;
        }
        if self.notes.is_some() {
            item.notes = non_blank(self.notes);
        }
        Ok(())
    }
}

/// Filter for item listings; all set criteria must match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFilter {
    /// Only items at this location
    #[serde(default)]
    pub location_id: Option<String>,
    /// Only items in this category (case-insensitive)
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive substring of the name
    #[serde(default)]
    pub search: Option<String>,
    /// Only low-stock items
    #[serde(default)]
    pub low_stock_only: bool,
}

impl ItemFilter {
    /// Whether `item` satisfies every criterion of the filter
    #[must_use]
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if let Some(location_id) = &self.location_id {
            if item.location_id.as_deref() != Some(location_id.as_str()) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            let same = item
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category));
            if !same {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !item.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        !self.low_stock_only || item.is_low_stock()
    }
}

fn normalized_barcode(code: Option<String>) -> Option<String> {
    code.map(|c| canonical_barcode(&c)).filter(|c| !c.is_empty())
}

fn validate_price(price: Option<f64>) -> Result<()> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(Error::validation("unit price must be a non-negative number"))
        }
        _ => Ok(()),
    }
}
