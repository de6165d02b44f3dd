use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OwnerRef, Record};

/// Why an item's quantity changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock received
    Restock,
    /// Stock consumed in treatment
    Usage,
    /// Manual correction or stocktake
    Adjustment,
    /// Received from another practice or location
    TransferIn,
    /// Sent to another practice or location
    TransferOut,
    /// Consumed as part of a treatment kit
    KitUsage,
    /// Received from a purchased shopping list entry
    Purchase,
}

impl MovementKind {
    /// Whether a manual `adjust_quantity` call may record this kind.
    ///
    /// Transfer and kit kinds are produced only by their own operations.
    #[must_use]
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::Restock | Self::Usage | Self::Adjustment)
    }
}

/// One entry of the stock movement history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    /// Record id
    pub id: String,
    /// Owning practice
    pub practice_id: String,
    /// Item whose quantity changed
    pub item_id: String,
    /// Item name at the time of the movement
    pub item_name: String,
    /// Reason for the change
    pub kind: MovementKind,
    /// Signed change in quantity
    pub delta: i64,
    /// Quantity after the change
    pub quantity_after: u32,
    /// Free-form note
    #[serde(default)]
    pub note: Option<String>,
    /// User who made the change
    pub actor: String,
    /// Shared id linking the two sides of a transfer
    #[serde(default)]
    pub transfer_id: Option<String>,
    /// When the change happened
    pub at: DateTime<Utc>,
}

impl Record for StockMovement {
    const COLLECTION: &'static str = "movements";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.practice_id.is_empty()).then_some(OwnerRef::Practice(&self.practice_id))
    }
}

/// Filter for movement history listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    /// Only movements of this item
    #[serde(default)]
    pub item_id: Option<String>,
    /// Only movements of this kind
    #[serde(default)]
    pub kind: Option<MovementKind>,
    /// Only movements at or after this time
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of movements returned (newest first)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl MovementFilter {
    /// Whether `movement` satisfies the filter (ignores `limit`)
    #[must_use]
    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.item_id.as_ref().is_none_or(|id| *id == movement.item_id)
            && self.kind.is_none_or(|kind| kind == movement.kind)
            && self.since.is_none_or(|since| movement.at >= since)
    }
}
