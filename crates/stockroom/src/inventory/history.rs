//! Stock movement history

use super::Inventory;
use crate::error::Result;
use crate::model::{MovementFilter, OwnerRef, Record, StockMovement};
use crate::ownership::Principal;

impl Inventory {
    /// A practice's stock movements matching `filter`, newest first
    pub async fn list_movements(
        &self,
        principal: &Principal,
        practice_id: &str,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>> {
        self.scope(principal, practice_id).await?;

        let owner = OwnerRef::Practice(practice_id);
        let mut movements = self
            .movements
            .list_where(|m| m.owner() == Some(owner) && filter.matches(m))
            .await?;

        movements.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            movements.truncate(limit);
        }
        Ok(movements)
    }
}
