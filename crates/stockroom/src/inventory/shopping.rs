//! The practice shopping list

use chrono::Utc;
use tracing::{debug, info, warn};

use super::Inventory;
use crate::error::{Error, Result};
use crate::model::{
    new_id, MovementKind, NewShoppingEntry, OwnerRef, Record, ShoppingEntryPatch,
    ShoppingListEntry,
};
use crate::ownership::Principal;

impl Inventory {
    /// Add an entry to a practice's shopping list.
    ///
    /// An entry linked to an item takes the item's name when none is given.
    pub async fn add_shopping_entry(
        &self,
        principal: &Principal,
        practice_id: &str,
        mut new: NewShoppingEntry,
    ) -> Result<ShoppingListEntry> {
        let _guard = self.mutation_lock.lock().await;
        let practice = self.scope(principal, practice_id).await?;

        let linked = crate::model::non_blank(new.item_id.clone());
        if let Some(item_id) = linked {
            let item = match self.items.find(&item_id).await {
                Ok(Some(item)) if item.practice_id == practice_id => item,
                _ => {
                    return Err(Error::validation(format!(
                        "item {item_id} is not part of practice {practice_id}"
                    )))
                }
            };
            if new.name.trim().is_empty() {
                new.name = item.name;
            }
        }

        let entry = new.into_entry(new_id(), practice.id)?;
        self.shopping.insert(&entry).await?;
        debug!(entry_id = %entry.id, practice_id, "Shopping list entry added");
        Ok(entry)
    }

    /// List a practice's shopping list, oldest entries first
    pub async fn list_shopping_list(
        &self,
        principal: &Principal,
        practice_id: &str,
        include_purchased: bool,
    ) -> Result<Vec<ShoppingListEntry>> {
        self.scope(principal, practice_id).await?;
        let owner = OwnerRef::Practice(practice_id);
        let mut entries = self
            .shopping
            .list_where(|e| e.owner() == Some(owner) && (include_purchased || !e.purchased))
            .await?;
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Edit a shopping list entry
    pub async fn update_shopping_entry(
        &self,
        principal: &Principal,
        entry_id: &str,
        patch: ShoppingEntryPatch,
    ) -> Result<ShoppingListEntry> {
        let _guard = self.mutation_lock.lock().await;
        let mut entry = self.load_owned(&self.shopping, principal, entry_id).await?;
        patch.apply(&mut entry)?;
        entry.updated_at = Utc::now();
        self.shopping.update(&entry).await?;
        Ok(entry)
    }

    /// Mark an entry as purchased.
    ///
    /// With `restock`, the linked item's stock grows by the entry's quantity
    /// and a purchase movement is recorded. An entry whose item has since
    /// been deleted is still marked.
    pub async fn mark_purchased(
        &self,
        principal: &Principal,
        entry_id: &str,
        restock: bool,
    ) -> Result<ShoppingListEntry> {
        let _guard = self.mutation_lock.lock().await;
        let mut entry = self.load_owned(&self.shopping, principal, entry_id).await?;
        if entry.purchased {
            return Err(Error::validation(format!(
                "{} is already marked as purchased",
                entry.name
            )));
        }

        if restock {
            if let Some(item_id) = entry.item_id.clone() {
                match self.items.find(&item_id).await? {
                    Some(mut item) if item.practice_id == entry.practice_id => {
                        let delta = i64::from(entry.quantity);
                        self.write_quantity(&mut item, delta).await?;
                        self.record_movement(
                            principal,
                            &item,
                            MovementKind::Purchase,
                            delta,
                            Some(format!("shopping list: {}", entry.name)),
                            None,
                        )
                        .await;
                    }
                    _ => warn!(entry_id, item_id = %item_id, "Linked item is gone; not restocking"),
                }
            }
        }

        let now = Utc::now();
        entry.purchased = true;
        entry.purchased_at = Some(now);
        entry.updated_at = now;
        self.shopping.update(&entry).await?;

        info!(entry_id, restock, "Shopping list entry purchased");
        Ok(entry)
    }

    /// Remove an entry from the shopping list
    pub async fn remove_shopping_entry(&self, principal: &Principal, entry_id: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        self.load_owned(&self.shopping, principal, entry_id).await?;
        self.shopping.remove(entry_id).await?;
        Ok(())
    }

    /// Remove every purchased entry; returns how many were removed
    pub async fn clear_purchased(&self, principal: &Principal, practice_id: &str) -> Result<usize> {
        let _guard = self.mutation_lock.lock().await;
        self.scope(principal, practice_id).await?;
        let purchased = self
            .shopping
            .list_where(|e| e.owner() == Some(OwnerRef::Practice(practice_id)) && e.purchased)
            .await?;
        for entry in &purchased {
            self.shopping.remove(&entry.id).await?;
        }
        info!(practice_id, removed = purchased.len(), "Purchased entries cleared");
        Ok(purchased.len())
    }

    /// Add an entry for every low-stock item that has no open entry yet.
    ///
    /// Returns the entries that were added. The check and the inserts run
    /// under the mutation lock, so concurrent calls add each item once.
    pub async fn populate_from_low_stock(
        &self,
        principal: &Principal,
        practice_id: &str,
    ) -> Result<Vec<ShoppingListEntry>> {
        let _guard = self.mutation_lock.lock().await;
        let low = self.low_stock_items(principal, practice_id).await?;
        let open = self.list_shopping_list(principal, practice_id, false).await?;

        let mut added = Vec::new();
        for item in low {
            if open.iter().any(|e| e.item_id.as_deref() == Some(item.id.as_str())) {
                continue;
            }
            let new = NewShoppingEntry {
                name: item.name.clone(),
                item_id: Some(item.id.clone()),
                quantity: item.reorder_quantity(),
                notes: None,
            };
            let entry = new.into_entry(new_id(), practice_id.to_string())?;
            self.shopping.insert(&entry).await?;
            added.push(entry);
        }

        info!(practice_id, added = added.len(), "Shopping list populated from low stock");
        Ok(added)
    }
}
