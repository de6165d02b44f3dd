//! The inventory service
//!
//! [`Inventory`] is the single entry point for reading and changing stock.
//! Every operation takes the [`Principal`] it runs for and checks ownership
//! before touching a record:
//!
//! - practices are visible to their owner and members
//! - locations, items, kits, shopping list entries and movements are visible
//!   to whoever has access to the practice they belong to
//! - renaming or deleting a practice and managing its members is owner-only
//!
//! Every operation that writes a record runs under one service-wide mutation
//! lock and reads the records it changes after taking it, so a write never
//! overwrites a change it did not see.

mod history;
mod items;
mod kits;
mod locations;
mod shopping;
mod transfer;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use crate::attachments::AttachmentStore;
use crate::barcode::BarcodeLookup;
use crate::collection::Collection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    new_id, InventoryItem, Kit, Location, MovementKind, NewPractice, OwnerRef, Practice,
    PracticePatch, Record, ShoppingListEntry, StockMovement,
};
use crate::ownership::{self, Principal};
use crate::store::Store;

pub use items::BarcodeMatch;
pub use transfer::{TransferOutcome, TransferRequest};

/// Ownership-checked access to a practice's stock.
///
/// # Example
///
/// ```rust,no_run
/// use stockroom::{Config, Inventory, NewItem, NewPractice, Principal};
///
/// # async fn example() -> stockroom::Result<()> {
/// let inventory = Inventory::open(Config::new("/tmp/stockroom")).await?;
/// let alice = Principal::new("alice");
///
/// let practice = inventory
///     .create_practice(&alice, NewPractice::named("Harbour Dental"))
///     .await?;
/// let gloves = inventory
///     .create_item(&alice, &practice.id, NewItem::new("Nitrile gloves (M)", 40, 10))
///     .await?;
///
/// for item in inventory.low_stock_items(&alice, &practice.id).await? {
///     println!("reorder {} x{}", item.name, item.reorder_quantity());
/// }
/// # let _ = gloves;
/// # Ok(())
/// # }
/// ```
pub struct Inventory {
    config: Config,
    store: Arc<Store>,
    attachments: AttachmentStore,
    barcode: BarcodeLookup,
    practices: Collection<Practice>,
    locations: Collection<Location>,
    items: Collection<InventoryItem>,
    kits: Collection<Kit>,
    shopping: Collection<ShoppingListEntry>,
    movements: Collection<StockMovement>,
    /// Serializes every write; not reentrant
    mutation_lock: TokioMutex<()>,
}

impl Inventory {
    /// Open the inventory at `config.storage_path`, creating it if needed
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        info!(path = %config.storage_path.display(), "Opening inventory");

        tokio::fs::create_dir_all(&config.storage_path)
            .await
            .map_err(|e| Error::init(format!("failed to create storage directory: {e}")))?;

        let store = Arc::new(Store::new(&config)?);
        let attachments =
            AttachmentStore::new(config.attachments_path(), config.max_attachment_bytes).await?;
        let barcode = BarcodeLookup::from_config(&config)?;

        info!(providers = barcode.len(), "Inventory ready");

        Ok(Self {
            practices: Collection::new(Arc::clone(&store)),
            locations: Collection::new(Arc::clone(&store)),
            items: Collection::new(Arc::clone(&store)),
            kits: Collection::new(Arc::clone(&store)),
            shopping: Collection::new(Arc::clone(&store)),
            movements: Collection::new(Arc::clone(&store)),
            config,
            store,
            attachments,
            barcode,
            mutation_lock: TokioMutex::new(()),
        })
    }

    /// Replace the barcode provider chain
    #[must_use]
    pub fn with_barcode_lookup(mut self, barcode: BarcodeLookup) -> Self {
        self.barcode = barcode;
        self
    }

    /// The configuration the inventory was opened with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying document store
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    // =========================================================================
    // Practices
    // =========================================================================

    /// Create a practice owned by `principal`
    pub async fn create_practice(&self, principal: &Principal, new: NewPractice) -> Result<Practice> {
        let practice = ownership::stamp_practice(new, principal)?;
        let _guard = self.mutation_lock.lock().await;
        self.practices.insert(&practice).await?;
        info!(practice_id = %practice.id, user_id = %principal.user_id, "Practice created");
        Ok(practice)
    }

    /// Get a practice the principal owns or is a member of
    pub async fn get_practice(&self, principal: &Principal, practice_id: &str) -> Result<Practice> {
        self.load_owned(&self.practices, principal, practice_id).await
    }

    /// List the practices the principal owns or is a member of, by name
    pub async fn list_practices(&self, principal: &Principal) -> Result<Vec<Practice>> {
        let mut practices = self
            .practices
            .list_where(|p| p.has_access(&principal.user_id))
            .await?;
        practices.sort_by_key(|p| p.name.to_lowercase());
        Ok(practices)
    }

    /// Rename or edit a practice; owner only
    pub async fn update_practice(
        &self,
        principal: &Principal,
        practice_id: &str,
        patch: PracticePatch,
    ) -> Result<Practice> {
        let _guard = self.mutation_lock.lock().await;
        let mut practice =
            ownership::ensure_practice_owner(&self.store, practice_id, principal).await?;
        patch.apply(&mut practice)?;
        practice.updated_at = Utc::now();
        self.practices.update(&practice).await?;
        debug!(practice_id, "Practice updated");
        Ok(practice)
    }

    /// Delete a practice and every record that belongs to it; owner only
    pub async fn delete_practice(&self, principal: &Principal, practice_id: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        ownership::ensure_practice_owner(&self.store, practice_id, principal).await?;

        let owner = OwnerRef::Practice(practice_id);
        let mut images = Vec::new();
        for item in self.items.list_owned_by(owner).await? {
            images.extend(item.image.clone());
            self.items.remove(&item.id).await?;
        }
        let removed = self.remove_owned(&self.locations, owner).await?
            + self.remove_owned(&self.kits, owner).await?
            + self.remove_owned(&self.shopping, owner).await?
            + self.remove_owned(&self.movements, owner).await?;
        for hash in images {
            self.release_image(&hash).await;
        }

        self.practices.remove(practice_id).await?;
        info!(practice_id, removed, "Practice deleted");
        Ok(())
    }

    /// Give another user access to a practice's stock; owner only
    pub async fn add_member(
        &self,
        principal: &Principal,
        practice_id: &str,
        user_id: &str,
    ) -> Result<Practice> {
        let _guard = self.mutation_lock.lock().await;
        let mut practice =
            ownership::ensure_practice_owner(&self.store, practice_id, principal).await?;

        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::validation("member user id must not be empty"));
        }
        if practice.is_owner(user_id) {
            return Err(Error::validation("the owner is already part of the practice"));
        }
        if practice.members.iter().any(|m| m == user_id) {
            return Ok(practice);
        }

        practice.members.push(user_id.to_string());
        practice.updated_at = Utc::now();
        self.practices.update(&practice).await?;
        info!(practice_id, member = user_id, "Member added");
        Ok(practice)
    }

    /// Revoke a member's access; owner only
    pub async fn remove_member(
        &self,
        principal: &Principal,
        practice_id: &str,
        user_id: &str,
    ) -> Result<Practice> {
        let _guard = self.mutation_lock.lock().await;
        let mut practice =
            ownership::ensure_practice_owner(&self.store, practice_id, principal).await?;

        let before = practice.members.len();
        practice.members.retain(|m| m != user_id);
        if practice.members.len() == before {
            return Err(Error::not_found(format!(
                "{user_id} is not a member of practice {practice_id}"
            )));
        }

        practice.updated_at = Utc::now();
        self.practices.update(&practice).await?;
        info!(practice_id, member = user_id, "Member removed");
        Ok(practice)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Load a record after checking the principal may access it.
    ///
    /// Absent records are `NotFound`; records the principal may not touch are
    /// `Unauthorized`.
    async fn load_owned<T: Record>(
        &self,
        collection: &Collection<T>,
        principal: &Principal,
        id: &str,
    ) -> Result<T> {
        if !collection.contains(id) {
            return Err(Error::not_found(format!("{}/{id}", T::COLLECTION)));
        }
        ownership::ensure_ownership(&self.store, T::COLLECTION, id, principal).await?;
        collection.get(id).await
    }

    /// Check access to a practice, returning it for stamping new records
    async fn scope(&self, principal: &Principal, practice_id: &str) -> Result<Practice> {
        if !self.practices.contains(practice_id) {
            return Err(Error::not_found(format!("practices/{practice_id}")));
        }
        ownership::practice_scope(&self.store, practice_id, principal).await
    }

    /// Remove every record of a collection owned by `owner`
    async fn remove_owned<T: Record>(
        &self,
        collection: &Collection<T>,
        owner: OwnerRef<'_>,
    ) -> Result<usize> {
        let records = collection.list_owned_by(owner).await?;
        for record in &records {
            collection.remove(record.id()).await?;
        }
        Ok(records.len())
    }

    /// Apply a signed change to an item's quantity and save it
    async fn write_quantity(&self, item: &mut InventoryItem, delta: i64) -> Result<()> {
        let quantity = checked_quantity(item, delta)?;
        item.quantity = quantity;
        item.updated_at = Utc::now();
        self.items.update(item).await
    }

    /// Record a stock movement.
    ///
    /// History is best-effort: a failed write is logged and the stock change
    /// it describes stands.
    async fn record_movement(
        &self,
        principal: &Principal,
        item: &InventoryItem,
        kind: MovementKind,
        delta: i64,
        note: Option<String>,
        transfer_id: Option<&str>,
    ) {
        let movement = StockMovement {
            id: new_id(),
            practice_id: item.practice_id.clone(),
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            kind,
            delta,
            quantity_after: item.quantity,
            note: crate::model::non_blank(note),
            actor: principal.user_id.clone(),
            transfer_id: transfer_id.map(str::to_string),
            at: Utc::now(),
        };

        if let Err(e) = self.movements.insert(&movement).await {
            warn!(item_id = %item.id, ?kind, delta, "Failed to record stock movement: {e}");
        }
    }

    /// Remove an attachment once no item refers to it any more
    async fn release_image(&self, hash: &str) {
        let still_used = match self
            .items
            .list_where(|item| item.image.as_deref() == Some(hash))
            .await
        {
            Ok(users) => !users.is_empty(),
            Err(e) => {
                warn!(hash, "Cannot check attachment references: {e}");
                true
            }
        };
        if still_used {
            return;
        }
        if let Err(e) = self.attachments.remove(hash).await {
            warn!(hash, "Failed to remove attachment: {e}");
        }
    }
}

/// The quantity after applying `delta`, rejecting results below zero
fn checked_quantity(item: &InventoryItem, delta: i64) -> Result<u32> {
    let next = i64::from(item.quantity) + delta;
    if next < 0 {
        let requested = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
        return Err(Error::insufficient_stock(
            item.name.clone(),
            requested,
            item.quantity,
        ));
    }
    u32::try_from(next)
        .map_err(|_| Error::validation(format!("quantity of {} would overflow", item.name)))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::model::NewItem;

    #[tokio::test]
    async fn test_practice_is_stamped_and_listed_for_owner_only() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        assert_eq!(practice.user_id, "alice");

        let listed = inventory.list_practices(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);

        let bob = Principal::new("bob");
        assert!(inventory.list_practices(&bob).await.unwrap().is_empty());
        assert!(matches!(
            inventory.get_practice(&bob, &practice.id).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_practice_is_not_found() {
        let (_dir, inventory, alice, _practice) = with_practice().await;
        assert!(inventory
            .get_practice(&alice, "nope")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_update_practice_owner_only() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let bob = Principal::new("bob");
        inventory.add_member(&alice, &practice.id, "bob").await.unwrap();

        let patch = PracticePatch {
            name: Some("Harbour Dental Care".into()),
            ..Default::default()
        };
        assert!(matches!(
            inventory.update_practice(&bob, &practice.id, patch.clone()).await,
            Err(Error::Unauthorized(_))
        ));

        let updated = inventory
            .update_practice(&alice, &practice.id, patch)
            .await
            .unwrap();
        assert_eq!(updated.name, "Harbour Dental Care");
    }

    #[tokio::test]
    async fn test_members() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let bob = Principal::new("bob");

        let updated = inventory.add_member(&alice, &practice.id, "bob").await.unwrap();
        assert_eq!(updated.members, vec!["bob"]);
        // Adding twice is a no-op
        let updated = inventory.add_member(&alice, &practice.id, "bob").await.unwrap();
        assert_eq!(updated.members.len(), 1);

        assert!(inventory.add_member(&alice, &practice.id, "alice").await.is_err());
        assert!(inventory.add_member(&bob, &practice.id, "carol").await.is_err());

        assert_eq!(inventory.list_practices(&bob).await.unwrap().len(), 1);
        inventory
            .create_item(&bob, &practice.id, NewItem::new("Bibs", 5, 1))
            .await
            .unwrap();

        inventory.remove_member(&alice, &practice.id, "bob").await.unwrap();
        assert!(inventory.list_practices(&bob).await.unwrap().is_empty());
        assert!(inventory
            .remove_member(&alice, &practice.id, "bob")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_member_changes_are_all_kept() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let inventory = Arc::new(inventory);

        let mut handles = Vec::new();
        for n in 0..8 {
            let inventory = Arc::clone(&inventory);
            let alice = alice.clone();
            let practice_id = practice.id.clone();
            handles.push(tokio::spawn(async move {
                inventory
                    .add_member(&alice, &practice_id, &format!("hygienist-{n}"))
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let practice = inventory.get_practice(&alice, &practice.id).await.unwrap();
        assert_eq!(practice.members.len(), 8);
    }

    #[tokio::test]
    async fn test_delete_practice_cascades() {
        let (_dir, inventory, alice, practice) = with_practice().await;

        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Cotton rolls", 3, 5))
            .await
            .unwrap();
        inventory
            .attach_image(&alice, &item.id, &b"png"[..])
            .await
            .unwrap();
        inventory
            .adjust_quantity(&alice, &item.id, 2, MovementKind::Restock, None)
            .await
            .unwrap();

        inventory.delete_practice(&alice, &practice.id).await.unwrap();

        assert!(inventory.store().list_docs("").unwrap().is_empty());
        assert!(inventory
            .get_practice(&alice, &practice.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_checked_quantity() {
        let item = crate::model::NewItem::new("Gauze", 3, 1)
            .into_item(new_id(), "p".into())
            .unwrap();
        assert_eq!(checked_quantity(&item, -3).unwrap(), 0);
        assert_eq!(checked_quantity(&item, 4).unwrap(), 7);
        assert!(matches!(
            checked_quantity(&item, -4),
            Err(Error::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
    }
}
