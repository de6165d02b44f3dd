//! Items, stock levels, barcodes and images

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::Inventory;
use crate::barcode::{canonical_barcode, normalize_barcode, ProductInfo};
use crate::error::{Error, Result};
use crate::model::{
    new_id, InventoryItem, ItemFilter, ItemPatch, MovementKind, NewItem, OwnerRef, Record,
};
use crate::ownership::Principal;

/// Outcome of scanning a barcode within a practice
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum BarcodeMatch {
    /// The practice already stocks an item with this barcode
    InInventory(InventoryItem),
    /// Not stocked, but an external provider knows the product
    External(ProductInfo),
    /// Nobody knows the code
    NotFound,
}

impl Inventory {
    /// Create an item in a practice
    pub async fn create_item(
        &self,
        principal: &Principal,
        practice_id: &str,
        new: NewItem,
    ) -> Result<InventoryItem> {
        let _guard = self.mutation_lock.lock().await;
        let practice = self.scope(principal, practice_id).await?;
        let item = new.into_item(new_id(), practice.id)?;
        if let Some(location_id) = &item.location_id {
            self.ensure_location_in(practice_id, location_id).await?;
        }

        self.items.insert(&item).await?;
        info!(item_id = %item.id, practice_id, name = %item.name, "Item created");

        if item.quantity > 0 {
            self.record_movement(
                principal,
                &item,
                MovementKind::Restock,
                i64::from(item.quantity),
                Some("opening stock".into()),
                None,
            )
            .await;
        }
        Ok(item)
    }

    /// Get an item
    pub async fn get_item(&self, principal: &Principal, item_id: &str) -> Result<InventoryItem> {
        self.load_owned(&self.items, principal, item_id).await
    }

    /// List a practice's items matching `filter`, by name
    pub async fn list_items(
        &self,
        principal: &Principal,
        practice_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<InventoryItem>> {
        self.scope(principal, practice_id).await?;
        let owner = OwnerRef::Practice(practice_id);
        let mut items = self
            .items
            .list_where(|item| item.owner() == Some(owner) && filter.matches(item))
            .await?;
        items.sort_by_key(|item| item.name.to_lowercase());
        Ok(items)
    }

    /// Edit an item's details. Quantity changes go through
    /// [`adjust_quantity`](Self::adjust_quantity).
    pub async fn update_item(
        &self,
        principal: &Principal,
        item_id: &str,
        patch: ItemPatch,
    ) -> Result<InventoryItem> {
        let _guard = self.mutation_lock.lock().await;
        let mut item = self.load_owned(&self.items, principal, item_id).await?;
        if let Some(location_id) = patch.target_location() {
            self.ensure_location_in(&item.practice_id, location_id).await?;
        }

        patch.apply(&mut item)?;
        item.updated_at = Utc::now();
        self.items.update(&item).await?;
        debug!(item_id, "Item updated");
        Ok(item)
    }

    /// Delete an item.
    ///
    /// The item is dropped from kits that use it and unlinked from shopping
    /// list entries, which keep their name.
    pub async fn delete_item(&self, principal: &Principal, item_id: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let item = self.load_owned(&self.items, principal, item_id).await?;

        self.items.remove(item_id).await?;

        let owner = OwnerRef::Practice(&item.practice_id);
        for mut kit in self.kits.list_owned_by(owner).await? {
            if kit.components.iter().any(|c| c.item_id == item_id) {
                kit.components.retain(|c| c.item_id != item_id);
                kit.updated_at = Utc::now();
                self.kits.update(&kit).await?;
            }
        }
        for mut entry in self.shopping.list_owned_by(owner).await? {
            if entry.item_id.as_deref() == Some(item_id) {
                entry.item_id = None;
                entry.updated_at = Utc::now();
                self.shopping.update(&entry).await?;
            }
        }

        if let Some(hash) = &item.image {
            self.release_image(hash).await;
        }

        info!(item_id, practice_id = %item.practice_id, "Item deleted");
        Ok(())
    }

    /// Change an item's quantity by `delta` and record the movement.
    ///
    /// Only restock, usage and adjustment movements can be recorded this way;
    /// the result may not drop below zero.
    pub async fn adjust_quantity(
        &self,
        principal: &Principal,
        item_id: &str,
        delta: i64,
        kind: MovementKind,
        note: Option<String>,
    ) -> Result<InventoryItem> {
        if delta == 0 {
            return Err(Error::validation("quantity change must not be zero"));
        }
        if !kind.is_manual() {
            return Err(Error::validation(format!(
                "{kind:?} movements are recorded by their own operations"
            )));
        }
        match kind {
            MovementKind::Restock if delta < 0 => {
                return Err(Error::validation("a restock must add stock"))
            }
            MovementKind::Usage if delta > 0 => {
                return Err(Error::validation("usage must remove stock"))
            }
            _ => {}
        }

        let _guard = self.mutation_lock.lock().await;
        let mut item = self.load_owned(&self.items, principal, item_id).await?;
        self.write_quantity(&mut item, delta).await?;
        self.record_movement(principal, &item, kind, delta, note, None)
            .await;

        debug!(item_id, delta, quantity = item.quantity, "Quantity adjusted");
        Ok(item)
    }

    /// Set an item's quantity after a stocktake.
    ///
    /// The difference is recorded as an adjustment; setting the current
    /// quantity records nothing.
    pub async fn set_quantity(
        &self,
        principal: &Principal,
        item_id: &str,
        quantity: u32,
        note: Option<String>,
    ) -> Result<InventoryItem> {
        let _guard = self.mutation_lock.lock().await;
        let mut item = self.load_owned(&self.items, principal, item_id).await?;
        let delta = i64::from(quantity) - i64::from(item.quantity);
        if delta == 0 {
            return Ok(item);
        }

        self.write_quantity(&mut item, delta).await?;
        self.record_movement(principal, &item, MovementKind::Adjustment, delta, note, None)
            .await;
        Ok(item)
    }

    /// Items at or below their minimum stock level, by name
    pub async fn low_stock_items(
        &self,
        principal: &Principal,
        practice_id: &str,
    ) -> Result<Vec<InventoryItem>> {
        let filter = ItemFilter {
            low_stock_only: true,
            ..ItemFilter::default()
        };
        self.list_items(principal, practice_id, &filter).await
    }

    /// Find a practice's item by barcode
    pub async fn find_by_barcode(
        &self,
        principal: &Principal,
        practice_id: &str,
        code: &str,
    ) -> Result<Option<InventoryItem>> {
        self.scope(principal, practice_id).await?;
        let code = canonical_barcode(code);
        if code.is_empty() {
            return Ok(None);
        }

        let owner = OwnerRef::Practice(practice_id);
        let mut matches = self
            .items
            .list_where(|item| item.owner() == Some(owner) && item.has_barcode(&code))
            .await?;
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches.into_iter().next())
    }

    /// Resolve a scanned barcode: the practice's own stock first, then the
    /// external provider chain
    pub async fn lookup_barcode(
        &self,
        principal: &Principal,
        practice_id: &str,
        code: &str,
    ) -> Result<BarcodeMatch> {
        let scanned = canonical_barcode(code);
        if scanned.is_empty() {
            return Err(Error::validation("barcode must not be empty"));
        }

        // Stored codes are matched as scanned; only external lookups need a valid GTIN
        if let Some(item) = self.find_by_barcode(principal, practice_id, &scanned).await? {
            debug!(code = %scanned, item_id = %item.id, "Barcode found in inventory");
            return Ok(BarcodeMatch::InInventory(item));
        }

        let code = normalize_barcode(&scanned)?;
        match self.barcode.lookup(&code).await? {
            Some(product) => Ok(BarcodeMatch::External(product)),
            None => Ok(BarcodeMatch::NotFound),
        }
    }

    /// Store an image for an item, replacing any previous one
    pub async fn attach_image(
        &self,
        principal: &Principal,
        item_id: &str,
        data: impl Into<Bytes>,
    ) -> Result<InventoryItem> {
        let _guard = self.mutation_lock.lock().await;
        let mut item = self.load_owned(&self.items, principal, item_id).await?;
        let hash = self.attachments.store_bytes(data).await?;

        let previous = item.image.replace(hash.clone());
        item.updated_at = Utc::now();
        self.items.update(&item).await?;

        if let Some(old) = previous.filter(|old| *old != hash) {
            self.release_image(&old).await;
        }
        info!(item_id, hash = %hash, "Image attached");
        Ok(item)
    }

    /// The item's image, if it has one
    pub async fn item_image(&self, principal: &Principal, item_id: &str) -> Result<Option<Bytes>> {
        let item = self.load_owned(&self.items, principal, item_id).await?;
        match &item.image {
            Some(hash) => self.attachments.get_bytes(hash).await.map(Some),
            None => Ok(None),
        }
    }

    /// Reject locations that do not belong to the practice
    pub(super) async fn ensure_location_in(&self, practice_id: &str, location_id: &str) -> Result<()> {
        match self.locations.find(location_id).await {
            Ok(Some(location)) if location.practice_id == practice_id => Ok(()),
            Ok(_) | Err(Error::Validation(_)) => Err(Error::validation(format!(
                "location {location_id} does not belong to practice {practice_id}"
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::barcode::{BarcodeLookup, BarcodeProvider};
    use crate::model::{MovementFilter, NewLocation};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StaticProvider;

    #[async_trait]
    impl BarcodeProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>> {
            Ok((code == "4006381333931").then(|| ProductInfo {
                barcode: code.to_string(),
                name: "Composite syringe".into(),
                brand: Some("Acme".into()),
                description: None,
                image_url: None,
                source: "static".into(),
            }))
        }
    }

    #[tokio::test]
    async fn test_create_and_get_item() {
        let (_dir, inventory, alice, practice) = with_practice().await;

        let item = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Prophy paste", 12, 4).with_barcode("0360-0029-1452"),
            )
            .await
            .unwrap();
        assert_eq!(item.practice_id, practice.id);
        assert_eq!(item.barcode.as_deref(), Some("036000291452"));

        let loaded = inventory.get_item(&alice, &item.id).await.unwrap();
        assert_eq!(loaded, item);

        let history = inventory
            .list_movements(&alice, &practice.id, &MovementFilter::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::Restock);
        assert_eq!(history[0].delta, 12);
    }

    #[tokio::test]
    async fn test_items_are_scoped_to_practice() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let mallory = Principal::new("mallory");

        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Burs", 8, 2))
            .await
            .unwrap();

        assert!(matches!(
            inventory.get_item(&mallory, &item.id).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            inventory
                .create_item(&mallory, &practice.id, NewItem::new("Sneaky", 1, 0))
                .await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            inventory
                .list_items(&mallory, &practice.id, &ItemFilter::default())
                .await,
            Err(Error::Unauthorized(_))
        ));
        assert!(inventory
            .adjust_quantity(&mallory, &item.id, -1, MovementKind::Usage, None)
            .await
            .is_err());
        assert_eq!(inventory.get_item(&alice, &item.id).await.unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_item_location_must_belong_to_practice() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let other = inventory
            .create_practice(&alice, crate::model::NewPractice::named("Branch"))
            .await
            .unwrap();
        let room = inventory
            .create_location(
                &alice,
                &other.id,
                NewLocation {
                    name: "Lab".into(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let err = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Alginate", 2, 1).with_location(room.id.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_adjust_quantity_rules() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Needles", 5, 2))
            .await
            .unwrap();

        let item = inventory
            .adjust_quantity(&alice, &item.id, -3, MovementKind::Usage, Some("chair 2".into()))
            .await
            .unwrap();
        assert_eq!(item.quantity, 2);
        assert!(item.is_low_stock());

        let err = inventory
            .adjust_quantity(&alice, &item.id, -3, MovementKind::Usage, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));

        assert!(inventory
            .adjust_quantity(&alice, &item.id, 0, MovementKind::Adjustment, None)
            .await
            .is_err());
        assert!(inventory
            .adjust_quantity(&alice, &item.id, 1, MovementKind::TransferIn, None)
            .await
            .is_err());
        assert!(inventory
            .adjust_quantity(&alice, &item.id, -1, MovementKind::Restock, None)
            .await
            .is_err());

        assert_eq!(inventory.get_item(&alice, &item.id).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_set_quantity_records_difference() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Masks", 20, 5))
            .await
            .unwrap();

        let item = inventory
            .set_quantity(&alice, &item.id, 14, Some("stocktake".into()))
            .await
            .unwrap();
        assert_eq!(item.quantity, 14);
        inventory.set_quantity(&alice, &item.id, 14, None).await.unwrap();

        let filter = MovementFilter {
            kind: Some(MovementKind::Adjustment),
            ..MovementFilter::default()
        };
        let history = inventory
            .list_movements(&alice, &practice.id, &filter)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, -6);
        assert_eq!(history[0].quantity_after, 14);
    }

    #[tokio::test]
    async fn test_low_stock_boundary() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        for (name, qty, min) in [("At", 5, 5), ("Below", 1, 5), ("Above", 6, 5), ("Empty", 0, 0)] {
            inventory
                .create_item(&alice, &practice.id, NewItem::new(name, qty, min))
                .await
                .unwrap();
        }
        inventory
            .create_item(&alice, &practice.id, NewItem::new("Untracked", 3, 0))
            .await
            .unwrap();

        let names: Vec<String> = inventory
            .low_stock_items(&alice, &practice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["At", "Below", "Empty"]);
    }

    #[tokio::test]
    async fn test_list_items_filter() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Nitrile gloves S", 10, 2).with_category("PPE"),
            )
            .await
            .unwrap();
        inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Nitrile gloves M", 10, 2).with_category("PPE"),
            )
            .await
            .unwrap();
        inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Lidocaine", 10, 2).with_category("Anaesthetic"),
            )
            .await
            .unwrap();

        let filter = ItemFilter {
            category: Some("ppe".into()),
            search: Some("GLOVES".into()),
            ..ItemFilter::default()
        };
        let found = inventory
            .list_items(&alice, &practice.id, &filter)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Nitrile gloves M");
    }

    #[tokio::test]
    async fn test_barcode_lookup_chain() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let provider: Arc<dyn BarcodeProvider> = Arc::new(StaticProvider);
        let inventory = inventory.with_barcode_lookup(BarcodeLookup::new(vec![provider]));

        let stocked = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Etchant", 3, 1).with_barcode("96385074"),
            )
            .await
            .unwrap();

        assert_eq!(
            inventory
                .lookup_barcode(&alice, &practice.id, "9638 5074")
                .await
                .unwrap(),
            BarcodeMatch::InInventory(stocked)
        );
        assert!(matches!(
            inventory
                .lookup_barcode(&alice, &practice.id, "4006381333931")
                .await
                .unwrap(),
            BarcodeMatch::External(p) if p.name == "Composite syringe"
        ));
        assert_eq!(
            inventory
                .lookup_barcode(&alice, &practice.id, "10614141000415")
                .await
                .unwrap(),
            BarcodeMatch::NotFound
        );
        assert!(matches!(
            inventory.lookup_barcode(&alice, &practice.id, "12345").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_stocked_non_gtin_barcode_is_found() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let provider: Arc<dyn BarcodeProvider> = Arc::new(StaticProvider);
        let inventory = inventory.with_barcode_lookup(BarcodeLookup::new(vec![provider]));

        let stocked = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Supplier sundries", 2, 1).with_barcode("A123BC4567"),
            )
            .await
            .unwrap();

        assert_eq!(
            inventory
                .lookup_barcode(&alice, &practice.id, "A123-BC4567")
                .await
                .unwrap(),
            BarcodeMatch::InInventory(stocked)
        );
        assert!(matches!(
            inventory.lookup_barcode(&alice, &practice.id, "Z999").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            inventory.lookup_barcode(&alice, &practice.id, "  ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_edits_do_not_lose_concurrent_stock_changes() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let inventory = Arc::new(inventory);
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Gauze", 40, 5))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for round in 0..10 {
            let edit = {
                let inventory = Arc::clone(&inventory);
                let alice = alice.clone();
                let item_id = item.id.clone();
                tokio::spawn(async move {
                    let patch = ItemPatch {
                        notes: Some(format!("round {round}")),
                        ..ItemPatch::default()
                    };
                    inventory.update_item(&alice, &item_id, patch).await.map(|_| ())
                })
            };
            let usage = {
                let inventory = Arc::clone(&inventory);
                let alice = alice.clone();
                let item_id = item.id.clone();
                tokio::spawn(async move {
                    inventory
                        .adjust_quantity(&alice, &item_id, -1, MovementKind::Usage, None)
                        .await
                        .map(|_| ())
                })
            };
            handles.push(edit);
            handles.push(usage);
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let item = inventory.get_item(&alice, &item.id).await.unwrap();
        assert_eq!(item.quantity, 30);
        assert!(item.notes.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_image_replacement_keeps_concurrent_stock_changes() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let inventory = Arc::new(inventory);
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Mirrors", 20, 2))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for round in 0u8..5 {
            let inventory_a = Arc::clone(&inventory);
            let inventory_b = Arc::clone(&inventory);
            let (alice_a, alice_b) = (alice.clone(), alice.clone());
            let (id_a, id_b) = (item.id.clone(), item.id.clone());
            handles.push(tokio::spawn(async move {
                inventory_a
                    .attach_image(&alice_a, &id_a, vec![round, 1, 2])
                    .await
                    .map(|_| ())
            }));
            handles.push(tokio::spawn(async move {
                inventory_b
                    .adjust_quantity(&alice_b, &id_b, 2, MovementKind::Restock, None)
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let item = inventory.get_item(&alice, &item.id).await.unwrap();
        assert_eq!(item.quantity, 30);
        assert!(inventory.item_image(&alice, &item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_and_delete_item() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Suction tips", 50, 10))
            .await
            .unwrap();

        let patch = ItemPatch {
            name: Some("Saliva ejectors".into()),
            min_stock_level: Some(60),
            ..ItemPatch::default()
        };
        let updated = inventory.update_item(&alice, &item.id, patch).await.unwrap();
        assert_eq!(updated.name, "Saliva ejectors");
        assert!(updated.is_low_stock());

        inventory.delete_item(&alice, &item.id).await.unwrap();
        assert!(inventory
            .get_item(&alice, &item.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_images() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let item = inventory
            .create_item(&alice, &practice.id, NewItem::new("Impression trays", 4, 1))
            .await
            .unwrap();
        assert!(inventory.item_image(&alice, &item.id).await.unwrap().is_none());

        let item = inventory
            .attach_image(&alice, &item.id, &b"first"[..])
            .await
            .unwrap();
        let first = item.image.clone().unwrap();

        let item = inventory
            .attach_image(&alice, &item.id, &b"second"[..])
            .await
            .unwrap();
        assert_eq!(
            &inventory.item_image(&alice, &item.id).await.unwrap().unwrap()[..],
            b"second"
        );
        assert!(!inventory.attachments.has(&first));
    }
}
