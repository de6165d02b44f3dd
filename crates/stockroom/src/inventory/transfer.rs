//! Moving stock between practices and locations
//!
//! A transfer takes quantity out of one item and adds it to a matching item
//! of the destination practice. The destination is, in order of preference:
//!
//! 1. an item with the same barcode
//! 2. an item with the same name, ignoring case
//! 3. a new copy of the source item, starting at zero
//!
//! When a destination location is given only items at that location match.
//! The source never matches itself, and moving stock to the place it
//! already is is rejected.
//!
//! Both quantity writes happen under the service mutation lock. If the
//! destination write fails the source is restored. The two movement records
//! that describe the transfer share a `transfer_id` and are best-effort.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Inventory;
use crate::error::{Error, Result};
use crate::model::{new_id, InventoryItem, MovementKind, OwnerRef, Record};
use crate::ownership::Principal;

/// A request to move stock from one item to another practice or location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Item the stock is taken from
    pub source_item_id: String,
    /// Practice receiving the stock (may be the source's own practice)
    pub destination_practice_id: String,
    /// Location receiving the stock
    #[serde(default)]
    pub destination_location_id: Option<String>,
    /// Units to move
    pub quantity: u32,
    /// Free-form note stored on both movements
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of a completed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    /// Shared id of the two movement records
    pub transfer_id: String,
    /// Source item after the transfer
    pub source: InventoryItem,
    /// Destination item after the transfer
    pub destination: InventoryItem,
    /// Whether the destination item was created by this transfer
    pub created_destination: bool,
}

impl Inventory {
    /// Move stock from one item to a matching item in the destination.
    ///
    /// The principal needs access to both the source item's practice and the
    /// destination practice.
    pub async fn transfer_stock(
        &self,
        principal: &Principal,
        request: TransferRequest,
    ) -> Result<TransferOutcome> {
        if request.quantity == 0 {
            return Err(Error::validation("transfer quantity must be at least 1"));
        }

        let _guard = self.mutation_lock.lock().await;

        let mut source = self
            .load_owned(&self.items, principal, &request.source_item_id)
            .await?;
        let destination_practice = self
            .scope(principal, &request.destination_practice_id)
            .await?;
        let location_id = crate::model::non_blank(request.destination_location_id.clone());
        if let Some(location_id) = &location_id {
            self.ensure_location_in(&destination_practice.id, location_id)
                .await?;
        }

        if source.quantity < request.quantity {
            return Err(Error::insufficient_stock(
                source.name.clone(),
                request.quantity,
                source.quantity,
            ));
        }

        let (mut destination, created_destination) = match self
            .match_destination(&source, &destination_practice.id, location_id.as_deref())
            .await?
        {
            Some(existing) => (existing, false),
            None if destination_practice.id == source.practice_id
                && location_id == source.location_id =>
            {
                return Err(Error::validation(format!(
                    "{} is already at the destination",
                    source.name
                )));
            }
            None => {
                let copy = copy_for_destination(&source, &destination_practice.id, location_id);
                self.items.insert(&copy).await?;
                (copy, true)
            }
        };

        let delta = i64::from(request.quantity);
        if let Err(e) = self.write_quantity(&mut source, -delta).await {
            self.discard_copy(&destination, created_destination).await;
            return Err(e);
        }
        if let Err(e) = self.write_quantity(&mut destination, delta).await {
            warn!(
                source_id = %source.id,
                destination_id = %destination.id,
                "Destination write failed, restoring source: {e}"
            );
            if let Err(restore) = self.write_quantity(&mut source, delta).await {
                warn!(source_id = %source.id, "Failed to restore transfer source: {restore}");
            }
            self.discard_copy(&destination, created_destination).await;
            return Err(e);
        }

        let transfer_id = new_id();
        let note = request.note.clone();
        self.record_movement(
            principal,
            &source,
            MovementKind::TransferOut,
            -delta,
            note.clone(),
            Some(&transfer_id),
        )
        .await;
        self.record_movement(
            principal,
            &destination,
            MovementKind::TransferIn,
            delta,
            note,
            Some(&transfer_id),
        )
        .await;

        info!(
            transfer_id = %transfer_id,
            source_id = %source.id,
            destination_id = %destination.id,
            quantity = request.quantity,
            created_destination,
            "Stock transferred"
        );

        Ok(TransferOutcome {
            transfer_id,
            source,
            destination,
            created_destination,
        })
    }

    /// Find the item in the destination that corresponds to `source`; never
    /// `source` itself
    async fn match_destination(
        &self,
        source: &InventoryItem,
        practice_id: &str,
        location_id: Option<&str>,
    ) -> Result<Option<InventoryItem>> {
        let owner = OwnerRef::Practice(practice_id);
        let mut candidates = self
            .items
            .list_where(|item| {
                item.id != source.id
                    && item.owner() == Some(owner)
                    && location_id.is_none_or(|loc| item.location_id.as_deref() == Some(loc))
            })
            .await?;
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        if let Some(code) = source.barcode.as_deref() {
            if let Some(pos) = candidates.iter().position(|item| item.has_barcode(code)) {
                return Ok(Some(candidates.swap_remove(pos)));
            }
        }

        let by_name = candidates
            .into_iter()
            .find(|item| item.name.to_lowercase() == source.name.to_lowercase());
        Ok(by_name)
    }

    /// Remove a destination item created for a transfer that did not happen
    async fn discard_copy(&self, destination: &InventoryItem, created: bool) {
        if !created {
            return;
        }
        if let Err(e) = self.items.remove(&destination.id).await {
            warn!(item_id = %destination.id, "Failed to remove unused transfer copy: {e}");
        }
    }
}

/// A zero-quantity copy of `source` in the destination practice
fn copy_for_destination(
    source: &InventoryItem,
    practice_id: &str,
    location_id: Option<String>,
) -> InventoryItem {
    let now = Utc::now();
    InventoryItem {
        id: new_id(),
        practice_id: practice_id.to_string(),
        location_id,
        quantity: 0,
        created_at: now,
        updated_at: now,
        ..source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::model::{ItemFilter, MovementFilter, NewItem, NewLocation, NewPractice};

    fn request(source: &InventoryItem, practice_id: &str, quantity: u32) -> TransferRequest {
        TransferRequest {
            source_item_id: source.id.clone(),
            destination_practice_id: practice_id.to_string(),
            destination_location_id: None,
            quantity,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_transfer_creates_destination_copy() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let branch = inventory
            .create_practice(&alice, NewPractice::named("Branch"))
            .await
            .unwrap();
        let source = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Composite A2", 10, 2).with_barcode("4006381333931"),
            )
            .await
            .unwrap();

        let outcome = inventory
            .transfer_stock(&alice, request(&source, &branch.id, 4))
            .await
            .unwrap();

        assert!(outcome.created_destination);
        assert_eq!(outcome.source.quantity, 6);
        assert_eq!(outcome.destination.quantity, 4);
        assert_eq!(outcome.destination.practice_id, branch.id);
        assert_eq!(outcome.destination.barcode.as_deref(), Some("4006381333931"));
        assert_ne!(outcome.destination.id, source.id);

        let out = inventory
            .list_movements(
                &alice,
                &practice.id,
                &MovementFilter {
                    kind: Some(MovementKind::TransferOut),
                    ..MovementFilter::default()
                },
            )
            .await
            .unwrap();
        let incoming = inventory
            .list_movements(
                &alice,
                &branch.id,
                &MovementFilter {
                    kind: Some(MovementKind::TransferIn),
                    ..MovementFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(incoming.len(), 1);
        assert_eq!(out[0].transfer_id.as_deref(), Some(outcome.transfer_id.as_str()));
        assert_eq!(out[0].transfer_id, incoming[0].transfer_id);
        assert_eq!(out[0].delta, -4);
        assert_eq!(incoming[0].delta, 4);
    }

    #[tokio::test]
    async fn test_transfer_matches_existing_by_barcode_then_name() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let branch = inventory
            .create_practice(&alice, NewPractice::named("Branch"))
            .await
            .unwrap();

        let source = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Gloves", 10, 2).with_barcode("96385074"),
            )
            .await
            .unwrap();
        let by_barcode = inventory
            .create_item(
                &alice,
                &branch.id,
                NewItem::new("Exam gloves", 1, 2).with_barcode("96385074"),
            )
            .await
            .unwrap();
        inventory
            .create_item(&alice, &branch.id, NewItem::new("gloves", 1, 2))
            .await
            .unwrap();

        let outcome = inventory
            .transfer_stock(&alice, request(&source, &branch.id, 3))
            .await
            .unwrap();
        assert!(!outcome.created_destination);
        assert_eq!(outcome.destination.id, by_barcode.id);
        assert_eq!(outcome.destination.quantity, 4);

        let plain = inventory
            .create_item(&alice, &practice.id, NewItem::new("Bibs", 5, 1))
            .await
            .unwrap();
        let named = inventory
            .create_item(&alice, &branch.id, NewItem::new("BIBS", 0, 1))
            .await
            .unwrap();
        let outcome = inventory
            .transfer_stock(&alice, request(&plain, &branch.id, 5))
            .await
            .unwrap();
        assert_eq!(outcome.destination.id, named.id);
        assert_eq!(outcome.source.quantity, 0);
    }

    #[tokio::test]
    async fn test_transfer_between_locations_of_one_practice() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let surgery = inventory
            .create_location(
                &alice,
                &practice.id,
                NewLocation {
                    name: "Surgery 1".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let source = inventory
            .create_item(&alice, &practice.id, NewItem::new("Gauze", 20, 5))
            .await
            .unwrap();

        let mut req = request(&source, &practice.id, 5);
        req.destination_location_id = Some(surgery.id.clone());
        let outcome = inventory.transfer_stock(&alice, req).await.unwrap();
        assert!(outcome.created_destination);
        assert_eq!(outcome.destination.location_id.as_deref(), Some(surgery.id.as_str()));

        let all = inventory
            .list_items(&alice, &practice.id, &ItemFilter::default())
            .await
            .unwrap();
        assert_eq!(all.iter().map(|i| i.quantity).sum::<u32>(), 20);
    }

    #[tokio::test]
    async fn test_transfer_to_own_place_rejected() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let source = inventory
            .create_item(&alice, &practice.id, NewItem::new("Floss", 5, 1))
            .await
            .unwrap();

        let err = inventory
            .transfer_stock(&alice, request(&source, &practice.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(inventory.get_item(&alice, &source.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_transfer_merges_duplicate_in_same_practice() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let source = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("Prophy cups", 12, 2).with_barcode("96385074"),
            )
            .await
            .unwrap();
        let duplicate = inventory
            .create_item(
                &alice,
                &practice.id,
                NewItem::new("prophy cups", 1, 2).with_barcode("96385074"),
            )
            .await
            .unwrap();

        let outcome = inventory
            .transfer_stock(&alice, request(&source, &practice.id, 5))
            .await
            .unwrap();
        assert!(!outcome.created_destination);
        assert_eq!(outcome.destination.id, duplicate.id);
        assert_eq!(outcome.source.quantity, 7);
        assert_eq!(outcome.destination.quantity, 6);
    }

    #[tokio::test]
    async fn test_failed_destination_write_restores_source() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let branch = inventory
            .create_practice(&alice, NewPractice::named("Branch"))
            .await
            .unwrap();
        let source = inventory
            .create_item(&alice, &practice.id, NewItem::new("Alginate", 8, 2))
            .await
            .unwrap();
        let destination = inventory
            .create_item(&alice, &branch.id, NewItem::new("Alginate", 1, 2))
            .await
            .unwrap();
        let blocked = block_item_writes(&inventory, &destination.id);

        let err = inventory
            .transfer_stock(&alice, request(&source, &branch.id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(inventory.get_item(&alice, &source.id).await.unwrap().quantity, 8);
        assert_eq!(
            inventory.get_item(&alice, &destination.id).await.unwrap().quantity,
            1
        );
        let out = MovementFilter {
            kind: Some(MovementKind::TransferOut),
            ..MovementFilter::default()
        };
        assert!(inventory
            .list_movements(&alice, &practice.id, &out)
            .await
            .unwrap()
            .is_empty());

        std::fs::remove_dir(blocked).unwrap();
        let outcome = inventory
            .transfer_stock(&alice, request(&source, &branch.id, 3))
            .await
            .unwrap();
        assert_eq!(outcome.destination.id, destination.id);
        assert_eq!(outcome.destination.quantity, 4);
    }

    #[tokio::test]
    async fn test_failed_source_write_leaves_no_copy() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let branch = inventory
            .create_practice(&alice, NewPractice::named("Branch"))
            .await
            .unwrap();
        let source = inventory
            .create_item(&alice, &practice.id, NewItem::new("Wedges", 30, 5))
            .await
            .unwrap();
        block_item_writes(&inventory, &source.id);

        assert!(matches!(
            inventory
                .transfer_stock(&alice, request(&source, &branch.id, 10))
                .await,
            Err(Error::Storage(_))
        ));
        assert_eq!(inventory.get_item(&alice, &source.id).await.unwrap().quantity, 30);
        assert!(inventory
            .list_items(&alice, &branch.id, &ItemFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_transfer_validation_and_authorization() {
        let (_dir, inventory, alice, practice) = with_practice().await;
        let bob = Principal::new("bob");
        let bobs = inventory
            .create_practice(&bob, NewPractice::named("Bob's Dental"))
            .await
            .unwrap();
        let source = inventory
            .create_item(&alice, &practice.id, NewItem::new("Burs", 3, 1))
            .await
            .unwrap();

        assert!(matches!(
            inventory
                .transfer_stock(&alice, request(&source, &bobs.id, 1))
                .await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            inventory
                .transfer_stock(&bob, request(&source, &bobs.id, 1))
                .await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            inventory
                .transfer_stock(&alice, request(&source, &practice.id, 0))
                .await,
            Err(Error::Validation(_))
        ));

        let branch = inventory
            .create_practice(&alice, NewPractice::named("Branch"))
            .await
            .unwrap();
        assert!(matches!(
            inventory
                .transfer_stock(&alice, request(&source, &branch.id, 4))
                .await,
            Err(Error::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
        assert!(inventory
            .list_items(&alice, &branch.id, &ItemFilter::default())
            .await
            .unwrap()
            .is_empty());
    }
}
