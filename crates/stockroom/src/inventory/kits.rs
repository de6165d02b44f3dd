//! Treatment kits: named bundles of items used together

use chrono::Utc;
use tracing::{info, warn};

use super::Inventory;
use crate::error::{Error, Result};
use crate::model::{
    new_id, InventoryItem, Kit, KitComponent, KitPatch, KitShortfall, MovementKind, NewKit,
    OwnerRef,
};
use crate::ownership::Principal;

impl Inventory {
    /// Create a kit; every component must be an item of the same practice
    pub async fn create_kit(
        &self,
        principal: &Principal,
        practice_id: &str,
        new: NewKit,
    ) -> Result<Kit> {
        let _guard = self.mutation_lock.lock().await;
        let practice = self.scope(principal, practice_id).await?;
        let kit = new.into_kit(new_id(), practice.id)?;
        self.ensure_components_in(practice_id, &kit.components).await?;

        self.kits.insert(&kit).await?;
        info!(kit_id = %kit.id, practice_id, components = kit.components.len(), "Kit created");
        Ok(kit)
    }

    /// Get a kit
    pub async fn get_kit(&self, principal: &Principal, kit_id: &str) -> Result<Kit> {
        self.load_owned(&self.kits, principal, kit_id).await
    }

    /// List a practice's kits, by name
    pub async fn list_kits(&self, principal: &Principal, practice_id: &str) -> Result<Vec<Kit>> {
        self.scope(principal, practice_id).await?;
        let mut kits = self
            .kits
            .list_owned_by(OwnerRef::Practice(practice_id))
            .await?;
        kits.sort_by_key(|k| k.name.to_lowercase());
        Ok(kits)
    }

    /// Edit a kit; a new component list replaces the old one
    pub async fn update_kit(
        &self,
        principal: &Principal,
        kit_id: &str,
        patch: KitPatch,
    ) -> Result<Kit> {
        let _guard = self.mutation_lock.lock().await;
        let mut kit = self.load_owned(&self.kits, principal, kit_id).await?;
        patch.apply(&mut kit)?;
        self.ensure_components_in(&kit.practice_id, &kit.components)
            .await?;

        kit.updated_at = Utc::now();
        self.kits.update(&kit).await?;
        Ok(kit)
    }

    /// Delete a kit; its items are untouched
    pub async fn delete_kit(&self, principal: &Principal, kit_id: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        self.load_owned(&self.kits, principal, kit_id).await?;
        self.kits.remove(kit_id).await?;
        info!(kit_id, "Kit deleted");
        Ok(())
    }

    /// Components that cannot be supplied for `count` uses of the kit.
    ///
    /// An empty result means the kit can be used `count` times.
    pub async fn kit_availability(
        &self,
        principal: &Principal,
        kit_id: &str,
        count: u32,
    ) -> Result<Vec<KitShortfall>> {
        let kit = self.load_owned(&self.kits, principal, kit_id).await?;
        let (_, shortfalls) = self.plan_kit_use(&kit, count).await?;
        Ok(shortfalls)
    }

    /// Take the components of `count` kits out of stock.
    ///
    /// Either every component is deducted or none is. Each deduction is
    /// recorded as a kit-usage movement.
    pub async fn use_kit(
        &self,
        principal: &Principal,
        kit_id: &str,
        count: u32,
    ) -> Result<Vec<InventoryItem>> {
        let _guard = self.mutation_lock.lock().await;
        let kit = self.load_owned(&self.kits, principal, kit_id).await?;

        let (plan, shortfalls) = self.plan_kit_use(&kit, count).await?;
        if let Some(short) = shortfalls.first() {
            return Err(Error::insufficient_stock(
                short.item_name.clone(),
                short.required,
                short.available,
            ));
        }

        let mut done: Vec<(InventoryItem, u32)> = Vec::with_capacity(plan.len());
        for (mut item, required) in plan {
            if let Err(e) = self.write_quantity(&mut item, -i64::from(required)).await {
                self.restore_kit_items(&done).await;
                return Err(e);
            }
            done.push((item, required));
        }

        let note = Some(format!("kit {} x{count}", kit.name));
        for (item, required) in &done {
            self.record_movement(
                principal,
                item,
                MovementKind::KitUsage,
                -i64::from(*required),
                note.clone(),
                None,
            )
            .await;
        }

        info!(kit_id, count, items = done.len(), "Kit used");
        Ok(done.into_iter().map(|(item, _)| item).collect())
    }

    /// Load the component items and work out what `count` uses need
    async fn plan_kit_use(
        &self,
        kit: &Kit,
        count: u32,
    ) -> Result<(Vec<(InventoryItem, u32)>, Vec<KitShortfall>)> {
        if count == 0 {
            return Err(Error::validation("kit count must be at least 1"));
        }
        if kit.components.is_empty() {
            return Err(Error::validation(format!("kit {} has no components", kit.name)));
        }

        let mut plan = Vec::with_capacity(kit.components.len());
        let mut shortfalls = Vec::new();
        for component in &kit.components {
            let required = component.quantity.checked_mul(count).ok_or_else(|| {
                Error::validation(format!("kit count {count} is too large"))
            })?;
            let item = self.items.get(&component.item_id).await?;
            if item.practice_id != kit.practice_id {
                return Err(Error::validation(format!(
                    "component {} is not part of the kit's practice",
                    item.id
                )));
            }
            if item.quantity < required {
                shortfalls.push(KitShortfall {
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    required,
                    available: item.quantity,
                });
            }
            plan.push((item, required));
        }
        Ok((plan, shortfalls))
    }

    /// Put back deductions made before a failed write
    async fn restore_kit_items(&self, done: &[(InventoryItem, u32)]) {
        for (item, required) in done {
            let mut item = item.clone();
            if let Err(e) = self.write_quantity(&mut item, i64::from(*required)).await {
                warn!(item_id = %item.id, required, "Failed to restore kit component: {e}");
            }
        }
    }

    async fn ensure_components_in(
        &self,
        practice_id: &str,
        components: &[KitComponent],
    ) -> Result<()> {
        for component in components {
            let belongs = matches!(
                self.items.find(&component.item_id).await,
                Ok(Some(item)) if item.practice_id == practice_id
            );
            if !belongs {
                return Err(Error::validation(format!(
                    "item {} is not part of practice {practice_id}",
                    component.item_id
                )));
            }
        }
        Ok(())
    }
}
