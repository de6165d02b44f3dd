//! Storage locations within a practice

use chrono::Utc;
use tracing::info;

use super::Inventory;
use crate::error::Result;
use crate::model::{new_id, required_name, Location, LocationPatch, NewLocation, OwnerRef};
use crate::ownership::Principal;

impl Inventory {
    /// Create a location in a practice
    pub async fn create_location(
        &self,
        principal: &Principal,
        practice_id: &str,
        new: NewLocation,
    ) -> Result<Location> {
        let _guard = self.mutation_lock.lock().await;
        let practice = self.scope(principal, practice_id).await?;
        let now = Utc::now();
        let location = Location {
            id: new_id(),
            practice_id: practice.id,
            name: required_name("location name", &new.name)?,
            description: crate::model::non_blank(new.description),
            created_at: now,
            updated_at: now,
        };

        self.locations.insert(&location).await?;
        info!(location_id = %location.id, practice_id, "Location created");
        Ok(location)
    }

    /// Get a location
    pub async fn get_location(&self, principal: &Principal, location_id: &str) -> Result<Location> {
        self.load_owned(&self.locations, principal, location_id).await
    }

    /// List a practice's locations, by name
    pub async fn list_locations(
        &self,
        principal: &Principal,
        practice_id: &str,
    ) -> Result<Vec<Location>> {
        self.scope(principal, practice_id).await?;
        let mut locations = self
            .locations
            .list_owned_by(OwnerRef::Practice(practice_id))
            .await?;
        locations.sort_by_key(|l| l.name.to_lowercase());
        Ok(locations)
    }

    /// Rename or describe a location
    pub async fn update_location(
        &self,
        principal: &Principal,
        location_id: &str,
        patch: LocationPatch,
    ) -> Result<Location> {
        let _guard = self.mutation_lock.lock().await;
        let mut location = self.load_owned(&self.locations, principal, location_id).await?;
        patch.apply(&mut location)?;
        location.updated_at = Utc::now();
        self.locations.update(&location).await?;
        Ok(location)
    }

    /// Delete a location; its items stay in the practice without a location
    pub async fn delete_location(&self, principal: &Principal, location_id: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let location = self.load_owned(&self.locations, principal, location_id).await?;

        let owner = OwnerRef::Practice(&location.practice_id);
        let mut unassigned = 0usize;
        for mut item in self.items.list_owned_by(owner).await? {
            if item.location_id.as_deref() == Some(location_id) {
                item.location_id = None;
                item.updated_at = Utc::now();
                self.items.update(&item).await?;
                unassigned += 1;
            }
        }

        self.locations.remove(location_id).await?;
        info!(location_id, unassigned, "Location deleted");
        Ok(())
    }
}
