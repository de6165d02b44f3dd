use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, OwnerRef, Record};
use crate::error::{Error, Result};

/// One item of a treatment kit and how many units a single use consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitComponent {
    /// Item consumed
    pub item_id: String,
    /// Units consumed per kit use
    pub quantity: u32,
}

/// A treatment kit: a named bundle of items used together in a procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kit {
    /// Record id
    pub id: String,
    /// Owning practice
    pub practice_id: String,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Items in the kit
    #[serde(default)]
    pub components: Vec<KitComponent>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Record for Kit {
    const COLLECTION: &'static str = "kits";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.practice_id.is_empty()).then_some(OwnerRef::Practice(&self.practice_id))
    }
}

/// Input for creating a kit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewKit {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Items in the kit
    #[serde(default)]
    pub components: Vec<KitComponent>,
}

impl NewKit {
    pub(crate) fn into_kit(self, id: String, practice_id: String) -> Result<Kit> {
        let now = Utc::now();
        Ok(Kit {
            id,
            practice_id,
            name: super::required_name("kit name", &self.name)?,
            description: non_blank(self.description),
            components: merge_components(self.components)?,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a kit; `components` replaces the whole list when set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KitPatch {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement component list
    #[serde(default)]
    pub components: Option<Vec<KitComponent>>,
}

impl KitPatch {
    pub(crate) fn apply(self, kit: &mut Kit) -> Result<()> {
        if let Some(name) = self.name {
            kit.name = super::required_name("kit name", &name)?;
        }
        if self.description.is_some() {
            kit.description = non_blank(self.description);
        }
        if let Some(components) = self.components {
            kit.components = merge_components(components)?;
        }
        Ok(())
    }
}

/// A component that cannot be supplied for the requested number of kit uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KitShortfall {
    /// Item id
    pub item_id: String,
    /// Item name
    pub item_name: String,
    /// Units needed
    pub required: u32,
    /// Units on hand
    pub available: u32,
}

/// Validate components and fold duplicate item ids into one entry
fn merge_components(components: Vec<KitComponent>) -> Result<Vec<KitComponent>> {
    let mut merged: Vec<KitComponent> = Vec::with_capacity(components.len());

    for component in components {
        if component.item_id.trim().is_empty() {
            return Err(Error::validation("kit component is missing an item id"));
        }
        if component.quantity == 0 {
            return Err(Error::validation(format!(
                "kit component {} must use at least one unit",
                component.item_id
            )));
        }
        match merged.iter_mut().find(|c| c.item_id == component.item_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(component.quantity)
                    .ok_or_else(|| Error::validation("kit component quantity overflows"))?;
            }
            None => merged.push(component),
        }
    }

    Ok(merged)
}
