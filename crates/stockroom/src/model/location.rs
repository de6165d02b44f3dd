use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, OwnerRef, Record};

/// A storage location inside a practice (surgery, cupboard, store room)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Record id
    pub id: String,
    /// Owning practice
    pub practice_id: String,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Record for Location {
    const COLLECTION: &'static str = "locations";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.practice_id.is_empty()).then_some(OwnerRef::Practice(&self.practice_id))
    }
}

/// Input for creating a location
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLocation {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a location
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationPatch {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New description (empty string clears it)
    #[serde(default)]
    pub description: Option<String>,
}

impl LocationPatch {
    pub(crate) fn apply(self, location: &mut Location) -> crate::Result<()> {
        if let Some(name) = self.name {
            location.name = super::required_name("location name", &name)?;
        }
        if self.description.is_some() {
            location.description = non_blank(self.description);
        }
        Ok(())
    }
}
