use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, OwnerRef, Record};

/// A dental practice: the tenant that owns locations, items and kits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practice {
    /// Record id
    pub id: String,
    /// Display name
    pub name: String,
    /// Postal address
    #[serde(default)]
    pub address: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Owning user account
    pub user_id: String,
    /// Additional user accounts with access to the practice's stock
    #[serde(default)]
    pub members: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Practice {
    /// Whether `user_id` owns this practice
    #[must_use]
    pub fn is_owner(&self, user_id: &str) -> bool {
        !self.user_id.is_empty() && self.user_id == user_id
    }

    /// Whether `user_id` owns the practice or is one of its members
    #[must_use]
    pub fn has_access(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.members.iter().any(|m| m == user_id)
    }
}

impl Record for Practice {
    const COLLECTION: &'static str = "practices";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Option<OwnerRef<'_>> {
        (!self.user_id.is_empty()).then_some(OwnerRef::User(&self.user_id))
    }
}

/// Input for creating a practice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPractice {
    /// Display name
    pub name: String,
    /// Postal address
    #[serde(default)]
    pub address: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
}

impl NewPractice {
    /// Practice input with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a practice; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PracticePatch {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New address (empty string clears it)
    #[serde(default)]
    pub address: Option<String>,
    /// New phone number (empty string clears it)
    #[serde(default)]
    pub phone: Option<String>,
}

impl PracticePatch {
    pub(crate) fn apply(self, practice: &mut Practice) -> crate::Result<()> {
        if let Some(name) = self.name {
            practice.name = super::required_name("practice name", &name)?;
        }
        if self.address.is_some() {
            practice.address = non_blank(self.address);
        }
        if self.phone.is_some() {
            practice.phone = non_blank(self.phone);
        }
        Ok(())
    }
}
