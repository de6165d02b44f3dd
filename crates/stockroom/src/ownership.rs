//! Ownership checks for stored records
//!
//! Every record carries an ownership field. Practices carry the owning
//! `user_id` (plus an optional member list); everything else carries the
//! `practice_id` of the practice it belongs to. A principal may touch a
//! practice-scoped record only if it has access to the owning practice.
//!
//! [`verify_ownership`] never fails: a read error, a missing record, a record
//! without an ownership field and a mismatch all come back as `false`.
//! [`ensure_ownership`] turns a denial into [`Error::Unauthorized`].

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{new_id, required_name, NewPractice, OwnerRef, Practice, Record};
use crate::store::Store;

/// The authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Account identifier issued by the authentication provider
    pub user_id: String,
}

impl Principal {
    /// Create a principal for a user id
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Account identifier
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// How much a principal may do with a practice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    /// Listed in the practice's members: may read and change its stock
    Member,
    /// Owner of the practice: may also rename, delete and manage members
    Owner,
}

/// Check whether `principal` owns the record `{collection}/{id}`.
///
/// Any failure to read or interpret the record is a denial.
pub async fn verify_ownership(
    store: &Store,
    collection: &str,
    id: &str,
    principal: &Principal,
) -> bool {
    match record_access(store, collection, id, principal).await {
        Ok(access) => {
            debug!(collection, id, user_id = %principal.user_id, ?access, "Ownership verified");
            true
        }
        Err(e) => {
            warn!(collection, id, user_id = %principal.user_id, "Ownership denied: {e}");
            false
        }
    }
}

/// Like [`verify_ownership`], but returns [`Error::Unauthorized`] on denial
pub async fn ensure_ownership(
    store: &Store,
    collection: &str,
    id: &str,
    principal: &Principal,
) -> Result<()> {
    if verify_ownership(store, collection, id, principal).await {
        Ok(())
    } else {
        Err(Error::unauthorized(format!(
            "{} may not access {collection}/{id}",
            principal.user_id
        )))
    }
}

/// Check an already loaded record against `principal`
pub async fn verify_record<T: Record>(store: &Store, record: &T, principal: &Principal) -> bool {
    match owner_access(store, record.owner(), principal).await {
        Ok(_) => true,
        Err(e) => {
            warn!(
                collection = T::COLLECTION,
                id = record.id(),
                user_id = %principal.user_id,
                "Ownership denied: {e}"
            );
            false
        }
    }
}

/// Load a practice and confirm the principal can work with its stock.
///
/// New practice-scoped records are stamped with the returned practice's id.
pub async fn practice_scope(
    store: &Store,
    practice_id: &str,
    principal: &Principal,
) -> Result<Practice> {
    let (practice, _) = practice_access(store, practice_id, principal).await?;
    Ok(practice)
}

/// Load a practice and confirm the principal is its owner
pub async fn ensure_practice_owner(
    store: &Store,
    practice_id: &str,
    principal: &Principal,
) -> Result<Practice> {
    match practice_access(store, practice_id, principal).await? {
        (practice, Access::Owner) => Ok(practice),
        (_, Access::Member) => {
            warn!(practice_id, user_id = %principal.user_id, "Owner-only operation denied to member");
            Err(Error::unauthorized(format!(
                "only the owner may change practice {practice_id}"
            )))
        }
    }
}

/// Build a new practice stamped with the principal as owner
pub fn stamp_practice(new: NewPractice, principal: &Principal) -> Result<Practice> {
    if principal.user_id.trim().is_empty() {
        return Err(Error::unauthorized("anonymous principal cannot own a practice"));
    }

    let now = Utc::now();
    Ok(Practice {
        id: new_id(),
        name: required_name("practice name", &new.name)?,
        address: crate::model::non_blank(new.address),
        phone: crate::model::non_blank(new.phone),
        user_id: principal.user_id.clone(),
        members: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

/// Resolve the access a principal has to a stored record
async fn record_access(
    store: &Store,
    collection: &str,
    id: &str,
    principal: &Principal,
) -> Result<Access> {
    let name = format!("{collection}/{id}");
    let doc = store
        .load_doc(&name)
        .await?
        .ok_or_else(|| Error::not_found(name.clone()))?;
    let record: JsonValue = doc.read_record()?;

    let owner = if let Some(user_id) = record.get("user_id").and_then(JsonValue::as_str) {
        OwnerRef::User(user_id)
    } else if let Some(practice_id) = record.get("practice_id").and_then(JsonValue::as_str) {
        OwnerRef::Practice(practice_id)
    } else {
        return Err(Error::unauthorized(format!("{name} has no ownership field")));
    };

    if let OwnerRef::User(user_id) = owner {
        // Practices list their members next to the owner
        let is_member = record
            .get("members")
            .and_then(JsonValue::as_array)
            .is_some_and(|members| {
                members
                    .iter()
                    .any(|m| m.as_str() == Some(principal.user_id.as_str()))
            });
        if is_member && user_id != principal.user_id {
            return Ok(Access::Member);
        }
    }

    owner_access(store, Some(owner), principal).await
}

async fn owner_access(
    store: &Store,
    owner: Option<OwnerRef<'_>>,
    principal: &Principal,
) -> Result<Access> {
    match owner {
        Some(OwnerRef::User(user_id)) if !user_id.is_empty() && user_id == principal.user_id => {
            Ok(Access::Owner)
        }
        Some(OwnerRef::User(_)) => Err(Error::unauthorized("owner mismatch")),
        Some(OwnerRef::Practice(practice_id)) => practice_access(store, practice_id, principal)
            .await
            .map(|(_, access)| access),
        None => Err(Error::unauthorized("record has no ownership field")),
    }
}

async fn practice_access(
    store: &Store,
    practice_id: &str,
    principal: &Principal,
) -> Result<(Practice, Access)> {
    let name = Practice::doc_name(practice_id);
    let doc = store
        .load_doc(&name)
        .await
        .map_err(|_| Error::unauthorized(format!("cannot read practice {practice_id}")))?
        .ok_or_else(|| Error::unauthorized(format!("practice {practice_id} does not exist")))?;
    let practice: Practice = doc.read_record()?;

    if practice.is_owner(&principal.user_id) {
        Ok((practice, Access::Owner))
    } else if practice.has_access(&principal.user_id) {
        Ok((practice, Access::Member))
    } else {
        Err(Error::unauthorized(format!(
            "{} has no access to practice {practice_id}",
            principal.user_id
        )))
    }
}
