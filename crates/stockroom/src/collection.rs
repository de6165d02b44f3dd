//! Typed access to one collection of records

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{OwnerRef, Record};
use crate::store::Store;

/// Typed view over the documents of one [`Record`] collection.
///
/// Collections do no ownership checks of their own; callers go through
/// [`crate::ownership`] first.
pub struct Collection<T> {
    store: Arc<Store>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    /// Create a collection view over a store
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Load a record, failing with [`Error::NotFound`] if it is absent
    pub async fn get(&self, id: &str) -> Result<T> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{}/{id}", T::COLLECTION)))
    }

    /// Load a record, or `None` if it is absent
    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        let name = doc_name::<T>(id)?;
        match self.store.load_doc(&name).await? {
            Some(doc) => doc.read_record().map(Some),
            None => Ok(None),
        }
    }

    /// Whether a record with this id exists
    pub fn contains(&self, id: &str) -> bool {
        doc_name::<T>(id).is_ok_and(|name| self.store.doc_exists(&name))
    }

    /// Store a new record; fails if the id is already taken
    pub async fn insert(&self, record: &T) -> Result<()> {
        let name = doc_name::<T>(record.id())?;
        let doc = self.store.create_doc(&name).await?;
        doc.write_record(record)?;
        self.store.save_doc_atomic(&doc).await?;
        debug!(name = %name, "Record inserted");
        Ok(())
    }

    /// Overwrite an existing record
    pub async fn update(&self, record: &T) -> Result<()> {
        let name = doc_name::<T>(record.id())?;
        let doc = self
            .store
            .load_doc(&name)
            .await?
            .ok_or_else(|| Error::not_found(name.clone()))?;
        doc.write_record(record)?;
        self.store.save_doc_atomic(&doc).await?;
        debug!(name = %name, "Record updated");
        Ok(())
    }

    /// Delete a record; returns whether it existed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let name = doc_name::<T>(id)?;
        self.store.delete_doc(&name).await
    }

    /// Load every record of the collection.
    ///
    /// Documents that cannot be decoded are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<T>> {
        self.list_where(|_| true).await
    }

    /// Load the records matching `pred`
    pub async fn list_where<F>(&self, mut pred: F) -> Result<Vec<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let prefix = format!("{}/", T::COLLECTION);
        let mut records = Vec::new();

        for name in self.store.list_docs(&prefix)? {
            let Some(doc) = self.store.load_doc(&name).await? else {
                continue;
            };
            match doc.read_record::<T>() {
                Ok(record) if pred(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(name = %name, "Skipping unreadable record: {e}"),
            }
        }

        Ok(records)
    }

    /// Load the records owned by `owner`
    pub async fn list_owned_by(&self, owner: OwnerRef<'_>) -> Result<Vec<T>> {
        self.list_where(|record| record.owner() == Some(owner)).await
    }
}

/// Document name for a record id, rejecting ids that are not a single path segment
fn doc_name<T: Record>(id: &str) -> Result<String> {
    if id.is_empty() || id.contains('/') {
        return Err(Error::validation(format!("invalid record id: {id:?}")));
    }
    Ok(T::doc_name(id))
}
