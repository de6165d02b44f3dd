//! Document handle for reading and writing record data.
//!
//! Every record lives in its own Automerge document. A [`Document`] holds the
//! record's fields in the root map of that document: [`Document::write_record`]
//! replaces them and [`Document::read_record`] reads them back as a typed value.
//!
//! Arrays and objects are stored as nested Automerge lists and maps, so a
//! string such as a barcode `"0012345678905"` reads back as a string and not
//! as a number.
//!
//! # Example
//!
//! ```rust,no_run
//! use stockroom::store::Store;
//! use stockroom::Config;
//! use serde_json::json;
//!
//! # async fn example() -> stockroom::Result<()> {
//! let store = Store::new(&Config::default())?;
//! let doc = store.create_doc("notes/reorder").await?;
//!
//! doc.write_record(&json!({ "supplier": "Henry Schein", "boxes": 4 }))?;
//! store.save_doc_atomic(&doc).await?;
//!
//! let loaded: serde_json::Value = doc.read_record()?;
//! assert_eq!(loaded["boxes"], 4);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use automerge::{transaction::Transactable, AutoCommit, ObjId, ObjType, ReadDoc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// A handle to an Automerge-backed record document.
///
/// Changes stay in memory until
/// [`Store::save_doc_atomic()`](crate::store::Store::save_doc_atomic) is called.
/// Document operations use internal locking and can be called from multiple
/// async tasks concurrently.
pub struct Document {
    /// Document name/path
    name: String,
    /// Path on disk
    path: PathBuf,
    /// The Automerge document
    doc: RwLock<AutoCommit>,
}

impl Document {
    pub(crate) fn new(name: String, path: PathBuf, doc: AutoCommit) -> Self {
        Self {
            name,
            path,
            doc: RwLock::new(doc),
        }
    }

    /// Get the document name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the document path on disk
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Replace the root map with the fields of `record`.
    ///
    /// `record` must serialize to a JSON object. Root keys that are not
    /// fields of the record are removed.
    pub fn write_record<T: Serialize>(&self, record: &T) -> Result<()> {
        let json_value = serde_json::to_value(record)
            .map_err(|e| Error::document(format!("failed to serialize record: {e}")))?;
        let JsonValue::Object(fields) = json_value else {
            return Err(Error::document("record must serialize to an object"));
        };

        let mut doc = self.doc.write();

        let stale: Vec<String> = doc
            .keys(automerge::ROOT)
            .filter(|k| !fields.contains_key(k))
            .collect();
        for key in stale {
            doc.delete(automerge::ROOT, key.as_str())
                .map_err(|e| Error::document(format!("failed to delete stale key: {e}")))?;
        }

        for (key, value) in &fields {
            put_value(&mut doc, &automerge::ROOT, key, value)?;
        }

        Ok(())
    }

    /// Read the root map back as a typed record
    pub fn read_record<T: DeserializeOwned>(&self) -> Result<T> {
        let doc = self.doc.read();
        let json_value = read_map(&doc, &automerge::ROOT)?;
        serde_json::from_value(json_value)
            .map_err(|e| Error::document(format!("failed to decode {}: {e}", self.name)))
    }

    /// Serialize the whole document
    pub(crate) fn save_bytes(&self) -> Vec<u8> {
        self.doc.write().save()
    }
}

/// Write `value` under `key` in the map `obj`, nesting maps and lists
fn put_value(doc: &mut AutoCommit, obj: &ObjId, key: &str, value: &JsonValue) -> Result<()> {
    match value {
        JsonValue::Object(fields) => {
            let child = doc
                .put_object(obj, key, ObjType::Map)
                .map_err(|e| Error::document(format!("failed to create map {key}: {e}")))?;
            for (k, v) in fields {
                put_value(doc, &child, k, v)?;
            }
            Ok(())
        }
        JsonValue::Array(items) => {
            let child = doc
                .put_object(obj, key, ObjType::List)
                .map_err(|e| Error::document(format!("failed to create list {key}: {e}")))?;
            fill_list(doc, &child, items)
        }
        scalar => doc
            .put(obj, key, json_to_scalar(scalar)?)
            .map_err(|e| Error::document(format!("failed to put value: {e}"))),
    }
}

fn fill_list(doc: &mut AutoCommit, list: &ObjId, items: &[JsonValue]) -> Result<()> {
    for (index, item) in items.iter().enumerate() {
        match item {
            JsonValue::Object(fields) => {
                let child = doc
                    .insert_object(list, index, ObjType::Map)
                    .map_err(|e| Error::document(format!("failed to insert map: {e}")))?;
                for (k, v) in fields {
                    put_value(doc, &child, k, v)?;
                }
            }
            JsonValue::Array(nested) => {
                let child = doc
                    .insert_object(list, index, ObjType::List)
                    .map_err(|e| Error::document(format!("failed to insert list: {e}")))?;
                fill_list(doc, &child, nested)?;
            }
            scalar => {
                doc.insert(list, index, json_to_scalar(scalar)?)
                    .map_err(|e| Error::document(format!("failed to insert value: {e}")))?;
            }
        }
    }
    Ok(())
}

fn read_value(doc: &AutoCommit, value: &automerge::Value<'_>, id: &ObjId) -> Result<JsonValue> {
    match value {
        automerge::Value::Object(ObjType::Map | ObjType::Table) => read_map(doc, id),
        automerge::Value::Object(ObjType::List) => read_list(doc, id),
        automerge::Value::Object(ObjType::Text) => doc
            .text(id)
            .map(JsonValue::String)
            .map_err(|e| Error::document(format!("failed to read text: {e}"))),
        automerge::Value::Scalar(s) => scalar_to_json(s.as_ref()),
    }
}

fn read_map(doc: &AutoCommit, obj: &ObjId) -> Result<JsonValue> {
    let keys: Vec<String> = doc.keys(obj).collect();
    let mut fields = serde_json::Map::with_capacity(keys.len());

    for key in keys {
        let entry = doc
            .get(obj, key.as_str())
            .map_err(|e| Error::document(format!("failed to get {key}: {e}")))?;
        if let Some((value, id)) = entry {
            let json = read_value(doc, &value, &id)?;
            fields.insert(key, json);
        }
    }

    Ok(JsonValue::Object(fields))
}

fn read_list(doc: &AutoCommit, obj: &ObjId) -> Result<JsonValue> {
    let len = doc.length(obj);
    let mut items = Vec::with_capacity(len);

    for index in 0..len {
        let entry = doc
            .get(obj, index)
            .map_err(|e| Error::document(format!("failed to get list item {index}: {e}")))?;
        if let Some((value, id)) = entry {
            items.push(read_value(doc, &value, &id)?);
        }
    }

    Ok(JsonValue::Array(items))
}

/// Convert a JSON scalar to an Automerge scalar value
fn json_to_scalar(value: &JsonValue) -> Result<automerge::ScalarValue> {
    use automerge::ScalarValue;

    match value {
        JsonValue::Null => Ok(ScalarValue::Null),
        JsonValue::Bool(b) => Ok(ScalarValue::Boolean(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ScalarValue::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(ScalarValue::Uint(u))
            } else if let Some(f) = n.as_f64() {
                Ok(ScalarValue::F64(f))
            } else {
                Err(Error::document("unsupported number type"))
            }
        }
        JsonValue::String(s) => Ok(ScalarValue::Str(s.as_str().into())),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Err(Error::document("nested value passed where a scalar was expected"))
        }
    }
}

/// Convert an Automerge scalar to JSON
fn scalar_to_json(value: &automerge::ScalarValue) -> Result<JsonValue> {
    use automerge::ScalarValue;

    match value {
        ScalarValue::Null => Ok(JsonValue::Null),
        ScalarValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        ScalarValue::Int(i) => Ok(JsonValue::Number((*i).into())),
        ScalarValue::Uint(u) => Ok(JsonValue::Number((*u).into())),
        ScalarValue::F64(f) => {
            let n = serde_json::Number::from_f64(*f)
                .ok_or_else(|| Error::document("invalid float value"))?;
            Ok(JsonValue::Number(n))
        }
        ScalarValue::Str(s) => Ok(JsonValue::String(s.to_string())),
        ScalarValue::Bytes(b) => {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(b);
            Ok(JsonValue::String(encoded))
        }
        _ => Err(Error::document("unsupported Automerge value type")),
    }
}
