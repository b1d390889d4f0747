use serde_json::{json, Map, Value};

use crate::constants::SIGN_OUT_TAG_AUTO;
use crate::store::operations::attendance::SessionCollection;
use crate::store::{keys, Store, StoreError};

impl Store {
    /// Create an open history entry at session start. This is the primary
    /// application's write path; the reconciliation job only ever closes
    /// entries.
    pub fn open_history_entry(
        &self,
        collection: SessionCollection,
        owner_id: &str,
        time_in_ms: i64,
    ) -> Result<String, StoreError> {
        let key = keys::history_key(owner_id, time_in_ms);
        let mut entry = Map::new();
        entry.insert(collection.owner_id_field().to_string(), json!(owner_id));
        entry.insert("time_in".to_string(), json!(time_in_ms));
        entry.insert("time_out".to_string(), Value::Null);
        collection
            .history_tree(self)
            .insert(key.as_bytes(), Store::serialize(&entry)?)?;
        Ok(key)
    }

    /// Close the at-most-one open history entry for `owner_id`: set
    /// `time_out = now` and tag `last_sign_out = "auto"`. Returns whether an
    /// entry was closed; no matching open entry is a no-op, not an error
    /// (already closed, or the session was never logged).
    ///
    /// Independent per owner, so concurrent invocations for different owners
    /// are safe and unordered.
    pub fn close_matching_open_entry(
        &self,
        collection: SessionCollection,
        owner_id: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let tree = collection.history_tree(self);
        let prefix = keys::history_prefix(owner_id);

        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            let mut entry = match serde_json::from_slice::<Value>(&v) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        collection = collection.name(),
                        owner_id,
                        "Skipping malformed history entry"
                    );
                    continue;
                }
            };

            if !matches!(entry.get("time_out"), None | Some(Value::Null)) {
                continue;
            }

            entry.insert("time_out".to_string(), json!(now_ms));
            entry.insert("last_sign_out".to_string(), json!(SIGN_OUT_TAG_AUTO));
            tree.insert(k, Store::serialize(&entry)?)?;
            return Ok(true);
        }

        Ok(false)
    }

    pub fn list_history_entries(
        &self,
        collection: SessionCollection,
        owner_id: &str,
    ) -> Result<Vec<Map<String, Value>>, StoreError> {
        let prefix = keys::history_prefix(owner_id);
        let mut entries = Vec::new();
        for item in collection.history_tree(self).scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            if let Value::Object(map) = Store::deserialize::<Value>(&v)? {
                entries.push(map);
            }
        }
        Ok(entries)
    }
}

/// Seam over the history-log close so the reconciliation engine can be
/// driven against a failing sync. `Store` is the only production
/// implementation.
pub trait HistorySync {
    fn close_matching_open_entry(
        &self,
        collection: SessionCollection,
        owner_id: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError>;
}

impl HistorySync for Store {
    fn close_matching_open_entry(
        &self,
        collection: SessionCollection,
        owner_id: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        Store::close_matching_open_entry(self, collection, owner_id, now_ms)
    }
}
