use std::ops::Bound;

use serde_json::{Map, Value};

use crate::constants::STORE_BATCH_HARD_LIMIT;
use crate::store::{keys, Store, StoreError};

/// The two attendance collections this job reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCollection {
    Students,
    Tutors,
}

impl SessionCollection {
    pub const ALL: [SessionCollection; 2] = [Self::Students, Self::Tutors];

    pub fn name(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Tutors => "tutors",
        }
    }

    /// Field naming the owner in this collection's history entries.
    pub fn owner_id_field(self) -> &'static str {
        match self {
            Self::Students => "student_id",
            Self::Tutors => "tutor_id",
        }
    }

    pub fn tree(self, store: &Store) -> &sled::Tree {
        match self {
            Self::Students => &store.students,
            Self::Tutors => &store.tutors,
        }
    }

    pub fn history_tree(self, store: &Store) -> &sled::Tree {
        match self {
            Self::Students => &store.student_history,
            Self::Tutors => &store.tutor_history,
        }
    }
}

/// Session documents are schemaless JSON maps written by several generations
/// of the primary application; typed accessors below absorb the variance.
pub type SessionDoc = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub key: String,
    pub doc: SessionDoc,
}

impl SessionRecord {
    /// Open means `time_out` is null or absent.
    pub fn is_open(&self) -> bool {
        matches!(self.doc.get("time_out"), None | Some(Value::Null))
    }

    pub fn time_in(&self) -> Option<&Value> {
        self.doc.get("time_in")
    }

    /// Distinguishes an absent `last_sign_out` field from an explicit null:
    /// absent means the record predates classification and needs a backfill.
    pub fn has_last_sign_out(&self) -> bool {
        self.doc.contains_key("last_sign_out")
    }

    /// Notification target. Empty strings are treated as no address on file.
    pub fn email(&self) -> Option<&str> {
        self.doc
            .get("email")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug)]
pub struct SessionPage {
    pub records: Vec<SessionRecord>,
    /// False once a scan returns fewer matches than the page size.
    pub has_more: bool,
}

impl SessionPage {
    pub fn last_key(&self) -> Option<&str> {
        self.records.last().map(|r| r.key.as_str())
    }
}

/// Bounded accumulator of merge-style staged writes.
///
/// `stage_merge` reports when the batch has reached capacity so the caller
/// can commit; the same flush path then serves both mid-page and page-end
/// flushes. Capacity is clamped strictly below the store's per-batch ceiling.
#[derive(Debug)]
pub struct WriteBatch {
    batch: sled::Batch,
    staged: usize,
    limit: usize,
}

impl WriteBatch {
    pub fn new(limit: usize) -> Self {
        Self {
            batch: sled::Batch::default(),
            staged: 0,
            limit: limit.clamp(1, STORE_BATCH_HARD_LIMIT - 1),
        }
    }

    /// Stage a field-level merge: `patch` fields overlay `doc`, everything
    /// else in the document is preserved. Returns `true` when the batch is
    /// full and must be committed before further staging.
    pub fn stage_merge(
        &mut self,
        record_key: &str,
        doc: &SessionDoc,
        patch: &SessionDoc,
    ) -> Result<bool, StoreError> {
        if self.staged >= self.limit {
            return Err(StoreError::BatchOverCapacity {
                staged: self.staged,
                limit: self.limit,
            });
        }

        let mut merged = doc.clone();
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }

        self.batch
            .insert(record_key.as_bytes(), Store::serialize(&merged)?);
        self.staged += 1;
        Ok(self.staged >= self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.staged == 0
    }

    pub fn len(&self) -> usize {
        self.staged
    }
}

impl Store {
    /// Keyset-paginated scan of open sessions, ordered by record key
    /// ascending. `after_key` resumes strictly after the last key processed,
    /// which keeps the cursor stable under concurrent writes outside the
    /// scanned range.
    pub fn scan_open_sessions(
        &self,
        collection: SessionCollection,
        page_size: usize,
        after_key: Option<&str>,
    ) -> Result<SessionPage, StoreError> {
        let tree = collection.tree(self);
        let iter = match after_key {
            Some(key) => tree.range((
                Bound::Excluded(key.as_bytes().to_vec()),
                Bound::<Vec<u8>>::Unbounded,
            )),
            None => tree.iter(),
        };

        let mut records = Vec::new();
        for item in iter {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k).to_string();
            let doc = match serde_json::from_slice::<Value>(&v) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        collection = collection.name(),
                        key = %key,
                        "Skipping malformed session document"
                    );
                    continue;
                }
            };

            let record = SessionRecord { key, doc };
            if !record.is_open() {
                continue;
            }

            records.push(record);
            if records.len() >= page_size {
                break;
            }
        }

        let has_more = records.len() >= page_size;
        Ok(SessionPage { records, has_more })
    }

    /// Atomically apply every staged write in the batch, or none of them.
    /// Returns the number of operations applied.
    pub fn commit_session_batch(
        &self,
        collection: SessionCollection,
        batch: WriteBatch,
    ) -> Result<usize, StoreError> {
        let ops = batch.staged;
        collection.tree(self).apply_batch(batch.batch)?;
        Ok(ops)
    }

    /// Full-document write, used by the primary application at session start.
    pub fn put_session(
        &self,
        collection: SessionCollection,
        user_id: &str,
        doc: &SessionDoc,
    ) -> Result<(), StoreError> {
        let key = keys::session_key(user_id);
        collection
            .tree(self)
            .insert(key.as_bytes(), Store::serialize(doc)?)?;
        Ok(())
    }

    pub fn get_session(
        &self,
        collection: SessionCollection,
        user_id: &str,
    ) -> Result<Option<SessionDoc>, StoreError> {
        let key = keys::session_key(user_id);
        let Some(raw) = collection.tree(self).get(key.as_bytes())? else {
            return Ok(None);
        };
        match Store::deserialize::<Value>(&raw)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(StoreError::Validation(format!(
                "session document for {user_id} is not an object: {other}"
            ))),
        }
    }
}
