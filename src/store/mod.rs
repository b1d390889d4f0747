pub mod keys;
pub mod operations;
pub mod timestamp;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

pub use operations::attendance::SessionCollection;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub students: sled::Tree,
    pub tutors: sled::Tree,
    pub student_history: sled::Tree,
    pub tutor_history: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("batch over capacity: staged={staged}, limit={limit}")]
    BatchOverCapacity { staged: usize, limit: usize },
    #[error("validation error: {0}")]
    Validation(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let students = db.open_tree(trees::STUDENTS)?;
        let tutors = db.open_tree(trees::TUTORS)?;
        let student_history = db.open_tree(trees::STUDENT_HISTORY)?;
        let tutor_history = db.open_tree(trees::TUTOR_HISTORY)?;

        Ok(Self {
            db,
            students,
            tutors,
            student_history,
            tutor_history,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
