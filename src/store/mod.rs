pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    // Course content, keyed by subject
    pub edges: sled::Tree,
    pub questions: sled::Tree,
    // Learner state
    pub mastery: sled::Tree,
    pub settings: sled::Tree,
    pub activity: sled::Tree,
    pub correct_answers: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let edges = db.open_tree(trees::EDGES)?;
        let questions = db.open_tree(trees::QUESTIONS)?;
        let mastery = db.open_tree(trees::MASTERY)?;
        let settings = db.open_tree(trees::SETTINGS)?;
        let activity = db.open_tree(trees::ACTIVITY)?;
        let correct_answers = db.open_tree(trees::CORRECT_ANSWERS)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            edges,
            questions,
            mastery,
            settings,
            activity,
            correct_answers,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
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
