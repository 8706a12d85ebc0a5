use chrono::{DateTime, Utc};
use sled::Db;

use crate::errors::LocalError;
use crate::models::Tokens;

/// Token cache and last-run bookkeeping, kept in sled as JSON values.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct RunRecord {
    pub finished_at: DateTime<Utc>,
    pub changed: usize,
    pub failed: usize,
    pub error: Option<String>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, LocalError> {
        Ok(Store {
            db: sled::open(path)?,
        })
    }

    #[cfg(test)]
    pub fn temporary() -> Result<Self, LocalError> {
        Ok(Store {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn tokens(&self, service: &str) -> Result<Option<Tokens>, LocalError> {
        self.get(&["token:", service].concat())
    }

    pub fn save_tokens(&self, service: &str, tokens: &Tokens) -> Result<(), LocalError> {
        self.put(&["token:", service].concat(), tokens)
    }

    pub fn last_run(&self, job: &str) -> Result<Option<RunRecord>, LocalError> {
        self.get(&["last_run:", job].concat())
    }

    pub fn record_run(&self, job: &str, record: &RunRecord) -> Result<(), LocalError> {
        self.put(&["last_run:", job].concat(), record)
    }

    pub async fn flush(&self) -> Result<(), LocalError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LocalError> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), LocalError> {
        self.db.insert(key, serde_json::to_vec(value)?)?;
        Ok(())
    }
}
