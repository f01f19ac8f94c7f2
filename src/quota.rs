use crate::error::StorageError;
use crate::storage::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Serialize, Deserialize)]
struct QuotaDocument {
    tweets_fetched: u64,
}

/// Advisory count of posts fetched in the current monthly window.
///
/// Persisted after every change so a restart resumes from the last known
/// value. Only an explicit [`QuotaCounter::reset`] ever lowers it.
#[derive(Debug)]
pub struct QuotaCounter<S: StateStore> {
    store: S,
    fetched: u64,
    monthly_limit: u64,
}

impl<S: StateStore> QuotaCounter<S> {
    /// Read the persisted count, falling back to `baseline` when nothing is stored
    pub fn load(store: S, baseline: u64, monthly_limit: u64) -> Result<Self, StorageError> {
        let fetched = match store.read()? {
            Some(contents) => serde_json::from_str::<QuotaDocument>(&contents)?.tweets_fetched,
            None => {
                debug!("No stored quota, starting from baseline {}", baseline);
                baseline
            }
        };

        Ok(Self {
            store,
            fetched,
            monthly_limit,
        })
    }

    pub fn current(&self) -> u64 {
        self.fetched
    }

    pub fn monthly_limit(&self) -> u64 {
        self.monthly_limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.fetched >= self.monthly_limit
    }

    /// Advance by `count` and persist.
    ///
    /// A failed write is logged and the in-memory value is kept; the counter
    /// is advisory and a fetch should not be lost over it.
    pub fn increment(&mut self, count: u64) {
        self.fetched = self.fetched.saturating_add(count);
        if let Err(e) = self.persist() {
            error!("Failed to persist quota counter ({}): {}", self.fetched, e);
        }
    }

    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.fetched = 0;
        self.persist()?;
        info!("Quota counter reset to 0");
        Ok(())
    }

    fn persist(&self) -> Result<(), StorageError> {
        let document = QuotaDocument {
            tweets_fetched: self.fetched,
        };
        self.store.write(&serde_json::to_string(&document)?)
    }
}
