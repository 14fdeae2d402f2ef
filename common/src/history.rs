use std::sync::Arc;
use crate::error::StoreError;
use crate::job::{JobId, JobRecord, JobUpdate};
use crate::store::PersistentStore;

/// Ordered list of past jobs, newest first, kept as one JSON array.
///
/// Every mutation is a read-modify-write of the whole array.
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn PersistentStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// All records, newest first. Missing or unreadable data yields an empty list.
    pub fn list(&self) -> Vec<JobRecord> {
        let raw = match self.store.get(crate::HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::error!("Failed to read history: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to parse history, treating it as empty: {}", e);
                Vec::new()
            }
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<JobRecord> {
        let mut records = self.list();
        records.truncate(limit);
        records
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.list().into_iter().find(|r| &r.id == id)
    }

    pub fn append(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut records = self.list();
        records.insert(0, record);
        self.write(&records)
    }

    /// Applies `update` to the record with `id`. Returns false when no such record exists.
    pub fn update_by_id(&self, id: &JobId, update: &JobUpdate) -> Result<bool, StoreError> {
        let mut records = self.list();
        let Some(record) = records.iter_mut().find(|r| &r.id == id) else {
            return Ok(false);
        };
        record.apply(update);
        self.write(&records)?;
        Ok(true)
    }

    pub fn delete_by_id(&self, id: &JobId) -> Result<bool, StoreError> {
        let mut records = self.list();
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records)?;
        Ok(true)
    }

    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.store.delete(crate::HISTORY_KEY)
    }

    fn write(&self, records: &[JobRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;
        self.store.set(crate::HISTORY_KEY, &json)
    }
}
