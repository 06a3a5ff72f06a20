use crate::engine::types::ActivityEntry;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let key = keys::activity_key(
            &entry.user_id,
            entry.created_at.timestamp_millis(),
            &entry.id,
        )?;
        self.activity.insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    /// Newest first.
    pub fn list_activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        let prefix = keys::activity_prefix(user_id)?;
        let mut entries = Vec::new();
        for item in self.activity.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = match item {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            if let Ok(entry) = Self::deserialize::<ActivityEntry>(&raw) {
                entries.push(entry);
            }
            if entries.len() >= limit {
                break;
            }
        }
        Ok(entries)
    }
}
