use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::db::database::Database;

/// A value bound to one key of the store: read once on bind, written through
/// on every `update`.
pub struct Persisted<T> {
    db: Database,
    key: String,
    value: T,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned,
{
    pub async fn bind(db: &Database, key: &str, default: T) -> Result<Self> {
        let value = match db.get_raw(key).await? {
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    // No migrations: a record whose shape changed is dropped.
                    warn!("Stored value for '{}' is unreadable ({}); using default", key, err);
                    default
                }
            },
            None => default,
        };
        Ok(Persisted {
            db: db.clone(),
            key: key.to_string(),
            value,
        })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn update<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        mutate(&mut self.value);
        let raw = serde_json::to_string(&self.value)?;
        self.db.set_raw(&self.key, &raw).await
    }
}
