use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::db::database::Database;
use crate::db::persisted::Persisted;

pub const CHARACTERS_KEY: &str = "saved-characters";
pub const SCENARIOS_KEY: &str = "saved-scenarios";

pub trait Saved: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
}

/// An ordered list of saved records stored under one key.
pub struct SavedCollection<T> {
    items: Persisted<Vec<T>>,
}

impl<T: Saved> SavedCollection<T> {
    pub async fn open(db: &Database, key: &str) -> Result<Self> {
        Ok(SavedCollection {
            items: Persisted::bind(db, key, Vec::new()).await?,
        })
    }

    pub fn list(&self) -> &[T] {
        self.items.get()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get().iter().find(|item| item.id() == id)
    }

    /// Appends `item`, replacing any record with the same id in place.
    pub async fn save(&mut self, item: T) -> Result<()> {
        let key = self.items.key().to_string();
        let id = item.id().to_string();
        self.items
            .update(|items| match items.iter().position(|existing| existing.id() == id) {
                Some(index) => items[index] = item,
                None => items.push(item),
            })
            .await?;
        info!("Saved '{}' in {}", id, key);
        Ok(())
    }

    pub async fn delete(&mut self, id: &str) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        self.items
            .update(|items| items.retain(|item| item.id() != id))
            .await?;
        info!("Deleted '{}' from {}", id, self.items.key());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Saved for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn save_replaces_by_id_and_persists() {
        let db = Database::in_memory().await.unwrap();
        let mut notes = SavedCollection::<Note>::open(&db, "notes").await.unwrap();
        notes.save(note("a", "first")).await.unwrap();
        notes.save(note("b", "second")).await.unwrap();
        notes.save(note("a", "edited")).await.unwrap();

        let reopened = SavedCollection::<Note>::open(&db, "notes").await.unwrap();
        assert_eq!(reopened.list(), &[note("a", "edited"), note("b", "second")]);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let db = Database::in_memory().await.unwrap();
        let mut notes = SavedCollection::<Note>::open(&db, "notes").await.unwrap();
        notes.save(note("a", "x")).await.unwrap();
        assert!(notes.delete("a").await.unwrap());
        assert!(!notes.delete("a").await.unwrap());
        assert!(notes.get("a").is_none());
    }
}
