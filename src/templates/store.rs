use anyhow::Result;
use tracing::{info, warn};

use crate::db::database::Database;
use crate::templates::engine::TemplateEngine;
use crate::templates::model::{TemplatePattern, TemplateVariable};

pub const VARIABLES_KEY: &str = "template-variables";
pub const PATTERNS_KEY: &str = "template-patterns";

/// Persists the two template catalogs in the key-value store.
pub struct TemplateStore;

impl TemplateStore {
    pub async fn load(db: &Database) -> Result<TemplateEngine> {
        let defaults = TemplateEngine::with_defaults();
        let variables = match load_list::<TemplateVariable>(db, VARIABLES_KEY).await? {
            Some(list) => list,
            None => defaults.variables().cloned().collect(),
        };
        let patterns = match load_list::<TemplatePattern>(db, PATTERNS_KEY).await? {
            Some(list) => list,
            None => defaults.patterns().cloned().collect(),
        };
        Ok(TemplateEngine::from_parts(variables, patterns))
    }

    pub async fn save(db: &Database, engine: &TemplateEngine) -> Result<()> {
        let variables: Vec<&TemplateVariable> = engine.variables().collect();
        let patterns: Vec<&TemplatePattern> = engine.patterns().collect();
        db.set_many(&[
            (VARIABLES_KEY, serde_json::to_string(&variables)?),
            (PATTERNS_KEY, serde_json::to_string(&patterns)?),
        ])
        .await
    }

    /// Discards every stored edit and writes the built-in catalog back.
    pub async fn reset(db: &Database) -> Result<TemplateEngine> {
        let engine = TemplateEngine::with_defaults();
        Self::save(db, &engine).await?;
        info!(
            "Template catalog reset: {} variables, {} patterns",
            engine.variables().count(),
            engine.patterns().count()
        );
        Ok(engine)
    }
}

async fn load_list<T: serde::de::DeserializeOwned>(
    db: &Database,
    key: &str,
) -> Result<Option<Vec<T>>> {
    let Some(raw) = db.get_raw(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(list) => Ok(Some(list)),
        Err(err) => {
            warn!("Stored catalog '{}' is unreadable ({}); using defaults", key, err);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::defaults::SCENARIO_PATTERN;
    use crate::templates::engine::VariableDraft;
    use crate::templates::model::VariableCategory;

    #[tokio::test]
    async fn empty_store_loads_defaults() {
        let db = Database::in_memory().await.unwrap();
        let engine = TemplateStore::load(&db).await.unwrap();
        assert_eq!(engine, TemplateEngine::with_defaults());
    }

    #[tokio::test]
    async fn edits_survive_reload_and_reset_discards_them() {
        let db = Database::in_memory().await.unwrap();
        let mut engine = TemplateStore::load(&db).await.unwrap();
        engine
            .update_pattern_template(SCENARIO_PATTERN, "{place} only")
            .unwrap();
        engine.remove_variable("quirk");
        TemplateStore::save(&db, &engine).await.unwrap();

        let reloaded = TemplateStore::load(&db).await.unwrap();
        assert_eq!(reloaded, engine);
        assert_eq!(
            reloaded.get_pattern(SCENARIO_PATTERN).unwrap().variables(),
            ["place"]
        );

        let reset = TemplateStore::reset(&db).await.unwrap();
        assert_eq!(reset, TemplateEngine::with_defaults());
        assert_eq!(TemplateStore::load(&db).await.unwrap(), reset);
    }

    #[tokio::test]
    async fn reset_overwrites_unreadable_and_custom_entries() {
        let db = Database::in_memory().await.unwrap();
        db.set_raw(VARIABLES_KEY, "not json").await.unwrap();
        let mut engine = TemplateEngine::with_defaults();
        engine.remove_pattern(SCENARIO_PATTERN);
        engine
            .save_variable(VariableDraft {
                name: "Favourite Drink".to_string(),
                description: String::new(),
                default_value: "gin".to_string(),
                category: VariableCategory::Custom,
            })
            .unwrap();
        db.set_raw(
            PATTERNS_KEY,
            &serde_json::to_string(&engine.patterns().collect::<Vec<_>>()).unwrap(),
        )
        .await
        .unwrap();

        let reset = TemplateStore::reset(&db).await.unwrap();
        assert_eq!(reset, TemplateEngine::with_defaults());
        let reloaded = TemplateStore::load(&db).await.unwrap();
        assert_eq!(reloaded, reset);
        assert!(reloaded.get_variable("favourite-drink").is_none());
        assert!(reloaded.get_pattern(SCENARIO_PATTERN).is_some());
    }

    #[tokio::test]
    async fn corrupt_catalog_falls_back_to_defaults() {
        let db = Database::in_memory().await.unwrap();
        db.set_raw(PATTERNS_KEY, "{\"oops\": true}").await.unwrap();
        let engine = TemplateStore::load(&db).await.unwrap();
        assert!(engine.get_pattern(SCENARIO_PATTERN).is_some());
    }
}
