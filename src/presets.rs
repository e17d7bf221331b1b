// Preset Module - named animation configurations persisted in SQLite.
// Every write is validated against the animation's parameter schema, so a
// stored preset is always playable as-is.
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::animations::{self, Params, SetupError};

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Preset {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Validation(#[from] SetupError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub id: i64,
    pub name: String,
    pub animation: String,
    pub created_on: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NewPreset {
    pub name: String,
    pub animation: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Name and parameter update; the animation of a preset is immutable.
#[derive(Debug, Deserialize)]
pub struct PresetUpdate {
    pub name: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct PresetStore {
    pool: SqlitePool,
}

impl PresetStore {
    pub async fn open(path: &Path) -> Result<PresetStore, PresetError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS presets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                animation TEXT NOT NULL,
                created_on TEXT NOT NULL,
                params TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        info!(path = %path.display(), "preset store opened");
        Ok(PresetStore { pool })
    }

    fn validate(
        animation: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), PresetError> {
        let descriptor = animations::descriptor(animation)
            .ok_or_else(|| SetupError::UnknownAnimation(animation.to_string()))?;
        Params::validate(descriptor, params)?;
        Ok(())
    }

    pub async fn create(&self, new: &NewPreset) -> Result<Preset, PresetError> {
        Self::validate(&new.animation, &new.params)?;
        let created_on = chrono::Utc::now().to_rfc3339();
        let params_json = serde_json::Value::Object(new.params.clone()).to_string();
        let result = sqlx::query(
            "INSERT INTO presets (name, animation, created_on, params) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&new.name)
        .bind(&new.animation)
        .bind(&created_on)
        .bind(&params_json)
        .execute(&self.pool)
        .await?;
        Ok(Preset {
            id: result.last_insert_rowid(),
            name: new.name.clone(),
            animation: new.animation.clone(),
            created_on,
            params: new.params.clone(),
        })
    }

    pub async fn get(&self, id: i64) -> Result<Preset, PresetError> {
        let row = sqlx::query("SELECT id, name, animation, created_on, params FROM presets WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::from_row).transpose()?.ok_or(PresetError::NotFound(id))
    }

    pub async fn list(&self, animation: Option<&str>) -> Result<Vec<Preset>, PresetError> {
        let rows = match animation {
            Some(animation) => {
                sqlx::query(
                    "SELECT id, name, animation, created_on, params FROM presets
                     WHERE animation = ?1 ORDER BY id",
                )
                .bind(animation)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, name, animation, created_on, params FROM presets ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Rename a preset or change its parameters. The parameters are
    /// validated against the schema of the preset's existing animation.
    pub async fn update(&self, id: i64, update: &PresetUpdate) -> Result<Preset, PresetError> {
        let existing = self.get(id).await?;
        Self::validate(&existing.animation, &update.params)?;
        let params_json = serde_json::Value::Object(update.params.clone()).to_string();
        sqlx::query("UPDATE presets SET name = ?1, params = ?2 WHERE id = ?3")
            .bind(&update.name)
            .bind(&params_json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(Preset {
            name: update.name.clone(),
            params: update.params.clone(),
            ..existing
        })
    }

    pub async fn delete(&self, id: i64) -> Result<(), PresetError> {
        let result = sqlx::query("DELETE FROM presets WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PresetError::NotFound(id));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<Preset, PresetError> {
        let params_raw: String = row.get("params");
        let params = serde_json::from_str::<serde_json::Value>(&params_raw)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        Ok(Preset {
            id: row.get("id"),
            name: row.get("name"),
            animation: row.get("animation"),
            created_on: row.get("created_on"),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animations::descriptor;

    async fn store() -> (tempfile::TempDir, PresetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::open(&dir.path().join("presets.db")).await.unwrap();
        (dir, store)
    }

    fn fade_preset(name: &str) -> NewPreset {
        NewPreset {
            name: name.to_string(),
            animation: "fade".to_string(),
            params: Params::defaults(descriptor("fade").unwrap()),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_dir, store) = store().await;
        let created = store.create(&fade_preset("evening")).await.unwrap();
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.name, "evening");
        assert_eq!(fetched.animation, "fade");
        assert_eq!(fetched.params, created.params);
        assert!(!fetched.created_on.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_animation_rejected() {
        let (_dir, store) = store().await;
        let mut preset = fade_preset("bad");
        preset.animation = "wobble".to_string();
        assert!(matches!(
            store.create(&preset).await,
            Err(PresetError::Validation(SetupError::UnknownAnimation(_)))
        ));
    }

    #[tokio::test]
    async fn test_schema_violations_rejected() {
        let (_dir, store) = store().await;

        let mut missing = fade_preset("missing");
        missing.params.remove("duration");
        assert!(matches!(
            store.create(&missing).await,
            Err(PresetError::Validation(SetupError::MissingParams(_)))
        ));

        let mut extra = fade_preset("extra");
        extra.params.insert("sparkle".into(), serde_json::json!(true));
        assert!(matches!(
            store.create(&extra).await,
            Err(PresetError::Validation(SetupError::InvalidParams(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_animation_and_validates() {
        let (_dir, store) = store().await;
        let created = store.create(&fade_preset("base")).await.unwrap();

        let mut params = Params::defaults(descriptor("fade").unwrap());
        params.insert("duration".into(), serde_json::json!(10.0));
        let updated = store
            .update(
                created.id,
                &PresetUpdate {
                    name: "renamed".to_string(),
                    params: params.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.animation, "fade");
        assert_eq!(updated.params, params);

        // Parameters for a different animation do not fit the schema
        let err = store
            .update(
                created.id,
                &PresetUpdate {
                    name: "renamed".to_string(),
                    params: Params::defaults(descriptor("disco").unwrap()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresetError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let (_dir, store) = store().await;
        let created = store.create(&fade_preset("gone")).await.unwrap();
        store.delete(created.id).await.unwrap();
        assert!(matches!(
            store.get(created.id).await,
            Err(PresetError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(created.id).await,
            Err(PresetError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filtered_by_animation() {
        let (_dir, store) = store().await;
        store.create(&fade_preset("one")).await.unwrap();
        store.create(&fade_preset("two")).await.unwrap();
        let mut disco = fade_preset("party");
        disco.animation = "disco".to_string();
        disco.params = Params::defaults(descriptor("disco").unwrap());
        store.create(&disco).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 3);
        let fades = store.list(Some("fade")).await.unwrap();
        assert_eq!(fades.len(), 2);
        assert!(fades.iter().all(|p| p.animation == "fade"));
    }
}
