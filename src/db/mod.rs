// Local key-value store for persisted model selection (SQLite or memory)

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::registry::{ModelRegistry, ServiceType};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        tracing::info!("SQLite selection store initialized at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional();

        match value {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read key {} from store: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now],
        )?;
        tracing::debug!("Stored {} = {}", key, value);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("model {0} is not in the registry")]
    UnknownModel(String),
    #[error("model {model} does not serve {service_type}")]
    WrongServiceType {
        model: String,
        service_type: ServiceType,
    },
    #[error("failed to persist selection: {0}")]
    Store(#[from] anyhow::Error),
}

/// Write path for the administration surface. The dispatcher only reads.
pub struct ActiveSelection<'a> {
    store: &'a dyn KeyValueStore,
    registry: &'a ModelRegistry,
}

impl<'a> ActiveSelection<'a> {
    pub fn new(store: &'a dyn KeyValueStore, registry: &'a ModelRegistry) -> Self {
        Self { store, registry }
    }

    /// Raw stored identifier, which may be stale.
    pub fn current(&self, service_type: ServiceType) -> Option<String> {
        self.store.get(&service_type.persistence_key())
    }

    pub fn select(&self, service_type: ServiceType, model_id: &str) -> Result<(), SelectionError> {
        if self.registry.get(model_id).is_none() {
            return Err(SelectionError::UnknownModel(model_id.to_string()));
        }
        if ServiceType::from_model_id(model_id) != Some(service_type) {
            return Err(SelectionError::WrongServiceType {
                model: model_id.to_string(),
                service_type,
            });
        }
        self.store.set(&service_type.persistence_key(), model_id)?;
        tracing::info!("Active model for {} set to {}", service_type, model_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("selection.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("ai_config:ACTIVE_MODEL_TEXT_TO_TEXT", "TEXT_TO_TEXT_BOTHUB").unwrap();
            store.set("ai_config:ACTIVE_MODEL_TEXT_TO_TEXT", "TEXT_TO_TEXT_WORKERS_AI").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get("ai_config:ACTIVE_MODEL_TEXT_TO_TEXT").as_deref(),
            Some("TEXT_TO_TEXT_WORKERS_AI")
        );
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_select_validates_service_type() {
        let store = MemoryStore::new();
        let registry = ModelRegistry::builtin();
        let selection = ActiveSelection::new(&store, &registry);

        selection.select(ServiceType::ImageToText, "IMAGE_TO_TEXT_BOTHUB").unwrap();
        assert_eq!(selection.current(ServiceType::ImageToText).as_deref(), Some("IMAGE_TO_TEXT_BOTHUB"));

        assert!(matches!(
            selection.select(ServiceType::ImageToText, "TEXT_TO_TEXT_GEMINI"),
            Err(SelectionError::WrongServiceType { .. })
        ));
        assert!(matches!(
            selection.select(ServiceType::TextToText, "TEXT_TO_TEXT_NOPE"),
            Err(SelectionError::UnknownModel(_))
        ));
        assert_eq!(selection.current(ServiceType::TextToText), None);
    }
}
