#[cfg(test)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    Element,
    EndpointUrl,
    ModelName,
}

impl PrefKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefKey::Element => "element",
            PrefKey::EndpointUrl => "endpointUrl",
            PrefKey::ModelName => "modelName",
        }
    }
}

/// Snapshot of the stored preferences. Every field is absent until first set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub element: Option<String>,
    pub endpoint_url: Option<String>,
    pub model_name: Option<String>,
}

pub trait PreferenceStore: Send {
    fn get(&self, key: PrefKey) -> Option<String>;

    /// Never fails from the caller's point of view; implementations log
    /// storage errors instead.
    fn set(&mut self, key: PrefKey, value: &str);

    fn load(&self) -> Preferences {
        Preferences {
            element: self.get(PrefKey::Element),
            endpoint_url: self.get(PrefKey::EndpointUrl),
            model_name: self.get(PrefKey::ModelName),
        }
    }
}

pub fn db_path() -> PathBuf {
    Config::get_config_dir().join("preferences.sqlite")
}

pub struct SqlitePreferenceStore {
    conn: Connection,
}

impl SqlitePreferenceStore {
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(&db_path())
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening preference store {}", path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SqlitePreferenceStore { conn })
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, key: PrefKey) -> Option<String> {
        let result = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional();

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.as_str(), "reading preference failed: {}", e);
                None
            }
        }
    }

    fn set(&mut self, key: PrefKey, value: &str) {
        let result = self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        );
        match result {
            Ok(_) => debug!(key = key.as_str(), "preference stored"),
            Err(e) => warn!(key = key.as_str(), "storing preference failed: {}", e),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: HashMap<PrefKey, String>,
}

#[cfg(test)]
impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: PrefKey) -> Option<String> {
        self.values.get(&key).cloned()
    }

    fn set(&mut self, key: PrefKey, value: &str) {
        self.values.insert(key, value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_keys_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlitePreferenceStore::open(&dir.path().join("prefs.sqlite")).unwrap();
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqlitePreferenceStore::open(&dir.path().join("prefs.sqlite")).unwrap();

        store.set(PrefKey::EndpointUrl, "http://10.0.0.5:11434/api/chat");
        assert_eq!(
            store.get(PrefKey::EndpointUrl).as_deref(),
            Some("http://10.0.0.5:11434/api/chat")
        );

        store.set(PrefKey::EndpointUrl, "");
        assert_eq!(store.get(PrefKey::EndpointUrl).as_deref(), Some(""));
        assert_eq!(store.get(PrefKey::ModelName), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prefs.sqlite");

        {
            let mut store = SqlitePreferenceStore::open(&path).unwrap();
            store.set(PrefKey::Element, "<div>kept</div>");
            store.set(PrefKey::ModelName, "llama3");
        }

        let store = SqlitePreferenceStore::open(&path).unwrap();
        assert_eq!(
            store.load(),
            Preferences {
                element: Some("<div>kept</div>".to_string()),
                endpoint_url: None,
                model_name: Some("llama3".to_string()),
            }
        );
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryPreferenceStore::new();
        assert_eq!(store.get(PrefKey::Element), None);
        store.set(PrefKey::Element, "<p>x</p>");
        store.set(PrefKey::Element, "<p>y</p>");
        assert_eq!(store.get(PrefKey::Element).as_deref(), Some("<p>y</p>"));
    }
}
