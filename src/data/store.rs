//! SQLite storage behind the knowledge and structured-data caches.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::{data::utc_timestamp_string, error::EngineError};

/// What is known about a title. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CacheEntry {
    Content {
        description: String,
        item_id: Option<String>,
    },
    /// The source has nothing usable for the title.
    Absent,
    Redirect {
        target: String,
    },
}

impl CacheEntry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Absent => "absent",
            Self::Redirect { .. } => "redirect",
        }
    }
}

/// Structured facts about one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemFacts {
    pub map_filename: Option<String>,
    pub inception: Option<String>,
}

/// One cache database file per remote source.
pub struct CacheStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("path", &self.path).finish()
    }
}

impl CacheStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        info!(path = %path.display(), "opened cache store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), EngineError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS titles (
                title TEXT PRIMARY KEY COLLATE NOCASE,
                kind TEXT NOT NULL,
                description TEXT,
                item_id TEXT,
                redirect_to TEXT,
                fetched_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS items (
                item_id TEXT PRIMARY KEY,
                map_filename TEXT,
                inception TEXT,
                fetched_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored row for `title`, compared case-insensitively.
    pub fn title(&self, title: &str) -> Result<Option<CacheEntry>, EngineError> {
        let row = self
            .conn
            .query_row(
                "SELECT kind, description, item_id, redirect_to FROM titles WHERE title = ?1",
                params![title],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(kind, description, item_id, redirect_to)| {
            match (kind.as_str(), description, redirect_to) {
                ("content", Some(description), _) => CacheEntry::Content {
                    description,
                    item_id,
                },
                ("redirect", _, Some(target)) => CacheEntry::Redirect { target },
                _ => CacheEntry::Absent,
            }
        }))
    }

    /// Insert a row unless the title already has one. Returns whether it was written.
    pub fn put_title(&self, title: &str, entry: &CacheEntry) -> Result<bool, EngineError> {
        let (description, item_id, redirect_to) = match entry {
            CacheEntry::Content {
                description,
                item_id,
            } => (Some(description.as_str()), item_id.as_deref(), None),
            CacheEntry::Absent => (None, None, None),
            CacheEntry::Redirect { target } => (None, None, Some(target.as_str())),
        };
        let written = self.conn.execute(
            "INSERT OR IGNORE INTO titles (title, kind, description, item_id, redirect_to, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                title,
                entry.kind(),
                description,
                item_id,
                redirect_to,
                utc_timestamp_string()
            ],
        )?;
        Ok(written > 0)
    }

    pub fn item(&self, item_id: &str) -> Result<Option<ItemFacts>, EngineError> {
        let facts = self
            .conn
            .query_row(
                "SELECT map_filename, inception FROM items WHERE item_id = ?1",
                params![item_id],
                |row| {
                    Ok(ItemFacts {
                        map_filename: row.get(0)?,
                        inception: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(facts)
    }

    pub fn put_item(&self, item_id: &str, facts: &ItemFacts) -> Result<bool, EngineError> {
        let written = self.conn.execute(
            "INSERT OR IGNORE INTO items (item_id, map_filename, inception, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                item_id,
                facts.map_filename,
                facts.inception,
                utc_timestamp_string()
            ],
        )?;
        Ok(written > 0)
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>, EngineError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn close(self) -> Result<(), EngineError> {
        self.conn.close().map_err(|(_, err)| EngineError::from(err))
    }
}
