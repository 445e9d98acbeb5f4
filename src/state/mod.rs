// src/state/mod.rs

//! Per-prefix state database
//!
//! Each prefix owns a SQLite database holding:
//! - The installed-state snapshot (one row per installed package name,
//!   plus its file manifest)
//! - The configured repositories
//! - The package descriptors synced from each repository
//!
//! The engine only reads this state; mutation happens in the plan applier
//! after a solve has produced a plan.

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use crate::index::DepEntry;
use crate::version::Version;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Initialize a prefix state database at the specified path
///
/// Creates the database file, sets pragmas, and applies schema migrations.
/// Idempotent: safe to call on an existing database.
pub fn init(db_path: &Path) -> Result<Connection> {
    debug!("Initializing state database at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Init(format!("Failed to create state directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an existing prefix state database
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(Error::NotFound(format!(
            "prefix state database at {} (run 'pakt mkprefix' first)",
            db_path.display()
        )));
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run a closure inside a database transaction
///
/// Commits when the closure returns Ok, rolls back on Err.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// One installed package in the per-prefix snapshot, in parsed form
#[derive(Debug, Clone)]
pub struct InstalledEntry {
    pub name: String,
    pub version: Version,
    pub sumsha: String,
    pub size: u64,
    pub depends: Vec<DepEntry>,
    pub conflicts: Vec<DepEntry>,
}

/// The installed-state snapshot of one prefix
///
/// At most one version of a name is installed at a time. The snapshot is
/// loaded at context initialization and treated as read-only input by the
/// solver; only the plan applier rewrites the underlying rows.
#[derive(Debug, Default)]
pub struct InstalledState {
    entries: BTreeMap<String, InstalledEntry>,
}

impl InstalledState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot from the state database
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut state = Self::new();
        for row in models::InstalledPackage::list_all(conn)? {
            state.insert(row.into_entry()?);
        }
        debug!("Loaded installed state: {} packages", state.len());
        Ok(state)
    }

    pub fn insert(&mut self, entry: InstalledEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&InstalledEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &InstalledEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch_db() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");
        (dir, path)
    }

    #[test]
    fn test_init_creates_database_and_schema() {
        let (_dir, path) = scratch_db();

        let conn = init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(schema::get_schema_version(&conn).unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_init_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("var/lib/pakt/state.db");

        init(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_nonexistent_database_fails() {
        let (_dir, path) = scratch_db();
        let result = open(&path);
        assert!(matches!(result.unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (_dir, path) = scratch_db();
        let mut conn = init(&path).unwrap();

        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO repositories (name, url) VALUES ('scratch', 'http://example')",
                [],
            )?;
            Err(Error::Init("forced failure".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "Rolled-back insert must not persist");
    }

    #[test]
    fn test_installed_state_roundtrip() {
        let (_dir, path) = scratch_db();
        let conn = init(&path).unwrap();

        let mut row = models::InstalledPackage::new(
            "hello".to_string(),
            "1.2.0".to_string(),
            "ab".repeat(32),
            2048,
        );
        row.depends = r#"[{"name":"libfoo","constraint":">= 1.0.0"}]"#.to_string();
        row.insert(&conn).unwrap();

        let state = InstalledState::load(&conn).unwrap();
        assert_eq!(state.len(), 1);

        let entry = state.get("hello").unwrap();
        assert_eq!(entry.version, Version::parse("1.2.0").unwrap());
        assert_eq!(entry.sumsha, "ab".repeat(32));
        assert_eq!(entry.depends.len(), 1);
        assert_eq!(entry.depends[0].name, "libfoo");
    }
}
