// src/state/models.rs

//! Data models for the prefix state database
//!
//! Structs correspond to tables and carry their own CRUD. Dependency and
//! conflict lists are stored as JSON columns in the raw descriptor form and
//! parsed when the installed-state snapshot is loaded.

use crate::error::{Error, Result};
use crate::index::{DepEntry, DepSpec};
use crate::state::InstalledEntry;
use crate::version::Version;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Serialize a parsed entry list back to its JSON column form
pub fn dep_entries_to_json(entries: &[DepEntry]) -> String {
    let specs: Vec<DepSpec> = entries.iter().map(DepEntry::to_spec).collect();
    serde_json::to_string(&specs).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a JSON column into dependency entries
pub fn dep_entries_from_json(json: &str) -> Result<Vec<DepEntry>> {
    let specs: Vec<DepSpec> = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("Invalid dependency list JSON: {}", e)))?;
    DepEntry::from_specs(&specs)
}

/// One row of the installed-state snapshot
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub sumsha: String,
    pub size: i64,
    pub description: Option<String>,
    pub depends: String,
    pub conflicts: String,
    pub installed_at: Option<String>,
}

impl InstalledPackage {
    /// Create a new installed package row
    pub fn new(name: String, version: String, sumsha: String, size: i64) -> Self {
        Self {
            name,
            version,
            sumsha,
            size,
            description: None,
            depends: "[]".to_string(),
            conflicts: "[]".to_string(),
            installed_at: None,
        }
    }

    /// Insert this row into the database
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO installed (name, version, sumsha, size, description, depends, conflicts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.name,
                &self.version,
                &self.sumsha,
                &self.size,
                &self.description,
                &self.depends,
                &self.conflicts,
            ],
        )?;
        Ok(())
    }

    /// Find an installed package by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, version, sumsha, size, description, depends, conflicts, installed_at
             FROM installed WHERE name = ?1",
        )?;

        let pkg = stmt.query_row([name], Self::from_row).optional()?;
        Ok(pkg)
    }

    /// List all installed packages, name-ordered
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, version, sumsha, size, description, depends, conflicts, installed_at
             FROM installed ORDER BY name",
        )?;

        let pkgs = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pkgs)
    }

    /// Delete an installed package by name
    pub fn delete(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("DELETE FROM installed WHERE name = ?1", [name])?;
        Ok(())
    }

    /// Parse this row into a snapshot entry
    pub fn into_entry(self) -> Result<InstalledEntry> {
        Ok(InstalledEntry {
            version: Version::parse(&self.version)
                .map_err(|e| Error::Parse(format!("Installed '{}': {}", self.name, e)))?,
            sumsha: self.sumsha,
            size: self.size.max(0) as u64,
            depends: dep_entries_from_json(&self.depends)
                .map_err(|e| Error::Parse(format!("Installed '{}': {}", self.name, e)))?,
            conflicts: dep_entries_from_json(&self.conflicts)
                .map_err(|e| Error::Parse(format!("Installed '{}': {}", self.name, e)))?,
            name: self.name,
        })
    }

    /// Convert a database row to an InstalledPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            sumsha: row.get(2)?,
            size: row.get(3)?,
            description: row.get(4)?,
            depends: row.get(5)?,
            conflicts: row.get(6)?,
            installed_at: row.get(7)?,
        })
    }
}

/// One file deployed by an installed package
#[derive(Debug, Clone)]
pub struct InstalledFile {
    pub id: Option<i64>,
    pub package_name: String,
    pub path: String,
    pub sumsha: Option<String>,
    pub size: i64,
}

impl InstalledFile {
    /// Create a new file manifest entry
    pub fn new(package_name: String, path: String, sumsha: Option<String>, size: i64) -> Self {
        Self {
            id: None,
            package_name,
            path,
            sumsha,
            size,
        }
    }

    /// Insert this file entry into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO installed_files (package_name, path, sumsha, size)
             VALUES (?1, ?2, ?3, ?4)",
            params![&self.package_name, &self.path, &self.sumsha, &self.size],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all files belonging to a package
    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_name, path, sumsha, size
             FROM installed_files WHERE package_name = ?1 ORDER BY path",
        )?;

        let files = stmt
            .query_map([package_name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Convert a database row to an InstalledFile
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_name: row.get(1)?,
            path: row.get(2)?,
            sumsha: row.get(3)?,
            size: row.get(4)?,
        })
    }
}

/// A configured package repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub priority: i32,
    pub last_sync: Option<String>,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new Repository
    pub fn new(name: String, url: String) -> Self {
        Self {
            id: None,
            name,
            url,
            enabled: true,
            priority: 0,
            last_sync: None,
            created_at: None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, url, enabled, priority)
             VALUES (?1, ?2, ?3, ?4)",
            params![&self.name, &self.url, self.enabled as i32, &self.priority],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, last_sync, created_at
             FROM repositories WHERE name = ?1",
        )?;

        let repo = stmt.query_row([name], Self::from_row).optional()?;
        Ok(repo)
    }

    /// List all repositories, priority-descending then name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, last_sync, created_at
             FROM repositories ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// List enabled repositories, priority-descending then name
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, last_sync, created_at
             FROM repositories WHERE enabled = 1 ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Update repository metadata
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::Init("Cannot update repository without ID".to_string()))?;

        conn.execute(
            "UPDATE repositories SET name = ?1, url = ?2, enabled = ?3, priority = ?4, last_sync = ?5
             WHERE id = ?6",
            params![
                &self.name,
                &self.url,
                self.enabled as i32,
                &self.priority,
                &self.last_sync,
                id,
            ],
        )?;
        Ok(())
    }

    /// Delete a repository by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            url: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
            priority: row.get(4)?,
            last_sync: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

/// A package descriptor synced from a repository
#[derive(Debug, Clone)]
pub struct RepoPackage {
    pub id: Option<i64>,
    pub repository_id: i64,
    pub name: String,
    pub version: String,
    pub sumsha: String,
    pub size: i64,
    pub description: Option<String>,
    pub download_url: Option<String>,
    pub depends: String,
    pub conflicts: String,
    pub synced_at: Option<String>,
}

impl RepoPackage {
    /// Create a new RepoPackage
    pub fn new(
        repository_id: i64,
        name: String,
        version: String,
        sumsha: String,
        size: i64,
    ) -> Self {
        Self {
            id: None,
            repository_id,
            name,
            version,
            sumsha,
            size,
            description: None,
            download_url: None,
            depends: "[]".to_string(),
            conflicts: "[]".to_string(),
            synced_at: None,
        }
    }

    /// Insert this descriptor row into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repository_packages
             (repository_id, name, version, sumsha, size, description, download_url, depends, conflicts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.repository_id,
                &self.name,
                &self.version,
                &self.sumsha,
                &self.size,
                &self.description,
                &self.download_url,
                &self.depends,
                &self.conflicts,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find descriptors by repository ID, in sync order
    pub fn find_by_repository(conn: &Connection, repository_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, name, version, sumsha, size, description, download_url,
                    depends, conflicts, synced_at
             FROM repository_packages WHERE repository_id = ?1 ORDER BY id",
        )?;

        let packages = stmt
            .query_map([repository_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Delete all descriptors for a repository (used when syncing)
    pub fn delete_by_repository(conn: &Connection, repository_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM repository_packages WHERE repository_id = ?1",
            [repository_id],
        )?;
        Ok(())
    }

    /// Convert a database row to a RepoPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repository_id: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
            sumsha: row.get(4)?,
            size: row.get(5)?,
            description: row.get(6)?,
            download_url: row.get(7)?,
            depends: row.get(8)?,
            conflicts: row.get(9)?,
            synced_at: row.get(10)?,
        })
    }
}
