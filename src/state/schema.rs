// src/state/schema.rs

//! Database schema definitions and migrations for the prefix state store

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying state schema migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Installed-state snapshot:
/// - installed: one row per installed package name
/// - installed_files: per-package file manifest
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Installed packages: at most one version per name
        CREATE TABLE installed (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            sumsha TEXT NOT NULL,
            size INTEGER NOT NULL,
            description TEXT,
            depends TEXT NOT NULL DEFAULT '[]',
            conflicts TEXT NOT NULL DEFAULT '[]',
            installed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_installed_sumsha ON installed(sumsha);

        -- File manifest of each installed package
        CREATE TABLE installed_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL,
            path TEXT NOT NULL,
            sumsha TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            UNIQUE(package_name, path),
            FOREIGN KEY (package_name) REFERENCES installed(name) ON DELETE CASCADE
        );

        CREATE INDEX idx_installed_files_package ON installed_files(package_name);
        ",
    )?;

    info!("State schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: Repository configuration and synced descriptors
///
/// - repositories: configured package sources
/// - repository_packages: descriptor rows synced from each repository
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Repositories: configured package sources
        CREATE TABLE repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            last_sync TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_repositories_enabled ON repositories(enabled);

        -- Package descriptors synced from repositories
        CREATE TABLE repository_packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            sumsha TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            download_url TEXT,
            depends TEXT NOT NULL DEFAULT '[]',
            conflicts TEXT NOT NULL DEFAULT '[]',
            synced_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(repository_id, name, version, sumsha),
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_repo_packages_name ON repository_packages(name);
        CREATE INDEX idx_repo_packages_repo ON repository_packages(repository_id);
        CREATE INDEX idx_repo_packages_sumsha ON repository_packages(sumsha);
        ",
    )?;

    info!("State schema version 2 applied successfully");
    Ok(())
}
