// src/prefix.rs

//! Prefix context
//!
//! A prefix is an isolated, user-owned installation root (similar to a
//! virtualenv sandbox). Each prefix carries its own state database and
//! package cache:
//!
//! - `var/lib/pakt/state.db`    installed state, repositories, descriptors
//! - `var/cache/pakt/pkgs/`     content-addressed package archive cache
//!
//! The active prefix is resolved from the `--prefix` flag, then the
//! `PAKT_PREFIX` environment variable, then a per-user default.

use crate::error::{Error, Result};
use crate::index::{BinaryIndex, IndexWarning, PackageDescriptor};
use crate::state::models::{RepoPackage, Repository};
use crate::state::{self, InstalledState};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// State database location inside a prefix
pub const STATE_DB_RELPATH: &str = "var/lib/pakt/state.db";

/// Package archive cache inside a prefix
pub const PKGS_CACHE_RELPATH: &str = "var/cache/pakt/pkgs";

/// Environment variable naming the active prefix
pub const PREFIX_ENV_VAR: &str = "PAKT_PREFIX";

/// An opened prefix: root directory plus state database connection
#[derive(Debug)]
pub struct PrefixContext {
    pub root: PathBuf,
    pub conn: Connection,
}

/// Resolve the active prefix root: flag, then environment, then the
/// per-user default (`$HOME/.pakt/default`)
pub fn resolve_root(flag: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = env::var_os(PREFIX_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .ok_or_else(|| {
            Error::Init("Cannot determine the default prefix: no HOME in environment".to_string())
        })?;
    Ok(PathBuf::from(home).join(".pakt").join("default"))
}

impl PrefixContext {
    /// Create a new prefix skeleton and its state database
    ///
    /// Idempotent on an existing prefix.
    pub fn create(root: &Path) -> Result<Self> {
        info!("Creating prefix at: {}", root.display());

        for dir in ["bin", "lib", PKGS_CACHE_RELPATH] {
            std::fs::create_dir_all(root.join(dir))
                .map_err(|e| Error::Init(format!("Failed to create prefix directory: {}", e)))?;
        }

        let conn = state::init(&root.join(STATE_DB_RELPATH))?;
        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// Open an existing prefix
    pub fn open(root: &Path) -> Result<Self> {
        let conn = state::open(&root.join(STATE_DB_RELPATH))?;
        debug!("Opened prefix at: {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// The package archive cache directory of this prefix
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(PKGS_CACHE_RELPATH)
    }

    /// Load the installed-state snapshot
    pub fn load_installed(&self) -> Result<InstalledState> {
        InstalledState::load(&self.conn)
    }

    /// Build the binary index from the synced descriptors of every enabled
    /// repository, in priority order
    ///
    /// Malformed descriptors are skipped with a warning; cached archives are
    /// verified against their declared digests.
    pub fn load_index(&self) -> Result<(BinaryIndex, Vec<IndexWarning>)> {
        let mut lists: Vec<(String, Vec<PackageDescriptor>)> = Vec::new();

        for repo in Repository::list_enabled(&self.conn)? {
            let repo_id = repo
                .id
                .ok_or_else(|| Error::Init("Repository row without ID".to_string()))?;
            let descriptors = RepoPackage::find_by_repository(&self.conn, repo_id)?
                .into_iter()
                .map(row_to_descriptor)
                .collect::<Result<Vec<_>>>()?;
            lists.push((repo.name, descriptors));
        }

        let (index, warnings) = BinaryIndex::build(&lists);
        index.verify_cache(&self.cache_dir())?;
        Ok((index, warnings))
    }

    /// Run a command with this prefix's environment injected
    ///
    /// Prepends the prefix bin/lib directories to PATH and LD_LIBRARY_PATH
    /// and exports the prefix location, then waits for the command.
    pub fn run_command(&self, program: &str, args: &[String]) -> Result<i32> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(PREFIX_ENV_VAR, &self.root)
            .env("PATH", prepend_path("PATH", &self.root.join("bin")))
            .env(
                "LD_LIBRARY_PATH",
                prepend_path("LD_LIBRARY_PATH", &self.root.join("lib")),
            );

        debug!("Running '{}' inside prefix {}", program, self.root.display());
        let status = cmd.status().map_err(|e| {
            Error::Init(format!("Failed to run '{}' in prefix: {}", program, e))
        })?;
        Ok(status.code().unwrap_or(1))
    }
}

/// Convert one synced descriptor row into its raw descriptor form
fn row_to_descriptor(row: RepoPackage) -> Result<PackageDescriptor> {
    let depends = serde_json::from_str(&row.depends)
        .map_err(|e| Error::Parse(format!("Descriptor row '{}': {}", row.name, e)))?;
    let conflicts = serde_json::from_str(&row.conflicts)
        .map_err(|e| Error::Parse(format!("Descriptor row '{}': {}", row.name, e)))?;
    Ok(PackageDescriptor {
        name: row.name,
        version: row.version,
        sumsha: row.sumsha,
        size: row.size.max(0) as u64,
        description: row.description,
        download_url: row.download_url,
        depends,
        conflicts,
    })
}

/// Prepend a directory to a PATH-style environment variable
fn prepend_path(var: &str, dir: &Path) -> std::ffi::OsString {
    let mut joined = std::ffi::OsString::from(dir);
    if let Some(existing) = env::var_os(var) {
        if !existing.is_empty() {
            joined.push(if cfg!(windows) { ";" } else { ":" });
            joined.push(existing);
        }
    }
    joined
}
