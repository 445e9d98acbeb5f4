// src/repository/mod.rs

//! Repository management and package downloading
//!
//! This module provides functionality for:
//! - Managing the configured package repositories of a prefix
//! - Synchronizing repository descriptor lists (`metadata.json`)
//! - Downloading package archives with retry support
//! - Verifying downloads against their declared sumsha

use crate::checksum;
use crate::error::{Error, Result};
use crate::index::{Package, PackageDescriptor};
use crate::state::models::{RepoPackage, Repository};
use reqwest::blocking::Client;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Descriptor list served by a repository at `<url>/metadata.json`
#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub packages: Vec<PackageDescriptor>,
}

/// HTTP client wrapper with retry support
pub struct RepoClient {
    client: Client,
    max_retries: u32,
}

impl RepoClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Init(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch a repository's descriptor list with retry support
    pub fn fetch_metadata(&self, url: &str) -> Result<RepositoryMetadata> {
        let metadata_url = if url.ends_with('/') {
            format!("{}metadata.json", url)
        } else {
            format!("{}/metadata.json", url)
        };

        info!("Fetching repository metadata from {}", metadata_url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&metadata_url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            metadata_url
                        )));
                    }

                    let metadata: RepositoryMetadata = response.json().map_err(|e| {
                        Error::Download(format!("Failed to parse metadata JSON: {}", e))
                    })?;

                    info!(
                        "Fetched metadata for {} packages",
                        metadata.packages.len()
                    );
                    return Ok(metadata);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to fetch metadata after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!("Metadata fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download a file to the specified path with retry support
    ///
    /// Writes to a temporary neighbor first and renames into place.
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let temp_path = dest_path.with_extension("tmp");
                    let mut file = File::create(&temp_path)?;
                    io::copy(&mut response, &mut file)?;
                    fs::rename(&temp_path, dest_path)?;

                    info!("Downloaded to {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to download after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

/// Synchronize one repository's descriptor rows from its metadata
pub fn sync_repository(conn: &Connection, repo: &mut Repository) -> Result<usize> {
    info!("Synchronizing repository: {}", repo.name);

    let client = RepoClient::new()?;
    let metadata = client.fetch_metadata(&repo.url)?;
    let repo_id = repo
        .id
        .ok_or_else(|| Error::Init("Repository row without ID".to_string()))?;

    // Replace this repository's descriptors wholesale
    RepoPackage::delete_by_repository(conn, repo_id)?;

    let mut count = 0;
    for desc in metadata.packages {
        let mut row = RepoPackage::new(
            repo_id,
            desc.name,
            desc.version,
            desc.sumsha,
            desc.size as i64,
        );
        row.description = desc.description;
        row.download_url = desc.download_url;
        row.depends = serde_json::to_string(&desc.depends).unwrap_or_else(|_| "[]".to_string());
        row.conflicts = serde_json::to_string(&desc.conflicts).unwrap_or_else(|_| "[]".to_string());
        row.insert(conn)?;
        count += 1;
    }

    repo.last_sync = Some(chrono::Utc::now().to_rfc3339());
    repo.update(conn)?;

    info!("Synchronized {} packages from repository {}", count, repo.name);
    Ok(count)
}

/// Ensure a package's archive is present and verified in the cache
///
/// Returns the cache path. An already-cached archive is verified in place;
/// a fresh download that fails verification is deleted before the error
/// propagates.
pub fn fetch_into_cache(pkg: &Package, cache_dir: &Path) -> Result<PathBuf> {
    let dest = cache_dir.join(checksum::cache_entry_name(&pkg.sumsha));
    if dest.exists() {
        checksum::verify_file(&dest, &pkg.sumsha)?;
        return Ok(dest);
    }

    let url = pkg.download_url.as_deref().ok_or_else(|| {
        Error::Download(format!(
            "no download URL for {} ({})",
            pkg.name, pkg.version
        ))
    })?;

    let client = RepoClient::new()?;
    client.download_file(url, &dest)?;

    if let Err(e) = checksum::verify_file(&dest, &pkg.sumsha) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }
    Ok(dest)
}

/// Add a new repository to the prefix
pub fn add_repository(
    conn: &Connection,
    name: String,
    url: String,
    enabled: bool,
    priority: i32,
) -> Result<Repository> {
    if Repository::find_by_name(conn, &name)?.is_some() {
        return Err(Error::Init(format!("Repository '{}' already exists", name)));
    }

    let mut repo = Repository::new(name, url);
    repo.enabled = enabled;
    repo.priority = priority;
    repo.insert(conn)?;

    info!("Added repository: {} ({})", repo.name, repo.url);
    Ok(repo)
}

/// Remove a repository from the prefix
pub fn remove_repository(conn: &Connection, name: &str) -> Result<()> {
    let repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFound(format!("repository '{}'", name)))?;

    Repository::delete(conn, repo.id.unwrap())?;
    info!("Removed repository: {}", name);
    Ok(())
}

/// Enable or disable a repository
pub fn set_repository_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<()> {
    let mut repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFound(format!("repository '{}'", name)))?;

    repo.enabled = enabled;
    repo.update(conn)?;

    info!(
        "Repository '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
