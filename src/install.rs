// src/install.rs

//! Plan applier
//!
//! Executes an accepted action plan against a prefix: archives are fetched
//! into the content-addressed cache and verified, `.pakt` payloads (gzipped
//! tar) are unpacked under the prefix root, and the installed-state rows are
//! rewritten one transaction per action. The solver never touches any of
//! this; by the time a plan reaches the applier it is already validated and
//! ordered.

use crate::checksum;
use crate::error::Result;
use crate::prefix::PrefixContext;
use crate::repository;
use crate::solver::{Action, ActionPlan};
use crate::state;
use crate::state::models::{InstalledFile, InstalledPackage, dep_entries_to_json};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One file deployed from an archive
struct ManifestEntry {
    path: String,
    sumsha: String,
    size: i64,
}

/// Apply a solved plan to the prefix, action by action, in plan order
pub fn apply_plan(ctx: &mut PrefixContext, plan: &ActionPlan) -> Result<()> {
    for action in plan.iter() {
        match action {
            Action::Install { pkg } | Action::Upgrade { pkg, .. } => {
                install_package(ctx, pkg)?;
            }
            Action::Remove { name, .. } => {
                remove_package(ctx, name)?;
            }
        }
    }
    Ok(())
}

/// Install (or replace) one package from its cached archive
fn install_package(ctx: &mut PrefixContext, pkg: &crate::index::Package) -> Result<()> {
    let archive = repository::fetch_into_cache(pkg, &ctx.cache_dir())?;

    // Capture the outgoing manifest before unpacking so files the new
    // version no longer ships can be cleaned up
    let old_files = InstalledFile::find_by_package(&ctx.conn, &pkg.name)?;
    let manifest = unpack_archive(&archive, &ctx.root)?;

    let new_paths: HashSet<&str> = manifest.iter().map(|m| m.path.as_str()).collect();
    for old in &old_files {
        if !new_paths.contains(old.path.as_str()) {
            remove_prefix_file(&ctx.root, &old.path)?;
        }
    }

    state::transaction(&mut ctx.conn, |tx| {
        // Replaces any previous version; the old file rows cascade away
        InstalledPackage::delete(tx, &pkg.name)?;

        let mut row = InstalledPackage::new(
            pkg.name.clone(),
            pkg.version.to_string(),
            pkg.sumsha.clone(),
            pkg.size as i64,
        );
        row.description = pkg.description.clone();
        row.depends = dep_entries_to_json(&pkg.depends);
        row.conflicts = dep_entries_to_json(&pkg.conflicts);
        row.insert(tx)?;

        for entry in &manifest {
            InstalledFile::new(
                pkg.name.clone(),
                entry.path.clone(),
                Some(entry.sumsha.clone()),
                entry.size,
            )
            .insert(tx)?;
        }
        Ok(())
    })?;

    info!(
        "Installed {} ({}): {} files",
        pkg.name,
        pkg.version,
        manifest.len()
    );
    Ok(())
}

/// Remove one installed package: its files, then its state rows
fn remove_package(ctx: &mut PrefixContext, name: &str) -> Result<()> {
    let files = InstalledFile::find_by_package(&ctx.conn, name)?;
    for file in &files {
        remove_prefix_file(&ctx.root, &file.path)?;
    }

    state::transaction(&mut ctx.conn, |tx| InstalledPackage::delete(tx, name))?;

    info!("Removed {}: {} files", name, files.len());
    Ok(())
}

/// Unpack a gzipped tar archive under the prefix root
///
/// Entries resolving outside the prefix (absolute paths, parent-dir
/// escapes) are skipped with a warning. Returns the manifest of deployed
/// regular files.
fn unpack_archive(archive: &Path, root: &Path) -> Result<Vec<ManifestEntry>> {
    let file = File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    let mut manifest = Vec::new();

    for entry in tarball.entries()? {
        let mut entry = entry?;
        let rel: PathBuf = entry.path()?.into_owned();
        let is_file = entry.header().entry_type().is_file();
        let size = entry.header().size()? as i64;

        if !entry.unpack_in(root)? {
            warn!("Skipping archive entry with unsafe path: {}", rel.display());
            continue;
        }

        if is_file {
            let sumsha = checksum::digest_file(&root.join(&rel))?;
            manifest.push(ManifestEntry {
                path: rel.to_string_lossy().into_owned(),
                sumsha,
                size,
            });
        }
    }

    Ok(manifest)
}

/// Delete one deployed file; a file already gone is not an error
fn remove_prefix_file(root: &Path, rel_path: &str) -> Result<()> {
    match fs::remove_file(root.join(rel_path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;
    use std::path::Path;

    /// Build a .pakt archive (gzipped tar) from in-memory files and return
    /// its sumsha
    pub fn make_archive(dest: &Path, files: &[(&str, &[u8])]) -> String {
        let file = File::create(dest).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            // Write the path directly into the header's name field. The
            // high-level `set_path`/`append_data` reject entries containing
            // `..`, but the escape-handling test needs such entries to exist
            // in the archive so `unpack_archive` can be observed skipping them.
            {
                let name_field = &mut header.as_gnu_mut().unwrap().name;
                let bytes = path.as_bytes();
                name_field[..bytes.len()].copy_from_slice(bytes);
            }
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
        crate::checksum::digest_file(dest).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_archive;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unpack_archive_deploys_files_and_reports_manifest() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pakt");
        make_archive(
            &archive,
            &[
                ("bin/hello", b"#!/bin/sh\necho hello\n".as_slice()),
                ("share/hello/readme", b"hi".as_slice()),
            ],
        );

        let root = dir.path().join("prefix");
        fs::create_dir_all(&root).unwrap();
        let manifest = unpack_archive(&archive, &root).unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(root.join("bin/hello").is_file());
        assert!(root.join("share/hello/readme").is_file());

        let readme = manifest
            .iter()
            .find(|m| m.path == "share/hello/readme")
            .unwrap();
        assert_eq!(readme.size, 2);
        assert_eq!(
            readme.sumsha,
            checksum::digest_reader(&mut &b"hi"[..]).unwrap()
        );
    }

    #[test]
    fn test_unpack_archive_skips_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.pakt");
        make_archive(
            &archive,
            &[
                ("../escape", b"nope".as_slice()),
                ("bin/ok", b"fine".as_slice()),
            ],
        );

        let root = dir.path().join("prefix");
        fs::create_dir_all(&root).unwrap();
        let manifest = unpack_archive(&archive, &root).unwrap();

        let paths: Vec<&str> = manifest.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["bin/ok"]);
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_remove_prefix_file_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        assert!(remove_prefix_file(dir.path(), "not/there").is_ok());
    }
}
