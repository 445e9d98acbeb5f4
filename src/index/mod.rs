// src/index/mod.rs

//! Binary package index
//!
//! The binary index is the merged, in-memory view of every package declared
//! by the configured repositories. Descriptor lists are merged one repository
//! at a time: two repositories declaring the same (name, version, sumsha)
//! identity share a single canonical record whose provenance set is the union
//! of both, while the same (name, version) under different digests stays as
//! distinct records so callers can disambiguate by sumsha.
//!
//! The index is read-only after construction and lives for the duration of
//! one command invocation.

pub mod rdeps;

use crate::checksum;
use crate::error::{Error, Result};
use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Identity key for a canonical package record
///
/// Replaces pointer-equality comparisons: two records are the same package
/// iff name, version, and content digest all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub name: String,
    pub version: Version,
    pub sumsha: String,
}

/// A parsed dependency or conflict entry: target name plus version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEntry {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl DepEntry {
    /// Parse a raw descriptor entry
    pub fn from_spec(spec: &DepSpec) -> Result<Self> {
        if spec.name.is_empty() {
            return Err(Error::Parse("Dependency entry with empty name".to_string()));
        }
        let constraint = match &spec.constraint {
            Some(s) => VersionConstraint::parse(s)?,
            None => VersionConstraint::Any,
        };
        Ok(Self {
            name: spec.name.clone(),
            constraint,
        })
    }

    /// Parse a whole descriptor entry list
    pub fn from_specs(specs: &[DepSpec]) -> Result<Vec<Self>> {
        specs.iter().map(Self::from_spec).collect()
    }

    /// Convert back to the raw descriptor form
    pub fn to_spec(&self) -> DepSpec {
        DepSpec {
            name: self.name.clone(),
            constraint: match &self.constraint {
                VersionConstraint::Any => None,
                c => Some(c.to_string()),
            },
        }
    }
}

impl fmt::Display for DepEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            VersionConstraint::Any => write!(f, "{}", self.name),
            c => write!(f, "{} {}", self.name, c),
        }
    }
}

/// Raw dependency/conflict entry as published in repository metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepSpec {
    /// Target package name
    pub name: String,

    /// Version constraint (e.g., ">= 1.0.0"); absent means any version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

/// Raw package descriptor as published in a repository's metadata.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name
    pub name: String,

    /// Package version string
    pub version: String,

    /// Content digest of the package archive (64 hex chars)
    pub sumsha: String,

    /// Archive size in bytes
    #[serde(default)]
    pub size: u64,

    /// Short package description
    #[serde(default)]
    pub description: Option<String>,

    /// Full URL to download the package archive
    #[serde(default)]
    pub download_url: Option<String>,

    /// Runtime dependencies
    #[serde(default)]
    pub depends: Vec<DepSpec>,

    /// Declared conflicts
    #[serde(default)]
    pub conflicts: Vec<DepSpec>,
}

/// A canonical package record owned by the binary index
///
/// Immutable once the index is built; the provenance set is only extended
/// while descriptor lists are being merged.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub sumsha: String,
    pub size: u64,
    pub description: Option<String>,
    pub download_url: Option<String>,
    pub depends: Vec<DepEntry>,
    pub conflicts: Vec<DepEntry>,
    /// Names of the repositories that declare this package
    pub repositories: BTreeSet<String>,
}

impl Package {
    /// The identity key of this record
    pub fn id(&self) -> PackageId {
        PackageId {
            name: self.name.clone(),
            version: self.version.clone(),
            sumsha: self.sumsha.clone(),
        }
    }

    /// Whether a repository declares this package
    pub fn in_repository(&self, repo: &str) -> bool {
        self.repositories.contains(repo)
    }

    fn from_descriptor(desc: &PackageDescriptor) -> Result<Self> {
        if desc.name.is_empty() {
            return Err(Error::Parse("Descriptor with empty package name".to_string()));
        }
        if !checksum::is_valid_sumsha(&desc.sumsha) {
            return Err(Error::Parse(format!(
                "Descriptor for '{}' has malformed sumsha '{}'",
                desc.name, desc.sumsha
            )));
        }
        let version = Version::parse(&desc.version)
            .map_err(|e| Error::Parse(format!("Descriptor for '{}': {}", desc.name, e)))?;

        Ok(Self {
            name: desc.name.clone(),
            version,
            sumsha: desc.sumsha.clone(),
            size: desc.size,
            description: desc.description.clone(),
            download_url: desc.download_url.clone(),
            depends: DepEntry::from_specs(&desc.depends)
                .map_err(|e| Error::Parse(format!("Descriptor for '{}': {}", desc.name, e)))?,
            conflicts: DepEntry::from_specs(&desc.conflicts)
                .map_err(|e| Error::Parse(format!("Descriptor for '{}': {}", desc.name, e)))?,
            repositories: BTreeSet::new(),
        })
    }
}

/// A skipped descriptor, recorded per repository during the index build
#[derive(Debug, Clone)]
pub struct IndexWarning {
    pub repository: String,
    pub detail: String,
}

/// The merged package index over all configured repositories
#[derive(Debug, Default)]
pub struct BinaryIndex {
    /// Canonical records; position is the stable internal handle
    packages: Vec<Package>,
    /// Package name → record positions, in repository submission order
    by_name: HashMap<String, Vec<usize>>,
    /// Identity → record position (the merge-rule invariant holder)
    by_id: HashMap<PackageId, usize>,
    /// Sumsha → record position (first submission wins)
    by_sumsha: HashMap<String, usize>,
}

impl BinaryIndex {
    /// Build the index from per-repository descriptor lists
    ///
    /// Lists are merged in the given repository order. A malformed descriptor
    /// (empty name, unparsable version or constraint, bad sumsha) is skipped
    /// and recorded as a warning for its repository; it never aborts the
    /// indexing of other descriptors.
    pub fn build(lists: &[(String, Vec<PackageDescriptor>)]) -> (Self, Vec<IndexWarning>) {
        let mut index = Self::default();
        let mut warnings = Vec::new();

        for (repo_name, descriptors) in lists {
            for desc in descriptors {
                match Package::from_descriptor(desc) {
                    Ok(pkg) => index.insert(pkg, repo_name),
                    Err(e) => {
                        warn!("Skipping descriptor from repository '{}': {}", repo_name, e);
                        warnings.push(IndexWarning {
                            repository: repo_name.clone(),
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }

        debug!(
            "Built binary index: {} packages from {} repositories ({} descriptors skipped)",
            index.packages.len(),
            lists.len(),
            warnings.len()
        );
        (index, warnings)
    }

    /// Insert one record, applying the merge rule
    fn insert(&mut self, mut pkg: Package, repo_name: &str) {
        let id = pkg.id();
        if let Some(&pos) = self.by_id.get(&id) {
            // Identical identity already known: union provenance, never a
            // second canonical record
            self.packages[pos].repositories.insert(repo_name.to_string());
            return;
        }

        pkg.repositories.insert(repo_name.to_string());
        let pos = self.packages.len();
        self.by_name.entry(pkg.name.clone()).or_default().push(pos);
        self.by_sumsha.entry(pkg.sumsha.clone()).or_insert(pos);
        self.by_id.insert(id, pos);
        self.packages.push(pkg);
    }

    /// All known versions of a name, version-descending
    ///
    /// Records with equal versions (digest divergence) keep repository
    /// submission order.
    pub fn find_by_name(&self, name: &str) -> Vec<&Package> {
        let mut found: Vec<&Package> = self
            .by_name
            .get(name)
            .map(|positions| positions.iter().map(|&p| &self.packages[p]).collect())
            .unwrap_or_default();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        found
    }

    /// Exact (name, version) lookup; absence is not an error
    pub fn find_by_name_version(&self, name: &str, version: &Version) -> Option<&Package> {
        self.by_name.get(name).and_then(|positions| {
            positions
                .iter()
                .map(|&p| &self.packages[p])
                .find(|pkg| &pkg.version == version)
        })
    }

    /// Exact identity lookup by content digest
    pub fn find_by_sumsha(&self, sumsha: &str) -> Option<&Package> {
        self.by_sumsha.get(sumsha).map(|&p| &self.packages[p])
    }

    /// Iterate over every canonical record
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    /// Number of canonical records
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Verify declared digests against archives present in the cache
    ///
    /// Only archives that are actually cached can be checked; a mismatch
    /// aborts with `Integrity`.
    pub fn verify_cache(&self, cache_dir: &Path) -> Result<()> {
        for pkg in &self.packages {
            let archive = cache_dir.join(checksum::cache_entry_name(&pkg.sumsha));
            if archive.exists() {
                checksum::verify_file(&archive, &pkg.sumsha)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Shorthand descriptor builder used across the engine tests
    pub fn descriptor(
        name: &str,
        version: &str,
        sumsha_seed: u8,
        depends: &[(&str, &str)],
    ) -> PackageDescriptor {
        PackageDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            sumsha: format!("{:02x}", sumsha_seed).repeat(32),
            size: 1024,
            description: None,
            download_url: None,
            depends: depends
                .iter()
                .map(|(n, c)| DepSpec {
                    name: n.to_string(),
                    constraint: if c.is_empty() {
                        None
                    } else {
                        Some(c.to_string())
                    },
                })
                .collect(),
            conflicts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::descriptor;
    use super::*;

    #[test]
    fn test_find_by_name_version_and_sumsha_return_inserted_identity() {
        let lists = vec![(
            "main".to_string(),
            vec![descriptor("hello", "1.2.0", 0xaa, &[])],
        )];
        let (index, warnings) = BinaryIndex::build(&lists);
        assert!(warnings.is_empty());

        let version = Version::parse("1.2.0").unwrap();
        let by_nv = index.find_by_name_version("hello", &version).unwrap();
        let by_sum = index.find_by_sumsha(&"aa".repeat(32)).unwrap();
        assert_eq!(by_nv.id(), by_sum.id());
        assert_eq!(by_nv.name, "hello");
    }

    #[test]
    fn test_merge_unions_provenance_for_identical_identity() {
        let lists = vec![
            (
                "alpha".to_string(),
                vec![descriptor("hello", "1.0.0", 0xaa, &[])],
            ),
            (
                "beta".to_string(),
                vec![descriptor("hello", "1.0.0", 0xaa, &[])],
            ),
        ];
        let (index, warnings) = BinaryIndex::build(&lists);
        assert!(warnings.is_empty());

        // Exactly one canonical record with both repositories
        assert_eq!(index.len(), 1);
        let pkg = index.find_by_name("hello")[0];
        let repos: Vec<&str> = pkg.repositories.iter().map(|s| s.as_str()).collect();
        assert_eq!(repos, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_digest_divergence_keeps_distinct_records() {
        let lists = vec![
            (
                "alpha".to_string(),
                vec![descriptor("hello", "1.0.0", 0xaa, &[])],
            ),
            (
                "beta".to_string(),
                vec![descriptor("hello", "1.0.0", 0xbb, &[])],
            ),
        ];
        let (index, _) = BinaryIndex::build(&lists);

        // Same (name, version), different digests: both records kept,
        // disambiguated by sumsha
        assert_eq!(index.len(), 2);
        assert!(index.find_by_sumsha(&"aa".repeat(32)).is_some());
        assert!(index.find_by_sumsha(&"bb".repeat(32)).is_some());
    }

    #[test]
    fn test_find_by_name_is_version_descending() {
        let lists = vec![(
            "main".to_string(),
            vec![
                descriptor("hello", "1.0.0", 0x01, &[]),
                descriptor("hello", "2.0.0", 0x02, &[]),
                descriptor("hello", "1.5.0", 0x03, &[]),
            ],
        )];
        let (index, _) = BinaryIndex::build(&lists);

        let versions: Vec<String> = index
            .find_by_name("hello")
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2.0.0", "1.5.0", "1.0.0"]);
    }

    #[test]
    fn test_build_skips_malformed_descriptor_and_warns() {
        let bad_version = descriptor("broken", "", 0x0c, &[]);
        let mut bad_sumsha = descriptor("short-sum", "1.0.0", 0x0d, &[]);
        bad_sumsha.sumsha = "abc123".to_string();

        let lists = vec![
            (
                "alpha".to_string(),
                vec![bad_version, descriptor("good", "1.0.0", 0x0e, &[])],
            ),
            ("beta".to_string(), vec![bad_sumsha]),
        ];
        let (index, warnings) = BinaryIndex::build(&lists);

        // Malformed entries are skipped per repository, valid ones index
        assert_eq!(index.len(), 1);
        assert!(index.find_by_name("good").len() == 1);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].repository, "alpha");
        assert_eq!(warnings[1].repository, "beta");
    }

    #[test]
    fn test_find_by_name_version_absent_is_none() {
        let (index, _) = BinaryIndex::build(&[]);
        let version = Version::parse("1.0.0").unwrap();
        assert!(index.find_by_name_version("ghost", &version).is_none());
        assert!(index.find_by_sumsha(&"00".repeat(32)).is_none());
        assert!(index.find_by_name("ghost").is_empty());
    }

    #[test]
    fn test_dep_entries_are_parsed_from_specs() {
        let lists = vec![(
            "main".to_string(),
            vec![descriptor(
                "app",
                "1.0.0",
                0x10,
                &[("libfoo", ">= 1.2.0"), ("libbar", "")],
            )],
        )];
        let (index, _) = BinaryIndex::build(&lists);

        let app = index.find_by_name("app")[0];
        assert_eq!(app.depends.len(), 2);
        assert_eq!(app.depends[0].name, "libfoo");
        assert!(
            app.depends[0]
                .constraint
                .satisfies(&Version::parse("1.2.0").unwrap())
        );
        assert_eq!(app.depends[1].constraint, VersionConstraint::Any);
    }

    #[test]
    fn test_verify_cache_detects_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"archive content";
        let sumsha = crate::checksum::digest_reader(&mut &payload[..]).unwrap();

        let mut desc = descriptor("app", "1.0.0", 0x00, &[]);
        desc.sumsha = sumsha.clone();
        let (index, _) = BinaryIndex::build(&[("main".to_string(), vec![desc])]);

        // Nothing cached: verification is a no-op
        assert!(index.verify_cache(dir.path()).is_ok());

        // Matching archive passes
        let entry = dir.path().join(checksum::cache_entry_name(&sumsha));
        std::fs::write(&entry, payload).unwrap();
        assert!(index.verify_cache(dir.path()).is_ok());

        // Corrupted archive fails with Integrity
        std::fs::write(&entry, b"tampered").unwrap();
        let err = index.verify_cache(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }
}
