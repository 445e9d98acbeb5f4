// src/version.rs

//! Version handling and constraint satisfaction for package dependencies
//!
//! Package versions use the `[epoch:]core[-release]` format and are totally
//! ordered: epoch first, then the dotted core, then the release suffix.

use crate::error::{Error, Result};
use semver::Version as SemVersion;
use std::cmp::Ordering;
use std::fmt;

/// A parsed package version with epoch, core, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub epoch: u64,
    pub core: String,
    pub release: Option<String>,
}

impl Version {
    /// Parse a version string
    ///
    /// Format: [epoch:]core[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, core="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, core="1.2.3", release=None
    /// - "1.2.3-4" → epoch=0, core="1.2.3", release=Some("4")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = if let Some(colon_pos) = s.find(':') {
            let (e, r) = s.split_at(colon_pos);
            (e, &r[1..]) // Skip the colon
        } else {
            ("0", s)
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str
                .parse::<u64>()
                .map_err(|e| Error::Parse(format!("Invalid epoch in version '{}': {}", s, e)))?
        };

        let (core, release) = if let Some(dash_pos) = rest.find('-') {
            let (v, r) = rest.split_at(dash_pos);
            (v.to_string(), Some(r[1..].to_string()))
        } else {
            (rest.to_string(), None)
        };

        if core.is_empty() {
            return Err(Error::Parse(format!("Empty version component in '{}'", s)));
        }

        Ok(Self {
            epoch,
            core,
            release,
        })
    }

    /// Normalize the dotted core to a semver::Version for comparison
    ///
    /// Cores that are not semver-compliant get their leading numeric
    /// segments extracted into major.minor.patch.
    fn to_semver(&self) -> Option<SemVersion> {
        if let Ok(v) = SemVersion::parse(&self.core) {
            return Some(v);
        }

        let parts: Vec<&str> = self.core.split('.').collect();
        let major = parts.first().and_then(|s| s.parse::<u64>().ok())?;
        let minor = parts.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        let patch = parts.get(2).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);

        Some(SemVersion::new(major, minor, patch))
    }

    /// Compare two versions: epoch, then core, then release
    pub fn compare(&self, other: &Version) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (self.to_semver(), other.to_semver()) {
            (Some(v1), Some(v2)) => match v1.cmp(&v2) {
                Ordering::Equal => {}
                ord => return ord,
            },
            // Fall back to string comparison for non-numeric cores
            _ => {}
        }

        // String tiebreak keeps the order total and consistent with
        // structural equality ("1.0" and "1.0.0" are distinct versions)
        match self.core.cmp(&other.core) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.release.cmp(&other.release)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.core)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(Version),
    /// Greater than
    GreaterThan(Version),
    /// Greater than or equal
    GreaterOrEqual(Version),
    /// Less than
    LessThan(Version),
    /// Less than or equal
    LessOrEqual(Version),
    /// Not equal
    NotEqual(Version),
    /// Both constraints must be satisfied (for ranges like ">= 1.0, < 2.0")
    And(Box<VersionConstraint>, Box<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - "= 1.5.0" → Exact(1.5.0)
    /// - "" or "*" → Any
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        // Compound constraints, e.g. ">= 1.0, < 2.0"
        if s.contains(',') {
            let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
            if parts.len() == 2 {
                let left = Self::parse(parts[0])?;
                let right = Self::parse(parts[1])?;
                return Ok(VersionConstraint::And(Box::new(left), Box::new(right)));
            }
            return Err(Error::Parse(format!("Invalid compound constraint '{}'", s)));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionConstraint::NotEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(Version::parse(rest)?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(Version::parse(s)?))
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::GreaterThan(v) => version > v,
            VersionConstraint::GreaterOrEqual(v) => version >= v,
            VersionConstraint::LessThan(v) => version < v,
            VersionConstraint::LessOrEqual(v) => version <= v,
            VersionConstraint::NotEqual(v) => version != v,
            VersionConstraint::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_simple() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.core, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_version_parse_with_epoch() {
        let v = Version::parse("2:1.2.3").unwrap();
        assert_eq!(v.epoch, 2);
        assert_eq!(v.core, "1.2.3");
    }

    #[test]
    fn test_version_parse_with_release() {
        let v = Version::parse("1.2.3-4").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.core, "1.2.3");
        assert_eq!(v.release, Some("4".to_string()));
    }

    #[test]
    fn test_version_parse_rejects_empty_core() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("2:").is_err());
    }

    #[test]
    fn test_version_compare_epochs() {
        let v1 = Version::parse("1:1.0.0").unwrap();
        let v2 = Version::parse("0:2.0.0").unwrap();
        assert!(v1 > v2); // Higher epoch wins even with lower core
    }

    #[test]
    fn test_version_compare_cores() {
        let v1 = Version::parse("1.2.3").unwrap();
        let v2 = Version::parse("1.2.4").unwrap();
        assert!(v1 < v2);
        let v3 = Version::parse("1.10.0").unwrap();
        assert!(v2 < v3); // Numeric, not lexicographic
    }

    #[test]
    fn test_version_compare_releases() {
        let v1 = Version::parse("1.2.3-1").unwrap();
        let v2 = Version::parse("1.2.3-2").unwrap();
        assert!(v1 < v2);
    }

    #[test]
    fn test_version_total_order_is_consistent() {
        let mut versions = vec![
            Version::parse("2.0.0").unwrap(),
            Version::parse("1.0.0").unwrap(),
            Version::parse("1:0.1.0").unwrap(),
            Version::parse("1.5.0-1").unwrap(),
        ];
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(rendered, vec!["1.0.0", "1.5.0-1", "2.0.0", "1:0.1.0"]);
    }

    #[test]
    fn test_constraint_parse_exact() {
        let c = VersionConstraint::parse("1.2.3").unwrap();
        assert!(c.satisfies(&Version::parse("1.2.3").unwrap()));
        assert!(!c.satisfies(&Version::parse("1.2.4").unwrap()));
    }

    #[test]
    fn test_constraint_parse_greater_or_equal() {
        let c = VersionConstraint::parse(">= 1.2.0").unwrap();
        assert!(c.satisfies(&Version::parse("1.2.0").unwrap()));
        assert!(c.satisfies(&Version::parse("1.3.0").unwrap()));
        assert!(!c.satisfies(&Version::parse("1.1.0").unwrap()));
    }

    #[test]
    fn test_constraint_parse_less_than() {
        let c = VersionConstraint::parse("< 2.0.0").unwrap();
        assert!(c.satisfies(&Version::parse("1.9.9").unwrap()));
        assert!(!c.satisfies(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn test_constraint_range() {
        let c = VersionConstraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert!(c.satisfies(&Version::parse("1.5.0").unwrap()));
        assert!(!c.satisfies(&Version::parse("2.0.0").unwrap()));
        assert!(!c.satisfies(&Version::parse("0.9.0").unwrap()));
    }

    #[test]
    fn test_constraint_any() {
        let c = VersionConstraint::parse("*").unwrap();
        assert!(c.satisfies(&Version::parse("99.99.99").unwrap()));
        let empty = VersionConstraint::parse("").unwrap();
        assert_eq!(empty, VersionConstraint::Any);
    }

    #[test]
    fn test_constraint_display_roundtrip() {
        for s in [">= 1.2.0", "< 2.0.0", ">= 1.0.0, < 2.0.0", "*"] {
            let c = VersionConstraint::parse(s).unwrap();
            assert_eq!(c.to_string(), s);
        }
    }
}
