// src/checksum.rs

//! Content digests for package identity and integrity
//!
//! Every package archive is identified by its sumsha: the SHA-256 digest of
//! its content, rendered as 64 lowercase hex characters. The sumsha is the
//! canonical package identity key, the integrity check for downloads, and
//! the name of the cache entry holding the archive (identical content is
//! never stored twice).

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Length of a sumsha string: SHA-256 in hex, '\0' not included
pub const SUMSHA_HEX_LEN: usize = 64;

/// Compute the sumsha of a byte stream
///
/// Streams the reader through the hasher so content never has to be
/// fully resident in memory.
pub fn digest_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the sumsha of a file's content
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    digest_reader(&mut file)
}

/// Check that a string is a well-formed sumsha (64 lowercase hex chars)
pub fn is_valid_sumsha(s: &str) -> bool {
    s.len() == SUMSHA_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Verify a file's content against an expected sumsha
///
/// Returns `Error::Integrity` naming both digests on mismatch.
pub fn verify_file(path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying sumsha for {}", path.display());

    let actual = digest_file(path)?;
    if actual != expected {
        return Err(Error::Integrity {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Sumsha verified: {}", expected);
    Ok(())
}

/// Cache entry file name for a package archive with the given sumsha
pub fn cache_entry_name(sumsha: &str) -> String {
    format!("{}.pakt", sumsha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_digest_is_deterministic_and_fixed_length() {
        let data = b"pakt test payload";
        let d1 = digest_reader(&mut &data[..]).unwrap();
        let d2 = digest_reader(&mut &data[..]).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), SUMSHA_HEX_LEN);
        assert!(is_valid_sumsha(&d1));
    }

    #[test]
    fn test_digest_changes_with_content() {
        let d1 = digest_reader(&mut &b"payload a"[..]).unwrap();
        let d2 = digest_reader(&mut &b"payload b"[..]).unwrap();
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_digest_file_matches_digest_reader() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"file content").unwrap();
        temp.flush().unwrap();

        let from_file = digest_file(temp.path()).unwrap();
        let from_reader = digest_reader(&mut &b"file content"[..]).unwrap();
        assert_eq!(from_file, from_reader);
    }

    #[test]
    fn test_verify_file_detects_mismatch() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"original").unwrap();
        temp.flush().unwrap();

        let good = digest_file(temp.path()).unwrap();
        assert!(verify_file(temp.path(), &good).is_ok());

        let bad = "0".repeat(SUMSHA_HEX_LEN);
        let err = verify_file(temp.path(), &bad).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[test]
    fn test_is_valid_sumsha() {
        assert!(is_valid_sumsha(&"a1".repeat(32)));
        assert!(!is_valid_sumsha("a1b2"));
        assert!(!is_valid_sumsha(&"G1".repeat(32)));
        assert!(!is_valid_sumsha(&"A1".repeat(32))); // Uppercase rejected
    }

    #[test]
    fn test_cache_entry_name() {
        let sumsha = "ab".repeat(32);
        assert_eq!(cache_entry_name(&sumsha), format!("{}.pakt", sumsha));
    }
}
