//! Shared repository utilities.
//!
//! Histories are stored one directory per identifier under a two-level shard derived from the
//! SHA-256 of the identifier:
//!
//! ```text
//! <parent_dir>/<s1>/<s2>/<identifier>/
//! ```
//!
//! where `s1` and `s2` are the first and second pairs of hex characters of the digest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Compute the sharded directory for `identifier` under `parent_dir`.
///
/// Identifiers are validated as path-safe before they reach this point.
pub(crate) fn sharded_dir(parent_dir: &Path, identifier: &str) -> PathBuf {
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    parent_dir
        .join(&digest[0..2])
        .join(&digest[2..4])
        .join(identifier)
}
