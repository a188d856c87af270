//! Content digests for sentinel names.
//!
//! Sentinels are keyed by the SHA-256 of the input file so that a changed
//! provisioning script re-runs while an unchanged one stays gated.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Sentinel name for an install script: `<script-basename>-<hex sha256>`.
pub fn install_sentinel_name(script_basename: &str, digest: &str) -> String {
    format!("{script_basename}-{digest}")
}

/// Sentinel name for a Brewfile: `<pack>_<brewfile-basename>-<hex sha256>`.
pub fn homebrew_sentinel_name(pack: &str, brewfile_basename: &str, digest: &str) -> String {
    format!("{pack}_{brewfile_basename}-{digest}")
}
