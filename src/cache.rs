//! On-disk cache layout.
//!
//! Everything lives under one fixed directory in the system temp path:
//!
//! ```text
//! <tmp>/layerlens/
//!   layers/<digest-hex>/   extracted layer trees, shared across commands
//!   compare/base/          squash scratch for `compare files`,
//!   compare/target/        recreated on every invocation
//! ```

use crate::error::{LensError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the hex portion of an `<algorithm>:<hex>` digest; a bare hex
/// string passes through unchanged. The result lands in a path component,
/// so anything but ASCII alphanumerics is rejected.
pub fn digest_hex(digest: &str) -> Result<&str> {
    let hex = match digest.split_once(':') {
        Some((_, hex)) => hex,
        None => digest,
    };
    if hex.is_empty() {
        return Err(LensError::DataInconsistency(
            "layer digest is empty".to_string(),
        ));
    }
    if !hex.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LensError::DataInconsistency(format!(
            "layer digest {:?} is not hex",
            digest
        )));
    }
    Ok(hex)
}

#[derive(Debug, Clone)]
pub struct LayerCache {
    root: PathBuf,
}

impl LayerCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The fixed per-product cache location.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("layerlens")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layers_dir(&self) -> PathBuf {
        self.root.join("layers")
    }

    /// Directory holding one extracted layer, keyed by digest hex.
    pub fn layer_dir(&self, digest: &str) -> Result<PathBuf> {
        Ok(self.layers_dir().join(digest_hex(digest)?))
    }

    /// The `compare/{base,target}` scratch pair, deleted and recreated so
    /// stale trees from an earlier invocation can never leak into a diff.
    pub fn compare_scratch(&self) -> Result<(PathBuf, PathBuf)> {
        let compare = self.root.join("compare");
        let base = compare.join("base");
        let target = compare.join("target");
        for dir in [&base, &target] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| LensError::filesystem(dir, e))?;
            }
            fs::create_dir_all(dir).map_err(|e| LensError::filesystem(dir, e))?;
        }
        Ok((base, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn digest_hex_strips_the_algorithm_prefix() {
        assert_eq!(digest_hex("sha256:abc123").unwrap(), "abc123");
        assert_eq!(digest_hex("abc123").unwrap(), "abc123");
    }

    #[test]
    fn empty_or_unsafe_digests_are_rejected() {
        assert!(digest_hex("").is_err());
        assert!(digest_hex("sha256:").is_err());
        assert!(digest_hex("sha256:../escape").is_err());
    }

    #[test]
    fn layer_dir_is_keyed_by_hex() {
        let cache = LayerCache::new("/cache");
        let dir = cache.layer_dir("sha256:abc123").unwrap();
        assert_eq!(dir, PathBuf::from("/cache/layers/abc123"));
    }

    #[test]
    fn compare_scratch_starts_empty_every_time() {
        let root = tempdir().unwrap();
        let cache = LayerCache::new(root.path());

        let (base, target) = cache.compare_scratch().unwrap();
        fs::write(base.join("stale.txt"), b"old").unwrap();
        fs::write(target.join("stale.txt"), b"old").unwrap();

        let (base, target) = cache.compare_scratch().unwrap();
        assert!(!base.join("stale.txt").exists());
        assert!(!target.join("stale.txt").exists());
    }
}
