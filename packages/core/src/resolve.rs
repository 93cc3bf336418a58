//! Device specifier resolution.
//!
//! Fstab may name a device by `UUID=`, `PARTUUID=`, `LABEL=` or `PARTLABEL=`
//! instead of a path in /dev. udev publishes those identifiers as symlinks
//! under `/dev/disk/by-*`, which we follow to the real device node.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// Default root of the udev by-* symlink directories.
pub const DEV_DISK_DIR: &str = "/dev/disk";

/// Identifier prefixes and the by-* directory that publishes them.
const SPEC_PREFIXES: [(&str, &str); 4] = [
    ("UUID=", "by-uuid"),
    ("PARTUUID=", "by-partuuid"),
    ("LABEL=", "by-label"),
    ("PARTLABEL=", "by-partlabel"),
];

/// Maps fstab device specifiers to canonical block-device paths.
#[derive(Debug, Clone)]
pub struct DeviceResolver {
    dev_disk_dir: PathBuf,
}

impl Default for DeviceResolver {
    fn default() -> Self {
        Self::new(DEV_DISK_DIR)
    }
}

impl DeviceResolver {
    /// Creates a resolver rooted at `dev_disk_dir` (normally `/dev/disk`).
    pub fn new(dev_disk_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_disk_dir: dev_disk_dir.into(),
        }
    }

    /// Returns the symlink path that would publish `spec`, if it is an
    /// identifier rather than a path.
    pub fn link_path(&self, spec: &str) -> Option<PathBuf> {
        SPEC_PREFIXES.iter().find_map(|(prefix, dir)| {
            spec.strip_prefix(prefix)
                .map(|id| self.dev_disk_dir.join(dir).join(id))
        })
    }

    /// Resolves `spec` to a device path.
    ///
    /// Plain paths are returned unchanged. Identifiers are followed through
    /// their symlink; a missing or dangling link is `DeviceNotFound`.
    pub fn resolve(&self, spec: &str) -> Result<PathBuf> {
        match self.link_path(spec) {
            Some(link) => fs::canonicalize(&link).device_context(spec, &link),
            None => Ok(PathBuf::from(spec)),
        }
    }
}

/// Canonicalizes a device path, falling back to the path itself when it
/// cannot be resolved (eg. a mount source like `tmpfs`).
pub fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
