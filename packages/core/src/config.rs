//! Run configuration.

use std::path::{Path, PathBuf};

use crate::executor::PrivilegeEscalation;
use crate::fstab::{FSTAB_PATH, MOUNTS_PATH};
use crate::resolve::DEV_DISK_DIR;

/// Configuration for a shrink run.
#[derive(Debug, Clone)]
pub struct ShrinkConfig {
    /// Path to fstab file. Defaults to /etc/fstab.
    pub fstab_path: PathBuf,
    /// Path to the live mount table. Defaults to /proc/self/mounts.
    pub mounts_path: PathBuf,
    /// Root of the udev by-* symlink directories. Defaults to /dev/disk.
    pub dev_disk_dir: PathBuf,
    /// Treat a matched entry without a shrink tag as an error.
    pub require_tag: bool,
    /// Mount the filesystem read-only first and refuse to shrink below its usage.
    pub verify_usage: bool,
    /// Report the shrink plan without running it.
    pub dry_run: bool,
    /// How privileged commands are executed.
    pub escalation: PrivilegeEscalation,
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self {
            fstab_path: PathBuf::from(FSTAB_PATH),
            mounts_path: PathBuf::from(MOUNTS_PATH),
            dev_disk_dir: PathBuf::from(DEV_DISK_DIR),
            require_tag: false,
            verify_usage: false,
            dry_run: false,
            escalation: PrivilegeEscalation::None,
        }
    }
}

impl ShrinkConfig {
    /// Creates a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fstab path.
    pub fn with_fstab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab_path = path.into();
        self
    }

    /// Sets the live mount table path.
    pub fn with_mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }

    /// Sets the by-* symlink root.
    pub fn with_dev_disk_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.dev_disk_dir = path.into();
        self
    }

    pub fn with_require_tag(mut self, require_tag: bool) -> Self {
        self.require_tag = require_tag;
        self
    }

    pub fn with_verify_usage(mut self, verify_usage: bool) -> Self {
        self.verify_usage = verify_usage;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_escalation(mut self, escalation: PrivilegeEscalation) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn fstab_path(&self) -> &Path {
        &self.fstab_path
    }
}
