//! Volume state queries.
//!
//! [`VolumeInspector`] is the single seam through which the orchestrator
//! learns about a device. Every call is a fresh point-in-time query; nothing
//! is cached because the device can change between calls.

use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::debug;

use crate::error::{Error, Result, StatvfsSnafu};
use crate::executor::CommandRunner;
use crate::fstab::{self, MOUNTS_PATH};
use crate::mount::with_scoped_mount;
use crate::resolve::canonical_or_self;

/// lsblk TYPE of a device-mapper logical volume.
const LVM_DEVICE_TYPE: &str = "lvm";

/// Queries about a device's current size and state.
pub trait VolumeInspector {
    /// Current size of the block device in bytes.
    fn current_size_bytes(&self, device: &Path) -> Result<u64>;

    /// Whether the device, or the path as a mount point, is currently mounted.
    fn is_mounted(&self, device_or_mount_point: &Path) -> Result<bool>;

    /// Whether the device is an LVM logical volume.
    fn is_logical_volume(&self, device: &Path) -> Result<bool>;

    /// Path under which lvm knows the volume, eg. `/dev/mapper/vg0-home`.
    ///
    /// lvm tools reject the kernel `/dev/dm-N` name a UUID resolves to.
    fn volume_path(&self, device: &Path) -> Result<PathBuf>;

    /// Bytes in use by the filesystem on the device.
    fn used_bytes(&self, device: &Path) -> Result<u64>;
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "type")]
    device_type: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

fn parse_lsblk(stdout: &str) -> Result<LsblkDevice> {
    let output: LsblkOutput = serde_json::from_str(stdout).map_err(|e| Error::LsblkParse {
        message: e.to_string(),
    })?;

    output
        .blockdevices
        .into_iter()
        .next()
        .ok_or_else(|| Error::LsblkParse {
            message: "no block device in output".to_string(),
        })
}

/// Whether a parsed mount table lists `path` as a source or a mount point.
fn mount_table_contains(entries: &[fstab::FstabEntry], path: &Path) -> bool {
    let canonical = canonical_or_self(path);
    entries.iter().any(|entry| {
        entry.mount_point == path
            || (entry.fs_spec.starts_with('/')
                && canonical_or_self(Path::new(&entry.fs_spec)) == canonical)
    })
}

/// Inspector backed by `lsblk` and the live kernel mount table.
pub struct SystemInspector<'a> {
    runner: &'a dyn CommandRunner,
    mounts_path: PathBuf,
}

impl<'a> SystemInspector<'a> {
    /// Creates an inspector reading mounts from `/proc/self/mounts`.
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            mounts_path: PathBuf::from(MOUNTS_PATH),
        }
    }

    /// Overrides the mount table path.
    pub fn with_mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }

    fn lsblk(&self, device: &Path) -> Result<LsblkDevice> {
        let device = device.display().to_string();
        let output = self
            .runner
            .run(
                "lsblk",
                &["--json", "--bytes", "--nodeps", "--output", "SIZE,TYPE,PATH", &device],
            )?
            .checked()?;
        parse_lsblk(&output.stdout)
    }
}

impl VolumeInspector for SystemInspector<'_> {
    fn current_size_bytes(&self, device: &Path) -> Result<u64> {
        let size = self.lsblk(device)?.size.ok_or_else(|| Error::LsblkParse {
            message: format!("no size reported for {}", device.display()),
        })?;
        debug!(device = %device.display(), size, "queried device size");
        Ok(size)
    }

    fn is_mounted(&self, device_or_mount_point: &Path) -> Result<bool> {
        let entries = fstab::read_fstab(&self.mounts_path)?;
        Ok(mount_table_contains(&entries, device_or_mount_point))
    }

    fn is_logical_volume(&self, device: &Path) -> Result<bool> {
        let device_type = self.lsblk(device)?.device_type;
        Ok(device_type.as_deref().map(str::trim) == Some(LVM_DEVICE_TYPE))
    }

    fn volume_path(&self, device: &Path) -> Result<PathBuf> {
        match self.lsblk(device)?.path {
            Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
            _ => Ok(device.to_path_buf()),
        }
    }

    fn used_bytes(&self, device: &Path) -> Result<u64> {
        with_scoped_mount(self.runner, device, |mount_point| {
            let stat = statvfs(mount_point).context(StatvfsSnafu {
                path: mount_point.to_path_buf(),
            })?;
            let fragment = stat.fragment_size() as u64;
            let used_blocks = (stat.blocks() as u64).saturating_sub(stat.blocks_free() as u64);
            Ok(used_blocks * fragment)
        })
    }
}
