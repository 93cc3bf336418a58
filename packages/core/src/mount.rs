//! Scoped mount operations.
//!
//! Measuring how much of a filesystem is in use needs it mounted. A
//! [`ScopedMount`] mounts the device read-only and guarantees the matching
//! `umount` runs on every exit path, so a failed run never leaves the device
//! mounted.

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, warn};

use crate::error::{Error, Result, TempDirSnafu};
use crate::executor::CommandRunner;

/// A read-only mount that is undone when released or dropped.
pub struct ScopedMount<'a> {
    runner: &'a dyn CommandRunner,
    device: String,
    mount_point: PathBuf,
    mounted: bool,
}

impl<'a> ScopedMount<'a> {
    /// Mounts `device` read-only at `mount_point`.
    pub fn new(runner: &'a dyn CommandRunner, device: &Path, mount_point: &Path) -> Result<Self> {
        let device = device.display().to_string();
        let target = mount_point.display().to_string();

        debug!(device = %device, mount_point = %target, "scoped mount");
        let output = runner.run("mount", &["-o", "ro", &device, &target])?;
        if output.authentication_cancelled() {
            return Err(Error::AuthenticationCancelled);
        }
        if !output.success() {
            return Err(Error::MountOperationFailed {
                device,
                step: "mount".to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        Ok(Self {
            runner,
            device,
            mount_point: mount_point.to_path_buf(),
            mounted: true,
        })
    }

    /// Returns the path the device is mounted at.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Unmounts the device, reporting failure.
    pub fn release(mut self) -> Result<()> {
        self.unmount()
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;

        let target = self.mount_point.display().to_string();
        debug!(device = %self.device, mount_point = %target, "scoped umount");
        let output = self.runner.run("umount", &[&target])?;
        if output.authentication_cancelled() {
            return Err(Error::AuthenticationCancelled);
        }
        if !output.success() {
            return Err(Error::MountOperationFailed {
                device: self.device.clone(),
                step: "umount".to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for ScopedMount<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            warn!(device = %self.device, error = %e, "failed to release scoped mount");
        }
    }
}

/// Mounts `device` on a fresh temporary directory, runs `measure`, and
/// unmounts again.
///
/// The unmount happens even when `measure` fails; its error then takes
/// priority over any unmount error.
pub fn with_scoped_mount<T>(
    runner: &dyn CommandRunner,
    device: &Path,
    measure: impl FnOnce(&Path) -> Result<T>,
) -> Result<T> {
    let dir = tempfile::Builder::new()
        .prefix("shrinkfs-")
        .tempdir()
        .context(TempDirSnafu)?;

    let mount = ScopedMount::new(runner, device, dir.path())?;
    let measured = measure(mount.mount_point());
    let released = mount.release();

    let value = measured?;
    released?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use std::cell::RefCell;

    /// Records invocations and fails the programs listed in `failing`.
    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<String>>,
        failing: Vec<&'static str>,
        failure_code: Option<i32>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(program.to_string());
            let code = if self.failing.iter().any(|p| *p == program) {
                self.failure_code.unwrap_or(32)
            } else {
                0
            };
            Ok(CommandOutput {
                command: format!("{} {}", program, args.join(" ")),
                code: Some(code),
                stdout: String::new(),
                stderr: "denied".to_string(),
            })
        }
    }

    #[test]
    fn test_measure_then_release() {
        let runner = RecordingRunner::default();
        let value = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |_| Ok(42)).unwrap();

        assert_eq!(value, 42);
        assert_eq!(*runner.calls.borrow(), vec!["mount", "umount"]);
    }

    #[test]
    fn test_release_when_measurement_fails() {
        let runner = RecordingRunner::default();
        let result: Result<u64> = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |path| {
            Err(Error::Statvfs {
                path: path.to_path_buf(),
                source: nix::Error::EIO,
            })
        });

        assert!(matches!(result, Err(Error::Statvfs { .. })));
        assert_eq!(*runner.calls.borrow(), vec!["mount", "umount"]);
    }

    #[test]
    fn test_mount_failure_skips_umount() {
        let runner = RecordingRunner {
            failing: vec!["mount"],
            ..Default::default()
        };
        let result = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |_| Ok(()));

        assert!(matches!(
            result,
            Err(Error::MountOperationFailed { ref step, .. }) if step == "mount"
        ));
        assert_eq!(*runner.calls.borrow(), vec!["mount"]);
    }

    #[test]
    fn test_umount_failure_reported() {
        let runner = RecordingRunner {
            failing: vec!["umount"],
            ..Default::default()
        };
        let result = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |_| Ok(()));

        assert!(matches!(
            result,
            Err(Error::MountOperationFailed { ref step, .. }) if step == "umount"
        ));
    }

    #[test]
    fn test_dismissed_authorization_on_mount() {
        let runner = RecordingRunner {
            failing: vec!["mount"],
            failure_code: Some(126),
            ..Default::default()
        };
        let result = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |_| Ok(()));

        assert!(matches!(result, Err(Error::AuthenticationCancelled)));
        assert_eq!(*runner.calls.borrow(), vec!["mount"]);
    }

    #[test]
    fn test_dismissed_authorization_on_umount() {
        let runner = RecordingRunner {
            failing: vec!["umount"],
            failure_code: Some(126),
            ..Default::default()
        };
        let result = with_scoped_mount(&runner, Path::new("/dev/vg0/home"), |_| Ok(()));

        assert!(matches!(result, Err(Error::AuthenticationCancelled)));
    }

    #[test]
    fn test_drop_unmounts_once() {
        let runner = RecordingRunner::default();
        {
            let _mount =
                ScopedMount::new(&runner, Path::new("/dev/vg0/home"), Path::new("/mnt")).unwrap();
        }
        assert_eq!(*runner.calls.borrow(), vec!["mount", "umount"]);
    }
}
