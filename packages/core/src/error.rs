//! Unified error types for the shrinkfs-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
///
/// Every variant is fatal to the current run; nothing is retried internally.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// A query command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// User cancelled authentication dialog.
    #[snafu(display("authentication cancelled by user"))]
    AuthenticationCancelled,

    /// Failed to parse lsblk JSON output.
    #[snafu(display("failed to parse lsblk output: {message}"))]
    LsblkParse { message: String },

    /// Fstab or mount table file not found or cannot be read.
    #[snafu(display("failed to read mount table at {}", path.display()))]
    FstabRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A mount table line does not have the six expected columns.
    #[snafu(display("malformed mount table entry on line {line_number}: {message}: '{line}'"))]
    MalformedEntry {
        line_number: usize,
        line: String,
        message: String,
    },

    /// The matched entry carries no shrink tag, and one was required.
    #[snafu(display("device {device} has no {tag} option"))]
    TagNotFound { device: String, tag: String },

    /// Unparsable numeric prefix or unknown unit suffix.
    #[snafu(display("invalid size '{value}': {message}"))]
    InvalidSizeFormat { value: String, message: String },

    /// A `UUID=`-style specifier could not be resolved to a device node.
    #[snafu(display("device {spec} not found at {}", path.display()))]
    DeviceNotFound {
        spec: String,
        path: PathBuf,
        source: std::io::Error,
    },

    /// The device is in a state where shrinking is unsafe.
    #[snafu(display("cannot shrink {device}: {reason}"))]
    PreconditionFailed { device: String, reason: String },

    /// A step of the resize sequence reported failure.
    #[snafu(display("failed to shrink {device}: step '{step}' exited with code {code}: {stderr}"))]
    ShrinkFailed {
        device: String,
        step: String,
        code: i32,
        stderr: String,
    },

    /// Mounting or unmounting the device for usage measurement failed.
    #[snafu(display("scoped {step} of {device} failed: {message}"))]
    MountOperationFailed {
        device: String,
        step: String,
        message: String,
    },

    /// Failed to create the temporary mount point.
    #[snafu(display("failed to create temporary mount point"))]
    TempDir { source: std::io::Error },

    /// statvfs on a mounted filesystem failed.
    #[snafu(display("failed to query filesystem usage at {}", path.display()))]
    Statvfs { path: PathBuf, source: nix::Error },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount table read errors.
    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for device resolution errors.
    fn device_context(self, spec: impl Into<String>, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabReadSnafu { path: path.into() })
    }

    fn device_context(self, spec: impl Into<String>, path: impl Into<PathBuf>) -> Result<T> {
        self.context(DeviceNotFoundSnafu {
            spec: spec.into(),
            path: path.into(),
        })
    }
}
