//! Fstab parsing module.
//!
//! This module reads `/etc/fstab` (and the identically formatted live mount
//! table in `/proc/self/mounts`) into structured entries.

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::tag;

/// Default fstab path.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Default live mount table path.
pub const MOUNTS_PATH: &str = "/proc/self/mounts";

/// Represents a single fstab entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// The device identifier (e.g., "/dev/vg0/home" or "UUID=xxx").
    pub fs_spec: String,
    /// Mount point path.
    pub mount_point: PathBuf,
    /// Filesystem type (e.g., "ext4").
    pub vfs_type: String,
    /// Mount options.
    pub mount_options: Vec<String>,
    /// This field is used by dump(8) to determine which filesystems need to be dumped.
    pub dump: u8,
    /// This field is used by fsck(8) to determine the order in which filesystem checks are done at boot time.
    pub fsck_order: u16,
}

impl FstabEntry {
    /// Creates a new fstab entry.
    pub fn new(
        fs_spec: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
        mount_options: &str,
        dump: u8,
        fsck_order: u16,
    ) -> Self {
        Self {
            fs_spec: fs_spec.into(),
            mount_point: mount_point.into(),
            vfs_type: fs_type.into(),
            mount_options: split_options(mount_options),
            dump,
            fsck_order,
        }
    }

    /// Formats the entry as an fstab line.
    pub fn to_fstab_line(&self) -> String {
        format!(
            "{}  {}  {}  {}  {}  {}",
            self.fs_spec,
            escape_fstab_path(&self.mount_point.to_string_lossy()),
            self.vfs_type,
            self.mount_options.join(","),
            self.dump,
            self.fsck_order
        )
    }

    /// Returns the value of a `key=value` mount option.
    pub fn option_value(&self, key: &str) -> Option<&str> {
        option_value(&self.mount_options, key)
    }

    /// Returns the raw shrink tag value, if present.
    pub fn shrink_tag_value(&self) -> Option<&str> {
        tag::extract_tag_value(&self.mount_options)
    }

    /// Parses a single fstab line into an entry.
    ///
    /// Returns None for comments and empty lines. A line without exactly six
    /// fields is an error rather than being skipped.
    pub fn from_line(line_number: usize, line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let malformed = |message: String| Error::MalformedEntry {
            line_number,
            line: trimmed.to_string(),
            message,
        };

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(malformed(format!(
                "expected 6 fields, found {}",
                parts.len()
            )));
        }

        let dump = parts[4]
            .parse::<u8>()
            .map_err(|e| malformed(format!("failed to parse dump field: {}", e)))?;
        let fsck_order = parts[5]
            .parse::<u16>()
            .map_err(|e| malformed(format!("failed to parse pass field: {}", e)))?;

        Ok(Some(Self {
            fs_spec: parts[0].to_string(),
            mount_point: unescape_fstab_path(parts[1]),
            vfs_type: parts[2].to_string(),
            mount_options: split_options(parts[3]),
            dump,
            fsck_order,
        }))
    }
}

/// Returns the value of the first `key=value` option in list order.
pub fn option_value<'o, S: AsRef<str>>(options: &'o [S], key: &str) -> Option<&'o str> {
    options.iter().find_map(|option| {
        option
            .as_ref()
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

fn split_options(options: &str) -> Vec<String> {
    options.split(',').map(|s| s.to_string()).collect()
}

/// Escapes special characters in fstab paths using octal sequences.
///
/// Handles space (\040), tab (\011), newline (\012), and backslash (\134).
fn escape_fstab_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            ' ' => encoded.push_str(r"\040"),
            '\t' => encoded.push_str(r"\011"),
            '\n' => encoded.push_str(r"\012"),
            '\\' => encoded.push_str(r"\134"),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Unescapes octal sequences in fstab paths.
///
/// Escapes stand for raw bytes, so multi-byte UTF-8 names survive intact.
fn unescape_fstab_path(input: &str) -> PathBuf {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let octal = bytes
            .get(i + 1..i + 4)
            .filter(|d| d.iter().all(|b| (b'0'..=b'7').contains(b)));

        match (bytes[i], octal) {
            (b'\\', Some(digits)) => {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                // \400 and above do not fit a byte; keep them literally.
                match u8::try_from(value) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 4;
                    }
                    Err(_) => {
                        result.push(b'\\');
                        i += 1;
                    }
                }
            }
            (byte, _) => {
                result.push(byte);
                i += 1;
            }
        }
    }

    PathBuf::from(OsString::from_vec(result))
}

/// Parses mount table text into entries, preserving document order.
pub fn parse(content: &str) -> Result<Vec<FstabEntry>> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(entry) = FstabEntry::from_line(index + 1, line)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Reads and parses a whole mount table file.
pub fn read_fstab(path: &Path) -> Result<Vec<FstabEntry>> {
    let content = fs::read_to_string(path).fstab_read_context(path)?;
    parse(&content)
}

/// Returns the first entry whose device column equals `device` verbatim.
pub fn find_entry<'a>(entries: &'a [FstabEntry], device: &str) -> Option<&'a FstabEntry> {
    entries.iter().find(|entry| entry.fs_spec == device)
}

/// Returns every entry that declares a shrink target.
pub fn shrink_candidates(entries: &[FstabEntry]) -> Vec<&FstabEntry> {
    entries
        .iter()
        .filter(|entry| entry.shrink_tag_value().is_some())
        .collect()
}
