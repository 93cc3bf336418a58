//! Shrink tag extraction and decoding.
//!
//! The target size of a device is declared in its fstab options column as
//! `x-systemd.shrinkfs=<size>`, eg. `defaults,x-systemd.shrinkfs=20G`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fstab;
use crate::size;

/// Mount option key carrying the shrink target.
pub const SHRINK_TAG: &str = "x-systemd.shrinkfs";

/// Returns the value of the first `x-systemd.shrinkfs=` option, if any.
///
/// An empty value is treated the same as a missing option.
pub fn extract_tag_value<S: AsRef<str>>(options: &[S]) -> Option<&str> {
    fstab::option_value(options, SHRINK_TAG).filter(|value| !value.is_empty())
}

/// A decoded shrink directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShrinkTag {
    /// The value as written in fstab, eg. "500M".
    pub raw_value: String,
    /// The target size in bytes.
    pub target_bytes: u64,
}

impl ShrinkTag {
    /// Returns the unit suffix of the raw value ("" for bytes).
    pub fn unit(&self) -> &str {
        self.raw_value.trim_start_matches(|c: char| c.is_ascii_digit())
    }

    /// Renders the size argument for `lvreduce -L`.
    ///
    /// lvm reads a bare number as MiB, so a unitless tag gets the explicit
    /// byte suffix `b`.
    pub fn lvm_size(&self) -> String {
        if self.unit().is_empty() {
            format!("{}b", self.raw_value)
        } else {
            self.raw_value.clone()
        }
    }
}

impl fmt::Display for ShrinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_value)
    }
}

impl FromStr for ShrinkTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

/// Decodes a raw tag value into its display string and byte count.
///
/// Eg: `"1M" -> ShrinkTag { raw_value: "1M", target_bytes: 1048576 }`.
pub fn decode(raw_value: &str) -> Result<ShrinkTag> {
    let target_bytes = size::parse_size(raw_value)?;
    Ok(ShrinkTag {
        raw_value: raw_value.to_string(),
        target_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(raw: &str) -> Vec<String> {
        raw.split(',').map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_tag_value() {
        let opts = options("defaults,x-systemd.shrinkfs=500M,noatime");
        assert_eq!(extract_tag_value(&opts), Some("500M"));
    }

    #[test]
    fn test_extract_tag_value_first_wins() {
        let opts = options("x-systemd.shrinkfs=1G,rw,x-systemd.shrinkfs=2G");
        assert_eq!(extract_tag_value(&opts), Some("1G"));
    }

    #[test]
    fn test_extract_tag_value_absent() {
        assert_eq!(extract_tag_value(&options("defaults,noatime")), None);
        assert_eq!(extract_tag_value::<String>(&[]), None);
        // Prefix of the key is not the key.
        assert_eq!(extract_tag_value(&options("x-systemd.shrinkfsX=1G")), None);
        assert_eq!(extract_tag_value(&options("x-systemd.shrinkfs")), None);
        assert_eq!(extract_tag_value(&options("x-systemd.shrinkfs=")), None);
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("1M").unwrap().target_bytes, 1_048_576);
        assert_eq!(decode("2G").unwrap().target_bytes, 2_147_483_648);
        assert_eq!(decode("500").unwrap().target_bytes, 500);

        let tag = decode("1G").unwrap();
        assert_eq!(tag.raw_value, "1G");
        assert_eq!(tag.to_string(), "1G");
    }

    #[test]
    fn test_decode_invalid() {
        for raw in ["M5", "5X", "", "5m", "5MB", " 5M", "1.5G"] {
            assert!(
                matches!(decode(raw), Err(Error::InvalidSizeFormat { .. })),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_magnitudes_across_units() {
        for (unit, exponent) in [("", 0u32), ("K", 1), ("M", 2), ("G", 3), ("T", 4)] {
            for magnitude in [0u64, 1, 1023, 1024] {
                let raw = format!("{magnitude}{unit}");
                let tag = decode(&raw).unwrap();

                let mut expected = magnitude;
                for _ in 0..exponent {
                    expected *= 1024;
                }
                assert_eq!(tag.target_bytes, expected, "{raw}");
                assert_eq!(tag.raw_value, raw);
                assert_eq!(tag.unit(), unit);
            }
        }
    }

    #[test]
    fn test_from_str() {
        let tag: ShrinkTag = "20G".parse().unwrap();
        assert_eq!(tag.target_bytes, 20 * 1024 * 1024 * 1024);
        assert!("twenty".parse::<ShrinkTag>().is_err());
    }

    #[test]
    fn test_lvm_size() {
        assert_eq!(decode("500").unwrap().lvm_size(), "500b");
        assert_eq!(decode("1G").unwrap().lvm_size(), "1G");
        assert_eq!(decode("0K").unwrap().lvm_size(), "0K");
    }
}
