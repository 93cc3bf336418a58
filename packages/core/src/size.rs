//! Size unit conversion.
//!
//! Sizes are written as a decimal integer followed by at most one unit
//! character. Units scale by powers of 1024; there is no SI or lowercase form.

use crate::error::{Error, Result};

/// Recognized unit suffixes and their base-1024 exponents.
const UNIT_EXPONENTS: [(&str, u32); 5] = [("", 0), ("K", 1), ("M", 2), ("G", 3), ("T", 4)];

const BINARY_LABELS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Returns the base-1024 exponent for a unit suffix.
pub fn unit_exponent(unit: &str) -> Option<u32> {
    UNIT_EXPONENTS
        .iter()
        .find(|(label, _)| *label == unit)
        .map(|(_, exponent)| *exponent)
}

/// Converts a magnitude and unit into a byte count.
///
/// Eg: `(1, "M") -> 1048576`.
pub fn to_bytes(magnitude: u64, unit: &str) -> Result<u64> {
    let exponent = unit_exponent(unit).ok_or_else(|| Error::InvalidSizeFormat {
        value: format!("{}{}", magnitude, unit),
        message: format!("unknown unit '{}', expected one of K, M, G, T", unit),
    })?;

    1024u64
        .checked_pow(exponent)
        .and_then(|scale| magnitude.checked_mul(scale))
        .ok_or_else(|| Error::InvalidSizeFormat {
            value: format!("{}{}", magnitude, unit),
            message: "size does not fit in 64 bits".to_string(),
        })
}

/// Splits a raw size into its digit prefix and unit suffix.
///
/// The unit is whatever follows the digits; validity is checked by
/// [`to_bytes`].
pub fn split_size(raw: &str) -> Result<(u64, &str)> {
    let digits_end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(digits_end);

    if digits.is_empty() {
        return Err(Error::InvalidSizeFormat {
            value: raw.to_string(),
            message: "expected a non-negative integer".to_string(),
        });
    }

    let magnitude = digits.parse::<u64>().map_err(|e| Error::InvalidSizeFormat {
        value: raw.to_string(),
        message: e.to_string(),
    })?;

    Ok((magnitude, unit))
}

/// Parses a unit-suffixed size string into bytes.
pub fn parse_size(raw: &str) -> Result<u64> {
    let (magnitude, unit) = split_size(raw)?;
    to_bytes(magnitude, unit).map_err(|e| match e {
        Error::InvalidSizeFormat { message, .. } => Error::InvalidSizeFormat {
            value: raw.to_string(),
            message,
        },
        other => other,
    })
}

/// Formats a byte count for humans, eg. `1073741824 -> "1.0 GiB"`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut label = 0;
    while value >= 1024.0 && label < BINARY_LABELS.len() - 1 {
        value /= 1024.0;
        label += 1;
    }

    if label == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, BINARY_LABELS[label])
    }
}
