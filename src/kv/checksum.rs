//! Snapshot checksums
//!
//! A snapshot file starts with a header line `crc32:XXXXXXXX` (lowercase
//! hex, zero-padded) holding the CRC32 of every byte after that line. The
//! checksum is verified before the body is parsed.

use crc32fast::Hasher;

const PREFIX: &str = "crc32:";

/// CRC32 (IEEE) of `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn format_checksum(checksum: u32) -> String {
    format!("{}{:08x}", PREFIX, checksum)
}

/// Parse a `crc32:XXXXXXXX` header; `None` if it is not one.
pub fn parse_checksum(formatted: &str) -> Option<u32> {
    let hex = formatted.strip_prefix(PREFIX)?;
    if hex.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Prefix `body` with its checksum header.
pub fn seal(body: &str) -> String {
    format!("{}\n{}", format_checksum(compute_checksum(body.as_bytes())), body)
}

/// Split a sealed document into its body, verifying the header.
///
/// Errors carry a human-readable reason.
pub fn unseal(content: &str) -> Result<&str, String> {
    let (header, body) = content
        .split_once('\n')
        .ok_or_else(|| "missing checksum header".to_string())?;
    let expected = parse_checksum(header.trim_end())
        .ok_or_else(|| format!("invalid checksum header '{}'", header))?;
    let actual = compute_checksum(body.as_bytes());
    if actual != expected {
        return Err(format!(
            "checksum mismatch: header {}, content {}",
            format_checksum(expected),
            format_checksum(actual)
        ));
    }
    Ok(body)
}
