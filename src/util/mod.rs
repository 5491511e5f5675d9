//! Ambient debug/tracing helpers that don't belong to any one module: a hex
//! dump for buffers crossing the USB transport boundary, and a kernel version
//! probe used to gate plugin features. Grounded on `fu-dump.c`/`fu-kernel.c`.

use crate::error::{Error, Result};
use hex_view::HexView;

bitflags::bitflags! {
    pub struct DumpFlags: u32 {
        const SHOW_ASCII     = 1 << 0;
        const SHOW_ADDRESSES = 1 << 1;
    }
}

/// Formats `data` the way `fu_dump_full` logs it: columns of hex bytes, with
/// an optional inline ASCII gutter and address prefixes for long buffers.
pub fn dump_bytes_full(title: Option<&str>, data: &[u8], columns: usize, flags: DumpFlags) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push(':');
        out.insert_str(0, title);
    }
    if data.len() > columns || flags.contains(DumpFlags::SHOW_ADDRESSES) {
        out.push('\n');
    }

    if flags.contains(DumpFlags::SHOW_ADDRESSES) {
        out.push_str(&format!("0x{:04x} │ ", 0));
    }

    for (i, byte) in data.iter().enumerate() {
        out.push_str(&format!("{:02x} ", byte));
        if flags.contains(DumpFlags::SHOW_ASCII) {
            if byte.is_ascii_graphic() || *byte == b' ' {
                out.push_str(&format!("[{}] ", *byte as char));
            } else {
                out.push_str("[?] ");
            }
        }
        if i > 0 && i != data.len() - 1 && (i + 1) % columns == 0 {
            out.push('\n');
            if flags.contains(DumpFlags::SHOW_ADDRESSES) {
                out.push_str(&format!("0x{:04x} │ ", i + 1));
            }
        }
    }
    out
}

/// Matches `fu_dump_raw`'s heuristic: wide buffers get an address gutter,
/// short ones don't, both at 32 columns.
pub fn dump_bytes(title: Option<&str>, data: &[u8]) -> String {
    let mut flags = DumpFlags::empty();
    if data.len() > 64 {
        flags |= DumpFlags::SHOW_ADDRESSES;
    }
    dump_bytes_full(title, data, 32, flags)
}

/// Renders `data` as a single contiguous lowercase hex string, for log lines
/// that want a compact one-liner rather than `dump_bytes`'s columnar form.
pub fn hex_string(data: &[u8]) -> String {
    format!("{:x}", HexView::from(data))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Parses the `release` field of `uname(2)`-shaped strings like
/// `6.18.5-fc-v18`, taking only the leading dot-separated numeric triplet.
pub fn parse_kernel_release(release: &str) -> Result<KernelVersion> {
    let numeric_prefix = release.split(|c: char| !c.is_ascii_digit() && c != '.').next().unwrap_or("");
    let mut parts = numeric_prefix.split('.');
    let major = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::internal(format!("unparseable kernel release: {}", release)))?;
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok(KernelVersion { major, minor, patch })
}

/// Mirrors `fu_kernel_check_version`: errors if `release` is below `minimum`.
pub fn check_kernel_version(release: &str, minimum: &str) -> Result<()> {
    let found = parse_kernel_release(release)?;
    let required = parse_kernel_release(minimum)?;
    if found < required {
        return Err(Error::internal(format!(
            "kernel {} doesn't meet minimum {}",
            release, minimum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_string_renders_lowercase_hex() {
        assert_eq!(hex_string(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn dump_bytes_wraps_long_buffers_with_addresses() {
        let data = vec![0u8; 80];
        let out = dump_bytes(Some("buf"), &data);
        assert!(out.starts_with("buf:"));
        assert!(out.contains("0x0000"));
    }

    #[test]
    fn parses_kernel_release_triplet() {
        let version = parse_kernel_release("6.18.5-fc-v18").unwrap();
        assert_eq!(version, KernelVersion { major: 6, minor: 18, patch: 5 });
    }

    #[test]
    fn check_kernel_version_rejects_below_minimum() {
        assert!(check_kernel_version("5.4.0", "6.0.0").is_err());
        assert!(check_kernel_version("6.1.0", "6.0.0").is_ok());
    }
}
