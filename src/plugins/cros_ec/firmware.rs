//! FMAP-indexed Cros-EC firmware image: section table and version parsing.
//! Grounded on `fu-cros-ec-firmware.c` and `fu-cros-ec-common.c`'s
//! `fu_cros_ec_version_parse`.

use crate::error::{Error, Result};
use crate::util::hex_string;
use crypto_hash::{Algorithm, Hasher};
use std::io::Write;

/// Guesses a checksum's algorithm from its hex-string length, the same
/// heuristic `fwupd-dbus`'s `common.rs::checksum_guess_kind` uses for
/// LVFS-downloaded cabinet files, now applied to a Cros-EC section payload
/// before it's written.
pub fn checksum_guess_kind(checksum: &str) -> Algorithm {
    match checksum.len() {
        32 => Algorithm::MD5,
        40 => Algorithm::SHA1,
        64 => Algorithm::SHA256,
        128 => Algorithm::SHA512,
        _ => Algorithm::SHA1,
    }
}

/// Verifies `data` against a hex-encoded `checksum`, guessing the algorithm
/// from the checksum's length.
pub fn verify_checksum(data: &[u8], checksum: &str) -> Result<bool> {
    let mut hasher = Hasher::new(checksum_guess_kind(checksum));
    hasher.write_all(data).map_err(|e| Error::read(e.to_string()))?;
    let digest = hex_string(&hasher.finish());
    Ok(digest.eq_ignore_ascii_case(checksum))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStatus {
    NotNeeded,
    NotPossible,
    Needed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    pub boardname: String,
    pub triplet: String,
    pub sha1: String,
    pub dirty: bool,
}

/// Parses `board_vMAJOR.MINOR.PATCH-SHA1[+]`, e.g. `cheese_v1.1.1755-4da9520+`.
pub fn parse_version(raw: &str) -> Result<ParsedVersion> {
    if raw.is_empty() {
        return Err(Error::internal("no version string to parse"));
    }
    let marker_pos = raw
        .rfind("_v")
        .ok_or_else(|| Error::internal("version marker not found"))?;
    let boardname = raw[..marker_pos].to_string();
    if boardname.is_empty() {
        return Err(Error::internal("empty board name"));
    }
    let rest = &raw[marker_pos + 2..];

    let split_pos = rest
        .find(|c| c == '-' || c == '+')
        .ok_or_else(|| Error::internal(format!("hash marker not found: {}", rest)))?;
    let triplet = rest[..split_pos].to_string();
    let after_marker = &rest[split_pos + 1..];

    let sha1_end = after_marker.find('+').unwrap_or(after_marker.len());
    let sha1 = after_marker[..sha1_end].to_string();
    if sha1.is_empty() {
        return Err(Error::internal("empty SHA"));
    }

    let triplet_parts: Vec<&str> = triplet.split('.').collect();
    if triplet_parts.len() < 3 {
        return Err(Error::internal(format!("improper version triplet: {}", triplet)));
    }

    let dirty = rest.contains('+');

    Ok(ParsedVersion { boardname, triplet, sha1, dirty })
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub version_raw: String,
    pub version: Option<ParsedVersion>,
    pub ustatus: UpgradeStatus,
}

/// The two FMAP-indexed sections of a Cros-EC image, `EC_RO` and `EC_RW`,
/// with their `RO_FRID`/`RW_FWID` version strings already resolved.
#[derive(Debug, Clone)]
pub struct CrosEcFirmware {
    pub sections: Vec<Section>,
}

impl CrosEcFirmware {
    pub fn new(ro: (u32, u32, &str), rw: (u32, u32, &str)) -> Self {
        let make = |name: &str, (offset, size, version_raw): (u32, u32, &str)| Section {
            name: name.to_string(),
            offset,
            size,
            version_raw: version_raw.to_string(),
            version: parse_version(version_raw).ok(),
            ustatus: UpgradeStatus::NotNeeded,
        };
        CrosEcFirmware { sections: vec![make("EC_RO", ro), make("EC_RW", rw)] }
    }

    /// Marks every section whose start offset matches `writeable_offset` as
    /// needed. It is an error if none match.
    pub fn pick_sections(&mut self, writeable_offset: u32) -> Result<()> {
        let mut found = false;
        for section in &mut self.sections {
            if section.offset == writeable_offset {
                section.ustatus = UpgradeStatus::Needed;
                found = true;
            }
        }
        if !found {
            return Err(Error::invalid_data(format!(
                "no writable section found with offset: 0x{:x}",
                writeable_offset
            )));
        }
        Ok(())
    }

    pub fn needed_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.ustatus == UpgradeStatus::Needed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dirty_version_string() {
        let parsed = parse_version("cheese_v1.1.1755-4da9520+").unwrap();
        assert_eq!(parsed.boardname, "cheese");
        assert_eq!(parsed.triplet, "1.1.1755");
        assert_eq!(parsed.sha1, "4da9520");
        assert!(parsed.dirty);
    }

    #[test]
    fn parses_clean_version_string() {
        let parsed = parse_version("hammer_v2.0.1-abcdef0").unwrap();
        assert!(!parsed.dirty);
        assert_eq!(parsed.sha1, "abcdef0");
    }

    #[test]
    fn rejects_missing_version_marker() {
        assert!(parse_version("no-marker-here").is_err());
    }

    #[test]
    fn pick_sections_marks_matching_offset_needed() {
        let mut fw = CrosEcFirmware::new((0, 0x1000, "cheese_v1.0.0-aaa"), (0x1000, 0x1000, "cheese_v1.0.0-bbb"));
        fw.pick_sections(0x1000).unwrap();
        let needed = fw.needed_sections();
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].name, "EC_RW");
    }

    #[test]
    fn pick_sections_errors_when_no_offset_matches() {
        let mut fw = CrosEcFirmware::new((0, 0x1000, "cheese_v1.0.0-aaa"), (0x1000, 0x1000, "cheese_v1.0.0-bbb"));
        assert!(fw.pick_sections(0x2000).is_err());
    }

    #[test]
    fn verify_checksum_accepts_matching_sha1() {
        let data = b"cros-ec-payload";
        let mut hasher = Hasher::new(Algorithm::SHA1);
        hasher.write_all(data).unwrap();
        let checksum = hex_string(&hasher.finish());
        assert!(verify_checksum(data, &checksum).unwrap());
    }

    #[test]
    fn verify_checksum_rejects_mismatch() {
        assert!(!verify_checksum(b"cros-ec-payload", &"0".repeat(40)).unwrap());
    }
}
