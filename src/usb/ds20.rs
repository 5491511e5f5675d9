//! BOS descriptor / DS20 vendor-quirk-blob parsing, per spec.md section 4.3.
//! fwupd's own two platform-capability UUIDs are reproduced verbatim since
//! they're part of the wire contract, not an implementation detail.

use crate::error::{Error, Result};

/// `fwupd` DS20 platform-capability UUID (little-endian byte order in the
/// descriptor, canonical form here).
pub const FW_DS20_UUID: &str = "b1a82fe8-45e9-4aee-8e9d-3e8f07bd04ce";
/// Microsoft's OS 2.0 descriptor platform-capability UUID.
pub const MS_DS20_UUID: &str = "d8dd60df-4589-4cc7-9cd2-659d9e648a9f";

#[derive(Debug, Clone)]
pub struct PlatformCapability {
    pub uuid: String,
    pub platform_ver: u32,
    pub vendor_code: u8,
    pub alt_code: u8,
}

/// Picks the newest `fw-DS20` capability whose `platform_ver` does not exceed
/// `current_version` and is at least `min_version`, sorted descending.
pub fn pick_fw_ds20<'a>(
    capabilities: &'a [PlatformCapability],
    current_version: u32,
    min_version: u32,
) -> Option<&'a PlatformCapability> {
    capabilities
        .iter()
        .filter(|c| c.uuid.eq_ignore_ascii_case(FW_DS20_UUID))
        .filter(|c| c.platform_ver <= current_version && c.platform_ver >= min_version)
        .max_by_key(|c| c.platform_ver)
}

/// Parses a quirk blob of `Key=Value\n` lines, as fetched via the control GET
/// driven by a matched capability's `vendor_code`. Rejects CR/LF embedded in
/// a value and non-UTF-8 payloads.
pub fn parse_quirk_blob(data: &[u8]) -> Result<Vec<(String, String)>> {
    let text = std::str::from_utf8(data).map_err(|e| Error::invalid_data(format!("quirk blob is not UTF-8: {}", e)))?;

    let mut pairs = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let eq = line
            .find('=')
            .ok_or_else(|| Error::invalid_data(format!("quirk line missing '=': {:?}", line)))?;
        let key = &line[..eq];
        let value = &line[eq + 1..];
        if value.contains('\r') || value.contains('\n') {
            return Err(Error::invalid_data("quirk value contains embedded CR/LF"));
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}
