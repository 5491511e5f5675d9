//! SMBIOS HWID/CHID computation. The CHID catalog is reproduced verbatim
//! from `fu_hwids_init` in `examples/original_source/libfwupdplugin/fu-hwids.c`;
//! the GUID hashing algorithm follows the same file's `fu_hwids_get_guid_for_str`
//! (UTF-16LE encode, hash against the Microsoft namespace).
//!
//! The namespace UUID itself (`FWUPD_GUID_FLAG_NAMESPACE_MICROSOFT`'s actual
//! 16 bytes) is resolved by `fwupd_guid_hash_data`, a function outside the
//! retrieved source set. The constant below is `ComputerHardwareIds.exe`'s
//! well-known namespace; see DESIGN.md for the provenance note.
pub const MICROSOFT_NAMESPACE: &str = "70ffd812-4c7f-4c7d-0000-000000000000";

use crate::device::instance_id_to_guid;
use std::collections::BTreeMap;

/// The well-known SMBIOS-derived keys, per spec.md section 3.
pub const KEYS: &[&str] = &[
    "BiosVendor",
    "BiosVersion",
    "BiosMajorRelease",
    "BiosMinorRelease",
    "FirmwareMajorRelease",
    "FirmwareMinorRelease",
    "Manufacturer",
    "Family",
    "ProductName",
    "ProductSku",
    "EnclosureKind",
    "BaseboardManufacturer",
    "BaseboardProduct",
];

/// The fixed CHID catalog: `HardwareID-00`..`HardwareID-14` (Windows 10
/// CHIDs) plus the `fwupd-*` entries used by the flashrom plugin.
pub const CHIDS: &[(&str, &str)] = &[
    ("HardwareID-00", "Manufacturer&Family&ProductName&ProductSku&BiosVendor&BiosVersion&BiosMajorRelease&BiosMinorRelease"),
    ("HardwareID-01", "Manufacturer&Family&ProductName&BiosVendor&BiosVersion&BiosMajorRelease&BiosMinorRelease"),
    ("HardwareID-02", "Manufacturer&ProductName&BiosVendor&BiosVersion&BiosMajorRelease&BiosMinorRelease"),
    ("HardwareID-03", "Manufacturer&Family&ProductName&ProductSku&BaseboardManufacturer&BaseboardProduct"),
    ("HardwareID-04", "Manufacturer&Family&ProductName&ProductSku"),
    ("HardwareID-05", "Manufacturer&Family&ProductName"),
    ("HardwareID-06", "Manufacturer&ProductSku&BaseboardManufacturer&BaseboardProduct"),
    ("HardwareID-07", "Manufacturer&ProductSku"),
    ("HardwareID-08", "Manufacturer&ProductName&BaseboardManufacturer&BaseboardProduct"),
    ("HardwareID-09", "Manufacturer&ProductName"),
    ("HardwareID-10", "Manufacturer&Family&BaseboardManufacturer&BaseboardProduct"),
    ("HardwareID-11", "Manufacturer&Family"),
    ("HardwareID-12", "Manufacturer&EnclosureKind"),
    ("HardwareID-13", "Manufacturer&BaseboardManufacturer&BaseboardProduct"),
    ("HardwareID-14", "Manufacturer"),
    ("fwupd-04", "Manufacturer&Family&ProductName&ProductSku&BiosVendor"),
    ("fwupd-05", "Manufacturer&Family&ProductName&BiosVendor"),
    ("fwupd-14", "Manufacturer&BiosVendor"),
];

#[derive(Debug, Default, Clone)]
pub struct Hwids {
    values: BTreeMap<String, String>,
}

impl Hwids {
    pub fn new() -> Self { Hwids::default() }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> { self.values.get(key).map(|s| s.as_str()) }

    /// Builds the ampersand-joined composite string for `chid_key`'s pattern,
    /// e.g. `HardwareID-5` → `LENOVO&ThinkPad T440s&20ARS19C0J`. Returns
    /// `None` if any key the pattern requires is missing.
    pub fn composite_key(&self, pattern: &str) -> Option<String> {
        let mut parts = Vec::new();
        for key in pattern.split('&') {
            parts.push(self.values.get(key)?.as_str());
        }
        Some(parts.join("&"))
    }

    /// Computes every CHID GUID this set of values can satisfy.
    pub fn compute_guids(&self) -> Vec<(&'static str, uuid::Uuid)> {
        let namespace = uuid::Uuid::parse_str(MICROSOFT_NAMESPACE).expect("static namespace constant");
        CHIDS
            .iter()
            .filter_map(|(name, pattern)| {
                self.composite_key(pattern).map(|composite| (*name, instance_id_to_guid(namespace, &composite)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_5_composite_key_matches_spec_example() {
        let mut hwids = Hwids::new();
        hwids.set("Manufacturer", "LENOVO");
        hwids.set("Family", "ThinkPad T440s");
        hwids.set("ProductName", "20ARS19C0J");
        let pattern = CHIDS.iter().find(|(name, _)| *name == "HardwareID-05").unwrap().1;
        assert_eq!(hwids.composite_key(pattern).unwrap(), "LENOVO&ThinkPad T440s&20ARS19C0J");
    }

    #[test]
    fn missing_key_yields_no_composite() {
        let hwids = Hwids::new();
        assert!(hwids.composite_key("Manufacturer&Family").is_none());
    }

    #[test]
    fn compute_guids_skips_unsatisfiable_patterns() {
        let mut hwids = Hwids::new();
        hwids.set("Manufacturer", "LENOVO");
        let guids = hwids.compute_guids();
        assert!(guids.iter().any(|(name, _)| *name == "HardwareID-14"));
        assert!(!guids.iter().any(|(name, _)| *name == "HardwareID-00"));
    }
}
