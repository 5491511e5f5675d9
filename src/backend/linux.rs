//! A single sysfs device directory: parses `uevent`, reads attribute files,
//! and resolves the `subsystem` symlink. Grounded on the attribute-reading
//! shape of `fu_udev_device_read_sysfs` in
//! `examples/original_source/libfwupdplugin/fu-udev-device.c`.

use crate::device::Device;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct SysfsDevice {
    path: PathBuf,
    uevent: BTreeMap<String, String>,
    subsystem: Option<String>,
}

impl SysfsDevice {
    pub fn open(path: PathBuf) -> Result<Self> {
        let uevent_path = path.join("uevent");
        let uevent = match std::fs::read_to_string(&uevent_path) {
            Ok(data) => parse_uevent(&data),
            Err(_) => BTreeMap::new(),
        };
        let subsystem = std::fs::read_link(path.join("subsystem"))
            .ok()
            .and_then(|link| link.file_name().map(|n| n.to_string_lossy().into_owned()));

        Ok(SysfsDevice { path, uevent, subsystem })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn subsystem(&self) -> Option<&str> { self.subsystem.as_deref() }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.uevent.get(name).cloned().or_else(|| {
            std::fs::read_to_string(self.path.join(name)).ok().map(|s| s.trim().to_string())
        })
    }

    /// Reads `attr_name` as a file and parses it as `u64`, honoring both
    /// decimal and `0x`-prefixed hex forms (the common sysfs convention).
    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        let raw = self.attr(name)?;
        let trimmed = raw.trim();
        if let Some(hex) = trimmed.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).ok()
        } else {
            trimmed.parse().ok()
        }
    }

    /// Populates physical-id/backend-id/instance-id on `device` from this
    /// sysfs entry. Matches `fu_udev_device_probe`'s "subsystem colon path"
    /// physical-id convention.
    pub fn probe_into(&self, device: &mut Device) -> Result<()> {
        let subsystem = self.subsystem.clone().unwrap_or_else(|| "unknown".to_string());
        device.set_backend_id(self.path.display().to_string());
        device.set_physical_id(format!("{}:{}", subsystem, self.path.display()));

        if let (Some(vendor), Some(product)) = (self.attr("idVendor"), self.attr("idProduct")) {
            device.build_instance_id(
                "USB",
                &[("VID", vendor.to_uppercase().as_str()), ("PID", product.to_uppercase().as_str())],
            )?;
        }
        Ok(())
    }
}

fn parse_uevent(data: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in data.lines() {
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uevent_key_value_lines() {
        let parsed = parse_uevent("DRIVER=usb\nPRODUCT=1234/5678/100\n");
        assert_eq!(parsed.get("DRIVER").map(|s| s.as_str()), Some("usb"));
        assert_eq!(parsed.get("PRODUCT").map(|s| s.as_str()), Some("1234/5678/100"));
    }

    #[test]
    fn probe_from_real_tempdir_sysfs_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uevent"), "DRIVER=usb\n").unwrap();
        std::fs::write(dir.path().join("idVendor"), "1234\n").unwrap();
        std::fs::write(dir.path().join("idProduct"), "5678\n").unwrap();

        let sysfs = SysfsDevice::open(dir.path().to_path_buf()).unwrap();
        let mut device = Device::new(uuid::Uuid::parse_str("70ffd812-4c7f-4c7d-0000-000000000000").unwrap());
        sysfs.probe_into(&mut device).unwrap();
        assert!(device.device_id().is_some());
        assert!(!device.instance_ids().is_empty());
    }
}
