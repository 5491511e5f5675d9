//! Linux sysfs-backed device adapters. Grounded on
//! `examples/original_source/libfwupdplugin/fu-udev-device.c` and
//! `fu-common-linux.c`'s sysfs-walking helpers, translated from the
//! GUdevDevice wrapper into a small owned struct over `/sys` paths.

pub mod linux;

use crate::device::Device;
use crate::error::Result;
use linux::SysfsDevice;

/// Enumerates a sysfs subsystem directory (e.g. `/sys/bus/usb/devices`) and
/// returns one probed `Device` per entry whose `uevent` parses cleanly.
pub fn coldplug_subsystem(sysfs_root: &std::path::Path, guid_namespace: uuid::Uuid) -> Result<Vec<Device>> {
    let mut devices = Vec::new();
    if !sysfs_root.exists() {
        return Ok(devices);
    }
    for entry in std::fs::read_dir(sysfs_root).map_err(|e| crate::error::Error::read(e.to_string()))? {
        let entry = entry.map_err(|e| crate::error::Error::read(e.to_string()))?;
        let sysfs = SysfsDevice::open(entry.path())?;
        let mut device = Device::new(guid_namespace);
        sysfs.probe_into(&mut device)?;
        devices.push(device);
    }
    Ok(devices)
}
