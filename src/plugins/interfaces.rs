//! Interface shapes for device kinds spec.md section 1 scopes out beyond
//! their method surface: "HID, DRM, BIOS-attribute, I2C, block-partition
//! helpers — specified only as interface shapes." Each trait below mirrors
//! the public method surface of its `original_source/libfwupdplugin`
//! counterpart with no behavior beyond the signatures; a downstream plugin
//! crate implements against these the way it would implement `Device`.

use crate::error::Result;

/// Mirrors `FuBlockPartition` (`fu-block-partition.h`): a single partition
/// on a block device, with filesystem metadata and a mount point lookup.
pub trait BlockPartitionOps {
    fn fs_type(&self) -> Option<&str>;
    fn fs_uuid(&self) -> Option<&str>;
    fn fs_label(&self) -> Option<&str>;
    fn mount_point(&mut self) -> Result<String>;
}

/// Mirrors `FuDrmDevice` (`fu-drm-device.h`): a DRM connector/CRTC pair and
/// its associated EDID.
pub trait DrmOps {
    fn enabled(&self) -> bool;
    fn connector_id(&self) -> u32;
    fn crtc_geometry(&self) -> (i32, i32, u32, u32);
    fn edid(&self) -> Option<&[u8]>;
}

/// Mirrors `FuHidDevice` (`fu-hid-device.h`/`.c`): USB HID GET_REPORT/
/// SET_REPORT over the control or interrupt endpoint.
pub trait HidOps {
    fn interface_number(&self) -> u8;
    fn set_interface(&mut self, interface_number: u8);
    fn get_report(&mut self, report_id: u8, buf: &mut [u8], timeout_ms: u64) -> Result<usize>;
    fn set_report(&mut self, report_id: u8, buf: &[u8], timeout_ms: u64) -> Result<()>;
}

/// Mirrors `FuI2cDevice` (`fu-i2c-device.h`): an addressed I2C peripheral
/// over a Linux `i2c-dev` node.
pub trait I2cOps {
    fn set_address(&mut self, address: u8, force: bool) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
    fn write(&mut self, buf: &[u8]) -> Result<()>;
}

/// Mirrors `FuProcessorDevice` (`fu-processor-device.h`): CPU microcode
/// mitigation status, not a firmware-writable device in its own right.
pub trait ProcessorOps {
    fn needs_mitigation(&self) -> bool;
    fn sinkclose_microcode_version(&self) -> Option<u32>;
}

/// Mirrors `FuBiosAttrs` (`fu-bios-attrs.h`): the vendor BIOS-attribute
/// table exposed under `/sys/class/firmware-attributes`, read-only here
/// since spec.md scopes out the attribute-write path.
pub trait BiosAttrsOps {
    fn pending_reboot(&self) -> Result<bool>;
    fn attr(&self, name: &str) -> Option<&str>;
}
