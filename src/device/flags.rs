//! Public device flags (`FwupdDeviceFlag`), carried verbatim in shape from the
//! teacher's `DeviceFlags` (`fwupd-dbus`'s `src/device.rs`), extended with the
//! lifecycle/emulation flags spec.md calls out that the D-Bus client never
//! needed to represent.

bitflags::bitflags! {
    pub struct DeviceFlags: u64 {
        const INTERNAL               = 1 << 0;
        const UPDATABLE              = 1 << 1;
        const ONLY_OFFLINE           = 1 << 2;
        const REQUIRE_AC             = 1 << 3;
        const LOCKED                 = 1 << 4;
        const SUPPORTED              = 1 << 5;
        const NEEDS_BOOTLOADER       = 1 << 6;
        const REGISTERED             = 1 << 7;
        const NEEDS_REBOOT           = 1 << 8;
        const REPORTED               = 1 << 9;
        const NOTIFIED               = 1 << 10;
        const USE_RUNTIME_VERSION    = 1 << 11;
        const INSTALL_PARENT_FIRST   = 1 << 12;
        const IS_BOOTLOADER          = 1 << 13;
        const WAIT_FOR_REPLUG        = 1 << 14;
        const IGNORE_VALIDATION      = 1 << 15;
        const TRUSTED                = 1 << 16;
        const NEEDS_SHUTDOWN         = 1 << 17;
        const ANOTHER_WRITE_REQUIRED = 1 << 18;
        const NO_AUTO_INSTANCE_IDS   = 1 << 19;
        const NEEDS_ACTIVATION       = 1 << 20;
        const ENSURE_SEMVER          = 1 << 21;
        const EMULATED               = 1 << 22;
        const SIGNED_PAYLOAD         = 1 << 23;
        const ONLY_SUPPORTED         = 1 << 24;
    }
}

impl Default for DeviceFlags {
    fn default() -> Self { DeviceFlags::empty() }
}

bitflags::bitflags! {
    /// Flags used when constructing instance IDs, per spec.md section 4.2.
    pub struct InstanceIdFlags: u32 {
        const NONE     = 0;
        const GENERIC  = 1 << 0;
        const VISIBLE  = 1 << 1;
        const QUIRKS   = 1 << 2;
        const OPTIONAL = 1 << 3;
    }
}

impl Default for InstanceIdFlags {
    fn default() -> Self { InstanceIdFlags::NONE }
}

/// Version encoding, per spec.md section 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFormat {
    Plain,
    Pair,
    Triplet,
    Quad,
    Bcd,
    Hex,
}
