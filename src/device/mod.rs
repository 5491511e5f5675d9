//! The core device object model. Identity, lifecycle and instance-ID
//! construction carried over from the shape of the teacher's `Device`
//! (`fwupd-dbus`'s `src/device.rs`), generalized from a read-only D-Bus proxy
//! into the mutable, backend-facing object this runtime needs.

pub mod event;
pub mod flags;
pub mod private_flags;

use crate::error::{Error, ErrorKind, Result};
use event::EventLog;
use flags::{DeviceFlags, InstanceIdFlags, VersionFormat};
use private_flags::PrivateFlags;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

/// Normalizes an untrusted string component for use inside an instance ID:
/// non-ASCII-printable bytes become `_`, matching `fu_common_instance_id_strsafe`.
pub fn strsafe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { '_' })
        .collect()
}

/// Hashes an instance-ID string to a GUID using the Microsoft CHID algorithm:
/// UTF-16LE encode the name, SHA-1 it against a fixed namespace, then fold
/// the digest into a version-5-shaped UUID. See `src/hwid.rs` for the
/// namespace constant and its provenance.
pub fn instance_id_to_guid(namespace: uuid::Uuid, instance_id: &str) -> uuid::Uuid {
    let utf16: Vec<u8> = instance_id
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();

    let mut hasher = Sha1::new();
    hasher.update(namespace.as_bytes());
    hasher.update(&utf16);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[0..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x50;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes)
}

fn device_id_hash(physical_id: &str, logical_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(physical_id.as_bytes());
    hasher.update(b"|");
    hasher.update(logical_id.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A scoped acquisition guard: `close_fn` runs unconditionally on drop.
/// Mirrors `FuDeviceLocker`'s "open succeeds or nothing is held" contract.
pub struct Locker<T> {
    object: Option<T>,
    close_fn: Box<dyn FnMut(&mut T) + Send>,
}

impl<T> Locker<T> {
    pub fn new_full<O, C>(mut object: T, open_fn: O, close_fn: C) -> Result<Self>
    where
        O: FnOnce(&mut T) -> Result<()>,
        C: FnMut(&mut T) + Send + 'static,
    {
        open_fn(&mut object)?;
        Ok(Locker { object: Some(object), close_fn: Box::new(close_fn) })
    }

    pub fn get(&self) -> &T { self.object.as_ref().expect("locker object taken") }
    pub fn get_mut(&mut self) -> &mut T { self.object.as_mut().expect("locker object taken") }
}

impl<T> Drop for Locker<T> {
    fn drop(&mut self) {
        if let Some(mut object) = self.object.take() {
            (self.close_fn)(&mut object);
        }
    }
}

/// Retries `f` up to `n_retries` times. A failure whose kind is in
/// `recoverable` sleeps `delay_ms` then retries; any other error is final.
pub fn retry<F>(mut f: F, n_retries: u32, delay_ms: u64, recoverable: &[ErrorKind]) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let mut attempt = 0;
    loop {
        match f() {
            Ok(()) => return Ok(()),
            Err(e) if attempt < n_retries && recoverable.contains(&e.kind()) => {
                attempt += 1;
                if delay_ms > 0 {
                    thread::sleep(Duration::from_millis(delay_ms));
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone)]
struct InhibitEntry {
    reason: String,
}

/// The core device object. Backends build one of these per enumerated
/// physical device; plugins mutate it through `probe`/`setup`/lifecycle hooks.
pub struct Device {
    physical_id: String,
    logical_id: String,
    backend_id: String,
    vendor_ids: Vec<String>,
    instance_ids: BTreeSet<String>,
    guids: BTreeSet<uuid::Uuid>,

    version: String,
    version_raw: u64,
    version_format: VersionFormat,

    name: String,
    parent_id: Option<String>,
    children: Vec<Device>,

    pub flags: DeviceFlags,
    pub private_flags: PrivateFlags,

    inhibits: std::collections::HashMap<String, InhibitEntry>,

    pub events: EventLog,

    quirks: std::collections::BTreeMap<String, String>,

    guid_namespace: uuid::Uuid,
}

impl Device {
    pub fn new(guid_namespace: uuid::Uuid) -> Self {
        Device {
            physical_id: String::new(),
            logical_id: String::new(),
            backend_id: String::new(),
            vendor_ids: Vec::new(),
            instance_ids: BTreeSet::new(),
            guids: BTreeSet::new(),
            version: String::new(),
            version_raw: 0,
            version_format: VersionFormat::Plain,
            name: String::new(),
            parent_id: None,
            children: Vec::new(),
            flags: DeviceFlags::empty(),
            private_flags: PrivateFlags::new(),
            inhibits: std::collections::HashMap::new(),
            events: EventLog::new(),
            quirks: std::collections::BTreeMap::new(),
            guid_namespace,
        }
    }

    pub fn set_physical_id(&mut self, physical_id: impl Into<String>) {
        self.physical_id = physical_id.into();
    }

    pub fn set_logical_id(&mut self, logical_id: impl Into<String>) {
        self.logical_id = logical_id.into();
    }

    pub fn set_backend_id(&mut self, backend_id: impl Into<String>) { self.backend_id = backend_id.into(); }

    /// Applies one `Key=Value` line from a probed quirk blob (USB DS20, or a
    /// quirk-file match). Last write for a given key wins, matching
    /// `fu_device_set_metadata`'s plain-overwrite semantics.
    pub fn set_quirk_kv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.quirks.insert(key.into(), value.into());
    }

    pub fn quirk(&self, key: &str) -> Option<&str> { self.quirks.get(key).map(|s| s.as_str()) }

    pub fn add_vendor_id(&mut self, vendor_id: impl Into<String>) { self.vendor_ids.push(vendor_id.into()); }

    pub fn set_version(&mut self, version: impl Into<String>, format: VersionFormat) {
        self.version = version.into();
        self.version_format = format;
    }

    pub fn set_version_raw(&mut self, version_raw: u64) { self.version_raw = version_raw; }

    pub fn version(&self) -> &str { &self.version }

    pub fn set_name(&mut self, name: impl Into<String>) { self.name = name.into(); }

    pub fn name(&self) -> &str { &self.name }

    /// `device-id` is derived deterministically from whatever physical and
    /// logical IDs are current at call time — there is no "first write wins"
    /// caching, since callers are free to set physical and logical IDs in
    /// either order (`backend::linux`'s coldplug path only ever calls
    /// `set_physical_id`, for instance) and an ID computed before both are
    /// known would silently omit the logical-id component forever.
    pub fn device_id(&self) -> Option<String> {
        if self.physical_id.is_empty() {
            return None;
        }
        Some(device_id_hash(&self.physical_id, &self.logical_id))
    }

    pub fn set_parent_id(&mut self, parent_id: impl Into<String>) { self.parent_id = Some(parent_id.into()); }

    pub fn parent_id(&self) -> Option<&str> { self.parent_id.as_deref() }

    pub fn add_child(&mut self, child: Device) { self.children.push(child); }

    pub fn children(&self) -> &[Device] { &self.children }

    pub fn children_mut(&mut self) -> &mut [Device] { &mut self.children }

    /// Composes `SUBSYSTEM\KEY1_val&KEY2_val…`, hashes it to a GUID and
    /// records both the instance-ID string (if `VISIBLE`) and the GUID.
    /// Missing keys fail unless `OPTIONAL` is set, in which case that
    /// component is simply omitted.
    pub fn add_instance_id_full(
        &mut self,
        flags: InstanceIdFlags,
        subsystem: &str,
        keys: &[(&str, Option<&str>)],
    ) -> Result<()> {
        let mut parts = Vec::new();
        for (key, value) in keys {
            match value {
                Some(v) => parts.push(format!("{}_{}", key, strsafe(v))),
                None if flags.contains(InstanceIdFlags::OPTIONAL) => continue,
                None => {
                    return Err(Error::invalid_data(format!(
                        "missing required instance-id key '{}'",
                        key
                    )))
                }
            }
        }
        let instance_id = format!("{}\\{}", subsystem, parts.join("&"));
        let guid = instance_id_to_guid(self.guid_namespace, &instance_id);

        if flags.contains(InstanceIdFlags::VISIBLE) {
            self.instance_ids.insert(instance_id);
        }
        self.guids.insert(guid);
        Ok(())
    }

    pub fn build_instance_id(&mut self, subsystem: &str, keys: &[(&str, &str)]) -> Result<()> {
        let owned: Vec<(&str, Option<&str>)> = keys.iter().map(|(k, v)| (*k, Some(*v))).collect();
        self.add_instance_id_full(InstanceIdFlags::VISIBLE, subsystem, &owned)
    }

    pub fn add_guid(&mut self, guid: uuid::Uuid) { self.guids.insert(guid); }

    pub fn instance_ids(&self) -> &BTreeSet<String> { &self.instance_ids }

    pub fn guids(&self) -> &BTreeSet<uuid::Uuid> { &self.guids }

    pub fn has_guid(&self, guid: &uuid::Uuid) -> bool { self.guids.contains(guid) }

    pub fn inhibit(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.inhibits.insert(key.into(), InhibitEntry { reason: reason.into() });
        self.flags.remove(DeviceFlags::UPDATABLE);
    }

    pub fn uninhibit(&mut self, key: &str) {
        self.inhibits.remove(key);
        if self.inhibits.is_empty() {
            self.flags.insert(DeviceFlags::UPDATABLE);
        }
    }

    pub fn is_inhibited(&self) -> bool { !self.inhibits.is_empty() }

    pub fn inhibit_reasons(&self) -> Vec<&str> { self.inhibits.values().map(|e| e.reason.as_str()).collect() }

    /// Rejects transport calls on an emulated device that isn't replaying
    /// through the event log — per the "emulated never does real I/O" invariant.
    pub fn assert_emulation_safe(&self) -> Result<()> {
        if self.flags.contains(DeviceFlags::EMULATED) && self.events.is_empty() {
            return Err(Error::internal("emulated device has no events to replay"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace() -> uuid::Uuid {
        uuid::Uuid::parse_str("70ffd812-4c7f-4c7d-0000-000000000000").unwrap()
    }

    #[test]
    fn device_id_is_stable_across_repeated_calls() {
        let mut device = Device::new(namespace());
        device.set_physical_id("usb:1-2");
        device.set_logical_id("hid");
        let first = device.device_id().unwrap();
        assert_eq!(device.device_id().unwrap(), first);
    }

    #[test]
    fn device_id_incorporates_logical_id_set_after_physical_id() {
        let mut physical_first = Device::new(namespace());
        physical_first.set_physical_id("usb:1-2");
        physical_first.set_logical_id("hid");

        let mut both_upfront = Device::new(namespace());
        both_upfront.set_logical_id("hid");
        both_upfront.set_physical_id("usb:1-2");

        assert_eq!(physical_first.device_id().unwrap(), both_upfront.device_id().unwrap());

        let mut physical_only = Device::new(namespace());
        physical_only.set_physical_id("usb:1-2");
        assert_ne!(physical_only.device_id().unwrap(), physical_first.device_id().unwrap());
    }

    #[test]
    fn set_quirk_kv_last_write_wins() {
        let mut device = Device::new(namespace());
        device.set_quirk_kv("Flags", "internal");
        device.set_quirk_kv("Flags", "updatable");
        assert_eq!(device.quirk("Flags"), Some("updatable"));
        assert_eq!(device.quirk("Missing"), None);
    }

    #[test]
    fn missing_required_instance_id_key_fails() {
        let mut device = Device::new(namespace());
        let result = device.add_instance_id_full(
            InstanceIdFlags::VISIBLE,
            "USB",
            &[("VID", Some("1234")), ("PID", None)],
        );
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn optional_missing_key_is_omitted() {
        let mut device = Device::new(namespace());
        device
            .add_instance_id_full(
                InstanceIdFlags::VISIBLE | InstanceIdFlags::OPTIONAL,
                "USB",
                &[("VID", Some("1234")), ("REV", None)],
            )
            .unwrap();
        assert!(device.instance_ids().iter().next().unwrap().starts_with("USB\\VID_1234"));
    }

    #[test]
    fn inhibit_clears_updatable_and_uninhibit_restores_it() {
        let mut device = Device::new(namespace());
        device.flags.insert(DeviceFlags::UPDATABLE);
        device.inhibit("locked", "device is locked");
        assert!(!device.flags.contains(DeviceFlags::UPDATABLE));
        device.uninhibit("locked");
        assert!(device.flags.contains(DeviceFlags::UPDATABLE));
    }

    #[test]
    fn locker_runs_close_even_when_body_errors() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let closed = Arc::new(AtomicBool::new(false));
        let closed_clone = closed.clone();
        let locker = Locker::new_full(0u32, |_| Ok(()), move |_| {
            closed_clone.store(true, Ordering::SeqCst);
        })
        .unwrap();
        drop(locker);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn retry_gives_up_on_non_recoverable_error() {
        let mut calls = 0;
        let result = retry(
            || {
                calls += 1;
                Err(Error::not_supported("nope"))
            },
            5,
            0,
            &[ErrorKind::Busy],
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_retries_recoverable_error_until_exhausted() {
        let mut calls = 0;
        let result = retry(
            || {
                calls += 1;
                Err(Error::busy("claim failed"))
            },
            3,
            0,
            &[ErrorKind::Busy],
        );
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }
}
