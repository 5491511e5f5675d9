//! `FuUefiDevice`-shaped collaborator contract: NVRAM variable access wrapped
//! in the event recorder, with a free-space inhibit. Grounded on
//! `examples/original_source/libfwupdplugin/fu-uefi-device.c`.

use crate::device::event::DeviceEvent;
use crate::device::Device;
use crate::error::{Error, Result};

pub const INHIBIT_ID_NO_EFIVARS_SPACE: &str = "no-efivars-space";

/// Backing store for NVRAM access. A real implementation talks to
/// `/sys/firmware/efi/efivars`; tests and emulation never need one since
/// emulated devices replay through the event log instead.
pub trait EfivarStore {
    fn set_data(&mut self, guid: &str, name: &str, data: &[u8], attr: u32) -> Result<()>;
    fn get_data(&self, guid: &str, name: &str) -> Result<(Vec<u8>, u32)>;
}

fn set_event_id(guid: &str, name: &str, attr: u32) -> String {
    format!("SetEfivar:Guid={},Name={},Attr=0x{:x}", guid, name, attr)
}

fn get_event_id(guid: &str, name: &str) -> String {
    format!("GetEfivar:Guid={},Name={}", guid, name)
}

/// Sets a UEFI variable, emulating through `device.events` when the device
/// carries the `EMULATED` flag, and additionally recording the call when
/// `SAVE_EVENTS` behavior is requested via `save_events`.
pub fn set_efivar_bytes(
    device: &mut Device,
    store: &mut impl EfivarStore,
    save_events: bool,
    guid: &str,
    name: &str,
    data: &[u8],
    attr: u32,
) -> Result<()> {
    let emulated = device.flags.contains(crate::device::flags::DeviceFlags::EMULATED);
    let event_id = set_event_id(guid, name, attr);

    if emulated {
        let event = device.events.load_event(&event_id)?;
        let recorded = event.get_data()?;
        if recorded != data {
            return Err(Error::invalid_data("efivar write does not match recorded emulation data"));
        }
        return Ok(());
    }

    store.set_data(guid, name, data, attr)?;

    if save_events {
        let mut event = DeviceEvent::new(&event_id);
        event.set_data(data);
        device.events.record(event);
    }
    Ok(())
}

/// Gets a UEFI variable, emulating the same way `set_efivar_bytes` does.
pub fn get_efivar_bytes(
    device: &mut Device,
    store: &impl EfivarStore,
    save_events: bool,
    guid: &str,
    name: &str,
) -> Result<(Vec<u8>, u32)> {
    let emulated = device.flags.contains(crate::device::flags::DeviceFlags::EMULATED);
    let event_id = get_event_id(guid, name);

    if emulated {
        let event = device.events.load_event(&event_id)?;
        let data = event.get_data()?;
        let attr = event.get_i64("Attr")? as u32;
        return Ok((data, attr));
    }

    let (data, attr) = store.get_data(guid, name)?;

    if save_events {
        let mut event = DeviceEvent::new(&event_id);
        event.set_data(&data);
        event.set_i64("Attr", attr as i64);
        device.events.record(event);
    }
    Ok((data, attr))
}

/// Applies the `no-efivars-space` inhibit/uninhibit transition as
/// `required_free` changes, per `fu_uefi_device_required_free_notify_cb`.
pub fn apply_free_space_inhibit(device: &mut Device, required_free: u64, available_free: u64) {
    if required_free > 0 && available_free < required_free {
        device.inhibit(
            INHIBIT_ID_NO_EFIVARS_SPACE,
            format!("required {} bytes, only {} available", required_free, available_free),
        );
    } else {
        device.uninhibit(INHIBIT_ID_NO_EFIVARS_SPACE);
    }
}
