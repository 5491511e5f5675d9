//! The `has-touchpad` child device, created at setup from the parent's
//! `TOUCHPAD_INFO` subcommand response. Grounded on
//! `fu-cros-ec-hammer-touchpad.c`.

use super::{send_subcommand, transfer_touchpad_firmware, ExtraCommand};
use crate::error::{Error, Result};
use crate::usb::UsbDevice;

pub const ST_VENDOR_ID: u16 = 0x0483;
pub const ELAN_VENDOR_ID: u16 = 0x04f3;

const ALLOWED_FW_HASH_LEN: usize = 32;

/// `status(4) + vendor(2) + fw_address(4) + fw_size(4) + allowed_fw_hash(32) +
/// id(2) + fw_version(2) + fw_checksum(2)`, big-endian, matching the field
/// order `fu_cros_ec_hammer_touchpad_get_info` reads off
/// `FuStructCrosEcTouchpadGetInfoResponsePdu`.
const RESPONSE_LEN: usize = 4 + 2 + 4 + 4 + ALLOWED_FW_HASH_LEN + 2 + 2 + 2;

#[derive(Debug, Clone)]
pub struct TouchpadInfo {
    pub vendor: u16,
    pub fw_address: u32,
    pub fw_size: u32,
    pub allowed_fw_hash: Vec<u8>,
    pub id: u16,
    pub fw_version: u16,
    pub fw_checksum: u16,
}

impl TouchpadInfo {
    /// Parses a `TOUCHPAD_INFO` response PDU, rejecting a non-zero device-side
    /// status the same way `fu_cros_ec_hammer_touchpad_get_info` does.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RESPONSE_LEN {
            return Err(Error::invalid_data("touchpad info response too short"));
        }
        let mut offset = 0;
        let read_u16 = |data: &[u8], offset: &mut usize| {
            let v = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
            *offset += 2;
            v
        };
        let read_u32 = |data: &[u8], offset: &mut usize| {
            let v = u32::from_be_bytes([data[*offset], data[*offset + 1], data[*offset + 2], data[*offset + 3]]);
            *offset += 4;
            v
        };

        let status = read_u32(data, &mut offset);
        if status != 0 {
            return Err(Error::internal(format!("target touchpad reporting error {}", status)));
        }
        let vendor = read_u16(data, &mut offset);
        let fw_address = read_u32(data, &mut offset);
        let fw_size = read_u32(data, &mut offset);
        let allowed_fw_hash = data[offset..offset + ALLOWED_FW_HASH_LEN].to_vec();
        offset += ALLOWED_FW_HASH_LEN;
        let id = read_u16(data, &mut offset);
        let fw_version = read_u16(data, &mut offset);
        let fw_checksum = read_u16(data, &mut offset);

        Ok(TouchpadInfo { vendor, fw_address, fw_size, allowed_fw_hash, id, fw_version, fw_checksum })
    }

    /// Sends the `TOUCHPAD_INFO` extra subcommand over the parent Cros-EC
    /// device's update endpoint and parses the device's response.
    pub fn query(usb: &mut UsbDevice, endpoint: u8, timeout_ms: u64) -> Result<Self> {
        let response = send_subcommand(usb, endpoint, ExtraCommand::TouchpadInfo, &[], RESPONSE_LEN, timeout_ms)?;
        Self::parse(&response)
    }

    /// Writes `firmware_data` to the touchpad, reusing the parent's chunked
    /// bulk-transfer framing with `cmd_block_base = fw_address` instead of a
    /// firmware section's offset.
    pub fn write_firmware(
        &self,
        usb: &mut UsbDevice,
        endpoint: u8,
        firmware_data: &[u8],
        max_pdu_size: u32,
        chunk_len: usize,
        timeout_ms: u64,
    ) -> Result<()> {
        self.validate_payload_size(firmware_data.len())?;
        transfer_touchpad_firmware(usb, endpoint, self.fw_address, firmware_data, max_pdu_size, chunk_len, timeout_ms)
    }

    /// ST formats as `low.high` of the two bytes of `fw_version`; ELAN
    /// formats as `ver.0`. Any other vendor has no known format.
    pub fn format_version(&self) -> Result<String> {
        match self.vendor {
            ST_VENDOR_ID => Ok(format!("{}.{}", self.fw_version & 0x00ff, (self.fw_version & 0xff00) >> 8)),
            ELAN_VENDOR_ID => Ok(format!("{}.0", self.fw_version)),
            other => Err(Error::not_supported(format!("unknown touchpad vendor 0x{:04x}", other))),
        }
    }

    /// Sanity-checks a firmware payload's length against the reported flash
    /// size before a touchpad write is attempted.
    pub fn validate_payload_size(&self, payload_len: usize) -> Result<()> {
        if payload_len > self.fw_size as usize {
            return Err(Error::invalid_data(format!(
                "touchpad payload ({} bytes) exceeds reported fw_size ({} bytes)",
                payload_len, self.fw_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(vendor: u16, fw_version: u16) -> TouchpadInfo {
        TouchpadInfo {
            vendor,
            fw_address: 0x1000,
            fw_size: 4096,
            allowed_fw_hash: vec![0; 32],
            id: 1,
            fw_version,
            fw_checksum: 0,
        }
    }

    #[test]
    fn st_vendor_formats_low_dot_high() {
        let touchpad = info(ST_VENDOR_ID, 0x0201);
        assert_eq!(touchpad.format_version().unwrap(), "1.2");
    }

    #[test]
    fn elan_vendor_formats_ver_dot_zero() {
        let touchpad = info(ELAN_VENDOR_ID, 42);
        assert_eq!(touchpad.format_version().unwrap(), "42.0");
    }

    #[test]
    fn unknown_vendor_is_not_supported() {
        assert!(info(0xDEAD, 1).format_version().is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let touchpad = info(ST_VENDOR_ID, 1);
        assert!(touchpad.validate_payload_size(8192).is_err());
        assert!(touchpad.validate_payload_size(2048).is_ok());
    }

    fn sample_response(status: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&status.to_be_bytes());
        data.extend_from_slice(&ST_VENDOR_ID.to_be_bytes());
        data.extend_from_slice(&0x2000u32.to_be_bytes());
        data.extend_from_slice(&4096u32.to_be_bytes());
        data.extend_from_slice(&[0u8; ALLOWED_FW_HASH_LEN]);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0x0201u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data
    }

    #[test]
    fn parse_reads_every_field_in_order() {
        let touchpad = TouchpadInfo::parse(&sample_response(0)).unwrap();
        assert_eq!(touchpad.vendor, ST_VENDOR_ID);
        assert_eq!(touchpad.fw_address, 0x2000);
        assert_eq!(touchpad.fw_size, 4096);
        assert_eq!(touchpad.id, 1);
        assert_eq!(touchpad.fw_version, 0x0201);
    }

    #[test]
    fn parse_rejects_nonzero_status() {
        assert!(TouchpadInfo::parse(&sample_response(7)).is_err());
    }

    #[test]
    fn parse_rejects_short_response() {
        assert!(TouchpadInfo::parse(&[0u8; 4]).is_err());
    }

    #[test]
    fn query_sends_touchpad_info_subcommand_and_parses_reply() {
        use crate::device::event::DeviceEvent;

        let mut usb = UsbDevice::emulated();
        // recorded twice: the emulated write leg and the emulated read leg
        // each consume one matching "bulk:endpoint=1" event from the log.
        for _ in 0..2 {
            let mut event = DeviceEvent::new("bulk:endpoint=1");
            event.set_data(&sample_response(0));
            usb.events.record(event);
        }

        let touchpad = TouchpadInfo::query(&mut usb, 1, 1000).unwrap();
        assert_eq!(touchpad.vendor, ST_VENDOR_ID);
        assert_eq!(touchpad.fw_version, 0x0201);
    }

    #[test]
    fn write_firmware_rejects_oversized_payload_before_transfer() {
        let touchpad = info(ST_VENDOR_ID, 1);
        let mut usb = UsbDevice::emulated();
        let oversized = vec![0u8; 8192];
        assert!(touchpad.write_firmware(&mut usb, 1, &oversized, 512, 64, 1000).is_err());
    }
}
