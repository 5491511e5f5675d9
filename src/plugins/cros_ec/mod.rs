//! The Cros-EC update state machine: the worked non-trivial protocol example
//! from spec.md section 4.5. Grounded on
//! `examples/original_source/plugins/cros-ec/fu-cros-ec-usb-device.c`.

pub mod firmware;
pub mod touchpad;

use crate::error::{Error, ErrorKind, Result};
use crate::usb::{Direction, UsbDevice};
use firmware::{CrosEcFirmware, Section};

pub const USB_SUBCLASS_GOOGLE_UPDATE: u8 = 0x53;
pub const USB_PROTOCOL_GOOGLE_UPDATE: u8 = 0xff;

const REQUEST_UPDATE_DONE: u32 = 0xB007AB1E;
const REQUEST_UPDATE_EXTRA_CMD: u32 = 0xB007AB1F;
const SETUP_RETRY_CNT: u32 = 5;
const BLOCK_RETRY_CNT: u32 = 10;

pub const FLAG_RO_WRITTEN: &str = "ro-written";
pub const FLAG_RW_WRITTEN: &str = "rw-written";
pub const FLAG_REBOOTING_TO_RO: &str = "rebooting-to-ro";
pub const FLAG_SPECIAL: &str = "special";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtraCommand {
    ImmediateReset = 0x0003,
    JumpToRw = 0x0004,
    UnlockRw = 0x0011,
    TouchpadInfo = 0x0013,
}

/// `{block_size: u32 BE, cmd_block_base: u32 BE}`, sent before every payload.
#[derive(Debug, Clone, Copy)]
pub struct UpdateFrameHeader {
    pub block_size: u32,
    pub cmd_block_base: u32,
}

impl UpdateFrameHeader {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.block_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.cmd_block_base.to_be_bytes());
        buf
    }
}

/// Encodes a subcommand frame: header with `cmd_block_base = 0xB007AB1F`
/// followed by a 16-bit opcode and optional body.
pub fn encode_subcommand(opcode: ExtraCommand, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + body.len());
    payload.extend_from_slice(&(opcode as u16).to_be_bytes());
    payload.extend_from_slice(body);

    let header = UpdateFrameHeader {
        block_size: (UpdateFrameHeader::SIZE + payload.len()) as u32,
        cmd_block_base: REQUEST_UPDATE_EXTRA_CMD,
    };
    let mut frame = header.to_bytes().to_vec();
    frame.extend_from_slice(&payload);
    frame
}

pub fn encode_done_frame() -> [u8; UpdateFrameHeader::SIZE] {
    UpdateFrameHeader { block_size: UpdateFrameHeader::SIZE as u32, cmd_block_base: REQUEST_UPDATE_DONE }.to_bytes()
}

/// The parsed "first response PDU" returned by the zero-length handshake
/// frame.
#[derive(Debug, Clone)]
pub struct FirstResponsePdu {
    pub protocol_version: u16,
    pub maximum_pdu_size: u32,
    pub flash_protection: u32,
    pub writeable_offset: u32,
    pub version: String,
    pub return_value: u32,
}

const RW_PROTECTION_BIT: u32 = 1 << 8;

impl FirstResponsePdu {
    pub fn is_rw_protected(&self) -> bool { self.flash_protection & RW_PROTECTION_BIT != 0 }

    /// `writeable_offset != 0` is the heuristic spec.md section 4.5 uses to
    /// decide the device has landed in its bootloader (RO) region.
    pub fn in_bootloader(&self) -> bool { self.writeable_offset != 0 }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 + 4 + 4 + 4 + 32 + 4 {
            return Err(Error::invalid_data("first response PDU too short"));
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

        let protocol_version = read_u16(data, &mut offset);
        if protocol_version != 5 && protocol_version != 6 {
            return Err(Error::invalid_data(format!("unsupported protocol version: {}", protocol_version)));
        }
        let maximum_pdu_size = read_u32(data, &mut offset);
        let flash_protection = read_u32(data, &mut offset);
        let writeable_offset = read_u32(data, &mut offset);
        let version_bytes = &data[offset..offset + 32];
        offset += 32;
        let version = String::from_utf8_lossy(version_bytes).trim_end_matches('\0').to_string();
        let return_value = read_u32(data, &mut offset);

        Ok(FirstResponsePdu {
            protocol_version,
            maximum_pdu_size,
            flash_protection,
            writeable_offset,
            version,
            return_value,
        })
    }
}

/// Strips trailing `0xFF` bytes from `payload`, always keeping at least one
/// byte, per spec.md's smart-trim rule.
pub fn smart_trim(payload: &[u8]) -> &[u8] {
    let mut end = payload.len();
    while end > 1 && payload[end - 1] == 0xFF {
        end -= 1;
    }
    &payload[..end]
}

/// One USB bulk transfer pass for a single needed section: frame, split into
/// `max_pdu_size` blocks, each split again into `chunk_len` bulk writes.
/// Block-level failures retry the whole block up to `BLOCK_RETRY_CNT` times,
/// draining the endpoint between attempts.
pub fn transfer_section(
    usb: &mut UsbDevice,
    endpoint: u8,
    section: &Section,
    firmware_data: &[u8],
    max_pdu_size: u32,
    chunk_len: usize,
    timeout_ms: u64,
) -> Result<()> {
    transfer_frame(usb, endpoint, section.offset, firmware_data, max_pdu_size, chunk_len, timeout_ms)
}

/// Transfers the touchpad child device's firmware, reusing the same framing
/// and chunked bulk-transfer/retry machinery as [`transfer_section`] but with
/// `cmd_block_base` set to the touchpad's `fw_address` rather than a Cros-EC
/// firmware section's offset, per spec.md section 4.5.
pub fn transfer_touchpad_firmware(
    usb: &mut UsbDevice,
    endpoint: u8,
    fw_address: u32,
    firmware_data: &[u8],
    max_pdu_size: u32,
    chunk_len: usize,
    timeout_ms: u64,
) -> Result<()> {
    transfer_frame(usb, endpoint, fw_address, firmware_data, max_pdu_size, chunk_len, timeout_ms)
}

fn transfer_frame(
    usb: &mut UsbDevice,
    endpoint: u8,
    cmd_block_base: u32,
    firmware_data: &[u8],
    max_pdu_size: u32,
    chunk_len: usize,
    timeout_ms: u64,
) -> Result<()> {
    let trimmed = smart_trim(firmware_data);

    let header =
        UpdateFrameHeader { block_size: (UpdateFrameHeader::SIZE + trimmed.len()) as u32, cmd_block_base };
    let mut frame = header.to_bytes().to_vec();
    frame.extend_from_slice(trimmed);

    for block in frame.chunks(max_pdu_size as usize) {
        let mut attempt = 0;
        loop {
            let result = send_block(usb, endpoint, block, chunk_len, timeout_ms);
            match result {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::Read && attempt < BLOCK_RETRY_CNT => {
                    attempt += 1;
                    usb.drain(endpoint);
                }
                Err(e) => {
                    usb.drain(endpoint);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

/// Sends an extra subcommand (e.g. `TOUCHPAD_INFO`) and reads back
/// `response_len` bytes of reply payload. Unlike [`send_block`]'s 4-byte
/// zero-ack, subcommand replies carry a real payload the caller parses.
pub fn send_subcommand(
    usb: &mut UsbDevice,
    endpoint: u8,
    opcode: ExtraCommand,
    body: &[u8],
    response_len: usize,
    timeout_ms: u64,
) -> Result<Vec<u8>> {
    let mut frame = encode_subcommand(opcode, body);
    usb.bulk(Direction::HostToDevice, endpoint, &mut frame, timeout_ms)?;
    let mut response = vec![0u8; response_len];
    if response_len > 0 {
        usb.bulk(Direction::DeviceToHost, endpoint, &mut response, timeout_ms)?;
    }
    Ok(response)
}

fn send_block(usb: &mut UsbDevice, endpoint: u8, block: &[u8], chunk_len: usize, timeout_ms: u64) -> Result<()> {
    for chunk in block.chunks(chunk_len) {
        let mut buf = chunk.to_vec();
        usb.bulk(Direction::HostToDevice, endpoint, &mut buf, timeout_ms)?;
    }
    let mut reply = [0u8; 4];
    usb.bulk(Direction::DeviceToHost, endpoint, &mut reply, timeout_ms)?;
    if u32::from_be_bytes(reply) != 0 {
        return Err(Error::read("non-zero block reply"));
    }
    Ok(())
}

/// The reboot choreography decision for one write pass, per spec.md's state
/// diagram. Pure decision logic over the handshake result and the device's
/// current private flags — transport side-effects live in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootAction {
    /// Issue `IMMEDIATE_RESET` and wait for replug.
    ResetToRo,
    /// Issue `JUMP_TO_RW` (falling back to `IMMEDIATE_RESET` on failure) and wait for replug.
    JumpToRw,
    /// Issue `UNLOCK_RW` and arm another write pass; no replug expected yet.
    UnlockRw,
    /// RW landed back in RO after auto-jump; arm a replug wait without a real transfer.
    Special,
    /// Nothing else to do.
    Done,
}

/// `ro_needed`/`rw_needed` come from [`CrosEcFirmware::pick_sections`] for
/// the *current* pass; `rw_already_written` carries the `rw-written`
/// private flag from an *earlier* pass (the anomaly the `SPECIAL` case
/// exists for: RW was written, but the device landed back in RO).
pub fn decide_reboot_action(
    pdu: &FirstResponsePdu,
    ro_needed: bool,
    rw_needed: bool,
    rw_already_written: bool,
) -> RebootAction {
    if rw_already_written && pdu.in_bootloader() {
        return RebootAction::Special;
    }
    if ro_needed && !rw_needed {
        return RebootAction::ResetToRo;
    }
    if rw_needed && !rw_already_written && (!pdu.in_bootloader() || pdu.is_rw_protected()) {
        return RebootAction::UnlockRw;
    }
    if rw_needed && pdu.in_bootloader() {
        return RebootAction::JumpToRw;
    }
    RebootAction::Done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_trim_keeps_at_least_one_byte() {
        let mut payload = vec![0u8; 1024];
        payload.extend(std::iter::repeat(0xFFu8).take(1024));
        assert_eq!(smart_trim(&payload).len(), 1025);
    }

    #[test]
    fn smart_trim_noop_when_no_trailing_ff() {
        let payload = vec![1, 2, 3];
        assert_eq!(smart_trim(&payload), &[1, 2, 3]);
    }

    #[test]
    fn encode_subcommand_uses_extra_cmd_base() {
        let frame = encode_subcommand(ExtraCommand::ImmediateReset, &[]);
        let base = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
        assert_eq!(base, REQUEST_UPDATE_EXTRA_CMD);
    }

    fn sample_pdu(writeable_offset: u32, protected: bool) -> FirstResponsePdu {
        FirstResponsePdu {
            protocol_version: 6,
            maximum_pdu_size: 512,
            flash_protection: if protected { RW_PROTECTION_BIT } else { 0 },
            writeable_offset,
            version: "cheese_v1.0.0-aaa".to_string(),
            return_value: 0,
        }
    }

    #[test]
    fn reboot_action_resets_to_ro_when_only_ro_needed() {
        let pdu = sample_pdu(0, false);
        assert_eq!(decide_reboot_action(&pdu, true, false, false), RebootAction::ResetToRo);
    }

    #[test]
    fn reboot_action_jumps_to_rw_when_unprotected_in_bootloader() {
        let pdu = sample_pdu(0x1000, false);
        assert_eq!(decide_reboot_action(&pdu, false, true, false), RebootAction::JumpToRw);
    }

    #[test]
    fn reboot_action_unlocks_rw_when_protected_in_bootloader() {
        let pdu = sample_pdu(0x1000, true);
        assert_eq!(decide_reboot_action(&pdu, false, true, false), RebootAction::UnlockRw);
    }

    /// `{RW needed, in_bootloader=false, protection=0x100}`: the device is
    /// still in its own firmware (never jumped), but RW is already flagged
    /// protected, so the next write pass needs an `UNLOCK_RW` before it can
    /// proceed rather than a bootloader jump.
    #[test]
    fn reboot_action_unlocks_rw_when_protected_and_not_in_bootloader() {
        let pdu = sample_pdu(0, true);
        assert_eq!(decide_reboot_action(&pdu, false, true, false), RebootAction::UnlockRw);
    }

    #[test]
    fn reboot_action_special_when_rw_already_written_but_landed_in_ro() {
        let pdu = sample_pdu(0x1000, false);
        assert_eq!(decide_reboot_action(&pdu, false, false, true), RebootAction::Special);
    }

    #[test]
    fn reboot_action_done_when_nothing_needed_and_not_in_bootloader() {
        let pdu = sample_pdu(0, false);
        assert_eq!(decide_reboot_action(&pdu, false, false, false), RebootAction::Done);
    }

    #[test]
    fn parses_first_response_pdu() {
        let mut data = Vec::new();
        data.extend_from_slice(&6u16.to_be_bytes());
        data.extend_from_slice(&512u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0x1000u32.to_be_bytes());
        let mut version = [0u8; 32];
        version[..9].copy_from_slice(b"cheese_v1");
        data.extend_from_slice(&version);
        data.extend_from_slice(&0u32.to_be_bytes());

        let pdu = FirstResponsePdu::parse(&data).unwrap();
        assert_eq!(pdu.protocol_version, 6);
        assert_eq!(pdu.writeable_offset, 0x1000);
        assert!(pdu.in_bootloader());
        assert!(pdu.version.starts_with("cheese_v1"));
    }

    #[test]
    fn rejects_unsupported_protocol_version() {
        let mut data = vec![0u8; 2 + 4 + 4 + 4 + 32 + 4];
        data[0..2].copy_from_slice(&4u16.to_be_bytes());
        assert!(FirstResponsePdu::parse(&data).is_err());
    }
}
