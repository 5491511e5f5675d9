//! USB transport: the three transfer primitives plus descriptor/BOS/DS20
//! scanning. Grounded on `rusb` (the dependency the pack's `cyme` example
//! also layers over libusb) for the device handle, with the error-kind
//! mapping table from spec.md section 4.3 owned here rather than left to
//! each caller to reinterpret `rusb::Error`.

pub mod ds20;

use crate::device::event::DeviceEvent;
use crate::device::Device;
use crate::error::{Error, ErrorKind, Result};
use ds20::PlatformCapability;
use std::time::Duration;

const GET_DESCRIPTOR: u8 = 0x06;
const DESCRIPTOR_TYPE_DEVICE: u16 = 0x01;
const DESCRIPTOR_TYPE_CONFIG: u16 = 0x02;
const DESCRIPTOR_TYPE_BOS: u16 = 0x0F;
const DESCRIPTOR_TYPE_HID_REPORT: u16 = 0x22;
const BCD_USB_2_0: u16 = 0x0200;
const USB_CLASS_HID: u8 = 0x03;
const DEV_CAPABILITY_DESCRIPTOR: u8 = 0x10;
const DEV_CAPABILITY_PLATFORM: u8 = 0x05;

/// Transfer direction, matching the `bmRequestType` direction bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Maps a `rusb::Error` to this crate's closed `ErrorKind`, per the table in
/// spec.md section 4.3.
pub fn map_usb_error(err: rusb::Error) -> ErrorKind {
    match err {
        rusb::Error::InvalidParam | rusb::Error::NotFound | rusb::Error::NoMem | rusb::Error::Other | rusb::Error::Interrupted => {
            ErrorKind::Internal
        }
        rusb::Error::Io | rusb::Error::Overflow | rusb::Error::Pipe => ErrorKind::Read,
        rusb::Error::Timeout => ErrorKind::TimedOut,
        rusb::Error::NotSupported => ErrorKind::NotSupported,
        rusb::Error::Access => ErrorKind::PermissionDenied,
        rusb::Error::NoDevice => ErrorKind::NotFound,
        rusb::Error::Busy => ErrorKind::Busy,
    }
}

fn wrap_usb_error(context: &str, err: rusb::Error) -> Error {
    Error::with_cause(map_usb_error(err), format!("{}: {}", context, err), err)
}

#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub bcd_usb: u16,
    pub class: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub max_packet_size: u16,
    pub transfer_type: u8,
}

#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Owned USB transport handle over a claimed set of interfaces. When
/// `emulated` is set, transfer primitives never touch `handle` and instead
/// load recorded events (or, if `save_events` is also set, append them).
pub struct UsbDevice {
    handle: Option<rusb::DeviceHandle<rusb::GlobalContext>>,
    claimed_interfaces: Vec<u8>,
    pub emulated: bool,
    pub save_events: bool,
    pub events: crate::device::event::EventLog,
}

impl UsbDevice {
    pub fn from_handle(handle: rusb::DeviceHandle<rusb::GlobalContext>) -> Self {
        UsbDevice {
            handle: Some(handle),
            claimed_interfaces: Vec::new(),
            emulated: false,
            save_events: false,
            events: crate::device::event::EventLog::new(),
        }
    }

    pub fn emulated() -> Self {
        UsbDevice {
            handle: None,
            claimed_interfaces: Vec::new(),
            emulated: true,
            save_events: false,
            events: crate::device::event::EventLog::new(),
        }
    }

    /// Claims `interface_number`, retrying up to `claim_retry_count` times
    /// with a 50ms delay, optionally detaching the kernel driver first.
    pub fn claim_interface(
        &mut self,
        interface_number: u8,
        detach_kernel_driver: bool,
        claim_retry_count: u32,
    ) -> Result<()> {
        if self.emulated {
            self.claimed_interfaces.push(interface_number);
            return Ok(());
        }
        let handle = self.handle.as_mut().ok_or_else(|| Error::internal("usb handle not open"))?;

        if detach_kernel_driver {
            match handle.kernel_driver_active(interface_number) {
                Ok(true) => {
                    handle
                        .detach_kernel_driver(interface_number)
                        .map_err(|e| wrap_usb_error("detach kernel driver", e))?;
                }
                Ok(false) => {}
                Err(_) => {}
            }
        }

        crate::device::retry(
            || handle.claim_interface(interface_number).map_err(|e| wrap_usb_error("claim interface", e)),
            claim_retry_count,
            50,
            &[ErrorKind::Busy],
        )?;
        self.claimed_interfaces.push(interface_number);
        Ok(())
    }

    /// Releases every claimed interface. Kernel-driver re-attach is skipped
    /// while `skip_reattach` is set (waiting for a replug avoids a race with
    /// udev re-enumerating the device).
    pub fn close(&mut self, skip_reattach: bool) {
        if let Some(handle) = self.handle.as_mut() {
            for &interface in &self.claimed_interfaces {
                let _ = handle.release_interface(interface);
                if !skip_reattach {
                    let _ = handle.attach_kernel_driver(interface);
                }
            }
        }
        self.claimed_interfaces.clear();
    }

    /// `control` transfer primitive: `(dir, req_type, recipient, request, value, index, buf, timeout_ms) -> actual_len`.
    pub fn control(
        &mut self,
        dir: Direction,
        req_type: RequestType,
        recipient: Recipient,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<usize> {
        let key = format!("control:request={},value={},index={}", request, value, index);

        if self.emulated {
            let event = self.events.load_event(&key)?;
            let data = event.get_data()?;
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            return Ok(n);
        }

        let handle = self.handle.as_ref().ok_or_else(|| Error::internal("usb handle not open"))?;
        let request_type = build_request_type(dir, req_type, recipient);
        let timeout = Duration::from_millis(timeout_ms);

        let n = match dir {
            Direction::DeviceToHost => handle
                .read_control(request_type, request, value, index, buf, timeout)
                .map_err(|e| wrap_usb_error("control read", e))?,
            Direction::HostToDevice => {
                handle
                    .write_control(request_type, request, value, index, buf, timeout)
                    .map_err(|e| wrap_usb_error("control write", e))?;
                buf.len()
            }
        };

        if self.save_events {
            let mut event = DeviceEvent::new(&key);
            event.set_data(&buf[..n]);
            self.events.record(event);
        }
        Ok(n)
    }

    pub fn bulk(&mut self, dir: Direction, endpoint: u8, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        self.transfer_primitive("bulk", dir, endpoint, buf, timeout_ms, |handle, dir, endpoint, buf, timeout| match dir {
            Direction::DeviceToHost => handle.read_bulk(endpoint, buf, timeout).map_err(|e| wrap_usb_error("bulk read", e)),
            Direction::HostToDevice => handle.write_bulk(endpoint, buf, timeout).map_err(|e| wrap_usb_error("bulk write", e)),
        })
    }

    pub fn interrupt(&mut self, dir: Direction, endpoint: u8, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        self.transfer_primitive("interrupt", dir, endpoint, buf, timeout_ms, |handle, dir, endpoint, buf, timeout| match dir {
            Direction::DeviceToHost => handle.read_interrupt(endpoint, buf, timeout).map_err(|e| wrap_usb_error("interrupt read", e)),
            Direction::HostToDevice => handle.write_interrupt(endpoint, buf, timeout).map_err(|e| wrap_usb_error("interrupt write", e)),
        })
    }

    fn transfer_primitive(
        &mut self,
        call_name: &str,
        dir: Direction,
        endpoint: u8,
        buf: &mut [u8],
        timeout_ms: u64,
        real: impl FnOnce(&rusb::DeviceHandle<rusb::GlobalContext>, Direction, u8, &mut [u8], Duration) -> Result<usize>,
    ) -> Result<usize> {
        let key_refs = [("endpoint", endpoint.to_string())];
        let key_refs: Vec<(&str, &str)> = key_refs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let buf_len = buf.len();

        if self.emulated {
            let event_key = format!(
                "{}:{}",
                call_name,
                key_refs.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
            );
            let event = self.events.load_event(&event_key)?;
            let data = event.get_data()?;
            let n = data.len().min(buf_len);
            buf[..n].copy_from_slice(&data[..n]);
            return Ok(n);
        }

        let handle = self.handle.as_ref().ok_or_else(|| Error::internal("usb handle not open"))?;
        let timeout = Duration::from_millis(timeout_ms);
        let n = real(handle, dir, endpoint, buf, timeout)?;

        if self.save_events {
            let event_key = format!(
                "{}:{}",
                call_name,
                key_refs.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
            );
            let mut event = DeviceEvent::new(&event_key);
            event.set_data(&buf[..n]);
            self.events.record(event);
        }

        Ok(n)
    }

    fn get_descriptor(&mut self, desc_type: u16, desc_index: u8, langid: u16, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        self.control(
            Direction::DeviceToHost,
            RequestType::Standard,
            Recipient::Device,
            GET_DESCRIPTOR,
            (desc_type << 8) | desc_index as u16,
            langid,
            buf,
            timeout_ms,
        )
    }

    fn get_string_descriptor(&mut self, index: u8, langid: u16, timeout_ms: u64) -> Option<String> {
        if index == 0 {
            return None;
        }
        let mut header = [0u8; 2];
        self.get_descriptor(0x03, index, langid, &mut header, timeout_ms).ok()?;
        let len = header[0] as usize;
        if len < 2 {
            return None;
        }
        let mut buf = vec![0u8; len];
        self.get_descriptor(0x03, index, langid, &mut buf, timeout_ms).ok()?;
        let utf16: Vec<u16> = buf[2..len].chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        Some(String::from_utf16_lossy(&utf16))
    }

    /// Reads the device descriptor (VID, PID, bcdDevice, bcdUSB, class,
    /// string descriptors), per spec.md section 4.3's "descriptor scan on
    /// probe".
    pub fn read_device_descriptor(&mut self, timeout_ms: u64) -> Result<DeviceDescriptor> {
        let mut buf = [0u8; 18];
        self.get_descriptor(DESCRIPTOR_TYPE_DEVICE, 0, 0, &mut buf, timeout_ms)?;
        if buf[1] as u16 != DESCRIPTOR_TYPE_DEVICE {
            return Err(Error::invalid_data("unexpected descriptor type in device descriptor response"));
        }
        let bcd_usb = u16::from_le_bytes([buf[2], buf[3]]);
        let class = buf[4];
        let vendor_id = u16::from_le_bytes([buf[8], buf[9]]);
        let product_id = u16::from_le_bytes([buf[10], buf[11]]);
        let bcd_device = u16::from_le_bytes([buf[12], buf[13]]);
        let i_manufacturer = buf[14];
        let i_product = buf[15];
        let i_serial_number = buf[16];

        // English (US) is good enough for every fwupd-matched quirk today.
        let langid = 0x0409;
        let manufacturer = self.get_string_descriptor(i_manufacturer, langid, timeout_ms);
        let product = self.get_string_descriptor(i_product, langid, timeout_ms);
        let serial_number = self.get_string_descriptor(i_serial_number, langid, timeout_ms);

        Ok(DeviceDescriptor { vendor_id, product_id, bcd_device, bcd_usb, class, manufacturer, product, serial_number })
    }

    /// Walks the active config descriptor's interfaces and endpoints.
    pub fn read_active_config(&mut self, timeout_ms: u64) -> Result<Vec<InterfaceDescriptor>> {
        let mut header = [0u8; 9];
        self.get_descriptor(DESCRIPTOR_TYPE_CONFIG, 0, 0, &mut header, timeout_ms)?;
        let total_len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut buf = vec![0u8; total_len];
        self.get_descriptor(DESCRIPTOR_TYPE_CONFIG, 0, 0, &mut buf, timeout_ms)?;
        Ok(parse_config_descriptor(&buf))
    }

    /// Walks BOS descriptors (only meaningful when `bcdUSB > 0x0200`),
    /// matching platform-capability UUIDs against {fw-DS20, MS-DS20}.
    pub fn read_bos_capabilities(&mut self, timeout_ms: u64) -> Result<Vec<PlatformCapability>> {
        let mut header = [0u8; 5];
        self.get_descriptor(DESCRIPTOR_TYPE_BOS, 0, 0, &mut header, timeout_ms)?;
        let total_len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut buf = vec![0u8; total_len];
        self.get_descriptor(DESCRIPTOR_TYPE_BOS, 0, 0, &mut buf, timeout_ms)?;
        Ok(parse_bos_descriptor(&buf))
    }

    /// Fetches the report descriptor for a HID interface given the class-
    /// specific HID descriptor bytes already read from the config descriptor
    /// (`hid_descriptor`'s length lives at little-endian offset 7).
    pub fn fetch_hid_report_descriptor(
        &mut self,
        interface_number: u8,
        hid_descriptor: &[u8],
        timeout_ms: u64,
    ) -> Result<Vec<u8>> {
        if hid_descriptor.len() < 9 {
            return Err(Error::invalid_data("HID descriptor too short to carry a report length"));
        }
        let report_len = u16::from_le_bytes([hid_descriptor[7], hid_descriptor[8]]) as usize;
        let mut buf = vec![0u8; report_len];
        self.control(
            Direction::DeviceToHost,
            RequestType::Standard,
            Recipient::Interface,
            GET_DESCRIPTOR,
            DESCRIPTOR_TYPE_HID_REPORT << 8,
            interface_number as u16,
            &mut buf,
            timeout_ms,
        )?;
        Ok(buf)
    }

    /// The full probe sequence from spec.md section 4.3: device descriptor,
    /// active-config interface/endpoint walk, BOS/DS20 quirk-blob fetch and
    /// application. Returns the walked interfaces for the caller to drive the
    /// HID report-descriptor fetch per interface.
    pub fn probe(&mut self, device: &mut Device, current_fwupd_version: u32, min_ds20_version: u32, timeout_ms: u64) -> Result<(DeviceDescriptor, Vec<InterfaceDescriptor>)> {
        let descriptor = self.read_device_descriptor(timeout_ms)?;
        let interfaces = self.read_active_config(timeout_ms)?;

        if descriptor.bcd_usb > BCD_USB_2_0 {
            let capabilities = self.read_bos_capabilities(timeout_ms)?;
            if let Some(capability) = ds20::pick_fw_ds20(&capabilities, current_fwupd_version, min_ds20_version) {
                let mut blob = vec![0u8; 4096];
                let n = self.control(
                    Direction::DeviceToHost,
                    RequestType::Vendor,
                    Recipient::Device,
                    capability.vendor_code,
                    0,
                    0,
                    &mut blob,
                    timeout_ms,
                )?;
                for (key, value) in ds20::parse_quirk_blob(&blob[..n])? {
                    device.set_quirk_kv(key, value);
                }
            }
        }

        Ok((descriptor, interfaces))
    }

    /// Drains `endpoint` with a short timeout until a read times out or
    /// returns nothing — used to clear stale data after a failed transfer.
    pub fn drain(&mut self, endpoint: u8) {
        if self.emulated {
            return;
        }
        let mut scratch = [0u8; 64];
        if let Some(handle) = self.handle.as_ref() {
            loop {
                match handle.read_bulk(endpoint, &mut scratch, Duration::from_millis(20)) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
    }
}

const DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
const DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;

/// Walks a raw configuration descriptor's TLV chain, collecting interface
/// descriptors and the endpoints nested under each.
fn parse_config_descriptor(buf: &[u8]) -> Vec<InterfaceDescriptor> {
    let mut interfaces = Vec::new();
    let mut pos = 0;
    while pos + 2 <= buf.len() {
        let len = buf[pos] as usize;
        if len == 0 || pos + len > buf.len() {
            break;
        }
        let desc_type = buf[pos + 1];
        if desc_type == DESCRIPTOR_TYPE_INTERFACE && len >= 9 {
            interfaces.push(InterfaceDescriptor {
                interface_number: buf[pos + 2],
                class: buf[pos + 5],
                subclass: buf[pos + 6],
                protocol: buf[pos + 7],
                endpoints: Vec::new(),
            });
        } else if desc_type == DESCRIPTOR_TYPE_ENDPOINT && len >= 7 {
            if let Some(interface) = interfaces.last_mut() {
                interface.endpoints.push(EndpointDescriptor {
                    address: buf[pos + 2],
                    max_packet_size: u16::from_le_bytes([buf[pos + 4], buf[pos + 5]]),
                    transfer_type: buf[pos + 3] & 0x03,
                });
            }
        }
        pos += len;
    }
    interfaces
}

/// Walks a raw BOS descriptor's device-capability chain, collecting
/// platform-capability descriptors (the only capability type fwupd matches
/// on: UUID + vendor-defined payload).
fn parse_bos_descriptor(buf: &[u8]) -> Vec<PlatformCapability> {
    let mut capabilities = Vec::new();
    let mut pos = 0;
    while pos + 3 <= buf.len() {
        let len = buf[pos] as usize;
        if len == 0 || pos + len > buf.len() {
            break;
        }
        let desc_type = buf[pos + 1];
        let cap_type = buf[pos + 2];
        if desc_type == DEV_CAPABILITY_DESCRIPTOR && cap_type == DEV_CAPABILITY_PLATFORM && len >= 20 {
            let uuid_bytes = &buf[pos + 4..pos + 20];
            if let Ok(uuid) = uuid::Uuid::from_slice(uuid_bytes) {
                let mut platform_ver = 0u32;
                let mut vendor_code = 0u8;
                let mut alt_code = 0u8;
                if len >= 26 {
                    platform_ver = u32::from_le_bytes([buf[pos + 20], buf[pos + 21], buf[pos + 22], buf[pos + 23]]);
                    vendor_code = buf[pos + 24];
                    alt_code = buf[pos + 25];
                }
                capabilities.push(PlatformCapability { uuid: uuid.to_string(), platform_ver, vendor_code, alt_code });
            }
        }
        pos += len;
    }
    capabilities
}

fn build_request_type(dir: Direction, req_type: RequestType, recipient: Recipient) -> u8 {
    let direction = match dir {
        Direction::HostToDevice => rusb::Direction::Out,
        Direction::DeviceToHost => rusb::Direction::In,
    };
    let kind = match req_type {
        RequestType::Standard => rusb::RequestType::Standard,
        RequestType::Class => rusb::RequestType::Class,
        RequestType::Vendor => rusb::RequestType::Vendor,
    };
    let target = match recipient {
        Recipient::Device => rusb::Recipient::Device,
        Recipient::Interface => rusb::Recipient::Interface,
        Recipient::Endpoint => rusb::Recipient::Endpoint,
        Recipient::Other => rusb::Recipient::Other,
    };
    rusb::request_type(direction, kind, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_matches_spec_table() {
        assert_eq!(map_usb_error(rusb::Error::InvalidParam), ErrorKind::Internal);
        assert_eq!(map_usb_error(rusb::Error::Io), ErrorKind::Read);
        assert_eq!(map_usb_error(rusb::Error::Overflow), ErrorKind::Read);
        assert_eq!(map_usb_error(rusb::Error::Pipe), ErrorKind::Read);
        assert_eq!(map_usb_error(rusb::Error::Timeout), ErrorKind::TimedOut);
        assert_eq!(map_usb_error(rusb::Error::NotSupported), ErrorKind::NotSupported);
        assert_eq!(map_usb_error(rusb::Error::Access), ErrorKind::PermissionDenied);
        assert_eq!(map_usb_error(rusb::Error::NoDevice), ErrorKind::NotFound);
        assert_eq!(map_usb_error(rusb::Error::Busy), ErrorKind::Busy);
    }

    #[test]
    fn emulated_bulk_read_replays_recorded_event() {
        let mut usb = UsbDevice::emulated();
        let mut event = DeviceEvent::new("bulk:endpoint=129");
        event.set_data(&[1, 2, 3, 4]);
        usb.events.record(event);

        let mut buf = [0u8; 4];
        let n = usb.bulk(Direction::DeviceToHost, 129, &mut buf, 1000).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn emulated_transfer_with_no_matching_event_is_not_found() {
        let mut usb = UsbDevice::emulated();
        let mut buf = [0u8; 4];
        assert_eq!(
            usb.bulk(Direction::DeviceToHost, 1, &mut buf, 1000).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn parse_config_descriptor_nests_endpoints_under_their_interface() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[9, 0x02, 0, 0, 1, 1, 0, 0, 0]); // configuration header
        buf.extend_from_slice(&[9, DESCRIPTOR_TYPE_INTERFACE, 0, 0, 1, 0x03, 0x00, 0x00, 0]); // HID interface
        buf.extend_from_slice(&[7, DESCRIPTOR_TYPE_ENDPOINT, 0x81, 0x03, 8, 0, 10]); // interrupt IN

        let interfaces = parse_config_descriptor(&buf);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].class, 0x03);
        assert_eq!(interfaces[0].endpoints.len(), 1);
        assert_eq!(interfaces[0].endpoints[0].address, 0x81);
        assert_eq!(interfaces[0].endpoints[0].max_packet_size, 8);
        assert_eq!(interfaces[0].endpoints[0].transfer_type, 0x03);
    }

    #[test]
    fn parse_bos_descriptor_extracts_platform_capability() {
        let uuid = uuid::Uuid::parse_str(ds20::FW_DS20_UUID).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&[5, DESCRIPTOR_TYPE_BOS as u8, 26, 0, 1]); // BOS header, 1 capability
        buf.push(26); // bLength
        buf.push(DEV_CAPABILITY_DESCRIPTOR);
        buf.push(DEV_CAPABILITY_PLATFORM);
        buf.push(0); // reserved
        buf.extend_from_slice(uuid.as_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes()); // platform_ver
        buf.push(0x42); // vendor_code
        buf.push(0x00); // alt_code

        let capabilities = parse_bos_descriptor(&buf);
        assert_eq!(capabilities.len(), 1);
        assert!(capabilities[0].uuid.eq_ignore_ascii_case(ds20::FW_DS20_UUID));
        assert_eq!(capabilities[0].platform_ver, 7);
        assert_eq!(capabilities[0].vendor_code, 0x42);
    }

    #[test]
    fn read_device_descriptor_replays_from_recorded_event() {
        let mut usb = UsbDevice::emulated();
        let mut raw = [0u8; 18];
        raw[1] = DESCRIPTOR_TYPE_DEVICE as u8;
        raw[2..4].copy_from_slice(&0x0300u16.to_le_bytes());
        raw[8..10].copy_from_slice(&0x18d1u16.to_le_bytes());
        raw[10..12].copy_from_slice(&0x5022u16.to_le_bytes());
        raw[12..14].copy_from_slice(&0x0100u16.to_le_bytes());

        let key = format!("control:request={},value={},index={}", GET_DESCRIPTOR, (DESCRIPTOR_TYPE_DEVICE << 8), 0);
        let mut event = DeviceEvent::new(&key);
        event.set_data(&raw);
        usb.events.record(event);

        let descriptor = usb.read_device_descriptor(1000).unwrap();
        assert_eq!(descriptor.vendor_id, 0x18d1);
        assert_eq!(descriptor.product_id, 0x5022);
        assert_eq!(descriptor.bcd_usb, 0x0300);
    }

    #[test]
    fn fetch_hid_report_descriptor_rejects_short_hid_descriptor() {
        let mut usb = UsbDevice::emulated();
        let result = usb.fetch_hid_report_descriptor(0, &[9, 0x21, 0, 1, 0, 1, 0x22], 1000);
        assert!(result.is_err());
    }
}
