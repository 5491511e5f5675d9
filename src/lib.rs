//! Device/plugin runtime for a firmware-update daemon: device object model,
//! plugin hook dispatch, USB transport, HWID/quirk matching, a layered
//! config store, and the Cros-EC update engine built on top of them.

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod hwid;
pub mod plugin;
pub mod plugins;
pub mod quirks;
pub mod uefi;
pub mod usb;
pub mod util;

pub use device::Device;
pub use error::{Error, ErrorKind, Result};
pub use plugin::Plugin;
