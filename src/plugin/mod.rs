//! The plugin runtime: hook dispatch, device-type registration, and rule
//! surfacing. Grounded on spec.md section 4.4; dispatch-invariant shape
//! borrowed from the teacher's `dbus_helpers` pattern of treating a
//! should-never-happen condition as a hard error rather than swallowing it.

pub mod depsolve;

use crate::device::Device;
use crate::error::{Error, Result};
use log::{debug, error};
use std::collections::BTreeSet;

/// One entry per hook named in spec.md section 4.4. Each is optional; a
/// plugin supplies only the ones it needs.
#[derive(Default)]
pub struct Hooks {
    pub load: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub constructed: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub startup: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub ready: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub coldplug: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub composite_prepare: Option<Box<dyn Fn(&Plugin, &[Device]) -> Result<()> + Send + Sync>>,
    pub composite_cleanup: Option<Box<dyn Fn(&Plugin, &[Device]) -> Result<()> + Send + Sync>>,
    pub prepare: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub cleanup: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub attach: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub detach: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub reload: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub reboot_cleanup: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub write_firmware: Option<Box<dyn Fn(&Plugin, &mut Device, &[u8]) -> Result<()> + Send + Sync>>,
    pub verify: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub activate: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub unlock: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub clear_results: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub get_results: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub backend_device_added: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub backend_device_changed: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub backend_device_removed: Option<Box<dyn Fn(&Plugin, &mut Device) -> Result<()> + Send + Sync>>,
    pub device_added: Option<Box<dyn Fn(&Plugin, &Device) -> Result<()> + Send + Sync>>,
    pub device_registered: Option<Box<dyn Fn(&Plugin, &Device) -> Result<()> + Send + Sync>>,
    pub device_created: Option<Box<dyn Fn(&Plugin, &Device) -> Result<()> + Send + Sync>>,
    pub modify_config: Option<Box<dyn Fn(&Plugin, &str, &str, &str) -> Result<()> + Send + Sync>>,
    pub add_security_attrs: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
    pub finalize: Option<Box<dyn Fn(&Plugin) -> Result<()> + Send + Sync>>,
}

#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    pub run_before: BTreeSet<String>,
    pub run_after: BTreeSet<String>,
    pub conflicts: BTreeSet<String>,
}

pub struct Plugin {
    pub name: String,
    pub order: i32,
    pub priority: i32,
    pub rules: RuleSet,
    pub report_metadata: std::collections::BTreeMap<String, String>,
    device_gtypes: BTreeSet<String>,
    device_gtype_default: Option<String>,
    pub hooks: Hooks,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Plugin {
            name: name.into(),
            order: 0,
            priority: 0,
            rules: RuleSet::default(),
            report_metadata: std::collections::BTreeMap::new(),
            device_gtypes: BTreeSet::new(),
            device_gtype_default: None,
            hooks: Hooks::default(),
        }
    }

    pub fn add_device_gtype(&mut self, gtype: impl Into<String>) { self.device_gtypes.insert(gtype.into()); }

    pub fn set_device_gtype_default(&mut self, gtype: impl Into<String>) {
        let gtype = gtype.into();
        self.device_gtypes.insert(gtype.clone());
        self.device_gtype_default = Some(gtype);
    }

    /// The gtype `backend_device_added`'s fallback should instantiate: the
    /// explicit default if set, else the sole registered gtype.
    pub fn default_device_gtype(&self) -> Option<&str> {
        self.device_gtype_default.as_deref().or_else(|| {
            if self.device_gtypes.len() == 1 {
                self.device_gtypes.iter().next().map(|s| s.as_str())
            } else {
                None
            }
        })
    }

    /// Dispatches a hook. A null hook is a success no-op. The "returns false
    /// without an error" invariant from spec.md section 4.4 is enforced at
    /// the hook's own return type (`Result<()>`): a hook has no way to signal
    /// failure except `Err`, so any caller-side inconsistency is caught here
    /// by insisting a panic inside a hook never silently becomes success.
    fn dispatch<F>(&self, name: &str, hook: &Option<F>, call: impl FnOnce(&F) -> Result<()>) -> Result<()>
    where
        F: ?Sized,
    {
        match hook {
            None => Ok(()),
            Some(f) => call(f).map_err(|e| {
                error!("plugin '{}' hook '{}' failed: {}", self.name, name, e);
                e
            }),
        }
    }

    pub fn dispatch_load(&self) -> Result<()> {
        self.dispatch("load", &self.hooks.load, |f| f(self))
    }

    pub fn dispatch_startup(&self) -> Result<()> {
        self.dispatch("startup", &self.hooks.startup, |f| f(self))
    }

    pub fn dispatch_ready(&self) -> Result<()> {
        self.dispatch("ready", &self.hooks.ready, |f| f(self))
    }

    pub fn dispatch_coldplug(&self) -> Result<()> {
        self.dispatch("coldplug", &self.hooks.coldplug, |f| f(self))
    }

    pub fn dispatch_write_firmware(&self, device: &mut Device, payload: &[u8]) -> Result<()> {
        self.dispatch("write_firmware", &self.hooks.write_firmware, |f| f(self, device, payload))
    }

    pub fn dispatch_attach(&self, device: &mut Device) -> Result<()> {
        self.dispatch("attach", &self.hooks.attach, |f| f(self, device))
    }

    pub fn dispatch_detach(&self, device: &mut Device) -> Result<()> {
        self.dispatch("detach", &self.hooks.detach, |f| f(self, device))
    }

    pub fn dispatch_reload(&self, device: &mut Device) -> Result<()> {
        self.dispatch("reload", &self.hooks.reload, |f| f(self, device))
    }

    pub fn dispatch_finalize(&self) -> Result<()> {
        self.dispatch("finalize", &self.hooks.finalize, |f| f(self))
    }

    pub fn dispatch_constructed(&self) -> Result<()> {
        self.dispatch("constructed", &self.hooks.constructed, |f| f(self))
    }

    pub fn dispatch_composite_prepare(&self, devices: &[Device]) -> Result<()> {
        self.dispatch("composite_prepare", &self.hooks.composite_prepare, |f| f(self, devices))
    }

    pub fn dispatch_composite_cleanup(&self, devices: &[Device]) -> Result<()> {
        self.dispatch("composite_cleanup", &self.hooks.composite_cleanup, |f| f(self, devices))
    }

    pub fn dispatch_prepare(&self, device: &mut Device) -> Result<()> {
        self.dispatch("prepare", &self.hooks.prepare, |f| f(self, device))
    }

    pub fn dispatch_cleanup(&self, device: &mut Device) -> Result<()> {
        self.dispatch("cleanup", &self.hooks.cleanup, |f| f(self, device))
    }

    pub fn dispatch_reboot_cleanup(&self, device: &mut Device) -> Result<()> {
        self.dispatch("reboot_cleanup", &self.hooks.reboot_cleanup, |f| f(self, device))
    }

    pub fn dispatch_verify(&self, device: &mut Device) -> Result<()> {
        self.dispatch("verify", &self.hooks.verify, |f| f(self, device))
    }

    pub fn dispatch_activate(&self, device: &mut Device) -> Result<()> {
        self.dispatch("activate", &self.hooks.activate, |f| f(self, device))
    }

    pub fn dispatch_unlock(&self, device: &mut Device) -> Result<()> {
        self.dispatch("unlock", &self.hooks.unlock, |f| f(self, device))
    }

    pub fn dispatch_clear_results(&self, device: &mut Device) -> Result<()> {
        self.dispatch("clear_results", &self.hooks.clear_results, |f| f(self, device))
    }

    pub fn dispatch_get_results(&self, device: &mut Device) -> Result<()> {
        self.dispatch("get_results", &self.hooks.get_results, |f| f(self, device))
    }

    pub fn dispatch_backend_device_added(&self, device: &mut Device) -> Result<()> {
        self.dispatch("backend_device_added", &self.hooks.backend_device_added, |f| f(self, device))
    }

    pub fn dispatch_backend_device_changed(&self, device: &mut Device) -> Result<()> {
        self.dispatch("backend_device_changed", &self.hooks.backend_device_changed, |f| f(self, device))
    }

    pub fn dispatch_backend_device_removed(&self, device: &mut Device) -> Result<()> {
        self.dispatch("backend_device_removed", &self.hooks.backend_device_removed, |f| f(self, device))
    }

    pub fn dispatch_device_added(&self, device: &Device) -> Result<()> {
        self.dispatch("device_added", &self.hooks.device_added, |f| f(self, device))
    }

    pub fn dispatch_device_registered(&self, device: &Device) -> Result<()> {
        self.dispatch("device_registered", &self.hooks.device_registered, |f| f(self, device))
    }

    pub fn dispatch_device_created(&self, device: &Device) -> Result<()> {
        self.dispatch("device_created", &self.hooks.device_created, |f| f(self, device))
    }

    pub fn dispatch_modify_config(&self, section: &str, key: &str, value: &str) -> Result<()> {
        self.dispatch("modify_config", &self.hooks.modify_config, |f| f(self, section, key, value))
    }

    pub fn dispatch_add_security_attrs(&self) -> Result<()> {
        self.dispatch("add_security_attrs", &self.hooks.add_security_attrs, |f| f(self))
    }

    /// `backend_device_added` fallback per spec.md section 4.4: instantiate
    /// the default gtype (or the sole registered one), probe it, and if it
    /// carries `ONLY_SUPPORTED`, drop it silently unless at least one of its
    /// instance-ID GUIDs is confirmed supported by `check_supported`.
    pub fn backend_device_added_fallback(
        &self,
        mut device: Device,
        probe: impl FnOnce(&mut Device) -> Result<()>,
        check_supported: impl Fn(&uuid::Uuid) -> bool,
    ) -> Result<Option<Device>> {
        if self.default_device_gtype().is_none() {
            return Err(Error::internal(format!(
                "plugin '{}' has no default device gtype for backend_device_added fallback",
                self.name
            )));
        }

        probe(&mut device)?;

        if device.flags.contains(crate::device::flags::DeviceFlags::ONLY_SUPPORTED) {
            let supported = device.guids().iter().any(&check_supported);
            if !supported {
                debug!("dropping unsupported device in plugin '{}'", self.name);
                return Ok(None);
            }
        }

        Ok(Some(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_hook_dispatch_is_success_noop() {
        let plugin = Plugin::new("test");
        assert!(plugin.dispatch_load().is_ok());
    }

    #[test]
    fn hook_error_propagates_through_dispatch() {
        let mut plugin = Plugin::new("test");
        plugin.hooks.load = Some(Box::new(|_| Err(Error::internal("boom"))));
        assert!(plugin.dispatch_load().is_err());
    }

    #[test]
    fn every_declared_hook_has_a_reachable_dispatch_wrapper() {
        let mut plugin = Plugin::new("test");
        plugin.hooks.constructed = Some(Box::new(|_| Err(Error::internal("boom"))));
        assert!(plugin.dispatch_constructed().is_err());

        let mut plugin = Plugin::new("test");
        plugin.hooks.add_security_attrs = Some(Box::new(|_| Err(Error::internal("boom"))));
        assert!(plugin.dispatch_add_security_attrs().is_err());

        let mut plugin = Plugin::new("test");
        plugin.hooks.modify_config = Some(Box::new(|_, _, _, _| Err(Error::internal("boom"))));
        assert!(plugin.dispatch_modify_config("fwupd", "key", "value").is_err());

        let mut plugin = Plugin::new("test");
        plugin.hooks.device_added = Some(Box::new(|_, _| Err(Error::internal("boom"))));
        let device = Device::new(uuid::Uuid::parse_str("70ffd812-4c7f-4c7d-0000-000000000000").unwrap());
        assert!(plugin.dispatch_device_added(&device).is_err());
    }

    #[test]
    fn set_device_gtype_default_implies_add() {
        let mut plugin = Plugin::new("test");
        plugin.set_device_gtype_default("CrosEcDevice");
        assert_eq!(plugin.default_device_gtype(), Some("CrosEcDevice"));
    }

    #[test]
    fn default_gtype_falls_back_to_sole_registered() {
        let mut plugin = Plugin::new("test");
        plugin.add_device_gtype("CrosEcDevice");
        assert_eq!(plugin.default_device_gtype(), Some("CrosEcDevice"));
    }

    #[test]
    fn default_gtype_is_none_when_ambiguous() {
        let mut plugin = Plugin::new("test");
        plugin.add_device_gtype("CrosEcDevice");
        plugin.add_device_gtype("CrosEcTouchpad");
        assert_eq!(plugin.default_device_gtype(), None);
    }
}
