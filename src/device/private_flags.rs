//! Plugin-private device flags, addressed by string tag rather than bit
//! position. Tags must be registered before use — using an unregistered tag
//! is a programmer error, matching spec.md section 3's invariant, and the
//! teacher's own `dbus_helpers::dbus_str` precedent of panicking on a
//! contract violation rather than threading an `Error` through it.

use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct PrivateFlags {
    registered: HashSet<&'static str>,
    set: HashSet<&'static str>,
}

impl PrivateFlags {
    pub fn new() -> Self { PrivateFlags::default() }

    pub fn register(&mut self, tag: &'static str) { self.registered.insert(tag); }

    fn assert_registered(&self, tag: &str) {
        if !self.registered.contains(tag) {
            panic!("private flag '{}' used before being registered", tag);
        }
    }

    pub fn add(&mut self, tag: &'static str) {
        self.assert_registered(tag);
        self.set.insert(tag);
    }

    pub fn remove(&mut self, tag: &str) {
        self.assert_registered(tag);
        self.set.remove(tag);
    }

    pub fn has(&self, tag: &str) -> bool {
        self.assert_registered(tag);
        self.set.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "used before being registered")]
    fn using_unregistered_flag_panics() {
        let flags = PrivateFlags::new();
        flags.has("ro-written");
    }

    #[test]
    fn registered_flag_round_trips() {
        let mut flags = PrivateFlags::new();
        flags.register("ro-written");
        assert!(!flags.has("ro-written"));
        flags.add("ro-written");
        assert!(flags.has("ro-written"));
        flags.remove("ro-written");
        assert!(!flags.has("ro-written"));
    }
}
