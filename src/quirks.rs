//! Per-device quirk matching: `[InstanceId]\nKey=Value` groups keyed by
//! exact instance-ID string, loaded from the same keyfile format the config
//! store uses (`config::keyfile`) since quirk files share that on-disk shape.

use crate::config::keyfile::Keyfile;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct Quirks {
    keyfile: Keyfile,
}

impl Quirks {
    pub fn new() -> Self { Quirks::default() }

    pub fn parse(data: &str) -> Self { Quirks { keyfile: Keyfile::parse(data) } }

    /// Merges another quirk source in, later files overriding earlier ones
    /// for the same `[InstanceId]` group/key pair.
    pub fn merge_from(&mut self, other: &Quirks) { self.keyfile.merge_from(&other.keyfile); }

    pub fn get(&self, instance_id: &str, key: &str) -> Option<&str> { self.keyfile.get(instance_id, key) }

    /// Returns every `Key=Value` pair quirked for `instance_id`.
    pub fn entries_for(&self, instance_id: &str) -> BTreeMap<String, String> {
        self.keyfile
            .keys(instance_id)
            .into_iter()
            .filter_map(|key| self.keyfile.get(instance_id, &key).map(|v| (key, v.to_string())))
            .collect()
    }

    /// Finds the first matching quirk value across a set of candidate
    /// instance-IDs (typically a device's full instance-ID set, most
    /// specific first), falling back to `None` if none match.
    pub fn lookup<'a>(&'a self, instance_ids: impl IntoIterator<Item = &'a str>, key: &str) -> Option<&'a str> {
        instance_ids.into_iter().find_map(|id| self.get(id, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quirk_lookup_matches_by_exact_instance_id() {
        let quirks = Quirks::parse("[USB\\VID_1234&PID_5678]\nFlags=needs-reboot\n\n");
        assert_eq!(quirks.get("USB\\VID_1234&PID_5678", "Flags"), Some("needs-reboot"));
        assert_eq!(quirks.get("USB\\VID_1234&PID_0000", "Flags"), None);
    }

    #[test]
    fn lookup_falls_back_across_candidate_ids() {
        let quirks = Quirks::parse("[USB\\VID_1234]\nFlags=generic\n\n");
        let candidates = ["USB\\VID_1234&PID_5678", "USB\\VID_1234"];
        assert_eq!(quirks.lookup(candidates.iter().copied(), "Flags"), Some("generic"));
    }

    #[test]
    fn merge_overrides_earlier_source() {
        let mut base = Quirks::parse("[USB\\VID_1234]\nFlags=generic\n\n");
        let override_quirks = Quirks::parse("[USB\\VID_1234]\nFlags=specific\n\n");
        base.merge_from(&override_quirks);
        assert_eq!(base.get("USB\\VID_1234", "Flags"), Some("specific"));
    }
}
