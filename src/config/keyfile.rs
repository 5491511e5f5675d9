//! A small GKeyFile-alike: ordered sections/keys with comments that stick to
//! the *next* key, so migrating keys between files carries their comments.
//!
//! `indexmap` supplies the "remember insertion order" piece that every real
//! keyfile crate we could reach for lacks when it comes to the comment-carry
//! semantics this format needs; the rest is small enough to own directly.

use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct Keyfile {
    sections: IndexMap<String, Section>,
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    /// comment lines (without leading `#`) attached to the group header itself
    pub comment: Vec<String>,
    entries: IndexMap<String, Entry>,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    value: String,
    /// comment lines attached to this key, preserved across migration
    comment: Vec<String>,
}

impl Keyfile {
    pub fn new() -> Self { Keyfile::default() }

    pub fn parse(data: &str) -> Self {
        let mut kf = Keyfile::new();
        let mut pending_comment: Vec<String> = Vec::new();
        let mut section = String::new();

        for line in data.lines() {
            let trimmed = line.trim_end();
            let stripped = trimmed.trim_start();
            if stripped.is_empty() {
                pending_comment.clear();
                continue;
            }
            if let Some(rest) = stripped.strip_prefix('#') {
                pending_comment.push(rest.trim_start().to_string());
                continue;
            }
            if stripped.starts_with('[') && stripped.ends_with(']') {
                section = stripped[1..stripped.len() - 1].to_string();
                let entry = kf.sections.entry(section.clone()).or_insert_with(Section::default);
                entry.comment = std::mem::take(&mut pending_comment);
                continue;
            }
            if let Some(eq) = stripped.find('=') {
                let key = stripped[..eq].trim().to_string();
                let value = stripped[eq + 1..].trim().to_string();
                let sect = kf.sections.entry(section.clone()).or_insert_with(Section::default);
                sect.entries.insert(
                    key,
                    Entry { value, comment: std::mem::take(&mut pending_comment) },
                );
                continue;
            }
            // unparsable line: drop silently, matching the "skip malformed" policy
            pending_comment.clear();
        }

        kf
    }

    pub fn to_data(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            for c in &section.comment {
                out.push_str("# ");
                out.push_str(c);
                out.push('\n');
            }
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            for (key, entry) in &section.entries {
                for c in &entry.comment {
                    out.push_str("# ");
                    out.push_str(c);
                    out.push('\n');
                }
                out.push_str(key);
                out.push('=');
                out.push_str(&entry.value);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let sect = self.sections.entry(section.to_string()).or_insert_with(Section::default);
        match sect.entries.get_mut(key) {
            Some(entry) => entry.value = value.to_string(),
            None => {
                sect.entries.insert(key.to_string(), Entry { value: value.to_string(), comment: Vec::new() });
            }
        }
    }

    pub fn remove_key(&mut self, section: &str, key: &str) {
        if let Some(sect) = self.sections.get_mut(section) {
            sect.entries.shift_remove(key);
        }
    }

    pub fn remove_group(&mut self, section: &str) {
        self.sections.shift_remove(section);
    }

    pub fn keys(&self, section: &str) -> Vec<String> {
        match self.sections.get(section) {
            Some(sect) => sect.entries.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Merge `other` into `self`, overwriting any key that exists in both and
    /// carrying `other`'s comments along with the value.
    pub fn merge_from(&mut self, other: &Keyfile) {
        for (name, section) in &other.sections {
            let sect = self.sections.entry(name.clone()).or_insert_with(Section::default);
            if !section.comment.is_empty() {
                sect.comment = section.comment.clone();
            }
            for (key, entry) in &section.entries {
                sect.entries.insert(key.clone(), entry.clone());
            }
        }
    }

    pub fn clear(&mut self) { self.sections.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip_preserves_comment() {
        let data = "# group comment\n[fwupd]\n# key comment\nKey=true\n\n";
        let kf = Keyfile::parse(data);
        assert_eq!(kf.get("fwupd", "Key"), Some("true"));
        assert_eq!(kf.to_data(), data);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let mut kf = Keyfile::parse("[fwupd]\nKey=true\n\n");
        kf.set("fwupd", "Key", "false");
        assert_eq!(kf.get("fwupd", "Key"), Some("false"));
    }

    #[test]
    fn remove_group_drops_all_keys() {
        let mut kf = Keyfile::parse("[fwupd]\nKey=true\nOther=1\n\n");
        kf.remove_group("fwupd");
        assert_eq!(kf.get("fwupd", "Key"), None);
    }
}
