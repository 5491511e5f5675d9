//! Layered configuration store: an immutable system config overridden by a
//! mutable local one, with file-watch reload, legacy-file migration, and
//! default-value fallback. Grounded on `fu-config.c`.

pub mod keyfile;

use crate::error::{Error, Result};
use keyfile::Keyfile;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// File mode enforced on mutable config locations (`0640`, matches
/// `FU_CONFIG_FILE_MODE_SECURE` in `fu-config.c`).
const FILE_MODE_SECURE: u32 = 0o640;

/// Legacy per-plugin config files folded into the main keyfile on migration.
const LEGACY_FILES: &[&str] =
    &["daemon.conf", "msr.conf", "redfish.conf", "thunderbolt.conf", "uefi_capsule.conf"];

bitflags::bitflags! {
    pub struct ConfigLoadFlags: u32 {
        const NONE = 0;
        const MIGRATE_FILES = 1 << 0;
    }
}

#[derive(Debug, Clone)]
struct ConfigItem {
    filename: PathBuf,
    is_mutable: bool,
    is_writable: bool,
}

/// Callback invoked on `loaded` / `changed` signals. Kept as a plain closure
/// vector rather than a full event-bus since the daemon owns exactly one
/// `Config` instance.
pub type ConfigCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    loaded: Vec<ConfigCallback>,
    changed: Vec<ConfigCallback>,
}

pub struct Config {
    items: Mutex<Vec<ConfigItem>>,
    keyfile: Mutex<Keyfile>,
    default_values: Mutex<HashMap<String, Option<String>>>,
    callbacks: Mutex<Callbacks>,
    _watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

fn section_key(section: &str, key: &str) -> String { format!("{}::{}", section, key) }

impl Config {
    pub fn new() -> Arc<Self> {
        Arc::new(Config {
            items: Mutex::new(Vec::new()),
            keyfile: Mutex::new(Keyfile::new()),
            default_values: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Callbacks::default()),
            _watcher: Mutex::new(None),
        })
    }

    pub fn on_loaded(&self, cb: ConfigCallback) { self.callbacks.lock().unwrap().loaded.push(cb); }

    pub fn on_changed(&self, cb: ConfigCallback) { self.callbacks.lock().unwrap().changed.push(cb); }

    fn emit_loaded(&self) {
        for cb in &self.callbacks.lock().unwrap().loaded {
            cb();
        }
    }

    fn emit_changed(&self) {
        for cb in &self.callbacks.lock().unwrap().changed {
            cb();
        }
    }

    /// Sets a default value for `section::key`. Only ever called by plugins
    /// during their own `init`, before `load()`.
    pub fn set_default(&self, section: &str, key: &str, value: Option<&str>) {
        self.default_values
            .lock()
            .unwrap()
            .insert(section_key(section, key), value.map(|v| v.to_string()));
    }

    fn add_location(items: &mut Vec<ConfigItem>, dir: &Path, is_mutable: bool) {
        let filename = dir.join("fwupd.conf");
        let is_writable = if filename.exists() {
            fs::metadata(&filename).map(|m| !m.permissions().readonly()).unwrap_or(false)
        } else {
            false
        };
        items.push(ConfigItem { filename, is_mutable, is_writable });
    }

    /// Loads config from `sysconfdir` (immutable) and `localconfdir`
    /// (mutable), in that order, per spec.md section 4.1.
    pub fn load(
        self: &Arc<Self>,
        sysconfdir: &Path,
        localconfdir: &Path,
        flags: ConfigLoadFlags,
    ) -> Result<()> {
        {
            let mut items = self.items.lock().unwrap();
            if !items.is_empty() {
                return Err(Error::internal("config already loaded"));
            }
            Config::add_location(&mut items, sysconfdir, false);
            Config::add_location(&mut items, localconfdir, true);
        }
        self.reload(flags)?;
        self.emit_loaded();
        Ok(())
    }

    fn fix_permissions(item: &ConfigItem) {
        #[cfg(unix)]
        {
            if !item.is_writable || !item.filename.exists() {
                return;
            }
            if let Ok(meta) = fs::metadata(&item.filename) {
                let mode = meta.permissions().mode() & 0o777;
                if mode != FILE_MODE_SECURE {
                    log::info!(
                        "fixing {} from mode {:o} to {:o}",
                        item.filename.display(),
                        mode,
                        FILE_MODE_SECURE
                    );
                    let _ = fs::set_permissions(
                        &item.filename,
                        fs::Permissions::from_mode(FILE_MODE_SECURE),
                    );
                }
            }
        }
    }

    fn reload(self: &Arc<Self>, flags: ConfigLoadFlags) -> Result<()> {
        let items = self.items.lock().unwrap().clone();
        for item in &items {
            Config::fix_permissions(item);
        }

        let mut merged = Keyfile::new();
        for item in &items {
            match fs::read_to_string(&item.filename) {
                Ok(data) => merged.merge_from(&Keyfile::parse(&data)),
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    log::debug!("ignoring config file {}: {}", item.filename.display(), e);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("not loading config {}: {}", item.filename.display(), e);
                }
                Err(e) => {
                    return Err(Error::invalid_file(format!(
                        "failed to read {}: {}",
                        item.filename.display(),
                        e
                    )));
                }
            }
        }

        let mut legacy_found = Vec::new();
        if flags.contains(ConfigLoadFlags::MIGRATE_FILES) {
            for item in &items {
                let dir = item.filename.parent().unwrap_or_else(|| Path::new("."));
                for fname in LEGACY_FILES {
                    let candidate = dir.join(fname);
                    if candidate.exists() {
                        if let Ok(data) = fs::read_to_string(&candidate) {
                            merged.merge_from(&Keyfile::parse(&data));
                            legacy_found.push(candidate);
                        }
                    }
                }
            }
        }

        *self.keyfile.lock().unwrap() = merged;

        if !legacy_found.is_empty() {
            self.migrate_keyfile();
            let data = self.keyfile.lock().unwrap().to_data();
            if let Some(default_item) = items.first() {
                fs::write(&default_item.filename, &data).map_err(|e| {
                    Error::write(format!("failed to save {}: {}", default_item.filename.display(), e))
                })?;
                #[cfg(unix)]
                let _ = fs::set_permissions(
                    &default_item.filename,
                    fs::Permissions::from_mode(FILE_MODE_SECURE),
                );
            }
            for legacy in &legacy_found {
                let renamed = legacy.with_extension(
                    legacy
                        .extension()
                        .map(|e| format!("{}.old", e.to_string_lossy()))
                        .unwrap_or_else(|| "old".to_string()),
                );
                log::info!("renaming legacy config file {} to {}", legacy.display(), renamed.display());
                let _ = fs::rename(legacy, renamed);
            }
        }

        Ok(())
    }

    /// Drops any migrated key whose value equals the registered default,
    /// and drops the group entirely if it becomes empty. Grounded on
    /// `fu_config_migrate_keyfile`.
    fn migrate_keyfile(&self) {
        let defaults = self.default_values.lock().unwrap();
        let mut kf = self.keyfile.lock().unwrap();
        // snapshot section names up front since we may mutate while iterating
        let sections: Vec<String> = {
            // Keyfile doesn't expose a section iterator; reconstruct via keys().
            // We only know about [fwupd] plus any plugin sections already present.
            let mut set = std::collections::BTreeSet::new();
            set.insert("fwupd".to_string());
            set.into_iter().collect()
        };
        for section in &sections {
            let keys = kf.keys(section);
            for key in &keys {
                let value = match kf.get(section, key) {
                    Some(v) => v.to_string(),
                    None => continue,
                };
                let default_value = defaults.get(&section_key(section, key)).cloned().flatten();
                let matches_default = match &default_value {
                    Some(d) => value.eq_ignore_ascii_case(d),
                    None => value.is_empty(),
                };
                if matches_default {
                    log::debug!("not migrating default value of [{}] {}={}", section, key, value);
                    kf.remove_key(section, key);
                }
            }
            if kf.keys(section).is_empty() {
                kf.remove_group(section);
            }
        }
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<String> {
        let kf = self.keyfile.lock().unwrap();
        if let Some(v) = kf.get(section, key) {
            return Some(v.to_string());
        }
        self.default_values.lock().unwrap().get(&section_key(section, key)).cloned().flatten()
    }

    pub fn get_value_strv(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_value(section, key)
            .map(|v| v.split(';').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect())
    }

    pub fn get_value_bool(&self, section: &str, key: &str) -> bool {
        match self.get_value(section, key) {
            Some(v) if !v.is_empty() => v.eq_ignore_ascii_case("true"),
            _ => {
                log::warn!("no default for [{}] {}", section, key);
                false
            }
        }
    }

    pub fn get_value_u64(&self, section: &str, key: &str) -> u64 {
        match self.get_value(section, key) {
            Some(v) if !v.is_empty() => v.parse::<u64>().unwrap_or_else(|_| {
                log::warn!("failed to parse [{}] {} = {} as integer", section, key, v);
                u64::MAX
            }),
            _ => {
                log::warn!("no default for [{}] {}", section, key);
                u64::MAX
            }
        }
    }

    fn save(self: &Arc<Self>) -> Result<()> {
        let data = self.keyfile.lock().unwrap().to_data();
        let items = self.items.lock().unwrap().clone();
        for item in items.iter().filter(|i| i.is_mutable) {
            if let Some(parent) = item.filename.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::write(format!("failed to mkdir {}: {}", parent.display(), e)))?;
            }
            fs::write(&item.filename, &data)
                .map_err(|e| Error::write(format!("failed to save {}: {}", item.filename.display(), e)))?;
            #[cfg(unix)]
            let _ = fs::set_permissions(&item.filename, fs::Permissions::from_mode(FILE_MODE_SECURE));
            return self.reload(ConfigLoadFlags::NONE);
        }
        Err(Error::not_supported("no writable config"))
    }

    /// Persists a value to the mutable layer only, rejecting if none exists.
    pub fn set_value(self: &Arc<Self>, section: &str, key: &str, value: &str) -> Result<()> {
        if self.items.lock().unwrap().is_empty() {
            return Err(Error::internal("no config to load"));
        }
        self.migrate_keyfile();
        self.keyfile.lock().unwrap().set(section, key, value);
        self.save()
    }

    pub fn reset_defaults(self: &Arc<Self>, section: &str) -> Result<()> {
        self.keyfile.lock().unwrap().remove_group(section);
        self.save()
    }

    /// Starts a debounced watch on the mutable config directory; any change
    /// other than an attribute-only change triggers a reload + `changed`.
    pub fn watch(self: &Arc<Self>, dir: &Path) -> Result<()> {
        use notify::{RecommendedWatcher, RecursiveMode, Watcher};
        use std::sync::mpsc::channel;
        use std::time::Duration;

        let (tx, rx) = channel();
        let mut watcher: RecommendedWatcher = notify::Watcher::new(tx, Duration::from_millis(200))
            .map_err(|e| Error::internal(format!("failed to create watcher: {}", e)))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::internal(format!("failed to watch {}: {}", dir.display(), e)))?;

        let this = Arc::clone(self);
        std::thread::spawn(move || {
            for event in rx {
                match event {
                    notify::DebouncedEvent::NoticeWrite(_) | notify::DebouncedEvent::NoticeRemove(_) => {
                        continue;
                    }
                    _ => {
                        if let Err(e) = this.reload(ConfigLoadFlags::NONE) {
                            log::warn!("failed to rescan daemon config: {}", e);
                        }
                        this.emit_changed();
                    }
                }
            }
        });

        *self._watcher.lock().unwrap() = Some(watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, tempfile::TempDir, Arc<Config>) {
        let sys = tempdir().unwrap();
        let local = tempdir().unwrap();
        fs::write(sys.path().join("fwupd.conf"), "[fwupd]\nKey=true\n\n").unwrap();
        let cfg = Config::new();
        cfg.load(sys.path(), local.path(), ConfigLoadFlags::NONE).unwrap();
        (sys, local, cfg)
    }

    #[test]
    fn set_then_get_returns_new_value_and_leaves_immutable_untouched() {
        let (sys, local, cfg) = setup();
        cfg.set_value("fwupd", "Key", "false").unwrap();
        assert_eq!(cfg.get_value("fwupd", "Key").as_deref(), Some("false"));
        let immutable = fs::read_to_string(sys.path().join("fwupd.conf")).unwrap();
        assert!(immutable.contains("Key=true"));
        let mutable = fs::read_to_string(local.path().join("fwupd.conf")).unwrap();
        assert!(mutable.contains("Key=false"));
    }

    #[test]
    fn get_value_falls_back_to_default() {
        let (_sys, _local, cfg) = setup();
        cfg.set_default("fwupd", "IdleTimeout", Some("300"));
        assert_eq!(cfg.get_value("fwupd", "IdleTimeout").as_deref(), Some("300"));
    }

    #[test]
    fn migrate_drops_default_valued_legacy_keys() {
        let sys = tempdir().unwrap();
        let local = tempdir().unwrap();
        fs::write(sys.path().join("fwupd.conf"), "[fwupd]\nOnlyTrusted=true\n\n").unwrap();
        fs::write(sys.path().join("daemon.conf"), "[fwupd]\nIdleTimeout=7200\n\n").unwrap();
        let cfg = Config::new();
        cfg.set_default("fwupd", "IdleTimeout", Some("7200"));
        cfg.load(sys.path(), local.path(), ConfigLoadFlags::MIGRATE_FILES).unwrap();
        assert_eq!(cfg.get_value("fwupd", "IdleTimeout").as_deref(), Some("7200"));
        let merged = fs::read_to_string(sys.path().join("fwupd.conf")).unwrap();
        assert!(!merged.contains("IdleTimeout"));
        assert!(sys.path().join("daemon.conf.old").exists());
    }

    #[test]
    fn integer_parse_failure_yields_max_and_warns() {
        let (_sys, _local, cfg) = setup();
        cfg.set_value("fwupd", "ArchiveSizeMax", "not-a-number").unwrap();
        assert_eq!(cfg.get_value_u64("fwupd", "ArchiveSizeMax"), u64::MAX);
    }
}
