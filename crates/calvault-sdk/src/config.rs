//! Vault configuration, read from `<root>/config.toml`.

use std::io;
use std::path::Path;
use std::time::Duration;

use calvault_store::{FileSystem, LockPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Configuration file name, relative to the vault root.
pub const CONFIG_FILE: &str = "config.toml";

/// Every knob of a vault. Missing keys take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Open without writing anything, even if the lock is free.
    pub read_only: bool,
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub orphans: OrphanConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hex characters of the hash used for the shard directory.
    pub shard_width: usize,
    /// Re-hash blobs on every read.
    pub verify_on_read: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_width: calvault_store::sharded::DEFAULT_SHARD_WIDTH,
            verify_on_read: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub enabled: bool,
    /// A foreign lock older than this is taken over.
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrphanConfig {
    /// Title of the group adopted orphans are collected in.
    pub group_title: String,
}

impl Default for OrphanConfig {
    fn default() -> Self {
        Self {
            group_title: "Orphan Events".to_string(),
        }
    }
}

impl VaultConfig {
    /// Load `config.toml` from the vault root, or the defaults if it does
    /// not exist.
    pub fn load(fs: &dyn FileSystem) -> VaultResult<Self> {
        match fs.read(Path::new(CONFIG_FILE)) {
            Ok(data) => {
                let text = String::from_utf8(data)
                    .map_err(|e| VaultError::Config(format!("{CONFIG_FILE}: {e}")))?;
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `config.toml` to the vault root.
    pub fn save(&self, fs: &dyn FileSystem) -> VaultResult<()> {
        fs.write_atomic(Path::new(CONFIG_FILE), self.to_toml()?.as_bytes())?;
        Ok(())
    }

    pub fn from_toml(text: &str) -> VaultResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> VaultResult<String> {
        toml::to_string_pretty(self).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// The lock policy, or `None` when locking is disabled.
    pub fn lock_policy(&self) -> Option<LockPolicy> {
        self.lock.enabled.then(|| LockPolicy {
            stale_after: Duration::from_secs(self.lock.stale_after_secs),
        })
    }

    fn validate(&self) -> VaultResult<()> {
        if self.store.shard_width == 0 || self.store.shard_width >= 64 {
            return Err(VaultError::Config(format!(
                "store.shard_width must be between 1 and 63, got {}",
                self.store.shard_width
            )));
        }
        if self.orphans.group_title.trim().is_empty() {
            return Err(VaultError::Config("orphans.group_title must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvault_store::MemoryFs;

    #[test]
    fn default_config() {
        let c = VaultConfig::default();
        assert_eq!(c.store.shard_width, 2);
        assert!(c.store.verify_on_read);
        assert!(c.lock.enabled);
        assert_eq!(c.lock.stale_after_secs, 604_800);
        assert_eq!(c.orphans.group_title, "Orphan Events");
        assert!(!c.read_only);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c = VaultConfig::from_toml("[store]\nshard_width = 3\n").unwrap();
        assert_eq!(c.store.shard_width, 3);
        assert!(c.store.verify_on_read);
        assert_eq!(c.orphans, OrphanConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(VaultConfig::from_toml("[store]\nshard_width = 0\n").is_err());
        assert!(VaultConfig::from_toml("[orphans]\ngroup_title = \"  \"\n").is_err());
        assert!(VaultConfig::from_toml("store = 5").is_err());
    }

    #[test]
    fn missing_file_gives_defaults_and_save_round_trips() {
        let fs = MemoryFs::new();
        assert_eq!(VaultConfig::load(&fs).unwrap(), VaultConfig::default());

        let mut c = VaultConfig::default();
        c.lock.enabled = false;
        c.orphans.group_title = "Found".into();
        c.save(&fs).unwrap();
        assert_eq!(VaultConfig::load(&fs).unwrap(), c);
    }

    #[test]
    fn disabled_lock_has_no_policy() {
        let mut c = VaultConfig::default();
        assert_eq!(
            c.lock_policy().unwrap().stale_after,
            Duration::from_secs(604_800)
        );
        c.lock.enabled = false;
        assert!(c.lock_policy().is_none());
    }
}
