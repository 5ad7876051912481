use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SchemaVersion;

/// Database version this build of the core upgrades to.
pub const CURRENT_DB_VERSION: SchemaVersion = SchemaVersion::new(9695);

/// Components switched on for a brand new install.
pub const DEFAULT_COMPONENTS: &[&str] = &["activity", "members", "settings", "xprofile", "notifications"];

/// Upgrade configuration
///
/// Everything the sequencer would otherwise pull from host globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Host table prefix, `wp_` by default
    pub table_prefix: String,

    /// Version persisted after a successful run
    pub target_version: SchemaVersion,

    /// Install root, used to derive legacy file locations
    pub abspath: String,

    /// Whether the plugin is network-activated on a multisite install
    pub network_active: bool,

    /// Guard runs with the advisory upgrade lock
    pub use_upgrade_lock: bool,

    /// Age after which a held upgrade lock is considered abandoned
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,

    /// Active component set seeded on a fresh install
    pub default_components: Vec<String>,
}

impl UpgradeConfig {
    pub fn new() -> Self {
        Self {
            table_prefix: "wp_".to_string(),
            target_version: CURRENT_DB_VERSION,
            abspath: "/var/www/html/".to_string(),
            network_active: false,
            use_upgrade_lock: true,
            lock_timeout: Duration::from_secs(15 * 60),
            default_components: DEFAULT_COMPONENTS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Set the table prefix
    pub fn table_prefix(mut self, prefix: &str) -> Self {
        self.table_prefix = prefix.to_string();
        self
    }

    /// Set the target database version
    pub fn target_version(mut self, version: u32) -> Self {
        self.target_version = SchemaVersion::new(version);
        self
    }

    /// Set the install root
    pub fn abspath(mut self, abspath: &str) -> Self {
        self.abspath = abspath.to_string();
        self
    }

    /// Mark the plugin as network-activated
    pub fn network_active(mut self, network_active: bool) -> Self {
        self.network_active = network_active;
        self
    }

    /// Enable or disable the upgrade lock
    pub fn use_upgrade_lock(mut self, enabled: bool) -> Self {
        self.use_upgrade_lock = enabled;
        self
    }

    /// Set the upgrade lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the fresh-install component set
    pub fn default_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_components = components.into_iter().map(Into::into).collect();
        self
    }

    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse config '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Fully prefixed name of a core table, e.g. `wp_bp_activity`.
    pub fn table_name(&self, suffix: &str) -> String {
        format!("{}bp_{}", self.table_prefix, suffix)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.table_prefix.is_empty() {
            return Err("table_prefix cannot be empty".to_string());
        }

        if !self
            .table_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!(
                "table_prefix '{}' may only contain letters, digits and underscores",
                self.table_prefix
            ));
        }

        if self.target_version.get() == 0 {
            return Err("target_version must be >= 1".to_string());
        }

        if self.use_upgrade_lock && self.lock_timeout.is_zero() {
            return Err("lock_timeout must be > 0 when the upgrade lock is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
