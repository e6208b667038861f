//! Tool settings.
//!
//! Loaded from TOML with a system path, then a user path, then built-in
//! defaults. Thresholds here drive probe status decisions; the runtime
//! config path points at the sandbox runtime's own configuration file,
//! which remediations may rewrite.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use anyhow::{Context, Result};

/// System-wide settings path.
pub const CONFIG_PATH_SYSTEM: &str = "/etc/medic/medic.toml";

/// Per-user settings path, relative to $HOME.
pub const CONFIG_PATH_USER: &str = ".config/medic/medic.toml";

/// Probe thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Warn when available memory drops below this many MB.
    pub memory_warn_mb: u64,
    /// Fail when available memory drops below this many MB.
    pub memory_fail_mb: u64,
    /// Warn when the data volume exceeds this used percentage.
    pub disk_warn_percent: f64,
    /// Fail when the data volume exceeds this used percentage.
    pub disk_fail_percent: f64,
    /// A client process older than this many seconds counts as hung.
    pub client_hang_secs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_warn_mb: 1024,
            memory_fail_mb: 256,
            disk_warn_percent: 85.0,
            disk_fail_percent: 95.0,
            client_hang_secs: 300,
        }
    }
}

/// medic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicConfig {
    /// Service unit backing the sandbox runtime.
    pub service_unit: String,
    /// Exact executable name of the runtime's client CLI.
    pub client_process: String,
    /// The runtime configuration file remediations may rewrite.
    pub runtime_config_path: PathBuf,
    /// Host resolved by the DNS probe.
    pub dns_check_host: String,
    /// Target for the TCP reachability probe.
    pub reach_host: String,
    pub reach_port: u16,
    /// Path whose backing volume the disk probe inspects.
    pub data_volume: PathBuf,
    /// Memory limit (MB) the cap-memory remediation writes.
    pub memory_cap_mb: u64,
    /// Bound for every external call a probe or remediation makes.
    pub call_timeout_secs: u64,
    pub thresholds: Thresholds,
}

impl Default for MedicConfig {
    fn default() -> Self {
        Self {
            service_unit: "vmrund.service".to_string(),
            client_process: "vmrun".to_string(),
            runtime_config_path: default_runtime_config_path(),
            dns_check_host: "example.com".to_string(),
            reach_host: "1.1.1.1".to_string(),
            reach_port: 443,
            data_volume: PathBuf::from("/var/lib/vmrun"),
            memory_cap_mb: 4096,
            call_timeout_secs: 10,
            thresholds: Thresholds::default(),
        }
    }
}

fn default_runtime_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    PathBuf::from(home).join(".vmrun").join("vmrun.conf")
}

impl MedicConfig {
    /// Load settings: system path first, then user path, then defaults.
    pub fn load() -> Result<Self> {
        if Path::new(CONFIG_PATH_SYSTEM).exists() {
            return Self::load_from(Path::new(CONFIG_PATH_SYSTEM));
        }

        if let Ok(home) = std::env::var("HOME") {
            let user_path = PathBuf::from(home).join(CONFIG_PATH_USER);
            if user_path.exists() {
                return Self::load_from(&user_path);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = MedicConfig::default();
        assert!(config.thresholds.memory_fail_mb < config.thresholds.memory_warn_mb);
        assert!(config.thresholds.disk_warn_percent < config.thresholds.disk_fail_percent);
        assert!(config.call_timeout_secs > 0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: MedicConfig = toml::from_str(
            r#"
service_unit = "boxd.service"

[thresholds]
disk_fail_percent = 98.0
"#,
        )
        .unwrap();

        assert_eq!(config.service_unit, "boxd.service");
        assert_eq!(config.thresholds.disk_fail_percent, 98.0);
        // Untouched fields keep their defaults
        assert_eq!(config.client_process, "vmrun");
        assert_eq!(config.thresholds.memory_warn_mb, 1024);
    }

    #[test]
    fn test_roundtrip() {
        let config = MedicConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: MedicConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.service_unit, config.service_unit);
        assert_eq!(parsed.reach_port, config.reach_port);
    }
}
