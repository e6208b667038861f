//! Runtime configuration file round-tripping.
//!
//! The sandbox runtime owns a sectioned key-value file (`[section]` headers,
//! `key = value` lines). medic rewrites it whole: lines it does not
//! recognize (comments, blanks, keys from newer runtime versions) survive
//! a rewrite byte-for-byte, and the prior version is renamed to a
//! timestamped backup before the new content lands.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::MedicError;

/// One line inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Pair { key: String, value: String },
    /// Comment, blank, or anything else we pass through untouched.
    Raw(String),
}

/// A `[name]` section and its lines. The preamble before the first header
/// is a section with an empty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<Entry>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }
}

/// Parsed runtime configuration, order-preserving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub sections: Vec<Section>,
}

impl RuntimeConfig {
    /// Parse is lenient: unrecognizable lines are kept as raw entries so a
    /// rewrite never drops them. `suspicious_lines()` reports them.
    pub fn parse(text: &str) -> Self {
        let mut sections = Vec::new();
        let mut current = Section::new("");

        for line in text.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() > 2 {
                sections.push(current);
                current = Section::new(&trimmed[1..trimmed.len() - 1]);
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                current.entries.push(Entry::Raw(line.to_string()));
                continue;
            }

            match trimmed.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    current.entries.push(Entry::Pair {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    });
                }
                _ => current.entries.push(Entry::Raw(line.to_string())),
            }
        }
        sections.push(current);

        Self { sections }
    }

    pub fn load(path: &Path) -> Result<Self, MedicError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Non-comment, non-blank lines that parsed as neither header nor pair.
    pub fn suspicious_lines(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter_map(|e| match e {
                Entry::Raw(line) => {
                    let t = line.trim();
                    if t.is_empty() || t.starts_with('#') || t.starts_with(';') {
                        None
                    } else {
                        Some(line.as_str())
                    }
                }
                Entry::Pair { .. } => None,
            })
            .collect()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .find_map(|e| match e {
                Entry::Pair { key: k, value } if k == key => Some(value.as_str()),
                _ => None,
            })
    }

    /// Update a key in place, or append it (creating the section if needed).
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();

        for s in self.sections.iter_mut().filter(|s| s.name == section) {
            for entry in s.entries.iter_mut() {
                if let Entry::Pair { key: k, value: v } = entry {
                    if k == key {
                        *v = value;
                        return;
                    }
                }
            }
        }

        match self.sections.iter_mut().find(|s| s.name == section) {
            Some(s) => s.entries.push(Entry::Pair {
                key: key.to_string(),
                value,
            }),
            None => {
                let mut s = Section::new(section);
                s.entries.push(Entry::Pair {
                    key: key.to_string(),
                    value,
                });
                self.sections.push(s);
            }
        }
    }

    /// Serialize back to file form. Preamble first, sections in order,
    /// raw lines verbatim.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !section.name.is_empty() {
                out.push_str(&format!("[{}]\n", section.name));
            }
            for entry in &section.entries {
                match entry {
                    Entry::Pair { key, value } => out.push_str(&format!("{key} = {value}\n")),
                    Entry::Raw(line) => {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        out
    }

    /// Rewrite the file at `path`. An existing file is renamed to a
    /// timestamped `.bak` sibling first, so a failed or partial write
    /// always leaves the prior version recoverable. Returns the backup
    /// path when one was made.
    pub fn save(&self, path: &Path) -> Result<Option<PathBuf>, MedicError> {
        let backup = if path.exists() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(|e| {
                MedicError::ConfigWriteFailed(format!(
                    "could not back up {} to {}: {e}",
                    path.display(),
                    backup.display()
                ))
            })?;
            info!("previous config saved as {}", backup.display());
            Some(backup)
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    MedicError::ConfigWriteFailed(format!(
                        "could not create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            None
        };

        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = fs::File::create(path)?;
            file.write_all(self.to_text().as_bytes())?;
            file.sync_all()
        };

        write(path).map_err(|e| {
            MedicError::ConfigWriteFailed(format!("writing {}: {e}", path.display()))
        })?;

        debug!("rewrote {}", path.display());
        Ok(backup)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!("{name}.{stamp}.bak"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# runtime tuning
[memory]
limit_mb = 8192
balloon = true

[network]
dns_proxy = on
# keep the mirrored resolver
mirror = legacy-value
";

    #[test]
    fn test_parse_and_get() {
        let config = RuntimeConfig::parse(SAMPLE);
        assert_eq!(config.get("memory", "limit_mb"), Some("8192"));
        assert_eq!(config.get("network", "dns_proxy"), Some("on"));
        assert_eq!(config.get("network", "absent"), None);
        assert!(config.suspicious_lines().is_empty());
    }

    #[test]
    fn test_roundtrip_preserves_unknown_keys_and_comments() {
        let config = RuntimeConfig::parse(SAMPLE);
        let text = config.to_text();
        assert!(text.contains("# runtime tuning"));
        assert!(text.contains("mirror = legacy-value"));
        assert!(text.contains("# keep the mirrored resolver"));

        let reparsed = RuntimeConfig::parse(&text);
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_set_updates_in_place() {
        let mut config = RuntimeConfig::parse(SAMPLE);
        config.set("memory", "limit_mb", "4096");
        assert_eq!(config.get("memory", "limit_mb"), Some("4096"));
        // Single occurrence, position preserved
        assert_eq!(config.to_text().matches("limit_mb").count(), 1);
    }

    #[test]
    fn test_set_creates_missing_section() {
        let mut config = RuntimeConfig::parse("");
        config.set("memory", "limit_mb", "2048");
        assert_eq!(config.get("memory", "limit_mb"), Some("2048"));
        assert!(config.to_text().contains("[memory]"));
    }

    #[test]
    fn test_suspicious_lines_reported() {
        let config = RuntimeConfig::parse("[memory]\nlimit_mb 8192\n");
        assert_eq!(config.suspicious_lines(), vec!["limit_mb 8192"]);
    }

    #[test]
    fn test_save_creates_timestamped_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmrun.conf");
        fs::write(&path, SAMPLE).unwrap();

        let mut config = RuntimeConfig::load(&path).unwrap();
        config.set("memory", "limit_mb", "4096");
        let backup = config.save(&path).unwrap().expect("backup expected");

        assert!(backup.exists());
        assert!(backup.to_string_lossy().ends_with(".bak"));
        // Backup holds the prior version
        let old = fs::read_to_string(&backup).unwrap();
        assert!(old.contains("limit_mb = 8192"));
        // File holds the new version
        let new = fs::read_to_string(&path).unwrap();
        assert!(new.contains("limit_mb = 4096"));
        assert!(new.contains("mirror = legacy-value"));
    }

    #[test]
    fn test_save_without_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh").join("vmrun.conf");

        let mut config = RuntimeConfig::default();
        config.set("memory", "limit_mb", "1024");
        let backup = config.save(&path).unwrap();

        assert!(backup.is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_load_roundtrip_equivalence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmrun.conf");

        let mut config = RuntimeConfig::default();
        config.set("memory", "limit_mb", "4096");
        config.set("network", "dns_proxy", "off");
        config.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.get("memory", "limit_mb"), Some("4096"));
        assert_eq!(loaded.get("network", "dns_proxy"), Some("off"));
    }
}
