use anyhow::{Context, Result};
use hcictl_core::{AlreadyCompleteRule, PollPolicy, PollProfile, SchemaLocations};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    /// Overrides keyed by profile name (`light`, `standard`, `heavy`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub already_complete: Vec<AlreadyCompleteRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ProfileOverride {
    pub fn apply(&self, policy: PollPolicy) -> PollPolicy {
        let interval = self
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or(policy.interval);
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(policy.timeout);
        PollPolicy::new(interval, timeout).with_recovery(
            self.recovery_secs
                .map(Duration::from_secs)
                .unwrap_or(policy.recovery_interval),
            self.max_retries.unwrap_or(policy.max_transient_retries),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid config JSON in {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Built-in profile defaults with any configured overrides applied.
    pub fn policy(&self, profile: PollProfile) -> PollPolicy {
        let base = profile.policy();
        match self.profiles.get(profile.as_str()) {
            Some(o) => o.apply(base),
            None => base,
        }
    }

    pub fn locations(&self) -> SchemaLocations {
        let mut locations = SchemaLocations::default();
        if let Some(schema) = &self.schema {
            if let Some(p) = &schema.consolidated {
                locations.consolidated = p.clone();
            }
            if let Some(p) = &schema.group_pattern {
                locations.group_pattern = p.clone();
            }
            if let Some(groups) = &schema.groups {
                locations.groups = groups.clone();
            }
        }
        locations
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("HCICTL_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("hcictl").join("config.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("hcictl")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = tempdir().expect("tempdir");
        let cfg = Config::load(&tmp.path().join("nope.json")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("config.json");
        let mut cfg = Config {
            host: Some("vxm.lab.local".into()),
            username: Some("administrator@vsphere.local".into()),
            ..Config::default()
        };
        cfg.profiles.insert(
            "heavy".into(),
            ProfileOverride {
                recovery_secs: Some(600),
                max_retries: Some(12),
                ..ProfileOverride::default()
            },
        );
        cfg.save(&path).expect("save");
        assert_eq!(Config::load(&path).expect("load"), cfg);
    }

    #[test]
    fn profile_overrides_only_replace_given_fields() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "heavy".into(),
            ProfileOverride {
                recovery_secs: Some(600),
                max_retries: Some(12),
                ..ProfileOverride::default()
            },
        );
        let heavy = cfg.policy(PollProfile::Heavy);
        let builtin = PollProfile::Heavy.policy();
        assert_eq!(heavy.interval, builtin.interval);
        assert_eq!(heavy.timeout, builtin.timeout);
        assert_eq!(heavy.recovery_interval, Duration::from_secs(600));
        assert_eq!(heavy.max_transient_retries, 12);
        assert_eq!(cfg.policy(PollProfile::Light), PollProfile::Light.policy());
    }

    #[test]
    fn schema_section_overrides_locations() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "schema": {"groups": ["cluster", "lcm"]},
            "already_complete": [{"status": 400, "error_code": "E30102"}]
        }))
        .expect("parse");
        let locations = cfg.locations();
        assert_eq!(locations.groups, vec!["cluster", "lcm"]);
        assert_eq!(locations.consolidated, "/rest/vxm/api-doc.json");
        assert_eq!(cfg.already_complete.len(), 1);
    }
}
