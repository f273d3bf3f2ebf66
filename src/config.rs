use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Template written by `ticketbox init`.
pub const DEFAULT_CONFIG_JSON: &str = include_str!("../resources/default-config.json");

/// Largest history page most chat platforms accept.
pub const MAX_HISTORY_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity the service acts as; always granted access to ticket channels.
    pub system_actor: String,
    /// Identities that may manage any ticket.
    pub admin_ids: Vec<String>,
    /// Roles granted access to every ticket channel.
    pub privileged_roles: Vec<String>,
    /// Category new channels are created under.
    pub parent_scope: Option<String>,
    pub export_byte_limit: usize,
    pub grace_delay_secs: u64,
    pub history_batch_size: usize,
    pub page_size: usize,
    pub selection_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_actor: "ticketbox".to_string(),
            admin_ids: Vec::new(),
            privileged_roles: Vec::new(),
            parent_scope: None,
            export_byte_limit: 7_800_000,
            grace_delay_secs: 5,
            history_batch_size: MAX_HISTORY_BATCH,
            page_size: 25,
            selection_timeout_secs: 90,
        }
    }
}

impl Config {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.export_byte_limit == 0 {
            anyhow::bail!("export_byte_limit must be positive");
        }
        if self.page_size == 0 {
            anyhow::bail!("page_size must be positive");
        }
        Ok(())
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs(self.grace_delay_secs)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }

    pub fn history_batch(&self) -> usize {
        self.history_batch_size.clamp(1, MAX_HISTORY_BATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = serde_json::from_str(DEFAULT_CONFIG_JSON).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.selection_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"admin_ids": ["42"], "history_batch_size": 500}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.admin_ids, vec!["42".to_string()]);
        assert_eq!(config.history_batch(), MAX_HISTORY_BATCH);
        assert_eq!(config.export_byte_limit, 7_800_000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"export_byte_limit": 0}"#).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("export_byte_limit"));

        fs::write(&path, "not json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
