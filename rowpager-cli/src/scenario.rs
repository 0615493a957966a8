//! Simulation scenario configuration.

use anyhow::{bail, Context, Result};
use rowpager_core::PagerConfig;
use rowpager_types::ResourceTag;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A scroll simulation: one table, one writer, one scrolling consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub pager: PagerConfig,

    /// Tag the table publishes and the pagers watch
    #[serde(default = "default_table")]
    pub table: ResourceTag,

    /// Rows present before the writer starts
    #[serde(default = "default_rows")]
    pub rows: u64,

    /// Where every scroll pass starts
    #[serde(default)]
    pub start: usize,

    /// Writes performed by the writer thread
    #[serde(default = "default_writes")]
    pub writes: usize,

    /// Pause between writes, in microseconds
    #[serde(default = "default_write_interval_us")]
    pub write_interval_us: u64,

    /// Every n-th write deletes the oldest row instead of appending; 0 never deletes
    #[serde(default = "default_delete_every")]
    pub delete_every: usize,

    /// Give up after this many pager epochs
    #[serde(default = "default_max_epochs")]
    pub max_epochs: u64,
}

fn default_table() -> ResourceTag {
    ResourceTag::new("messages")
}

fn default_rows() -> u64 {
    200
}

fn default_writes() -> usize {
    50
}

fn default_write_interval_us() -> u64 {
    200
}

fn default_delete_every() -> usize {
    3
}

fn default_max_epochs() -> u64 {
    10_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pager: PagerConfig::default(),
            table: default_table(),
            rows: default_rows(),
            start: 0,
            writes: default_writes(),
            write_interval_us: default_write_interval_us(),
            delete_every: default_delete_every(),
            max_epochs: default_max_epochs(),
        }
    }
}

impl SimulationConfig {
    /// Load from `path`, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SimulationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pager.validate().context("Invalid pager section")?;
        if self.table.as_str().is_empty() {
            bail!("table must not be empty");
        }
        if self.max_epochs == 0 {
            bail!("max_epochs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowpager_core::ReadStrategy;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: SimulationConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.rows, 200);
        assert_eq!(config.table.as_str(), "messages");
        assert_eq!(config.pager, PagerConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_nested_pager_section() {
        let yaml = r#"
pager:
  read_strategy: transactional
  page_size: 5
table: receipts
writes: 0
"#;
        let config: SimulationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pager.read_strategy, ReadStrategy::Transactional);
        assert_eq!(config.pager.initial_load_size(), 15);
        assert_eq!(config.table.as_str(), "receipts");
        assert_eq!(config.writes, 0);
    }

    #[test]
    fn test_validate_rejects_bad_pager() {
        let config: SimulationConfig = serde_yaml::from_str("pager:\n  page_size: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("page_size must be positive"));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = SimulationConfig::load(None).unwrap();
        assert_eq!(config.writes, 50);
    }
}
