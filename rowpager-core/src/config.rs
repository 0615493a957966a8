//! Pager configuration parsing and management.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a pager pairs its count and window reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Count and window run as independent reads; torn reads are caught by
    /// the size check after the fetch.
    #[default]
    Optimistic,

    /// Count and window run inside one read snapshot.
    Transactional,
}

/// Window-size hints and read strategy for a pager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerConfig {
    #[serde(default)]
    pub read_strategy: ReadStrategy,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Defaults to three pages when unset
    #[serde(default)]
    pub initial_load_size: Option<usize>,

    #[serde(default)]
    pub align_to_pages: bool,
}

fn default_page_size() -> usize {
    20
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            read_strategy: ReadStrategy::default(),
            page_size: default_page_size(),
            initial_load_size: None,
            align_to_pages: false,
        }
    }
}

impl PagerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PagerConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".into()));
        }
        if self.initial_load_size == Some(0) {
            return Err(ConfigError::Invalid(
                "initial_load_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Size of the first window a consumer should request
    pub fn initial_load_size(&self) -> usize {
        self.initial_load_size
            .unwrap_or_else(|| self.page_size.saturating_mul(3))
    }

    /// Page size used for start alignment, if alignment is enabled
    pub fn alignment(&self) -> Option<usize> {
        self.align_to_pages.then_some(self.page_size)
    }

    pub fn with_read_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.read_strategy = strategy;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}
