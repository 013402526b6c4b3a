//! Service configuration
//!
//! Configurable parameters for the openisms service: backing-store file
//! locations, HTTP port, and the risk-scoring constants that differ between
//! deployments of this data lineage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the openisms service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenismsConfig {
    // === Storage ===
    /// Primary backing document (processes, assets, threats, containers, risktable)
    pub data_file: PathBuf,

    /// Immutable control library document
    pub control_library_file: PathBuf,

    /// Optional deliverables document; a missing file yields an empty list
    pub deliverables_file: PathBuf,

    // === Network ===
    /// Port for the HTTP API
    pub api_port: u16,

    // === Scoring ===
    /// Maximum per-category impact score (inclusive)
    pub max_impact_score: u32,

    /// Risk normalization divisor.
    ///
    /// Derivable as max_priority_weight_sum × max_impact_score; 45 for the
    /// 6-category/0-3 variant (weights 5+4+3+2+1+0, scores up to 3).
    pub risk_score_divisor: f64,
}

impl Default for OpenismsConfig {
    fn default() -> Self {
        Self {
            // Storage
            data_file: PathBuf::from("assessments/data.json"),
            control_library_file: PathBuf::from("assessments/controls.json"),
            deliverables_file: PathBuf::from("assessments/deliverables.json"),

            // Network
            api_port: 8080,

            // Scoring
            max_impact_score: 3,
            risk_score_divisor: 45.0,
        }
    }
}

impl OpenismsConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    /// Point all three backing documents at a single data directory
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_file = dir.join("data.json");
        self.control_library_file = dir.join("controls.json");
        self.deliverables_file = dir.join("deliverables.json");
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.risk_score_divisor <= 0.0 {
            anyhow::bail!(
                "risk_score_divisor ({}) must be positive",
                self.risk_score_divisor
            );
        }

        if self.max_impact_score == 0 {
            anyhow::bail!("max_impact_score must be at least 1");
        }

        Ok(())
    }
}
