//! Backing documents
//!
//! The entire assessment lives in one flat JSON document that is read once
//! at startup and rewritten wholesale on every mutation. Writes go through
//! a temp file in the same directory followed by a rename, so a crashed
//! write never leaves a truncated document behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::types::{
    Asset, Container, Control, Deliverable, ImpactCategory, LinkRow, Process, Threat,
};

/// The primary backing document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub threats: Vec<Threat>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub risktable: Vec<LinkRow>,
    #[serde(default)]
    pub global_impact_details: Vec<ImpactCategory>,
    /// Reference list of risk-treatment options, served verbatim
    #[serde(default)]
    pub rxo_values: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Fresh document seeded with the standard six impact categories
    pub fn with_default_categories() -> Self {
        let categories = [
            ("safety", 1),
            ("legal", 2),
            ("financial", 3),
            ("operational", 4),
            ("reputation", 5),
            ("other", 6),
        ];
        Self {
            global_impact_details: categories
                .into_iter()
                .map(|(category, priority)| ImpactCategory {
                    category: category.to_string(),
                    priority,
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Wrapper shape of the control library document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ControlLibraryFile {
    #[serde(default)]
    control_library: Vec<Control>,
}

/// Wrapper shape of the deliverables document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeliverablesFile {
    #[serde(default)]
    deliverables: Vec<Deliverable>,
}

/// Load the primary document from disk
pub fn load_document(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path)?;
    let doc = serde_json::from_str(&content)?;
    Ok(doc)
}

/// Serialize and atomically replace the primary document.
///
/// The temp file lands in the same directory as the target so the rename
/// stays on one filesystem.
pub fn save_document(path: &Path, doc: &Document) -> Result<()> {
    let content = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    debug!("document written to {:?}", path);
    Ok(())
}

/// Load the immutable control library; a missing file yields an empty list
pub fn load_control_library(path: &Path) -> Result<Vec<Control>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let file: ControlLibraryFile = serde_json::from_str(&content)?;
    Ok(file.control_library)
}

/// Load the optional deliverables document; a missing file yields an empty
/// list, not an error
pub fn load_deliverables(path: &Path) -> Result<Vec<Deliverable>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let file: DeliverablesFile = serde_json::from_str(&content)?;
    Ok(file.deliverables)
}
