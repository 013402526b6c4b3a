//! Core domain types
//!
//! Entities are identified by typed string ids: a kind-name prefix with no
//! separator followed by a zero-padded 6-digit decimal, e.g. `asset000042`.
//! Control ids come from the immutable control library and are free-form
//! (e.g. `A.5.1.1`), which is why prefix resolution falls back to `Control`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Width of the numeric suffix in generated entity ids
pub const ID_SUFFIX_WIDTH: usize = 6;

// =============================================================================
// ENTITY IDENTITY
// =============================================================================

/// The five entity kinds connected by the risktable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Process,
    Asset,
    Threat,
    Container,
    Control,
}

impl EntityKind {
    /// Resolve the kind from an id's prefix.
    ///
    /// Anything that is not process/asset/threat/container is a control,
    /// since control-library ids carry no fixed prefix.
    pub fn of(id: &str) -> Self {
        if id.starts_with("process") {
            EntityKind::Process
        } else if id.starts_with("asset") {
            EntityKind::Asset
        } else if id.starts_with("threat") {
            EntityKind::Threat
        } else if id.starts_with("container") {
            EntityKind::Container
        } else {
            EntityKind::Control
        }
    }

    /// Prefix used when formatting generated ids
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Process => "process",
            EntityKind::Asset => "asset",
            EntityKind::Threat => "threat",
            EntityKind::Container => "container",
            EntityKind::Control => "control",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// An entity id with its kind resolved once at parse time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    kind: EntityKind,
    raw: String,
}

impl EntityId {
    /// Parse an id, resolving the kind from its prefix
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidEntityId(raw.to_string()));
        }
        Ok(Self {
            kind: EntityKind::of(raw),
            raw: raw.to_string(),
        })
    }

    /// Format a generated id: kind prefix + zero-padded suffix
    pub fn format(kind: EntityKind, n: u64) -> String {
        format!("{}{:0width$}", kind.prefix(), n, width = ID_SUFFIX_WIDTH)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Numeric suffix of a generated id, if it has one.
///
/// `asset000042` → 42. Control-library ids yield `None`.
pub fn id_suffix(id: &str) -> Option<u64> {
    let kind = EntityKind::of(id);
    id.strip_prefix(kind.prefix())?.parse().ok()
}

// =============================================================================
// ENTITY RECORDS
// =============================================================================

/// An organizational process under assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
}

/// An asset belonging to a process, with CIA criticality flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub criticality_c: bool,
    #[serde(default)]
    pub criticality_i: bool,
    #[serde(default)]
    pub criticality_a: bool,
}

/// A threat instance referencing a threat template by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub id: String,
    #[serde(default)]
    pub threat_lib_reference: String,
    #[serde(default)]
    pub impact_scores: Vec<ImpactScore>,
    /// Risk-treatment decision (accept / mitigate / transfer / avoid)
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub decision_comment: String,
}

/// A named grouping of controls associated with threats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Immutable control-library entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub control_id: String,
    pub control_name: String,
}

/// A 0-3 rating of a threat within one impact category.
///
/// The score is stringly in the document lineage (the repair pass writes
/// `"0"`), so it stays a string here with a parsing accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactScore {
    #[serde(rename = "type")]
    pub score_type: String,
    pub score: String,
}

impl ImpactScore {
    /// Numeric value of the score; unparseable input counts as 0
    pub fn value(&self) -> u32 {
        self.score.trim().parse().unwrap_or(0)
    }
}

/// Global impact category with its scoring priority (1 = highest)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactCategory {
    pub category: String,
    pub priority: u32,
}

/// Tracked deliverable with associated controls and maturity fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub control_ids: Vec<String>,
    #[serde(default)]
    pub maturity: String,
    #[serde(default)]
    pub target_maturity: String,
}

// =============================================================================
// LINK ROWS (risktable)
// =============================================================================

/// A sparse many-to-many join record connecting 1-3 entity ids.
///
/// Full-row equality is the duplicate-insert contract: a row identical in
/// every field to an existing one is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_id: Option<String>,
}

impl LinkRow {
    /// Number of id fields present
    pub fn field_count(&self) -> usize {
        self.ids().count()
    }

    /// The id stored for a given kind, if present
    pub fn get(&self, kind: EntityKind) -> Option<&str> {
        match kind {
            EntityKind::Process => self.process_id.as_deref(),
            EntityKind::Asset => self.asset_id.as_deref(),
            EntityKind::Threat => self.threat_id.as_deref(),
            EntityKind::Container => self.container_id.as_deref(),
            EntityKind::Control => self.control_id.as_deref(),
        }
    }

    /// Every id present on this row
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        [
            self.process_id.as_deref(),
            self.asset_id.as_deref(),
            self.threat_id.as_deref(),
            self.container_id.as_deref(),
            self.control_id.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether any field on this row equals `id`
    pub fn contains(&self, id: &str) -> bool {
        self.ids().any(|v| v == id)
    }

    /// Precondition check: 1 to 3 id fields
    pub fn validate(&self) -> Result<()> {
        let count = self.field_count();
        if !(1..=3).contains(&count) {
            return Err(Error::MalformedLinkRow(count));
        }
        Ok(())
    }

    /// Convenience constructor used by the add operations
    pub fn pair(a_kind: EntityKind, a: &str, b_kind: EntityKind, b: &str) -> Self {
        let mut row = LinkRow::default();
        row.set(a_kind, a);
        row.set(b_kind, b);
        row
    }

    /// Store an id in the slot matching its kind
    pub fn set(&mut self, kind: EntityKind, id: &str) {
        let slot = match kind {
            EntityKind::Process => &mut self.process_id,
            EntityKind::Asset => &mut self.asset_id,
            EntityKind::Threat => &mut self.threat_id,
            EntityKind::Container => &mut self.container_id,
            EntityKind::Control => &mut self.control_id,
        };
        *slot = Some(id.to_string());
    }
}

/// Anything addressable by entity id; the seam the join engine works over
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Process {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Asset {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Threat {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Container {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Control {
    fn key(&self) -> &str {
        &self.control_id
    }
}

// =============================================================================
// CREATE / PATCH INPUTS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetInput {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub criticality_c: bool,
    #[serde(default)]
    pub criticality_i: bool,
    #[serde(default)]
    pub criticality_a: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreatInput {
    #[serde(default)]
    pub threat_lib_reference: String,
    #[serde(default)]
    pub impact_scores: Vec<ImpactScore>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for a process; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub criticality_c: Option<bool>,
    pub criticality_i: Option<bool>,
    pub criticality_a: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreatPatch {
    pub threat_lib_reference: Option<String>,
    pub impact_scores: Option<Vec<ImpactScore>>,
    pub decision: Option<String>,
    pub decision_comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}
