//! Assessment store
//!
//! Owns the in-memory copy of the backing document plus the immutable
//! reference documents (control library, deliverables). Every mutating
//! operation rewrites the whole document through an atomic rename; a failed
//! write surfaces as a typed error, never a logged-and-ignored warning.
//! Cross-process writers remain last-writer-wins.

mod document;

pub use document::Document;

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

use crate::config::OpenismsConfig;
use crate::error::{Error, Result};
use crate::risktable::{self, EnrichedThreat};
use crate::types::{
    id_suffix, Asset, AssetInput, AssetPatch, Container, ContainerInput, ContainerPatch, Control,
    Deliverable, EntityId, EntityKind, ImpactScore, Keyed, LinkRow, Process, ProcessInput,
    ProcessPatch, Threat, ThreatInput, ThreatPatch,
};

/// Store contents at a glance
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub processes: usize,
    pub assets: usize,
    pub threats: usize,
    pub containers: usize,
    pub link_rows: usize,
    pub controls: usize,
    pub deliverables: usize,
}

/// The assessment store: one JSON document held in memory, committed
/// wholesale on every mutation
pub struct Store {
    doc: Document,
    control_library: Vec<Control>,
    deliverables: Vec<Deliverable>,
    data_path: PathBuf,
    risk_score_divisor: f64,
    max_impact_score: u32,
}

impl Store {
    /// Open the store, creating a seeded document if none exists, and run
    /// the impact-score repair pass.
    pub fn open(config: &OpenismsConfig) -> Result<Self> {
        let doc = if config.data_file.exists() {
            document::load_document(&config.data_file)?
        } else {
            if let Some(parent) = config.data_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let doc = Document::with_default_categories();
            document::save_document(&config.data_file, &doc)?;
            info!("created new assessment document at {:?}", config.data_file);
            doc
        };

        let control_library = document::load_control_library(&config.control_library_file)?;
        let deliverables = document::load_deliverables(&config.deliverables_file)?;

        let mut store = Self {
            doc,
            control_library,
            deliverables,
            data_path: config.data_file.clone(),
            risk_score_divisor: config.risk_score_divisor,
            max_impact_score: config.max_impact_score,
        };

        let repaired = store.repair_impact_scores();
        if repaired > 0 {
            info!("repair pass added {} default impact scores", repaired);
            store.commit()?;
        }

        Ok(store)
    }

    /// Serialize the whole document and atomically replace the file
    fn commit(&mut self) -> Result<()> {
        self.doc.saved_at = Some(Utc::now());
        document::save_document(&self.data_path, &self.doc)
    }

    /// Write the current document without mutating it (shutdown path)
    pub fn flush(&self) -> Result<()> {
        document::save_document(&self.data_path, &self.doc)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn control_library(&self) -> &[Control] {
        &self.control_library
    }

    pub fn deliverables(&self) -> &[Deliverable] {
        &self.deliverables
    }

    pub fn risk_score_divisor(&self) -> f64 {
        self.risk_score_divisor
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            processes: self.doc.processes.len(),
            assets: self.doc.assets.len(),
            threats: self.doc.threats.len(),
            containers: self.doc.containers.len(),
            link_rows: self.doc.risktable.len(),
            controls: self.control_library.len(),
            deliverables: self.deliverables.len(),
        }
    }

    // =========================================================================
    // ID ALLOCATION
    // =========================================================================

    /// Next id for a kind: max numeric suffix seen in the entity table and
    /// the risktable, plus one, zero-padded.
    pub fn next_id(&self, kind: EntityKind) -> String {
        let table_max = match kind {
            EntityKind::Process => table_suffix_max(&self.doc.processes),
            EntityKind::Asset => table_suffix_max(&self.doc.assets),
            EntityKind::Threat => table_suffix_max(&self.doc.threats),
            EntityKind::Container => table_suffix_max(&self.doc.containers),
            EntityKind::Control => 0,
        };

        let link_max = self
            .doc
            .risktable
            .iter()
            .filter_map(|row| row.get(kind))
            .filter(|id| EntityKind::of(id) == kind)
            .filter_map(id_suffix)
            .max()
            .unwrap_or(0);

        EntityId::format(kind, table_max.max(link_max) + 1)
    }

    // =========================================================================
    // REPAIR PASS
    // =========================================================================

    /// Synchronize every threat's impact-score list with the global
    /// category list: missing categories gain a default "0" entry, existing
    /// entries are left untouched. Returns the number of entries added.
    pub fn repair_impact_scores(&mut self) -> usize {
        let mut added = 0;
        for threat in &mut self.doc.threats {
            for category in &self.doc.global_impact_details {
                let present = threat
                    .impact_scores
                    .iter()
                    .any(|s| s.score_type == category.category);
                if !present {
                    threat.impact_scores.push(ImpactScore {
                        score_type: category.category.clone(),
                        score: "0".to_string(),
                    });
                    added += 1;
                }
            }
        }
        added
    }

    // =========================================================================
    // ADD
    // =========================================================================

    pub fn add_process(&mut self, input: ProcessInput) -> Result<Process> {
        let process = Process {
            id: self.next_id(EntityKind::Process),
            name: input.name,
            description: input.description,
            owner: input.owner,
        };
        self.doc.processes.push(process.clone());
        self.commit()?;
        Ok(process)
    }

    /// Add an asset and link it to its owning process
    pub fn add_asset(&mut self, process_id: &str, input: AssetInput) -> Result<Asset> {
        self.require(EntityKind::Process, process_id)?;

        let asset = Asset {
            id: self.next_id(EntityKind::Asset),
            name: input.name,
            owner: input.owner,
            criticality_c: input.criticality_c,
            criticality_i: input.criticality_i,
            criticality_a: input.criticality_a,
        };
        let link = LinkRow::pair(
            EntityKind::Process,
            process_id,
            EntityKind::Asset,
            &asset.id,
        );
        risktable::insert_link(&mut self.doc.risktable, link)?;
        self.doc.assets.push(asset.clone());
        self.commit()?;
        Ok(asset)
    }

    /// Add a threat against an asset; its impact-score list is filled out
    /// to cover every global category
    pub fn add_threat(&mut self, asset_id: &str, input: ThreatInput) -> Result<Threat> {
        self.require(EntityKind::Asset, asset_id)?;
        self.check_impact_scores(&input.impact_scores)?;

        let mut threat = Threat {
            id: self.next_id(EntityKind::Threat),
            threat_lib_reference: input.threat_lib_reference,
            impact_scores: input.impact_scores,
            decision: String::new(),
            decision_comment: String::new(),
        };
        for category in &self.doc.global_impact_details {
            let present = threat
                .impact_scores
                .iter()
                .any(|s| s.score_type == category.category);
            if !present {
                threat.impact_scores.push(ImpactScore {
                    score_type: category.category.clone(),
                    score: "0".to_string(),
                });
            }
        }

        let link = LinkRow::pair(EntityKind::Asset, asset_id, EntityKind::Threat, &threat.id);
        risktable::insert_link(&mut self.doc.risktable, link)?;
        self.doc.threats.push(threat.clone());
        self.commit()?;
        Ok(threat)
    }

    /// Add a container, optionally linking it to a threat right away
    pub fn add_container(
        &mut self,
        threat_id: Option<&str>,
        input: ContainerInput,
    ) -> Result<Container> {
        if let Some(tid) = threat_id {
            self.require(EntityKind::Threat, tid)?;
        }

        let container = Container {
            id: self.next_id(EntityKind::Container),
            name: input.name,
            description: input.description,
        };
        if let Some(tid) = threat_id {
            let link = LinkRow::pair(
                EntityKind::Threat,
                tid,
                EntityKind::Container,
                &container.id,
            );
            risktable::insert_link(&mut self.doc.risktable, link)?;
        }
        self.doc.containers.push(container.clone());
        self.commit()?;
        Ok(container)
    }

    /// Link a control from the library into a container
    pub fn link_control(&mut self, container_id: &str, control_id: &str) -> Result<()> {
        self.require(EntityKind::Container, container_id)?;
        if !self
            .control_library
            .iter()
            .any(|c| c.control_id == control_id)
        {
            return Err(Error::EntityNotFound(control_id.to_string()));
        }

        let link = LinkRow::pair(
            EntityKind::Container,
            container_id,
            EntityKind::Control,
            control_id,
        );
        risktable::insert_link(&mut self.doc.risktable, link)?;
        self.commit()
    }

    /// Insert an arbitrary link row (1-3 ids, no exact duplicate)
    pub fn insert_link(&mut self, row: LinkRow) -> Result<()> {
        risktable::insert_link(&mut self.doc.risktable, row)?;
        self.commit()
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    pub fn update_process(&mut self, id: &str, patch: ProcessPatch) -> Result<Process> {
        let process = self
            .doc
            .processes
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            process.name = name;
        }
        if let Some(description) = patch.description {
            process.description = description;
        }
        if let Some(owner) = patch.owner {
            process.owner = owner;
        }

        let updated = process.clone();
        self.commit()?;
        Ok(updated)
    }

    pub fn update_asset(&mut self, id: &str, patch: AssetPatch) -> Result<Asset> {
        let asset = self
            .doc
            .assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            asset.name = name;
        }
        if let Some(owner) = patch.owner {
            asset.owner = owner;
        }
        if let Some(c) = patch.criticality_c {
            asset.criticality_c = c;
        }
        if let Some(i) = patch.criticality_i {
            asset.criticality_i = i;
        }
        if let Some(a) = patch.criticality_a {
            asset.criticality_a = a;
        }

        let updated = asset.clone();
        self.commit()?;
        Ok(updated)
    }

    /// Patch a threat. Posted impact scores must name categories from the
    /// global list and stay within the configured ceiling.
    pub fn update_threat(&mut self, id: &str, patch: ThreatPatch) -> Result<Threat> {
        if let Some(scores) = &patch.impact_scores {
            for score in scores {
                let known = self
                    .doc
                    .global_impact_details
                    .iter()
                    .any(|c| c.category == score.score_type);
                if !known {
                    return Err(Error::UnknownCategory(score.score_type.clone()));
                }
            }
            self.check_impact_scores(scores)?;
        }

        let threat = self
            .doc
            .threats
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        if let Some(reference) = patch.threat_lib_reference {
            threat.threat_lib_reference = reference;
        }
        if let Some(scores) = patch.impact_scores {
            // Merge per category, keep untouched categories as they are
            for score in scores {
                match threat
                    .impact_scores
                    .iter_mut()
                    .find(|s| s.score_type == score.score_type)
                {
                    Some(existing) => existing.score = score.score,
                    None => threat.impact_scores.push(score),
                }
            }
        }
        if let Some(decision) = patch.decision {
            threat.decision = decision;
        }
        if let Some(comment) = patch.decision_comment {
            threat.decision_comment = comment;
        }

        let updated = threat.clone();
        self.commit()?;
        Ok(updated)
    }

    pub fn update_container(&mut self, id: &str, patch: ContainerPatch) -> Result<Container> {
        let container = self
            .doc
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            container.name = name;
        }
        if let Some(description) = patch.description {
            container.description = description;
        }

        let updated = container.clone();
        self.commit()?;
        Ok(updated)
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Cascading delete from a process/asset/threat root. Returns every id
    /// removed, sorted for stable output.
    pub fn delete_cascade(&mut self, root_id: &str) -> Result<Vec<String>> {
        let kind = EntityKind::of(root_id);
        if !matches!(
            kind,
            EntityKind::Process | EntityKind::Asset | EntityKind::Threat
        ) {
            return Err(Error::CascadeUnsupported(root_id.to_string()));
        }
        self.require(kind, root_id)?;

        let remove = risktable::cascade_remove_set(&self.doc.risktable, root_id);
        risktable::purge_rows(&mut self.doc.risktable, &remove);

        self.doc.processes.retain(|p| !remove.contains(&p.id));
        self.doc.assets.retain(|a| !remove.contains(&a.id));
        self.doc.threats.retain(|t| !remove.contains(&t.id));

        self.commit()?;

        let mut removed: Vec<String> = remove.into_iter().collect();
        removed.sort();
        Ok(removed)
    }

    /// Edge deletion: drop exactly the rows carrying both ids
    pub fn unlink(&mut self, a: &str, b: &str) -> Result<usize> {
        let removed = risktable::delete_id_set(&mut self.doc.risktable, a, b);
        if removed > 0 {
            self.commit()?;
        }
        Ok(removed)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Fetch entities by id set; the kind is resolved from the ids' prefix.
    /// Returns serialized records ready for the HTTP layer.
    pub fn fetch_entities(&self, ids: &HashSet<String>) -> Result<Vec<serde_json::Value>> {
        let Some(first) = ids.iter().next() else {
            return Ok(Vec::new());
        };
        let kind = EntityId::parse(first)?.kind();

        let values = match kind {
            EntityKind::Process => to_values(risktable::fetch_by_ids(&self.doc.processes, ids)),
            EntityKind::Asset => to_values(risktable::fetch_by_ids(&self.doc.assets, ids)),
            EntityKind::Threat => to_values(risktable::fetch_by_ids(&self.doc.threats, ids)),
            EntityKind::Container => to_values(risktable::fetch_by_ids(&self.doc.containers, ids)),
            EntityKind::Control => to_values(risktable::fetch_by_ids(&self.control_library, ids)),
        };
        values
    }

    /// Association walk over the risktable
    pub fn related_ids(
        &self,
        from_kind: EntityKind,
        from_ids: &HashSet<String>,
        to_kind: EntityKind,
    ) -> Vec<String> {
        risktable::related_ids(&self.doc.risktable, from_kind, from_ids, to_kind)
    }

    /// Threat with its container/control hierarchy and owning asset resolved
    pub fn enrich_threat(&self, threat_id: &str) -> Result<EnrichedThreat> {
        let threat = self
            .doc
            .threats
            .iter()
            .find(|t| t.id == threat_id)
            .ok_or_else(|| Error::EntityNotFound(threat_id.to_string()))?;

        Ok(risktable::enrich_threat(
            threat,
            &self.doc.risktable,
            &self.doc.containers,
            &self.control_library,
            &self.doc.assets,
            &self.doc.global_impact_details,
            self.risk_score_divisor,
        ))
    }

    /// Posted scores must parse to at most the configured per-category
    /// ceiling; unparseable strings count as 0 and pass
    fn check_impact_scores(&self, scores: &[ImpactScore]) -> Result<()> {
        for score in scores {
            if score.value() > self.max_impact_score {
                return Err(Error::ScoreOutOfRange {
                    category: score.score_type.clone(),
                    max: self.max_impact_score,
                });
            }
        }
        Ok(())
    }

    /// Existence check with a typed failure
    fn require(&self, kind: EntityKind, id: &str) -> Result<()> {
        let found = match kind {
            EntityKind::Process => self.doc.processes.iter().any(|p| p.id == id),
            EntityKind::Asset => self.doc.assets.iter().any(|a| a.id == id),
            EntityKind::Threat => self.doc.threats.iter().any(|t| t.id == id),
            EntityKind::Container => self.doc.containers.iter().any(|c| c.id == id),
            EntityKind::Control => self
                .control_library
                .iter()
                .any(|c| c.control_id == id),
        };
        if found {
            Ok(())
        } else {
            Err(Error::EntityNotFound(id.to_string()))
        }
    }
}

fn to_values<T: Keyed + serde::Serialize>(items: Vec<&T>) -> Result<Vec<serde_json::Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

fn table_suffix_max<T: Keyed>(table: &[T]) -> u64 {
    table
        .iter()
        .filter_map(|e| id_suffix(e.key()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &std::path::Path) -> Store {
        let config = OpenismsConfig::default().with_data_dir(dir);
        std::fs::write(
            &config.control_library_file,
            r#"{"control_library": [
                {"control_id": "A.5.1", "control_name": "Information security policies"},
                {"control_id": "A.8.7", "control_name": "Protection against malware"}
            ]}"#,
        )
        .unwrap();
        Store::open(&config).unwrap()
    }

    fn seed_chain(store: &mut Store) -> (Process, Asset, Threat, Container) {
        let process = store
            .add_process(ProcessInput {
                name: "Payroll".into(),
                ..Default::default()
            })
            .unwrap();
        let asset = store
            .add_asset(
                &process.id,
                AssetInput {
                    name: "HR database".into(),
                    owner: "HR".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let threat = store
            .add_threat(
                &asset.id,
                ThreatInput {
                    threat_lib_reference: "Data leak".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let container = store
            .add_container(
                Some(threat.id.as_str()),
                ContainerInput {
                    name: "Access control".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        (process, asset, threat, container)
    }

    #[test]
    fn test_open_creates_seeded_document() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert_eq!(store.document().global_impact_details.len(), 6);
        assert!(dir.path().join("data.json").exists());
    }

    #[test]
    fn test_add_chain_creates_link_rows() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (process, asset, threat, container) = seed_chain(&mut store);

        assert_eq!(process.id, "process000001");
        assert_eq!(asset.id, "asset000001");
        assert_eq!(threat.id, "threat000001");
        assert_eq!(container.id, "container000001");

        // process→asset, asset→threat, threat→container
        assert_eq!(store.document().risktable.len(), 3);

        // New threats get a full impact-score list
        assert_eq!(threat.impact_scores.len(), 6);
        assert!(threat.impact_scores.iter().all(|s| s.score == "0"));
    }

    #[test]
    fn test_next_id_considers_risktable() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());

        store.doc.assets.push(Asset {
            id: "asset000003".into(),
            name: "a".into(),
            owner: String::new(),
            criticality_c: false,
            criticality_i: false,
            criticality_a: false,
        });
        store.doc.assets.push(Asset {
            id: "asset000007".into(),
            name: "b".into(),
            owner: String::new(),
            criticality_c: false,
            criticality_i: false,
            criticality_a: false,
        });
        // A dangling reference in the risktable still reserves the suffix
        store.doc.risktable.push(LinkRow {
            asset_id: Some("asset000010".into()),
            ..Default::default()
        });

        assert_eq!(store.next_id(EntityKind::Asset), "asset000011");
    }

    #[test]
    fn test_repair_pass_fills_missing_categories() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());

        store.doc.threats.push(Threat {
            id: "threat000001".into(),
            threat_lib_reference: "Fire".into(),
            impact_scores: vec![ImpactScore {
                score_type: "safety".into(),
                score: "2".into(),
            }],
            decision: String::new(),
            decision_comment: String::new(),
        });

        let added = store.repair_impact_scores();
        assert_eq!(added, 5);

        let threat = &store.doc.threats[0];
        assert_eq!(threat.impact_scores.len(), 6);
        // Existing entry untouched
        assert_eq!(threat.impact_scores[0].score, "2");
        assert!(threat.impact_scores[1..].iter().all(|s| s.score == "0"));

        // Idempotent
        assert_eq!(store.repair_impact_scores(), 0);
    }

    #[test]
    fn test_update_threat_rejects_unknown_category() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (_, _, threat, _) = seed_chain(&mut store);

        let patch = ThreatPatch {
            impact_scores: Some(vec![ImpactScore {
                score_type: "astrological".into(),
                score: "3".into(),
            }]),
            ..Default::default()
        };
        assert!(matches!(
            store.update_threat(&threat.id, patch),
            Err(Error::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_threat_scores_bounded_by_config() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (_, asset, threat, _) = seed_chain(&mut store);

        // Default ceiling is 3
        assert!(matches!(
            store.add_threat(
                &asset.id,
                ThreatInput {
                    threat_lib_reference: "Flood".into(),
                    impact_scores: vec![ImpactScore {
                        score_type: "safety".into(),
                        score: "4".into(),
                    }],
                },
            ),
            Err(Error::ScoreOutOfRange { max: 3, .. })
        ));

        // A score large enough to overflow the weighted sum is rejected
        // at the boundary, not multiplied
        let patch = ThreatPatch {
            impact_scores: Some(vec![ImpactScore {
                score_type: "safety".into(),
                score: "2000000000".into(),
            }]),
            ..Default::default()
        };
        assert!(matches!(
            store.update_threat(&threat.id, patch),
            Err(Error::ScoreOutOfRange { .. })
        ));

        // In-range patches still go through
        let ok = ThreatPatch {
            impact_scores: Some(vec![ImpactScore {
                score_type: "safety".into(),
                score: "3".into(),
            }]),
            ..Default::default()
        };
        let updated = store.update_threat(&threat.id, ok).unwrap();
        assert!(updated
            .impact_scores
            .iter()
            .any(|s| s.score_type == "safety" && s.score == "3"));
    }

    #[test]
    fn test_update_merges_only_posted_fields() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (process, ..) = seed_chain(&mut store);

        let updated = store
            .update_process(
                &process.id,
                ProcessPatch {
                    owner: Some("Finance".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Payroll");
        assert_eq!(updated.owner, "Finance");

        assert!(matches!(
            store.update_process("process999999", ProcessPatch::default()),
            Err(Error::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_cascade_delete_removes_dependent_entities() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (process, asset, threat, container) = seed_chain(&mut store);
        store.link_control(&container.id, "A.8.7").unwrap();

        // A second, independent process chain that must survive
        let survivor = store
            .add_process(ProcessInput {
                name: "Billing".into(),
                ..Default::default()
            })
            .unwrap();
        let survivor_asset = store
            .add_asset(
                &survivor.id,
                AssetInput {
                    name: "Invoice system".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let removed = store.delete_cascade(&process.id).unwrap();

        assert!(removed.contains(&process.id));
        assert!(removed.contains(&asset.id));
        assert!(removed.contains(&threat.id));
        assert!(removed.contains(&container.id));
        assert!(!removed.contains(&survivor.id));

        assert!(store.document().processes.iter().all(|p| p.id == survivor.id));
        assert!(store
            .document()
            .assets
            .iter()
            .all(|a| a.id == survivor_asset.id));
        assert!(store.document().threats.is_empty());
        // Only the surviving process→asset row remains
        assert_eq!(store.document().risktable.len(), 1);
    }

    #[test]
    fn test_cascade_rejects_container_roots() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (.., container) = seed_chain(&mut store);

        assert!(matches!(
            store.delete_cascade(&container.id),
            Err(Error::CascadeUnsupported(_))
        ));
    }

    #[test]
    fn test_unlink_is_edge_deletion() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (_, _, threat, container) = seed_chain(&mut store);
        store.link_control(&container.id, "A.5.1").unwrap();

        let removed = store.unlink(&threat.id, &container.id).unwrap();
        assert_eq!(removed, 1);
        // The container's control link survives
        assert!(store
            .document()
            .risktable
            .iter()
            .any(|r| r.contains(container.id.as_str()) && r.contains("A.5.1")));
    }

    #[test]
    fn test_fetch_entities_by_prefix_kind() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        seed_chain(&mut store);

        let mut ids = HashSet::new();
        ids.insert("asset000001".to_string());
        ids.insert("asset000001".to_string()); // set collapses the duplicate

        let got = store.fetch_entities(&ids).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["name"], "HR database");

        // Control ids resolve against the library
        let mut control_ids = HashSet::new();
        control_ids.insert("A.8.7".to_string());
        let controls = store.fetch_entities(&control_ids).unwrap();
        assert_eq!(controls[0]["control_name"], "Protection against malware");
    }

    #[test]
    fn test_duplicate_link_rejected_through_store() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let (_, _, _, container) = seed_chain(&mut store);

        store.link_control(&container.id, "A.5.1").unwrap();
        assert!(matches!(
            store.link_control(&container.id, "A.5.1"),
            Err(Error::DuplicateLink)
        ));
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let config = OpenismsConfig::default().with_data_dir(dir.path());

        {
            let mut store = test_store(dir.path());
            seed_chain(&mut store);
        }

        let reopened = Store::open(&config).unwrap();
        let stats = reopened.stats();
        assert_eq!(stats.processes, 1);
        assert_eq!(stats.assets, 1);
        assert_eq!(stats.threats, 1);
        assert_eq!(stats.link_rows, 3);
    }
}
