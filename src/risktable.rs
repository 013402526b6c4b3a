//! Relational join engine over the risktable
//!
//! The risktable is a flat list of sparse link rows, each carrying 1-3
//! entity ids. Filtered entity lookups, association walks, threat
//! enrichment, and cascading deletion are all reconstructed from scans
//! over this list.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::scoring;
use crate::types::{
    Asset, Container, Control, EntityKind, ImpactCategory, Keyed, LinkRow, Threat,
};

/// Entities from `table` whose id is in `ids`.
///
/// Set semantics: duplicate requested ids collapse, nothing unrequested is
/// returned. An empty id set short-circuits without scanning the table.
pub fn fetch_by_ids<'a, T: Keyed>(table: &'a [T], ids: &HashSet<String>) -> Vec<&'a T> {
    if ids.is_empty() {
        return Vec::new();
    }
    table.iter().filter(|e| ids.contains(e.key())).collect()
}

/// Image of `from_ids` under link rows carrying both a `from_kind` and a
/// `to_kind` id. Rows lacking the to-kind field contribute nothing; each
/// target id appears once, in traversal order.
pub fn related_ids(
    rows: &[LinkRow],
    from_kind: EntityKind,
    from_ids: &HashSet<String>,
    to_kind: EntityKind,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        let Some(from) = row.get(from_kind) else {
            continue;
        };
        if !from_ids.contains(from) {
            continue;
        }
        if let Some(to) = row.get(to_kind) {
            if seen.insert(to.to_string()) {
                out.push(to.to_string());
            }
        }
    }

    out
}

/// Insert a link row after precondition and duplicate checks.
///
/// Duplicates are detected by full-row equality; a row differing in any
/// field is a distinct edge.
pub fn insert_link(rows: &mut Vec<LinkRow>, row: LinkRow) -> Result<()> {
    row.validate()?;
    if rows.contains(&row) {
        return Err(Error::DuplicateLink);
    }
    rows.push(row);
    Ok(())
}

// =============================================================================
// THREAT ENRICHMENT
// =============================================================================

/// A container resolved for display, with the controls linked through it
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnrichedContainer {
    pub id: String,
    pub name: String,
    pub description: String,
    pub controls: Vec<Control>,
}

/// A threat with its container/control hierarchy and owning asset resolved
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnrichedThreat {
    pub id: String,
    pub threat_lib_reference: String,
    pub impact_scores: Vec<crate::types::ImpactScore>,
    pub decision: String,
    pub decision_comment: String,
    /// Derived, recomputed on every read
    pub score_risk: String,
    pub containers: Vec<EnrichedContainer>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub asset_owner: Option<String>,
}

/// Resolve a threat's container → control hierarchy and owning asset.
///
/// Containers are deduplicated by id even when the underlying rows repeat
/// them across control links. The owning asset is the first asset id found
/// among the threat's rows.
#[allow(clippy::too_many_arguments)]
pub fn enrich_threat(
    threat: &Threat,
    rows: &[LinkRow],
    containers: &[Container],
    control_library: &[Control],
    assets: &[Asset],
    categories: &[ImpactCategory],
    divisor: f64,
) -> EnrichedThreat {
    let mut seen = HashSet::new();
    let mut enriched_containers = Vec::new();
    let mut owning_asset: Option<&Asset> = None;

    for row in rows {
        if row.get(EntityKind::Threat) != Some(threat.id.as_str()) {
            continue;
        }

        if owning_asset.is_none() {
            if let Some(asset_id) = row.get(EntityKind::Asset) {
                owning_asset = assets.iter().find(|a| a.id == asset_id);
            }
        }

        let Some(container_id) = row.get(EntityKind::Container) else {
            continue;
        };
        if !seen.insert(container_id.to_string()) {
            continue;
        }

        let (name, description) = containers
            .iter()
            .find(|c| c.id == container_id)
            .map(|c| (c.name.clone(), c.description.clone()))
            .unwrap_or_default();

        enriched_containers.push(EnrichedContainer {
            id: container_id.to_string(),
            name,
            description,
            controls: container_controls(rows, control_library, container_id),
        });
    }

    EnrichedThreat {
        id: threat.id.clone(),
        threat_lib_reference: threat.threat_lib_reference.clone(),
        impact_scores: threat.impact_scores.clone(),
        decision: threat.decision.clone(),
        decision_comment: threat.decision_comment.clone(),
        score_risk: scoring::risk_score(threat, categories, divisor),
        containers: enriched_containers,
        asset_id: owning_asset.map(|a| a.id.clone()),
        asset_name: owning_asset.map(|a| a.name.clone()),
        asset_owner: owning_asset.map(|a| a.owner.clone()),
    }
}

/// Controls reachable through rows sharing a container id, resolved against
/// the library. Unknown control ids are skipped.
pub fn container_controls(
    rows: &[LinkRow],
    control_library: &[Control],
    container_id: &str,
) -> Vec<Control> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        if row.get(EntityKind::Container) != Some(container_id) {
            continue;
        }
        let Some(control_id) = row.get(EntityKind::Control) else {
            continue;
        };
        if !seen.insert(control_id.to_string()) {
            continue;
        }
        if let Some(control) = control_library.iter().find(|c| c.control_id == control_id) {
            out.push(control.clone());
        }
    }

    out
}

// =============================================================================
// CASCADING DELETE
// =============================================================================

/// Transitive closure of ids reachable from `root_id` through link rows.
///
/// Rows are scanned in field precedence process_id, asset_id, threat_id:
/// a row whose field in one of these positions is already in the remove set
/// contributes every other id it carries. Iterates to a fixed point.
pub fn cascade_remove_set(rows: &[LinkRow], root_id: &str) -> HashSet<String> {
    let mut remove: HashSet<String> = HashSet::new();
    remove.insert(root_id.to_string());

    loop {
        let mut changed = false;

        for kind in [EntityKind::Process, EntityKind::Asset, EntityKind::Threat] {
            for row in rows {
                let Some(anchor) = row.get(kind) else {
                    continue;
                };
                if !remove.contains(anchor) {
                    continue;
                }
                for id in row.ids() {
                    if remove.insert(id.to_string()) {
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    remove
}

/// Drop every row containing any id from the remove set; returns the count
/// of rows removed
pub fn purge_rows(rows: &mut Vec<LinkRow>, remove: &HashSet<String>) -> usize {
    let before = rows.len();
    rows.retain(|row| !row.ids().any(|id| remove.contains(id)));
    before - rows.len()
}

/// Edge deletion: remove exactly the rows containing both `a` and `b`,
/// leaving rows containing only one of them intact. Returns the count of
/// rows removed.
pub fn delete_id_set(rows: &mut Vec<LinkRow>, a: &str, b: &str) -> usize {
    let before = rows.len();
    rows.retain(|row| !(row.contains(a) && row.contains(b)));
    before - rows.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImpactScore, Process};

    fn row(fields: &[(EntityKind, &str)]) -> LinkRow {
        let mut row = LinkRow::default();
        for (kind, id) in fields {
            row.set(*kind, id);
        }
        row
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn process(id: &str, name: &str) -> Process {
        Process {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            owner: String::new(),
        }
    }

    #[test]
    fn test_fetch_by_ids_set_semantics() {
        let table = vec![
            process("process000001", "Payroll"),
            process("process000002", "Onboarding"),
            process("process000003", "Billing"),
        ];

        // Only requested ids come back, requesting one twice changes nothing
        let got = fetch_by_ids(&table, &ids(&["process000001", "process000003"]));
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|p| p.id != "process000002"));

        let empty = fetch_by_ids(&table, &HashSet::new());
        assert!(empty.is_empty());

        let unknown = fetch_by_ids(&table, &ids(&["process999999"]));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_related_ids_is_image_under_rows() {
        let rows = vec![
            row(&[
                (EntityKind::Process, "process000001"),
                (EntityKind::Asset, "asset000001"),
            ]),
            row(&[
                (EntityKind::Process, "process000001"),
                (EntityKind::Asset, "asset000002"),
            ]),
            // Row without an asset field contributes nothing
            row(&[(EntityKind::Process, "process000001")]),
            // Different process, must not leak in
            row(&[
                (EntityKind::Process, "process000002"),
                (EntityKind::Asset, "asset000003"),
            ]),
        ];

        let got = related_ids(
            &rows,
            EntityKind::Process,
            &ids(&["process000001"]),
            EntityKind::Asset,
        );
        assert_eq!(got, vec!["asset000001", "asset000002"]);
    }

    #[test]
    fn test_related_ids_many_to_many() {
        // One asset linked to two threats, and one threat shared by two assets
        let rows = vec![
            row(&[
                (EntityKind::Asset, "asset000001"),
                (EntityKind::Threat, "threat000001"),
            ]),
            row(&[
                (EntityKind::Asset, "asset000001"),
                (EntityKind::Threat, "threat000002"),
            ]),
            row(&[
                (EntityKind::Asset, "asset000002"),
                (EntityKind::Threat, "threat000001"),
            ]),
        ];

        let got = related_ids(
            &rows,
            EntityKind::Asset,
            &ids(&["asset000001", "asset000002"]),
            EntityKind::Threat,
        );
        // Shared threat appears once
        assert_eq!(got, vec!["threat000001", "threat000002"]);
    }

    #[test]
    fn test_insert_link_rejects_duplicates() {
        let mut rows = Vec::new();
        let link = row(&[
            (EntityKind::Threat, "threat000001"),
            (EntityKind::Container, "container000001"),
        ]);

        insert_link(&mut rows, link.clone()).unwrap();
        assert!(matches!(
            insert_link(&mut rows, link),
            Err(Error::DuplicateLink)
        ));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_insert_link_enforces_field_bounds() {
        let mut rows = Vec::new();
        assert!(matches!(
            insert_link(&mut rows, LinkRow::default()),
            Err(Error::MalformedLinkRow(0))
        ));
    }

    #[test]
    fn test_enrich_threat_dedups_containers() {
        let threat = Threat {
            id: "threat000001".into(),
            threat_lib_reference: "Phishing".into(),
            impact_scores: vec![ImpactScore {
                score_type: "safety".into(),
                score: "3".into(),
            }],
            decision: String::new(),
            decision_comment: String::new(),
        };
        let containers = vec![Container {
            id: "container000001".into(),
            name: "Mail gateway".into(),
            description: "Perimeter mail filtering".into(),
        }];
        let library = vec![
            Control {
                control_id: "A.8.7".into(),
                control_name: "Protection against malware".into(),
            },
            Control {
                control_id: "A.8.23".into(),
                control_name: "Web filtering".into(),
            },
        ];
        let assets = vec![Asset {
            id: "asset000001".into(),
            name: "Mail server".into(),
            owner: "IT".into(),
            criticality_c: true,
            criticality_i: false,
            criticality_a: true,
        }];
        let categories = vec![ImpactCategory {
            category: "safety".into(),
            priority: 1,
        }];

        // The container appears in two rows (one per control link) plus the
        // threat-container row itself; it must come out once.
        let rows = vec![
            row(&[
                (EntityKind::Asset, "asset000001"),
                (EntityKind::Threat, "threat000001"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000001"),
                (EntityKind::Container, "container000001"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000001"),
                (EntityKind::Container, "container000001"),
                (EntityKind::Control, "A.8.7"),
            ]),
            row(&[
                (EntityKind::Container, "container000001"),
                (EntityKind::Control, "A.8.23"),
            ]),
        ];

        let enriched = enrich_threat(
            &threat,
            &rows,
            &containers,
            &library,
            &assets,
            &categories,
            45.0,
        );

        assert_eq!(enriched.containers.len(), 1);
        let container = &enriched.containers[0];
        assert_eq!(container.name, "Mail gateway");
        // Both controls resolve through rows sharing the container id
        let control_ids: Vec<_> = container.controls.iter().map(|c| &c.control_id).collect();
        assert_eq!(control_ids, vec!["A.8.7", "A.8.23"]);

        assert_eq!(enriched.asset_id.as_deref(), Some("asset000001"));
        assert_eq!(enriched.asset_name.as_deref(), Some("Mail server"));
        assert_eq!(enriched.asset_owner.as_deref(), Some("IT"));
        // 5 * 3 * 10 / 45
        assert_eq!(enriched.score_risk, "3.33");
    }

    #[test]
    fn test_cascade_stops_at_independent_subgraph() {
        // process1 → asset1 → threat1 → container1 → control A.5.1
        // process2 → asset2 → threat2 → container1 (container shared)
        let rows = vec![
            row(&[
                (EntityKind::Process, "process000001"),
                (EntityKind::Asset, "asset000001"),
            ]),
            row(&[
                (EntityKind::Asset, "asset000001"),
                (EntityKind::Threat, "threat000001"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000001"),
                (EntityKind::Container, "container000001"),
            ]),
            row(&[
                (EntityKind::Container, "container000001"),
                (EntityKind::Control, "A.5.1"),
            ]),
            row(&[
                (EntityKind::Process, "process000002"),
                (EntityKind::Asset, "asset000002"),
            ]),
            row(&[
                (EntityKind::Asset, "asset000002"),
                (EntityKind::Threat, "threat000002"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000002"),
                (EntityKind::Container, "container000001"),
            ]),
        ];

        let remove = cascade_remove_set(&rows, "process000001");

        assert!(remove.contains("process000001"));
        assert!(remove.contains("asset000001"));
        assert!(remove.contains("threat000001"));
        // The shared container is reachable from process1's threat rows
        assert!(remove.contains("container000001"));
        // Nothing from the surviving process's chain
        assert!(!remove.contains("process000002"));
        assert!(!remove.contains("asset000002"));
        assert!(!remove.contains("threat000002"));
    }

    #[test]
    fn test_cascade_purges_only_touched_rows() {
        let mut rows = vec![
            row(&[
                (EntityKind::Process, "process000001"),
                (EntityKind::Asset, "asset000001"),
            ]),
            row(&[
                (EntityKind::Asset, "asset000001"),
                (EntityKind::Threat, "threat000001"),
            ]),
            row(&[
                (EntityKind::Process, "process000002"),
                (EntityKind::Asset, "asset000002"),
            ]),
        ];

        let remove = cascade_remove_set(&rows, "process000001");
        let dropped = purge_rows(&mut rows, &remove);

        assert_eq!(dropped, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(EntityKind::Process), Some("process000002"));
    }

    #[test]
    fn test_delete_id_set_removes_exact_pairs() {
        let mut rows = vec![
            row(&[
                (EntityKind::Threat, "threat000001"),
                (EntityKind::Container, "container000001"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000001"),
                (EntityKind::Container, "container000002"),
            ]),
            row(&[
                (EntityKind::Threat, "threat000002"),
                (EntityKind::Container, "container000001"),
            ]),
        ];

        let removed = delete_id_set(&mut rows, "threat000001", "container000001");
        assert_eq!(removed, 1);
        assert_eq!(rows.len(), 2);
        // Rows carrying only one of the pair survive
        assert!(rows
            .iter()
            .any(|r| r.get(EntityKind::Container) == Some("container000002")));
        assert!(rows
            .iter()
            .any(|r| r.get(EntityKind::Threat) == Some("threat000002")));
    }
}
