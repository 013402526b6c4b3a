//! Rendering-ready report rows
//!
//! Each report joins the flat tables back into display rows. The HTTP layer
//! serializes these verbatim; template rendering is someone else's problem.

use serde::Serialize;
use std::collections::HashSet;

use crate::risktable::related_ids;
use crate::scoring;
use crate::store::Document;
use crate::types::{Control, Deliverable, EntityKind, ImpactScore};

/// One row of the threat assessment report: a (process, threat) pair
#[derive(Debug, Clone, Serialize)]
pub struct ThreatReportRow {
    pub process_name: String,
    pub threat_id: String,
    pub threat_name: String,
    pub affected_assets: Vec<String>,
    pub impact_scores: Vec<ImpactScore>,
    pub score_risk: String,
    pub decision: String,
}

/// One row of the SOA/controls report: a control in use within a process
#[derive(Debug, Clone, Serialize)]
pub struct ControlReportRow {
    pub process_name: String,
    pub control_id: String,
    pub control_name: String,
}

/// One row of the container report
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReportRow {
    pub process_name: String,
    pub container_name: String,
    pub description: String,
    pub assets: Vec<String>,
    pub threats: Vec<String>,
    pub controls: Vec<String>,
}

/// One row of the deliverables tracking report
#[derive(Debug, Clone, Serialize)]
pub struct DeliverableReportRow {
    pub name: String,
    pub description: String,
    pub maturity: String,
    pub target_maturity: String,
    pub controls: Vec<String>,
}

/// Asset ids belonging to a process, as a set for membership checks
fn process_assets(doc: &Document, process_id: &str) -> HashSet<String> {
    let from = HashSet::from([process_id.to_string()]);
    related_ids(&doc.risktable, EntityKind::Process, &from, EntityKind::Asset)
        .into_iter()
        .collect()
}

/// Threat ids reachable from a process through its assets
fn process_threats(doc: &Document, process_id: &str) -> Vec<String> {
    let assets = process_assets(doc, process_id);
    related_ids(&doc.risktable, EntityKind::Asset, &assets, EntityKind::Threat)
}

/// Threat assessment report: one row per (process, threat) pair, with the
/// risk score recomputed on read
pub fn threat_report(doc: &Document, divisor: f64) -> Vec<ThreatReportRow> {
    let mut rows = Vec::new();

    for process in &doc.processes {
        let asset_ids = process_assets(doc, &process.id);

        for threat_id in process_threats(doc, &process.id) {
            let Some(threat) = doc.threats.iter().find(|t| t.id == threat_id) else {
                continue;
            };

            // Assets of this process that link to this threat
            let threat_set = HashSet::from([threat.id.clone()]);
            let affected_assets: Vec<String> = related_ids(
                &doc.risktable,
                EntityKind::Threat,
                &threat_set,
                EntityKind::Asset,
            )
            .into_iter()
            .filter(|id| asset_ids.contains(id))
            .filter_map(|id| doc.assets.iter().find(|a| a.id == id))
            .map(|a| a.name.trim().to_string())
            .collect();

            rows.push(ThreatReportRow {
                process_name: process.name.clone(),
                threat_id: threat.id.clone(),
                threat_name: threat.threat_lib_reference.clone(),
                affected_assets,
                impact_scores: threat.impact_scores.clone(),
                score_risk: scoring::risk_score(threat, &doc.global_impact_details, divisor),
                decision: threat.decision.clone(),
            });
        }
    }

    rows
}

/// SOA/controls report: library controls referenced through at least one
/// container link within each process
pub fn control_report(doc: &Document, control_library: &[Control]) -> Vec<ControlReportRow> {
    let mut rows = Vec::new();

    for process in &doc.processes {
        let threats: HashSet<String> = process_threats(doc, &process.id).into_iter().collect();
        let containers: HashSet<String> = related_ids(
            &doc.risktable,
            EntityKind::Threat,
            &threats,
            EntityKind::Container,
        )
        .into_iter()
        .collect();
        let control_ids: HashSet<String> = related_ids(
            &doc.risktable,
            EntityKind::Container,
            &containers,
            EntityKind::Control,
        )
        .into_iter()
        .collect();

        // Walk the library so the report follows its ordering
        for control in control_library {
            if control_ids.contains(&control.control_id) {
                rows.push(ControlReportRow {
                    process_name: process.name.clone(),
                    control_id: control.control_id.clone(),
                    control_name: control.control_name.clone(),
                });
            }
        }
    }

    rows
}

/// Container report: per (process, container), the names of linked assets,
/// threats, and controls
pub fn container_report(doc: &Document, control_library: &[Control]) -> Vec<ContainerReportRow> {
    let mut rows = Vec::new();

    for process in &doc.processes {
        let threats: HashSet<String> = process_threats(doc, &process.id).into_iter().collect();

        for container in &doc.containers {
            let container_set = HashSet::from([container.id.clone()]);
            let linked_threats: Vec<String> = related_ids(
                &doc.risktable,
                EntityKind::Container,
                &container_set,
                EntityKind::Threat,
            )
            .into_iter()
            .filter(|id| threats.contains(id))
            .collect();

            if linked_threats.is_empty() {
                continue;
            }

            let threat_set: HashSet<String> = linked_threats.iter().cloned().collect();
            let asset_names: Vec<String> = related_ids(
                &doc.risktable,
                EntityKind::Threat,
                &threat_set,
                EntityKind::Asset,
            )
            .into_iter()
            .filter_map(|id| doc.assets.iter().find(|a| a.id == id))
            .map(|a| a.name.clone())
            .collect();

            let threat_names: Vec<String> = linked_threats
                .iter()
                .filter_map(|id| doc.threats.iter().find(|t| &t.id == id))
                .map(|t| t.threat_lib_reference.clone())
                .collect();

            let control_names: Vec<String> = related_ids(
                &doc.risktable,
                EntityKind::Container,
                &container_set,
                EntityKind::Control,
            )
            .into_iter()
            .filter_map(|id| control_library.iter().find(|c| c.control_id == id))
            .map(|c| format!("{} {}", c.control_id, c.control_name))
            .collect();

            rows.push(ContainerReportRow {
                process_name: process.name.clone(),
                container_name: container.name.clone(),
                description: container.description.clone(),
                assets: asset_names,
                threats: threat_names,
                controls: control_names,
            });
        }
    }

    rows
}

/// Deliverables tracking report, control ids resolved to display names
pub fn deliverable_report(
    deliverables: &[Deliverable],
    control_library: &[Control],
) -> Vec<DeliverableReportRow> {
    deliverables
        .iter()
        .map(|d| DeliverableReportRow {
            name: d.name.clone(),
            description: d.description.clone(),
            maturity: d.maturity.clone(),
            target_maturity: d.target_maturity.clone(),
            controls: d
                .control_ids
                .iter()
                .map(|id| {
                    control_library
                        .iter()
                        .find(|c| &c.control_id == id)
                        .map(|c| format!("{} {}", c.control_id, c.control_name))
                        .unwrap_or_else(|| id.clone())
                })
                .collect(),
        })
        .collect()
}
