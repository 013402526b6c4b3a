//! Risk scoring
//!
//! A threat's risk is a weighted sum over the global impact categories.
//! Each category has a priority (1 = highest); its weight is `6 - priority`,
//! so priority 1 scores ×5 and priority 5 scores ×1. The raw sum is
//! normalized into 0-10 by a deployment-specific divisor and rendered as a
//! two-decimal string, or the sentinel when nothing scores.

use crate::types::{ImpactCategory, Threat};

/// Output when the computed risk is zero or below
pub const NO_RISK_SENTINEL: &str = "No risk calculated";

/// Highest priority value that still carries weight
pub const WEIGHT_BASE: u32 = 6;

/// Weight for a category priority: priority 1 → 5, priority 5 → 1,
/// priority 6 and beyond → 0
pub fn category_weight(priority: u32) -> u32 {
    WEIGHT_BASE.saturating_sub(priority)
}

/// Weighted raw score over the categories present in both the threat and
/// the global list. Categories missing on either side contribute nothing.
pub fn raw_score(threat: &Threat, categories: &[ImpactCategory]) -> u32 {
    // Saturating: the store bounds posted scores, but hand-edited documents
    // can carry arbitrary values
    categories
        .iter()
        .filter_map(|cat| {
            threat
                .impact_scores
                .iter()
                .find(|s| s.score_type == cat.category)
                .map(|s| category_weight(cat.priority).saturating_mul(s.value()))
        })
        .fold(0u32, u32::saturating_add)
}

/// Normalized risk score as a display string.
///
/// `raw × 10 / divisor`, two decimals; a raw score of 0 yields the sentinel
/// rather than "0.00".
pub fn risk_score(threat: &Threat, categories: &[ImpactCategory], divisor: f64) -> String {
    let raw = raw_score(threat, categories);
    let normalized = raw as f64 * 10.0 / divisor;
    if normalized <= 0.0 {
        NO_RISK_SENTINEL.to_string()
    } else {
        format!("{normalized:.2}")
    }
}
