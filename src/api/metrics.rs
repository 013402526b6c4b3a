//! Metrics Collection
//!
//! Counts the service's request traffic for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the openisms service
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Total HTTP requests handled
    pub requests: AtomicU64,

    /// Mutating operations (add/update/delete/link)
    pub mutations: AtomicU64,

    /// Cascade deletes performed
    pub cascade_deletes: AtomicU64,

    /// Report renders served
    pub reports_served: AtomicU64,

    /// Rejected requests (precondition or lookup failures)
    pub rejected_requests: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_mutations(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cascade_deletes(&self) {
        self.cascade_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reports_served(&self) {
        self.reports_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP openisms_uptime_seconds Service uptime in seconds\n\
             # TYPE openisms_uptime_seconds gauge\n\
             openisms_uptime_seconds {}\n\n",
            self.uptime_secs()
        ));

        output.push_str(&format!(
            "# HELP openisms_requests_total Total HTTP requests handled\n\
             # TYPE openisms_requests_total counter\n\
             openisms_requests_total {}\n\n",
            self.requests.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP openisms_mutations_total Mutating operations committed\n\
             # TYPE openisms_mutations_total counter\n\
             openisms_mutations_total {}\n\n",
            self.mutations.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP openisms_cascade_deletes_total Cascade deletes performed\n\
             # TYPE openisms_cascade_deletes_total counter\n\
             openisms_cascade_deletes_total {}\n\n",
            self.cascade_deletes.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP openisms_reports_served_total Report renders served\n\
             # TYPE openisms_reports_served_total counter\n\
             openisms_reports_served_total {}\n\n",
            self.reports_served.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP openisms_rejected_requests_total Requests rejected with a client error\n\
             # TYPE openisms_rejected_requests_total counter\n\
             openisms_rejected_requests_total {}\n\n",
            self.rejected_requests.load(Ordering::Relaxed)
        ));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "requests": self.requests.load(Ordering::Relaxed),
            "mutations": self.mutations.load(Ordering::Relaxed),
            "cascade_deletes": self.cascade_deletes.load(Ordering::Relaxed),
            "reports_served": self.reports_served.load(Ordering::Relaxed),
            "rejected_requests": self.rejected_requests.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.inc_requests();
        metrics.inc_requests();
        metrics.inc_mutations();

        assert_eq!(metrics.requests.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.mutations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.inc_requests();
        metrics.inc_cascade_deletes();

        let output = metrics.to_prometheus();

        assert!(output.contains("openisms_requests_total 1"));
        assert!(output.contains("openisms_cascade_deletes_total 1"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.inc_reports_served();

        let json = metrics.to_json();

        assert_eq!(json["reports_served"], 1);
    }
}
