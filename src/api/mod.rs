//! HTTP API
//!
//! JSON endpoints over the assessment store: CRUD, join queries, reports,
//! and monitoring.

mod metrics;
mod routes;

pub use metrics::Metrics;
pub use routes::{run_api_server, ApiState};
