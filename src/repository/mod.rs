//! Store-backed persistence for the scan pipeline.
//!
//! SQLite via sync Diesel + r2d2, bridged into async with spawn_blocking.
//! One repository struct per aggregate; all coordination between worker
//! processes happens through these tables.

pub mod diesel_compliance;
pub mod diesel_evidence;
pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_scan;
pub mod migrations;

pub use diesel_compliance::DieselComplianceRepository;
pub use diesel_evidence::DieselEvidenceCacheRepository;
pub use diesel_pool::{create_diesel_pool_from_url, run_blocking, DieselError, SqlitePool};
pub use diesel_scan::DieselScanRepository;

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp column, falling back to now on bad data.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
