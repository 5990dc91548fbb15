//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! For SQLite, operations are wrapped in spawn_blocking since diesel-async
//! only supports Postgres/MySQL.

use diesel::prelude::*;

use crate::schema;

/// Scan record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scans)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScanRecord {
    pub id: String,
    pub repo_url: String,
    pub status: String,
    pub report_url: Option<String>,
    pub report_markdown: Option<String>,
    pub created_at: String,
}

/// New scan for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scans)]
pub struct NewScan<'a> {
    pub id: &'a str,
    pub repo_url: &'a str,
    pub status: &'a str,
    pub report_url: Option<&'a str>,
    pub report_markdown: Option<&'a str>,
    pub created_at: &'a str,
}

/// Scan-to-document link row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scan_documents)]
#[diesel(primary_key(scan_id, document_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScanDocumentRecord {
    pub scan_id: String,
    pub document_id: String,
}

/// New scan-to-document link for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scan_documents)]
pub struct NewScanDocument<'a> {
    pub scan_id: &'a str,
    pub document_id: &'a str,
}

/// Compliance item record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::compliance_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ComplianceItemRecord {
    pub id: String,
    pub document_id: String,
    pub item_text: String,
    pub item_type: String,
    pub section: Option<String>,
    pub page: Option<i32>,
}

/// New compliance item for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::compliance_items)]
pub struct NewComplianceItem<'a> {
    pub id: &'a str,
    pub document_id: &'a str,
    pub item_text: &'a str,
    pub item_type: &'a str,
    pub section: Option<&'a str>,
    pub page: Option<i32>,
}

/// Scan result record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scan_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScanResultRecord {
    pub id: String,
    pub scan_id: String,
    pub compliance_item_id: String,
    pub status: String,
    pub reasoning: Option<String>,
    pub evidence: Option<String>,
    pub worker_id: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<String>,
    pub updated_at: String,
}

/// New scan result for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scan_results)]
pub struct NewScanResult<'a> {
    pub id: &'a str,
    pub scan_id: &'a str,
    pub compliance_item_id: &'a str,
    pub status: &'a str,
    pub reasoning: Option<&'a str>,
    pub evidence: Option<&'a str>,
    pub worker_id: Option<&'a str>,
    pub claimed_by: Option<&'a str>,
    pub claimed_until: Option<&'a str>,
    pub updated_at: &'a str,
}

/// Evidence cache record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::evidence_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EvidenceCacheRecord {
    pub id: i32,
    pub artifact_id: String,
    pub fingerprint: String,
    pub evidence: String,
    pub created_at: String,
}

/// New evidence cache entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::evidence_cache)]
pub struct NewEvidenceCache<'a> {
    pub artifact_id: &'a str,
    pub fingerprint: &'a str,
    pub evidence: &'a str,
    pub created_at: &'a str,
}
