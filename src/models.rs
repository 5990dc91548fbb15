//! Domain models for the scan pipeline.
//!
//! These are the store-backed types shared by the orchestrator, validator,
//! and reporter workers. Status enums round-trip through TEXT columns via
//! `as_str`/`from_str`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a scan as it moves through the worker pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Queued,
    Processing,
    ReportGenerating,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Queued => "QUEUED",
            ScanStatus::Processing => "PROCESSING",
            ScanStatus::ReportGenerating => "REPORT_GENERATING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(ScanStatus::Queued),
            "PROCESSING" => Some(ScanStatus::Processing),
            "REPORT_GENERATING" => Some(ScanStatus::ReportGenerating),
            "COMPLETED" => Some(ScanStatus::Completed),
            "FAILED" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are never advanced by a worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// One audit run over a repository against a set of compliance items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    pub repo_url: String,
    pub status: ScanStatus,
    pub report_url: Option<String>,
    pub report_markdown: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Scan {
    /// Create a new queued scan.
    pub fn new(repo_url: String) -> Self {
        Scan {
            id: Uuid::new_v4().to_string(),
            repo_url,
            status: ScanStatus::Queued,
            report_url: None,
            report_markdown: None,
            created_at: Utc::now(),
        }
    }
}

/// Verdict state of a single scan result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Pending,
    Pass,
    Fail,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "PENDING",
            ResultStatus::Pass => "PASS",
            ResultStatus::Fail => "FAIL",
            ResultStatus::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ResultStatus::Pending),
            "PASS" => Some(ResultStatus::Pass),
            "FAIL" => Some(ResultStatus::Fail),
            "ERROR" => Some(ResultStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Pending)
    }
}

/// One pending/resolved verdict for a compliance item within a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: String,
    pub scan_id: String,
    pub compliance_item_id: String,
    pub status: ResultStatus,
    pub reasoning: Option<String>,
    pub evidence: Option<String>,
    pub worker_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ScanResult {
    /// Create a pending result row for one (scan, compliance item) pair.
    pub fn new(scan_id: String, compliance_item_id: String) -> Self {
        ScanResult {
            id: Uuid::new_v4().to_string(),
            scan_id,
            compliance_item_id,
            status: ResultStatus::Pending,
            reasoning: None,
            evidence: None,
            worker_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// A requirement extracted from a source document. Written once by
/// ingestion, read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceItem {
    pub id: String,
    pub document_id: String,
    pub item_text: String,
    pub item_type: String,
    pub section: Option<String>,
    pub page: Option<i32>,
}

impl ComplianceItem {
    pub fn new(document_id: String, item_text: String, item_type: String) -> Self {
        ComplianceItem {
            id: Uuid::new_v4().to_string(),
            document_id,
            item_text,
            item_type,
            section: None,
            page: None,
        }
    }
}
