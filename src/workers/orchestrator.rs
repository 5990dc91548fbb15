//! Orchestrator worker: Scan QUEUED -> PROCESSING/FAILED.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::repository::{DieselComplianceRepository, DieselScanRepository};
use crate::models::ScanStatus;

const SCAN_BATCH: i64 = 10;

/// Fans queued scans out into one PENDING result row per compliance item.
#[derive(Clone)]
pub struct OrchestratorWorker {
    scans: DieselScanRepository,
    compliance: DieselComplianceRepository,
    poll_interval: Duration,
}

impl OrchestratorWorker {
    pub fn new(
        scans: DieselScanRepository,
        compliance: DieselComplianceRepository,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scans,
            compliance,
            poll_interval,
        }
    }

    /// One polling step. Returns the number of scans advanced.
    ///
    /// A scan with no documents or no compliance items is a data problem,
    /// not a transient failure: it is marked FAILED and never retried.
    /// Fan-out inserts are conflict-ignoring, so running over an already
    /// fanned-out scan never duplicates rows.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let queued = self.scans.list_queued(SCAN_BATCH).await?;
        if queued.is_empty() {
            return Ok(0);
        }

        let mut processed = 0;
        for scan in queued {
            info!("Processing scan {}", scan.id);

            let document_ids = self.scans.list_documents(&scan.id).await?;
            if document_ids.is_empty() {
                warn!("Scan {} has no documents; marking FAILED", scan.id);
                self.scans
                    .update_scan_status(&scan.id, ScanStatus::Failed, None, None)
                    .await?;
                processed += 1;
                continue;
            }

            let items = self.compliance.list_for_documents(&document_ids).await?;
            if items.is_empty() {
                warn!("Scan {} has no compliance items; marking FAILED", scan.id);
                self.scans
                    .update_scan_status(&scan.id, ScanStatus::Failed, None, None)
                    .await?;
                processed += 1;
                continue;
            }

            let item_ids: Vec<String> = items.into_iter().map(|item| item.id).collect();
            let inserted = self.scans.create_results(&scan.id, &item_ids).await?;
            info!("Inserted {} result rows for scan {}", inserted, scan.id);

            self.scans
                .update_scan_status(&scan.id, ScanStatus::Processing, None, None)
                .await?;
            processed += 1;
        }

        Ok(processed)
    }

    /// Poll until the process is terminated. Sleeps only when a batch comes
    /// back empty or an iteration fails.
    pub async fn run_loop(self) {
        info!("Orchestrator started");
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(count) => info!("Orchestrator advanced {} scans", count),
                Err(e) => {
                    error!("Orchestrator iteration failed: {:#}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
