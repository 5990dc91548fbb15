//! Reporter worker: finalizes scans whose results are all resolved.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::{Scan, ScanStatus};
use crate::report::render_report;
use crate::repository::DieselScanRepository;

/// Turns fully-resolved scans into markdown reports.
#[derive(Clone)]
pub struct ReporterWorker {
    scans: DieselScanRepository,
    report_dir: PathBuf,
    poll_interval: Duration,
    max_evidence_chars: usize,
}

impl ReporterWorker {
    pub fn new(
        scans: DieselScanRepository,
        report_dir: PathBuf,
        poll_interval: Duration,
        max_evidence_chars: usize,
    ) -> Self {
        Self {
            scans,
            report_dir,
            poll_interval,
            max_evidence_chars,
        }
    }

    /// One polling step. Returns the number of scans finalized.
    ///
    /// A PROCESSING scan advances only once its PENDING count reaches
    /// zero, claimed rows included, so a report is never generated while
    /// any validator still holds a live lease on one of its rows.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let active = self
            .scans
            .list_active(&[ScanStatus::Processing, ScanStatus::ReportGenerating])
            .await?;
        if active.is_empty() {
            return Ok(0);
        }

        let mut finalized = 0;
        for scan in active {
            if scan.status == ScanStatus::Processing {
                let pending = self.scans.count_pending(&scan.id).await?;
                if pending > 0 {
                    debug!("Scan {} has {} pending results", scan.id, pending);
                    continue;
                }
                self.scans
                    .update_scan_status(&scan.id, ScanStatus::ReportGenerating, None, None)
                    .await?;
            }

            self.finalize_scan(&scan).await?;
            finalized += 1;
        }

        Ok(finalized)
    }

    /// Render and persist the report, then mark the scan COMPLETED.
    ///
    /// File-write failure degrades to a markdown-only completion rather
    /// than wedging the scan in REPORT_GENERATING. If the completing
    /// status write itself fails with the markdown attached, a second
    /// attempt without it goes through before the error propagates.
    async fn finalize_scan(&self, scan: &Scan) -> anyhow::Result<()> {
        let results = self.scans.list_results(&scan.id).await?;
        let markdown = render_report(scan, &results, self.max_evidence_chars);

        let report_url = match self.write_report_file(&scan.id, &markdown).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    "Report file write failed for scan {}; completing with markdown only: {}",
                    scan.id, e
                );
                None
            }
        };

        let completed = self
            .scans
            .update_scan_status(
                &scan.id,
                ScanStatus::Completed,
                report_url.as_deref(),
                Some(&markdown),
            )
            .await;

        if let Err(e) = completed {
            warn!(
                "Completion write with markdown failed for scan {}; retrying without body: {}",
                scan.id, e
            );
            self.scans
                .update_scan_status(&scan.id, ScanStatus::Completed, report_url.as_deref(), None)
                .await?;
        }

        info!(
            "Scan {} completed ({} results, report {})",
            scan.id,
            results.len(),
            report_url.as_deref().unwrap_or("inline only"),
        );
        Ok(())
    }

    async fn write_report_file(&self, scan_id: &str, markdown: &str) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.report_dir).await?;
        let path = self.report_dir.join(format!("scan-{}.md", scan_id));
        tokio::fs::write(&path, markdown).await?;
        Ok(path.display().to_string())
    }

    /// Poll until the process is terminated.
    pub async fn run_loop(self) {
        info!("Reporter started (reports in {})", self.report_dir.display());
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(count) => info!("Reporter finalized {} scans", count),
                Err(e) => {
                    error!("Reporter iteration failed: {:#}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
