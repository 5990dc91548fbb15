//! Validator worker: drains PENDING result rows through the evaluator.
//!
//! Many validator instances run this loop concurrently against one store.
//! Each row is claimed with an atomic conditional lease before processing,
//! so exactly one of several racing workers wins it; an expired lease
//! makes the row visible again if a worker dies mid-item.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::evaluator::{Evaluator, Verdict};
use crate::models::{ComplianceItem, ResultStatus, Scan, ScanResult};
use crate::report::truncate_evidence;
use crate::repository::{DieselComplianceRepository, DieselScanRepository};
use crate::retry::{retry_with_backoff, RetryConfig};

const RESULT_BATCH: i64 = 5;

/// Resolves pending scan results into terminal verdicts.
#[derive(Clone)]
pub struct ValidatorWorker {
    scans: DieselScanRepository,
    compliance: DieselComplianceRepository,
    evaluator: Arc<dyn Evaluator>,
    retry: RetryConfig,
    worker_id: String,
    lease: Duration,
    poll_interval: Duration,
    max_evidence_chars: usize,
}

impl ValidatorWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scans: DieselScanRepository,
        compliance: DieselComplianceRepository,
        evaluator: Arc<dyn Evaluator>,
        retry: RetryConfig,
        worker_id: String,
        lease: Duration,
        poll_interval: Duration,
        max_evidence_chars: usize,
    ) -> Self {
        Self {
            scans,
            compliance,
            evaluator,
            retry,
            worker_id,
            lease,
            poll_interval,
            max_evidence_chars,
        }
    }

    /// One polling step. Returns the number of rows resolved by this worker.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let pending = self.scans.list_pending(RESULT_BATCH).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut processed = 0;
        for result in pending {
            let claimed = self
                .scans
                .claim_result(&result.id, &self.worker_id, self.lease)
                .await?;
            if !claimed {
                debug!("Result {} claimed by another worker", result.id);
                continue;
            }

            self.process_result(&result).await?;
            processed += 1;
        }

        Ok(processed)
    }

    /// Resolve one claimed row. Referential problems are terminal ERRORs
    /// written immediately; evaluator failures go through retry first.
    async fn process_result(&self, result: &ScanResult) -> anyhow::Result<()> {
        let scan = match self.scans.get(&result.scan_id).await? {
            Some(scan) => scan,
            None => {
                return self
                    .write_error(result, "Scan not found.")
                    .await;
            }
        };
        if scan.repo_url.is_empty() {
            return self.write_error(result, "Scan repo_url is empty.").await;
        }

        let item = match self.compliance.get(&result.compliance_item_id).await? {
            Some(item) => item,
            None => {
                return self
                    .write_error(result, "Compliance item not found.")
                    .await;
            }
        };

        let context = build_artifact_context(&scan, &item);
        let label = format!("evaluator for result {}", result.id);
        let outcome = retry_with_backoff(&self.retry, &label, || {
            self.evaluator.evaluate(&context, &item.item_text)
        })
        .await;

        match outcome {
            Ok(evaluation) => {
                let status = match evaluation.status {
                    Verdict::Pass => ResultStatus::Pass,
                    Verdict::Fail => ResultStatus::Fail,
                    Verdict::Error => ResultStatus::Error,
                };
                let evidence = if evaluation.evidence.is_empty() {
                    None
                } else {
                    Some(truncate_evidence(
                        &evaluation.evidence.join("\n"),
                        self.max_evidence_chars,
                    ))
                };
                info!(
                    "Result {} resolved {} by {}",
                    result.id,
                    status.as_str(),
                    self.worker_id
                );
                self.scans
                    .update_result(
                        &result.id,
                        status,
                        Some(&evaluation.reasoning),
                        evidence.as_deref(),
                        &self.worker_id,
                    )
                    .await?;
            }
            Err(e) => {
                let reasoning = format!("Evaluator failed after retries: {}", e);
                error!("Result {}: {}", result.id, reasoning);
                self.scans
                    .update_result(
                        &result.id,
                        ResultStatus::Error,
                        Some(&reasoning),
                        None,
                        &self.worker_id,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn write_error(&self, result: &ScanResult, reasoning: &str) -> anyhow::Result<()> {
        error!("Result {}: {}", result.id, reasoning);
        self.scans
            .update_result(
                &result.id,
                ResultStatus::Error,
                Some(reasoning),
                None,
                &self.worker_id,
            )
            .await?;
        Ok(())
    }

    /// Poll until the process is terminated.
    pub async fn run_loop(self) {
        info!("Validator {} started", self.worker_id);
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(count) => debug!("Validator {} resolved {} results", self.worker_id, count),
                Err(e) => {
                    error!("Validator {} iteration failed: {:#}", self.worker_id, e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

/// Context handed to the evaluator. Repository fetching is an external
/// concern; the judgment service resolves the repo from its URL.
fn build_artifact_context(scan: &Scan, item: &ComplianceItem) -> String {
    let mut context = format!("Repository under audit: {}", scan.repo_url);
    context.push_str(&format!("\nSource document: {}", item.document_id));
    if let Some(section) = &item.section {
        context.push_str(&format!("\nRequirement section: {}", section));
    }
    if let Some(page) = item.page {
        context.push_str(&format!("\nRequirement page: {}", page));
    }
    context.push_str(&format!("\nRequirement type: {}", item.item_type));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::ScanStatus;

    #[test]
    fn test_context_includes_repo_and_section() {
        let scan = Scan {
            id: "s-1".to_string(),
            repo_url: "https://example.com/r.git".to_string(),
            status: ScanStatus::Processing,
            report_url: None,
            report_markdown: None,
            created_at: Utc::now(),
        };
        let item = ComplianceItem {
            id: "i-1".to_string(),
            document_id: "doc-1".to_string(),
            item_text: "Encrypt data at rest".to_string(),
            item_type: "requirement".to_string(),
            section: Some("3.2".to_string()),
            page: Some(12),
        };

        let context = build_artifact_context(&scan, &item);
        assert!(context.contains("https://example.com/r.git"));
        assert!(context.contains("section: 3.2"));
        assert!(context.contains("page: 12"));
    }
}
