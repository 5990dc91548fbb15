//! Diesel-based task store for scans and their result rows.
//!
//! This is the coordination point for every worker role. Operations are
//! short, independent reads/writes; the only cross-worker discipline is the
//! conditional claim on pending rows (see `claim_result`).

use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use std::time::Duration;
use uuid::Uuid;

use super::diesel_models::{NewScan, NewScanDocument, NewScanResult, ScanRecord, ScanResultRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::parse_datetime;
use crate::models::{ResultStatus, Scan, ScanResult, ScanStatus};
use crate::schema::{scan_documents, scan_results, scans};

impl From<ScanRecord> for Scan {
    fn from(record: ScanRecord) -> Self {
        Scan {
            id: record.id,
            repo_url: record.repo_url,
            // Unknown status text means a corrupt row; treat as terminal so
            // no worker picks it up.
            status: ScanStatus::from_str(&record.status).unwrap_or(ScanStatus::Failed),
            report_url: record.report_url,
            report_markdown: record.report_markdown,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

impl From<ScanResultRecord> for ScanResult {
    fn from(record: ScanResultRecord) -> Self {
        ScanResult {
            id: record.id,
            scan_id: record.scan_id,
            compliance_item_id: record.compliance_item_id,
            status: ResultStatus::from_str(&record.status).unwrap_or(ResultStatus::Error),
            reasoning: record.reasoning,
            evidence: record.evidence,
            worker_id: record.worker_id,
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Diesel-based scan repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselScanRepository {
    pool: SqlitePool,
}

impl DieselScanRepository {
    /// Create a new Diesel scan repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueue a new scan with its immutable document links.
    pub async fn create_scan(
        &self,
        repo_url: &str,
        document_ids: &[String],
    ) -> Result<Scan, diesel::result::Error> {
        let scan = Scan::new(repo_url.to_string());
        let scan_clone = scan.clone();
        let created_at = scan.created_at.to_rfc3339();
        let documents = document_ids.to_vec();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction(|conn| {
                let new_scan = NewScan {
                    id: &scan_clone.id,
                    repo_url: &scan_clone.repo_url,
                    status: scan_clone.status.as_str(),
                    report_url: None,
                    report_markdown: None,
                    created_at: &created_at,
                };
                diesel::insert_into(scans::table)
                    .values(&new_scan)
                    .execute(conn)?;

                let links: Vec<NewScanDocument> = documents
                    .iter()
                    .map(|doc_id| NewScanDocument {
                        scan_id: &scan_clone.id,
                        document_id: doc_id,
                    })
                    .collect();
                if !links.is_empty() {
                    diesel::insert_or_ignore_into(scan_documents::table)
                        .values(&links)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await?;

        Ok(scan)
    }

    /// Get a scan by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Scan>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scans::table.find(&id).first::<ScanRecord>(conn).optional()
        })
        .await
        .map(|opt| opt.map(Scan::from))
    }

    /// List queued scans, oldest first.
    pub async fn list_queued(&self, limit: i64) -> Result<Vec<Scan>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scans::table
                .filter(scans::status.eq(ScanStatus::Queued.as_str()))
                .order(scans::created_at.asc())
                .limit(limit)
                .load::<ScanRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Scan::from).collect())
    }

    /// List scans currently in any of the given statuses, oldest first.
    pub async fn list_active(
        &self,
        statuses: &[ScanStatus],
    ) -> Result<Vec<Scan>, diesel::result::Error> {
        let status_strs: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scans::table
                .filter(scans::status.eq_any(&status_strs))
                .order(scans::created_at.asc())
                .load::<ScanRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Scan::from).collect())
    }

    /// Update a scan's status, optionally attaching report fields.
    pub async fn update_scan_status(
        &self,
        id: &str,
        status: ScanStatus,
        report_url: Option<&str>,
        report_markdown: Option<&str>,
    ) -> Result<(), diesel::result::Error> {
        let id = id.to_string();
        let status = status.as_str();
        let report_url = report_url.map(|s| s.to_string());
        let report_markdown = report_markdown.map(|s| s.to_string());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::update(scans::table.find(&id))
                .set(scans::status.eq(status))
                .execute(conn)?;
            if let Some(ref url) = report_url {
                diesel::update(scans::table.find(&id))
                    .set(scans::report_url.eq(url))
                    .execute(conn)?;
            }
            if let Some(ref markdown) = report_markdown {
                diesel::update(scans::table.find(&id))
                    .set(scans::report_markdown.eq(markdown))
                    .execute(conn)?;
            }
            Ok(())
        })
        .await
    }

    /// Document IDs linked to a scan.
    pub async fn list_documents(&self, scan_id: &str) -> Result<Vec<String>, diesel::result::Error> {
        let scan_id = scan_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scan_documents::table
                .filter(scan_documents::scan_id.eq(&scan_id))
                .select(scan_documents::document_id)
                .order(scan_documents::document_id.asc())
                .load::<String>(conn)
        })
        .await
    }

    /// Fan a scan out into one PENDING result per compliance item.
    ///
    /// Returns the number of rows actually inserted. Empty input is a no-op.
    /// The unique (scan_id, compliance_item_id) index makes repeated fan-out
    /// insert nothing new.
    pub async fn create_results(
        &self,
        scan_id: &str,
        item_ids: &[String],
    ) -> Result<usize, diesel::result::Error> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let scan_id = scan_id.to_string();
        let items = item_ids.to_vec();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let ids: Vec<String> = items.iter().map(|_| Uuid::new_v4().to_string()).collect();
            let rows: Vec<NewScanResult> = items
                .iter()
                .zip(ids.iter())
                .map(|(item_id, id)| NewScanResult {
                    id,
                    scan_id: &scan_id,
                    compliance_item_id: item_id,
                    status: ResultStatus::Pending.as_str(),
                    reasoning: None,
                    evidence: None,
                    worker_id: None,
                    claimed_by: None,
                    claimed_until: None,
                    updated_at: &now,
                })
                .collect();

            diesel::insert_or_ignore_into(scan_results::table)
                .values(&rows)
                .execute(conn)
        })
        .await
    }

    /// List PENDING results not under a live claim, oldest update first.
    pub async fn list_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<ScanResult>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            scan_results::table
                .filter(scan_results::status.eq(ResultStatus::Pending.as_str()))
                .filter(
                    scan_results::claimed_until
                        .is_null()
                        .or(scan_results::claimed_until.lt(&now)),
                )
                .order(scan_results::updated_at.asc())
                .limit(limit)
                .load::<ScanResultRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(ScanResult::from).collect())
    }

    /// Atomically claim a PENDING result for one worker.
    ///
    /// The update only matches while the row is still PENDING and any prior
    /// lease has expired, so exactly one of several racing workers wins.
    /// Returns true when this worker got the claim.
    pub async fn claim_result(
        &self,
        result_id: &str,
        worker_id: &str,
        lease: Duration,
    ) -> Result<bool, diesel::result::Error> {
        let result_id = result_id.to_string();
        let worker_id = worker_id.to_string();
        let lease = ChronoDuration::seconds(lease.as_secs() as i64);
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now();
            let now_str = now.to_rfc3339();
            let until = (now + lease).to_rfc3339();

            let rows = diesel::update(
                scan_results::table
                    .filter(scan_results::id.eq(&result_id))
                    .filter(scan_results::status.eq(ResultStatus::Pending.as_str()))
                    .filter(
                        scan_results::claimed_until
                            .is_null()
                            .or(scan_results::claimed_until.lt(&now_str)),
                    ),
            )
            .set((
                scan_results::claimed_by.eq(&worker_id),
                scan_results::claimed_until.eq(&until),
                scan_results::updated_at.eq(&now_str),
            ))
            .execute(conn)?;

            Ok(rows == 1)
        })
        .await
    }

    /// Write a result's verdict. Unconditional overwrite; clears any lease.
    pub async fn update_result(
        &self,
        result_id: &str,
        status: ResultStatus,
        reasoning: Option<&str>,
        evidence: Option<&str>,
        worker_id: &str,
    ) -> Result<(), diesel::result::Error> {
        let result_id = result_id.to_string();
        let status = status.as_str();
        let reasoning = reasoning.map(|s| s.to_string());
        let evidence = evidence.map(|s| s.to_string());
        let worker_id = worker_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            diesel::update(scan_results::table.find(&result_id))
                .set((
                    scan_results::status.eq(status),
                    scan_results::reasoning.eq(reasoning.as_deref()),
                    scan_results::evidence.eq(evidence.as_deref()),
                    scan_results::worker_id.eq(&worker_id),
                    scan_results::claimed_by.eq(None::<String>),
                    scan_results::claimed_until.eq(None::<String>),
                    scan_results::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Count PENDING results for a scan, claimed or not.
    pub async fn count_pending(&self, scan_id: &str) -> Result<i64, diesel::result::Error> {
        let scan_id = scan_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            scan_results::table
                .filter(scan_results::scan_id.eq(&scan_id))
                .filter(scan_results::status.eq(ResultStatus::Pending.as_str()))
                .select(count_star())
                .first(conn)
        })
        .await
    }

    /// Get one result row by ID.
    pub async fn get_result(
        &self,
        result_id: &str,
    ) -> Result<Option<ScanResult>, diesel::result::Error> {
        let result_id = result_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scan_results::table
                .find(&result_id)
                .first::<ScanResultRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(ScanResult::from))
    }

    /// All result rows for a scan, oldest update first.
    pub async fn list_results(
        &self,
        scan_id: &str,
    ) -> Result<Vec<ScanResult>, diesel::result::Error> {
        let scan_id = scan_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scan_results::table
                .filter(scan_results::scan_id.eq(&scan_id))
                .order(scan_results::updated_at.asc())
                .load::<ScanResultRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(ScanResult::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use crate::repository::migrations::run_migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db_url = format!("{}", db_path.display());

        let pool = create_diesel_pool_from_url(&db_url).unwrap();
        run_migrations(pool.clone()).await.unwrap();

        (pool, dir)
    }

    #[tokio::test]
    async fn test_create_and_list_queued() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo
            .create_scan("https://example.com/repo.git", &["doc-1".to_string()])
            .await
            .unwrap();
        assert_eq!(scan.status, ScanStatus::Queued);

        let queued = repo.list_queued(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, scan.id);

        let documents = repo.list_documents(&scan.id).await.unwrap();
        assert_eq!(documents, vec!["doc-1".to_string()]);
    }

    #[tokio::test]
    async fn test_fan_out_is_idempotent() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        let items = vec!["item-1".to_string(), "item-2".to_string()];

        let first = repo.create_results(&scan.id, &items).await.unwrap();
        assert_eq!(first, 2);

        let second = repo.create_results(&scan.id, &items).await.unwrap();
        assert_eq!(second, 0);

        let results = repo.list_results(&scan.id).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_create_results_empty_is_noop() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        let count = repo.create_results(&scan.id, &[]).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        repo.create_results(&scan.id, &["item-1".to_string()])
            .await
            .unwrap();
        let pending = repo.list_pending(10).await.unwrap();
        let result_id = pending[0].id.clone();

        let lease = Duration::from_secs(300);
        assert!(repo.claim_result(&result_id, "worker-a", lease).await.unwrap());
        assert!(!repo.claim_result(&result_id, "worker-b", lease).await.unwrap());

        // Claimed rows disappear from the pending listing
        let pending = repo.list_pending(10).await.unwrap();
        assert!(pending.is_empty());

        // But still count toward finalization gating
        assert_eq!(repo.count_pending(&scan.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        repo.create_results(&scan.id, &["item-1".to_string()])
            .await
            .unwrap();
        let pending = repo.list_pending(10).await.unwrap();
        let result_id = pending[0].id.clone();

        assert!(repo
            .claim_result(&result_id, "worker-a", Duration::from_secs(0))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Lease has expired, another worker may take over
        assert!(repo
            .claim_result(&result_id, "worker-b", Duration::from_secs(300))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_result_is_terminal_overwrite() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        repo.create_results(&scan.id, &["item-1".to_string()])
            .await
            .unwrap();
        let result_id = repo.list_pending(10).await.unwrap()[0].id.clone();

        repo.claim_result(&result_id, "worker-a", Duration::from_secs(300))
            .await
            .unwrap();
        repo.update_result(&result_id, ResultStatus::Pass, Some("ok"), None, "worker-a")
            .await
            .unwrap();

        let row = repo.get_result(&result_id).await.unwrap().unwrap();
        assert_eq!(row.status, ResultStatus::Pass);
        assert_eq!(row.worker_id.as_deref(), Some("worker-a"));
        assert_eq!(repo.count_pending(&scan.id).await.unwrap(), 0);

        // A late overwrite replaces fields but the row count stays the same
        repo.update_result(&result_id, ResultStatus::Fail, Some("late"), None, "worker-b")
            .await
            .unwrap();
        let row = repo.get_result(&result_id).await.unwrap().unwrap();
        assert_eq!(row.status, ResultStatus::Fail);
        assert_eq!(repo.list_results(&scan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_status_update_with_report() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let scan = repo.create_scan("https://example.com/r.git", &[]).await.unwrap();
        repo.update_scan_status(&scan.id, ScanStatus::Processing, None, None)
            .await
            .unwrap();
        let fetched = repo.get(&scan.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Processing);
        assert!(fetched.report_url.is_none());

        repo.update_scan_status(
            &scan.id,
            ScanStatus::Completed,
            Some("reports/scan-1.md"),
            Some("# Report"),
        )
        .await
        .unwrap();
        let fetched = repo.get(&scan.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Completed);
        assert_eq!(fetched.report_url.as_deref(), Some("reports/scan-1.md"));
        assert_eq!(fetched.report_markdown.as_deref(), Some("# Report"));
    }

    #[tokio::test]
    async fn test_list_active_filters_statuses() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScanRepository::new(pool);

        let a = repo.create_scan("https://example.com/a.git", &[]).await.unwrap();
        let b = repo.create_scan("https://example.com/b.git", &[]).await.unwrap();
        repo.update_scan_status(&a.id, ScanStatus::Processing, None, None)
            .await
            .unwrap();
        repo.update_scan_status(&b.id, ScanStatus::Completed, None, None)
            .await
            .unwrap();

        let active = repo
            .list_active(&[ScanStatus::Processing, ScanStatus::ReportGenerating])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }
}
