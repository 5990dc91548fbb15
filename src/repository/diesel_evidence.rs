//! Diesel-based evidence cache for SQLite.
//!
//! Entries are addressed by (artifact_id, fingerprint); a changed artifact
//! gets a new fingerprint and therefore a miss, with the old entry left in
//! place. Saves overwrite on conflict.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use tracing::warn;

use super::diesel_models::{EvidenceCacheRecord, NewEvidenceCache};
use super::diesel_pool::{run_blocking, SqlitePool};
use crate::audit::evidence::{Evidence, EvidenceCache};
use crate::schema::evidence_cache;

/// Diesel-based evidence cache repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselEvidenceCacheRepository {
    pool: SqlitePool,
}

impl DieselEvidenceCacheRepository {
    /// Create a new Diesel evidence cache repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the cached evidence JSON for an (artifact, fingerprint) pair.
    pub async fn load_entry(
        &self,
        artifact_id: &str,
        fingerprint: &str,
    ) -> Result<Option<String>, diesel::result::Error> {
        let artifact_id = artifact_id.to_string();
        let fingerprint = fingerprint.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            evidence_cache::table
                .filter(evidence_cache::artifact_id.eq(&artifact_id))
                .filter(evidence_cache::fingerprint.eq(&fingerprint))
                .first::<EvidenceCacheRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(|record| record.evidence))
    }

    /// Store evidence JSON for an (artifact, fingerprint) pair, replacing
    /// any existing entry for the same pair.
    pub async fn save_entry(
        &self,
        artifact_id: &str,
        fingerprint: &str,
        evidence: &str,
    ) -> Result<(), diesel::result::Error> {
        let artifact_id = artifact_id.to_string();
        let fingerprint = fingerprint.to_string();
        let evidence = evidence.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let entry = NewEvidenceCache {
                artifact_id: &artifact_id,
                fingerprint: &fingerprint,
                evidence: &evidence,
                created_at: &now,
            };
            diesel::replace_into(evidence_cache::table)
                .values(&entry)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl EvidenceCache for DieselEvidenceCacheRepository {
    async fn load(&self, artifact_id: &str, fingerprint: &str) -> Option<Vec<Evidence>> {
        match self.load_entry(artifact_id, fingerprint).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(evidence) => Some(evidence),
                Err(e) => {
                    warn!("Discarding unreadable cache entry for {}: {}", artifact_id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Evidence cache load failed for {}: {}", artifact_id, e);
                None
            }
        }
    }

    async fn save(&self, artifact_id: &str, fingerprint: &str, evidence: &[Evidence]) {
        let json = match serde_json::to_string(evidence) {
            Ok(json) => json,
            Err(e) => {
                warn!("Evidence serialization failed for {}: {}", artifact_id, e);
                return;
            }
        };
        if let Err(e) = self.save_entry(artifact_id, fingerprint, &json).await {
            warn!("Evidence cache save failed for {}: {}", artifact_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::evidence::{extract_evidence, ExtractOptions};
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use crate::repository::migrations::run_migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&format!("{}", db_path.display())).unwrap();
        run_migrations(pool.clone()).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselEvidenceCacheRepository::new(pool);

        let evidence = extract_evidence(
            "main.rs",
            "let key = encryption_key();\n",
            &["encryption".to_string()],
            &ExtractOptions::default(),
        );
        assert!(!evidence.is_empty());

        repo.save("art-1", "fp-1", &evidence).await;
        let loaded = repo.load("art-1", "fp-1").await.unwrap();
        assert_eq!(loaded.len(), evidence.len());
        assert_eq!(loaded[0].id, evidence[0].id);
    }

    #[tokio::test]
    async fn test_changed_fingerprint_is_a_miss() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselEvidenceCacheRepository::new(pool);

        repo.save("art-1", "fp-old", &[]).await;
        assert!(repo.load("art-1", "fp-new").await.is_none());
        // Old entry stays addressable
        assert!(repo.load("art-1", "fp-old").await.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_same_pair() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselEvidenceCacheRepository::new(pool.clone());

        repo.save_entry("art-1", "fp-1", "[]").await.unwrap();
        repo.save_entry("art-1", "fp-1", "[]").await.unwrap();

        let count: i64 = run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            evidence_cache::table.select(count_star()).first(conn)
        })
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
