//! Schema bootstrap for the scan pipeline store.
//!
//! Workers call this on startup; every statement is idempotent so multiple
//! processes racing at boot is harmless.

use diesel::prelude::*;

use super::diesel_pool::{run_blocking, DieselError, SqlitePool};

const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS scans (
        id TEXT PRIMARY KEY,
        repo_url TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'QUEUED',
        report_url TEXT,
        report_markdown TEXT,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS scan_documents (
        scan_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        PRIMARY KEY (scan_id, document_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS compliance_items (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        item_text TEXT NOT NULL,
        item_type TEXT NOT NULL DEFAULT 'requirement',
        section TEXT,
        page INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS scan_results (
        id TEXT PRIMARY KEY,
        scan_id TEXT NOT NULL,
        compliance_item_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        reasoning TEXT,
        evidence TEXT,
        worker_id TEXT,
        claimed_by TEXT,
        claimed_until TEXT,
        updated_at TEXT NOT NULL,
        UNIQUE (scan_id, compliance_item_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS evidence_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_id TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        evidence TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (artifact_id, fingerprint)
    )"#,
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_scans_status ON scans (status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_scan_results_status ON scan_results (status, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_scan_results_scan ON scan_results (scan_id)",
    "CREATE INDEX IF NOT EXISTS idx_compliance_items_document ON compliance_items (document_id)",
];

/// Create all tables and indexes if they do not exist.
pub async fn run_migrations(pool: SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool, |conn| {
        for statement in CREATE_TABLES.iter().chain(CREATE_INDEXES) {
            diesel::sql_query(*statement).execute(conn)?;
        }
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&format!("{}", db_path.display())).unwrap();

        run_migrations(pool.clone()).await.unwrap();
        run_migrations(pool.clone()).await.unwrap();

        // Tables exist after bootstrap
        let count: i64 = run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            crate::schema::scans::table.select(count_star()).first(conn)
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
