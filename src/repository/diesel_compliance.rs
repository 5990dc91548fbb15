//! Diesel-based compliance item repository for SQLite.
//!
//! Items are written once by ingestion and read-only to the workers.

use diesel::prelude::*;

use super::diesel_models::{ComplianceItemRecord, NewComplianceItem};
use super::diesel_pool::{run_blocking, SqlitePool};
use crate::models::ComplianceItem;
use crate::schema::compliance_items;

impl From<ComplianceItemRecord> for ComplianceItem {
    fn from(record: ComplianceItemRecord) -> Self {
        ComplianceItem {
            id: record.id,
            document_id: record.document_id,
            item_text: record.item_text,
            item_type: record.item_type,
            section: record.section,
            page: record.page,
        }
    }
}

/// Diesel-based compliance item repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselComplianceRepository {
    pool: SqlitePool,
}

impl DieselComplianceRepository {
    /// Create a new Diesel compliance repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert items extracted by ingestion. Existing IDs are left untouched.
    pub async fn insert_items(
        &self,
        items: &[ComplianceItem],
    ) -> Result<usize, diesel::result::Error> {
        if items.is_empty() {
            return Ok(0);
        }

        let items = items.to_vec();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows: Vec<NewComplianceItem> = items
                .iter()
                .map(|item| NewComplianceItem {
                    id: &item.id,
                    document_id: &item.document_id,
                    item_text: &item.item_text,
                    item_type: &item.item_type,
                    section: item.section.as_deref(),
                    page: item.page,
                })
                .collect();

            diesel::insert_or_ignore_into(compliance_items::table)
                .values(&rows)
                .execute(conn)
        })
        .await
    }

    /// Get a compliance item by ID.
    pub async fn get(&self, id: &str) -> Result<Option<ComplianceItem>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            compliance_items::table
                .find(&id)
                .first::<ComplianceItemRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(ComplianceItem::from))
    }

    /// All items belonging to any of the given documents.
    pub async fn list_for_documents(
        &self,
        document_ids: &[String],
    ) -> Result<Vec<ComplianceItem>, diesel::result::Error> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let document_ids = document_ids.to_vec();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            compliance_items::table
                .filter(compliance_items::document_id.eq_any(&document_ids))
                .order((compliance_items::document_id.asc(), compliance_items::id.asc()))
                .load::<ComplianceItemRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(ComplianceItem::from).collect())
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
        let pool = create_diesel_pool_from_url(&format!("{}", db_path.display())).unwrap();
        run_migrations(pool.clone()).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselComplianceRepository::new(pool);

        let item = ComplianceItem::new(
            "doc-1".to_string(),
            "All data at rest must be encrypted".to_string(),
            "requirement".to_string(),
        );
        let inserted = repo.insert_items(std::slice::from_ref(&item)).await.unwrap();
        assert_eq!(inserted, 1);

        // Re-inserting the same ID is ignored
        let again = repo.insert_items(std::slice::from_ref(&item)).await.unwrap();
        assert_eq!(again, 0);

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.item_text, item.item_text);

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_for_documents() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselComplianceRepository::new(pool);

        let items = vec![
            ComplianceItem::new("doc-1".to_string(), "a".to_string(), "requirement".to_string()),
            ComplianceItem::new("doc-1".to_string(), "b".to_string(), "requirement".to_string()),
            ComplianceItem::new("doc-2".to_string(), "c".to_string(), "control".to_string()),
        ];
        repo.insert_items(&items).await.unwrap();

        let found = repo
            .list_for_documents(&["doc-1".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let both = repo
            .list_for_documents(&["doc-1".to_string(), "doc-2".to_string()])
            .await
            .unwrap();
        assert_eq!(both.len(), 3);

        let none = repo.list_for_documents(&[]).await.unwrap();
        assert!(none.is_empty());
    }
}
