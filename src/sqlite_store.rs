//! SQLite-backed [`PatientIndex`] implementation.
//!
//! Every read binds the tenant id into the `WHERE` clause; there is no
//! query in this module that can return rows for more than one tenant.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use patient_search_core::models::DocumentRecord;
use patient_search_core::store::PatientIndex;
use patient_search_core::TenantId;

/// SQLite implementation of the [`PatientIndex`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of documents owned by `tenant`.
    pub async fn count_for(&self, tenant: &TenantId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE user_id = ?")
            .bind(tenant.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_record(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        document_id: row.get("id"),
        user_id: row.get("user_id"),
        patient_name: row.get("patient_name"),
        filename: row.get("filename"),
        record_number: row.get("record_number"),
        episode_number: row.get("episode_number"),
        category: row.get("category"),
        processing_status: row.get("processing_status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PatientIndex for SqliteStore {
    async fn candidates_for(&self, tenant: &TenantId) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, patient_name, filename, record_number, episode_number,
                   category, processing_status, created_at, updated_at
            FROM documents
            WHERE user_id = ?
            "#,
        )
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, patient_name, filename, record_number,
                                   episode_number, category, processing_status,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                patient_name = excluded.patient_name,
                filename = excluded.filename,
                record_number = excluded.record_number,
                episode_number = excluded.episode_number,
                category = excluded.category,
                processing_status = excluded.processing_status,
                updated_at = excluded.updated_at
            WHERE documents.user_id = excluded.user_id
            "#,
        )
        .bind(&doc.document_id)
        .bind(&doc.user_id)
        .bind(&doc.patient_name)
        .bind(&doc.filename)
        .bind(&doc.record_number)
        .bind(&doc.episode_number)
        .bind(&doc.category)
        .bind(&doc.processing_status)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
