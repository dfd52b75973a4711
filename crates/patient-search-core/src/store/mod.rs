//! Tenant-scoped read view over the document catalog.
//!
//! The [`PatientIndex`] trait is the only way the search engine reaches
//! documents. Every read takes a [`TenantId`]; there is deliberately no
//! method that spans tenants.
//!
//! # Isolation contract
//!
//! Implementations must never return a record whose `user_id` differs from
//! the requested tenant, and must never reassign an existing document to
//! another tenant on upsert. A tenant with no documents yields an empty
//! snapshot, not an error. Each call returns a fresh snapshot; nothing is
//! cached between calls.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DocumentRecord;
use crate::tenant::TenantId;

/// Abstract document catalog backing the search engine.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`candidates_for`](PatientIndex::candidates_for) | Snapshot of one tenant's documents |
/// | [`upsert_document`](PatientIndex::upsert_document) | Insert or replace a document (ingestion side) |
#[async_trait]
pub trait PatientIndex: Send + Sync {
    /// All documents owned by `tenant`, in no particular order.
    async fn candidates_for(&self, tenant: &TenantId) -> Result<Vec<DocumentRecord>>;

    /// Insert or replace a document, keyed by `document_id`.
    ///
    /// A document keeps the tenant it was first stored under: an upsert
    /// whose `document_id` already belongs to another tenant is a no-op.
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()>;
}

#[async_trait]
impl<T: PatientIndex + ?Sized> PatientIndex for Arc<T> {
    async fn candidates_for(&self, tenant: &TenantId) -> Result<Vec<DocumentRecord>> {
        (**self).candidates_for(tenant).await
    }

    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        (**self).upsert_document(doc).await
    }
}

/// Drop any record that does not belong to `tenant`.
///
/// Backends already filter by tenant; the engine applies this again to
/// every snapshot so a faulty backend cannot leak another tenant's data.
pub fn retain_owned(tenant: &TenantId, mut docs: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    docs.retain(|d| d.user_id == tenant.as_str());
    docs
}
