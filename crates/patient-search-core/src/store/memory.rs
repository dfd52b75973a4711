//! In-memory [`PatientIndex`] implementation for tests and embedding.
//!
//! Documents live in a `HashMap` keyed by document id behind a
//! `std::sync::RwLock`. Snapshots are filtered by owner on every read.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::DocumentRecord;
use crate::tenant::TenantId;

use super::PatientIndex;

/// In-memory document catalog.
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Build an index pre-populated with `docs`.
    pub fn with_documents(docs: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let map = docs
            .into_iter()
            .map(|d| (d.document_id.clone(), d))
            .collect();
        Self {
            docs: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientIndex for InMemoryIndex {
    async fn candidates_for(&self, tenant: &TenantId) -> Result<Vec<DocumentRecord>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        Ok(docs
            .values()
            .filter(|d| d.user_id == tenant.as_str())
            .cloned()
            .collect())
    }

    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        let mut docs = self
            .docs
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        if let Some(existing) = docs.get(&doc.document_id) {
            if existing.user_id != doc.user_id {
                return Ok(());
            }
        }
        docs.insert(doc.document_id.clone(), doc.clone());
        Ok(())
    }
}
