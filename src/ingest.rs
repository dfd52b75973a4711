//! Document registration from medical filenames.
//!
//! Stands in for the upload pipeline: each filename is parsed with
//! [`parse_medical_filename`] and, if valid, catalogued for the owning
//! tenant with status `registered`. Invalid names are reported and skipped;
//! they never abort the batch.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use patient_search_core::filename::{category_description, parse_medical_filename, FilenameError};
use patient_search_core::models::DocumentRecord;
use patient_search_core::store::PatientIndex;
use patient_search_core::TenantId;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub const STATUS_REGISTERED: &str = "registered";

/// Result of registering a batch of filenames.
#[derive(Debug, Default)]
pub struct RegisterOutcome {
    pub registered: Vec<DocumentRecord>,
    pub rejected: Vec<(String, FilenameError)>,
}

/// Build a new record for `tenant` from a filename (or a path ending in one).
pub fn record_from_filename(
    tenant: &TenantId,
    filename: &str,
    now: i64,
) -> Result<DocumentRecord, FilenameError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let info = parse_medical_filename(name)?;

    Ok(DocumentRecord {
        document_id: uuid::Uuid::new_v4().to_string(),
        user_id: tenant.as_str().to_string(),
        patient_name: info.patient_name,
        filename: name.to_string(),
        record_number: Some(info.record_number),
        episode_number: Some(info.episode_number),
        category: Some(info.category),
        processing_status: STATUS_REGISTERED.to_string(),
        created_at: now,
        updated_at: now,
    })
}

/// Parse and upsert each filename into `index`.
pub async fn register_documents<S: PatientIndex + ?Sized>(
    index: &S,
    tenant: &TenantId,
    filenames: &[String],
) -> Result<RegisterOutcome> {
    let now = chrono::Utc::now().timestamp();
    let mut outcome = RegisterOutcome::default();

    for filename in filenames {
        match record_from_filename(tenant, filename, now) {
            Ok(record) => {
                index.upsert_document(&record).await?;
                info!(
                    tenant = %tenant,
                    document_id = %record.document_id,
                    patient = %record.patient_name,
                    "registered document"
                );
                outcome.registered.push(record);
            }
            Err(e) => {
                warn!(tenant = %tenant, filename = %filename, error = %e, "rejected filename");
                outcome.rejected.push((filename.clone(), e));
            }
        }
    }

    Ok(outcome)
}

/// `psearch register`: catalogue filenames for one tenant.
pub async fn run_register(config: &Config, user_id: &str, filenames: &[String]) -> Result<()> {
    let tenant = TenantId::parse(Some(user_id))?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let outcome = register_documents(&store, &tenant, filenames).await?;

    println!("register {}", tenant);
    for doc in &outcome.registered {
        let category = doc.category.as_deref().unwrap_or("-");
        println!(
            "  + {} ({}) {}",
            doc.patient_name,
            category_description(category).unwrap_or(category),
            doc.document_id
        );
    }
    for (filename, err) in &outcome.rejected {
        println!("  ! {}: {}", filename, err);
    }
    println!("  registered: {}", outcome.registered.len());
    println!("  rejected: {}", outcome.rejected.len());
    println!("  total for tenant: {}", store.count_for(&tenant).await?);

    store.pool().close().await;

    if outcome.registered.is_empty() && !outcome.rejected.is_empty() {
        anyhow::bail!("no documents registered");
    }
    println!("ok");
    Ok(())
}
