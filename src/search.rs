//! CLI front-end for the search engine.
//!
//! Opens the SQLite catalog, runs one engine operation and prints the
//! result in a human-readable layout.

use anyhow::Result;
use tracing::info;

use patient_search_core::filename::category_description;
use patient_search_core::models::SearchPage;
use patient_search_core::{
    ExactNameRequest, PatientSearchRequest, SearchEngine, SuggestionRequest,
};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Engine over the configured SQLite catalog. Creates the schema if needed.
pub async fn open_engine(config: &Config) -> Result<SearchEngine<SqliteStore>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(SearchEngine::new(
        SqliteStore::new(pool),
        config.search.limits(),
    ))
}

pub async fn run_search(
    config: &Config,
    term: &str,
    user_id: &str,
    limit: Option<usize>,
    skip: usize,
    min_similarity: Option<f64>,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let page = engine
        .search_patients(&PatientSearchRequest {
            term,
            user_id: Some(user_id),
            limit,
            skip,
            min_similarity,
        })
        .await?;

    info!(
        term = %term,
        tenant = %user_id,
        total = page.total_found,
        returned = page.results.len(),
        "patient search"
    );

    print_page(&page);
    engine.index().pool().close().await;
    Ok(())
}

pub async fn run_suggest(
    config: &Config,
    partial_term: &str,
    user_id: &str,
    limit: Option<usize>,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let suggestions = engine
        .suggest_patient_names(&SuggestionRequest {
            partial_term,
            user_id: Some(user_id),
            limit,
        })
        .await?;

    if suggestions.suggestions.is_empty() {
        println!("No suggestions.");
    } else {
        for (i, name) in suggestions.suggestions.iter().enumerate() {
            println!("{}. {}", i + 1, name);
        }
    }

    engine.index().pool().close().await;
    Ok(())
}

pub async fn run_documents(
    config: &Config,
    patient_name: &str,
    user_id: &str,
    limit: Option<usize>,
    skip: usize,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let page = engine
        .find_documents_by_exact_name(&ExactNameRequest {
            patient_name,
            user_id: Some(user_id),
            limit,
            skip,
        })
        .await?;

    print_page(&page);
    engine.index().pool().close().await;
    Ok(())
}

fn print_page(page: &SearchPage) {
    if page.results.is_empty() {
        println!("No results.");
        return;
    }

    let info = page.pagination();
    println!(
        "normalized: \"{}\"  total: {}  page {}/{}",
        page.normalized_term, page.total_found, info.current_page, info.total_pages
    );
    println!();

    for (i, hit) in page.results.iter().enumerate() {
        let doc = &hit.document;
        let date = chrono::DateTime::from_timestamp(doc.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!(
            "{}. [{:.2} {}] {}",
            page.skip + i + 1,
            hit.similarity_score,
            hit.match_type,
            doc.patient_name
        );
        println!("    file: {}", doc.filename);
        if let Some(ref category) = doc.category {
            match category_description(category) {
                Some(desc) => println!("    category: {} ({})", category, desc),
                None => println!("    category: {}", category),
            }
        }
        println!("    updated: {}", date);
        println!("    id: {}", doc.document_id);
        println!();
    }
}
