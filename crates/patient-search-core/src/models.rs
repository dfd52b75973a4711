//! Core data models shared by the search engine and its storage backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A document as catalogued by the ingestion pipeline.
///
/// The search core only reads these. `user_id` is the owning tenant and
/// `patient_name` is the raw name as stored (e.g. `"GARCIA LOPEZ, MARIA"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub user_id: String,
    pub patient_name: String,
    pub filename: String,
    /// Medical record number (expediente).
    pub record_number: Option<String>,
    pub episode_number: Option<String>,
    /// Document category code (`EMER`, `CONS`, ...).
    pub category: Option<String>,
    pub processing_status: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

/// Coarse bucket assigned alongside a similarity score.
///
/// Variants are declared from strongest to weakest, so the derived
/// `Ord` sorts `Exact < Prefix < Fuzzy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Prefix,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored document in a search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: DocumentRecord,
    /// Similarity in `[0.0, 1.0]`.
    pub similarity_score: f64,
    pub match_type: MatchType,
    /// The normalized query this hit was scored against.
    #[serde(skip)]
    pub normalized_term: String,
}

/// A page of ranked hits.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub normalized_term: String,
    /// Number of matches before pagination.
    pub total_found: usize,
    pub results: Vec<SearchHit>,
    pub limit: usize,
    pub skip: usize,
}

impl SearchPage {
    pub fn pagination(&self) -> PageInfo {
        PageInfo::new(self.total_found, self.limit, self.skip, self.results.len())
    }
}

/// Ranked, de-duplicated patient name suggestions.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestions {
    pub normalized_term: String,
    pub suggestions: Vec<String>,
    pub limit: usize,
}

/// Derived pagination metadata for a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub returned_count: usize,
    pub has_next: bool,
    pub has_prev: bool,
    /// 1-based.
    pub current_page: usize,
    pub total_pages: usize,
}

impl PageInfo {
    pub fn new(total: usize, limit: usize, skip: usize, returned: usize) -> Self {
        let limit = limit.max(1);
        Self {
            returned_count: returned,
            has_next: skip + returned < total,
            has_prev: skip > 0,
            current_page: skip / limit + 1,
            total_pages: total.div_ceil(limit),
        }
    }
}
