//! Fuzzy patient search over a tenant-scoped [`PatientIndex`].
//!
//! The engine is stateless apart from its index handle and limits; every
//! call is a pure function of the tenant's current snapshot and the
//! request. It exposes three operations:
//!
//! | Operation | Returns |
//! |-----------|---------|
//! | [`search_patients`](SearchEngine::search_patients) | Ranked, paginated documents |
//! | [`suggest_patient_names`](SearchEngine::suggest_patient_names) | Distinct raw names for autocomplete |
//! | [`find_documents_by_exact_name`](SearchEngine::find_documents_by_exact_name) | Documents whose name normalizes identically |
//!
//! # Pipeline
//!
//! 1. Validate the tenant, then the remaining parameters. Nothing is
//!    normalized or read before validation passes.
//! 2. Normalize the term ([`normalize_name`]).
//! 3. Fetch the tenant's snapshot and re-check ownership.
//! 4. Score each candidate ([`score`]) and drop those below the threshold.
//! 5. Sort by similarity (desc), match type (exact, prefix, fuzzy), raw
//!    name (asc), document id (asc).
//! 6. Apply `skip`, then `limit`. `total_found` is counted before paging.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{SearchError, ValidationError};
use crate::models::{DocumentRecord, MatchType, SearchHit, SearchPage, Suggestions};
use crate::normalize::normalize_name;
use crate::scoring::score;
use crate::store::{retain_owned, PatientIndex};
use crate::tenant::TenantId;

/// Bounds and defaults applied to incoming requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_min_similarity: f64,
    pub suggestion_default_limit: usize,
    pub suggestion_max_limit: usize,
    /// Fuzzy-only candidates must reach this to be suggested.
    pub suggestion_min_similarity: f64,
    pub max_term_length: usize,
    pub max_partial_term_length: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            default_min_similarity: 0.3,
            suggestion_default_limit: 10,
            suggestion_max_limit: 50,
            suggestion_min_similarity: 0.75,
            max_term_length: 200,
            max_partial_term_length: 100,
        }
    }
}

/// Inputs for [`SearchEngine::search_patients`].
#[derive(Debug, Clone, Default)]
pub struct PatientSearchRequest<'a> {
    pub term: &'a str,
    /// Raw tenant identifier as received; validated by the engine.
    pub user_id: Option<&'a str>,
    pub limit: Option<usize>,
    pub skip: usize,
    pub min_similarity: Option<f64>,
}

/// Inputs for [`SearchEngine::suggest_patient_names`].
#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest<'a> {
    pub partial_term: &'a str,
    pub user_id: Option<&'a str>,
    pub limit: Option<usize>,
}

/// Inputs for [`SearchEngine::find_documents_by_exact_name`].
#[derive(Debug, Clone, Default)]
pub struct ExactNameRequest<'a> {
    pub patient_name: &'a str,
    pub user_id: Option<&'a str>,
    pub limit: Option<usize>,
    pub skip: usize,
}

/// Fuzzy search engine bound to one index.
pub struct SearchEngine<S> {
    index: S,
    limits: SearchLimits,
}

impl<S: PatientIndex> SearchEngine<S> {
    pub fn new(index: S, limits: SearchLimits) -> Self {
        Self { index, limits }
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Rank the tenant's documents by patient name similarity to `term`.
    pub async fn search_patients(
        &self,
        req: &PatientSearchRequest<'_>,
    ) -> Result<SearchPage, SearchError> {
        let tenant = TenantId::parse(req.user_id)?;
        let term = check_term("search_term", req.term, self.limits.max_term_length)?;
        let limit = resolve_limit(req.limit, self.limits.default_limit, self.limits.max_limit)?;
        let min_similarity = resolve_similarity(req.min_similarity, self.limits.default_min_similarity)?;

        let normalized_term = normalize_name(term);
        let docs = self.snapshot(&tenant).await?;

        let mut hits: Vec<SearchHit> = docs
            .into_iter()
            .filter_map(|document| {
                let candidate = normalize_name(&document.patient_name);
                let s = score(&normalized_term, &candidate);
                (s.similarity >= min_similarity).then(|| SearchHit {
                    document,
                    similarity_score: s.similarity,
                    match_type: s.match_type,
                    normalized_term: normalized_term.clone(),
                })
            })
            .collect();

        Ok(paginate(normalized_term, &mut hits, limit, req.skip))
    }

    /// Distinct raw names for autocomplete.
    ///
    /// Exact and prefix matches are always eligible; fuzzy matches only when
    /// they reach `suggestion_min_similarity`. Ordered exact, prefix, fuzzy,
    /// then shorter names first, then raw name. De-duplicated by normalized
    /// name, keeping the first raw spelling in that order.
    pub async fn suggest_patient_names(
        &self,
        req: &SuggestionRequest<'_>,
    ) -> Result<Suggestions, SearchError> {
        let tenant = TenantId::parse(req.user_id)?;
        let term = check_term(
            "partial_term",
            req.partial_term,
            self.limits.max_partial_term_length,
        )?;
        let limit = resolve_limit(
            req.limit,
            self.limits.suggestion_default_limit,
            self.limits.suggestion_max_limit,
        )?;

        let normalized_term = normalize_name(term);
        let docs = self.snapshot(&tenant).await?;

        struct Candidate {
            raw: String,
            normalized: String,
            match_type: MatchType,
        }

        let mut candidates: Vec<Candidate> = docs
            .into_iter()
            .filter_map(|doc| {
                let normalized = normalize_name(&doc.patient_name);
                let s = score(&normalized_term, &normalized);
                let eligible = match s.match_type {
                    MatchType::Exact | MatchType::Prefix => true,
                    MatchType::Fuzzy => {
                        s.similarity > 0.0 && s.similarity >= self.limits.suggestion_min_similarity
                    }
                };
                eligible.then(|| Candidate {
                    raw: doc.patient_name.trim().to_string(),
                    normalized,
                    match_type: s.match_type,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.match_type
                .cmp(&b.match_type)
                .then(a.normalized.chars().count().cmp(&b.normalized.chars().count()))
                .then(a.raw.cmp(&b.raw))
        });

        let mut seen: HashSet<String> = HashSet::new();
        let suggestions: Vec<String> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.normalized.clone()))
            .map(|c| c.raw)
            .take(limit)
            .collect();

        Ok(Suggestions {
            normalized_term,
            suggestions,
            limit,
        })
    }

    /// Every tenant document whose name normalizes to the same form as
    /// `patient_name`. All hits are exact with similarity `1.0`.
    pub async fn find_documents_by_exact_name(
        &self,
        req: &ExactNameRequest<'_>,
    ) -> Result<SearchPage, SearchError> {
        let tenant = TenantId::parse(req.user_id)?;
        let name = check_term("patient_name", req.patient_name, self.limits.max_term_length)?;
        let limit = resolve_limit(req.limit, self.limits.default_limit, self.limits.max_limit)?;

        let normalized_term = normalize_name(name);
        let docs = if normalized_term.is_empty() {
            Vec::new()
        } else {
            self.snapshot(&tenant).await?
        };

        let mut hits: Vec<SearchHit> = docs
            .into_iter()
            .filter(|doc| normalize_name(&doc.patient_name) == normalized_term)
            .map(|document| SearchHit {
                document,
                similarity_score: 1.0,
                match_type: MatchType::Exact,
                normalized_term: normalized_term.clone(),
            })
            .collect();

        Ok(paginate(normalized_term, &mut hits, limit, req.skip))
    }

    async fn snapshot(&self, tenant: &TenantId) -> Result<Vec<DocumentRecord>, SearchError> {
        let docs = self
            .index
            .candidates_for(tenant)
            .await
            .map_err(SearchError::Index)?;
        Ok(retain_owned(tenant, docs))
    }
}

/// Deterministic result ordering.
pub fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.similarity_score
        .partial_cmp(&a.similarity_score)
        .unwrap_or(Ordering::Equal)
        .then(a.match_type.cmp(&b.match_type))
        .then(a.document.patient_name.cmp(&b.document.patient_name))
        .then(a.document.document_id.cmp(&b.document.document_id))
}

fn paginate(normalized_term: String, hits: &mut Vec<SearchHit>, limit: usize, skip: usize) -> SearchPage {
    hits.sort_by(rank);
    let total_found = hits.len();
    let results = hits.drain(..).skip(skip).take(limit).collect();
    SearchPage {
        normalized_term,
        total_found,
        results,
        limit,
        skip,
    }
}

fn check_term<'a>(field: &'static str, term: &'a str, max_len: usize) -> Result<&'a str, ValidationError> {
    if term.trim().is_empty() {
        return Err(ValidationError::parameter(field, "must not be empty"));
    }
    let len = term.chars().count();
    if len > max_len {
        return Err(ValidationError::parameter(
            field,
            format!("must be at most {} characters, got {}", max_len, len),
        ));
    }
    Ok(term)
}

fn resolve_limit(limit: Option<usize>, default: usize, max: usize) -> Result<usize, ValidationError> {
    let limit = limit.unwrap_or(default);
    if limit == 0 || limit > max {
        return Err(ValidationError::parameter(
            "limit",
            format!("must be between 1 and {}, got {}", max, limit),
        ));
    }
    Ok(limit)
}

fn resolve_similarity(value: Option<f64>, default: f64) -> Result<f64, ValidationError> {
    let value = value.unwrap_or(default);
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::parameter(
            "min_similarity",
            format!("must be within [0.0, 1.0], got {}", value),
        ));
    }
    Ok(value)
}
