//! # Patient Search Core
//!
//! Runtime-agnostic logic for Patient Search: name normalization,
//! similarity scoring, tenant validation, the tenant-scoped index trait
//! and the fuzzy search engine built on top of it.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem I/O. Storage
//! backends plug in through [`store::PatientIndex`].

pub mod error;
pub mod filename;
pub mod models;
pub mod normalize;
pub mod scoring;
pub mod search;
pub mod store;
pub mod tenant;

pub use error::{SearchError, ValidationError};
pub use filename::{parse_medical_filename, FilenameError, MedicalFileInfo};
pub use models::{DocumentRecord, MatchType, PageInfo, SearchHit, SearchPage, Suggestions};
pub use normalize::normalize_name;
pub use scoring::{score, MatchScore};
pub use search::{
    ExactNameRequest, PatientSearchRequest, SearchEngine, SearchLimits, SuggestionRequest,
};
pub use store::PatientIndex;
pub use tenant::TenantId;
