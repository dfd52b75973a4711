//! Parser for medical document filenames.
//!
//! Documents are registered from filenames of the form
//!
//! ```text
//! {RECORD}_{SURNAMES, GIVEN NAMES}_{EPISODE}_{CATEGORY}.pdf
//! 4000123456_GARCIA LOPEZ, MARIA_6001467010_EMER.pdf
//! ```
//!
//! | Part | Rule |
//! |------|------|
//! | record | exactly 10 ASCII digits, not all zeros |
//! | patient name | uppercase letters (accents allowed) and spaces, one comma separating surnames from given names |
//! | episode | exactly 10 ASCII digits, greater than zero |
//! | category | one of [`CATEGORIES`] |
//!
//! The extension check is case-insensitive; everything else is exact.

use serde::Serialize;
use thiserror::Error;

/// Known document categories and their descriptions.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("EMER", "Emergency"),
    ("CONS", "Consultation"),
    ("LAB", "Laboratory"),
    ("RAD", "Radiology"),
    ("CIRC", "Surgery"),
    ("HOSP", "Hospitalization"),
    ("UCI", "Intensive care unit"),
    ("URG", "Urgent care"),
];

/// Fields extracted from a well-formed filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicalFileInfo {
    pub record_number: String,
    /// As written in the filename, trimmed.
    pub patient_name: String,
    pub episode_number: String,
    pub category: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("file must be a PDF: '{0}'")]
    NotPdf(String),

    #[error("expected 4 '_'-separated parts (record_patient_episode_category), found {0}")]
    PartCount(usize),

    #[error("{field} must be exactly 10 digits: '{value}'")]
    BadNumber { field: &'static str, value: String },

    #[error("{field} must not be zero: '{value}'")]
    ZeroNumber { field: &'static str, value: String },

    #[error("unknown category '{0}', expected one of EMER, CONS, LAB, RAD, CIRC, HOSP, UCI, URG")]
    UnknownCategory(String),

    #[error("patient name must be 'SURNAMES, GIVEN NAMES': '{0}'")]
    NameShape(String),

    #[error("patient name may only contain uppercase letters and spaces: '{0}'")]
    NameCharacters(String),
}

/// Parse and validate a medical filename.
pub fn parse_medical_filename(filename: &str) -> Result<MedicalFileInfo, FilenameError> {
    let stem = strip_pdf(filename).ok_or_else(|| FilenameError::NotPdf(filename.to_string()))?;

    let parts: Vec<&str> = stem.split('_').collect();
    let [record, name, episode, category] = parts.as_slice() else {
        return Err(FilenameError::PartCount(parts.len()));
    };

    check_number("record number", record)?;
    check_number("episode number", episode)?;

    if !CATEGORIES.iter().any(|(code, _)| code == category) {
        return Err(FilenameError::UnknownCategory(category.to_string()));
    }

    let patient_name = name.trim();
    check_patient_name(patient_name)?;

    Ok(MedicalFileInfo {
        record_number: record.to_string(),
        patient_name: patient_name.to_string(),
        episode_number: episode.to_string(),
        category: category.to_string(),
    })
}

/// Human description of a category code.
pub fn category_description(code: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
}

fn strip_pdf(filename: &str) -> Option<&str> {
    let split = filename.len().checked_sub(4)?;
    if !filename.is_char_boundary(split) {
        return None;
    }
    let (stem, ext) = filename.split_at(split);
    ext.eq_ignore_ascii_case(".pdf").then_some(stem)
}

fn check_number(field: &'static str, value: &str) -> Result<(), FilenameError> {
    if value.len() != 10 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FilenameError::BadNumber {
            field,
            value: value.to_string(),
        });
    }
    if value.bytes().all(|b| b == b'0') {
        return Err(FilenameError::ZeroNumber {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn check_patient_name(name: &str) -> Result<(), FilenameError> {
    let halves: Vec<&str> = name.split(',').map(str::trim).collect();
    let [surnames, given] = halves.as_slice() else {
        return Err(FilenameError::NameShape(name.to_string()));
    };
    if surnames.is_empty() || given.is_empty() {
        return Err(FilenameError::NameShape(name.to_string()));
    }

    let allowed = |c: char| c == ' ' || (c.is_alphabetic() && !c.is_lowercase());
    if !surnames.chars().all(allowed) || !given.chars().all(allowed) {
        return Err(FilenameError::NameCharacters(name.to_string()));
    }
    Ok(())
}
