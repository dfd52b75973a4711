//! Patient name normalization.
//!
//! Produces the canonical comparable form of a name: upper case, no
//! diacritics, and every run of whitespace or punctuation collapsed into a
//! single space with no leading or trailing space.
//!
//! ```text
//! "  García-López,  maría "  →  "GARCIA LOPEZ MARIA"
//! ```
//!
//! Normalization is total (any input, including `""`, yields a possibly
//! empty string) and idempotent.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a raw patient name.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    // Upper-case before decomposing so that case mappings which introduce
    // combining marks get stripped as well.
    for c in raw.to_uppercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}
