//! Similarity scoring between a normalized query and a normalized name.
//!
//! # Algorithm
//!
//! 1. Either side empty → `0.0`, [`MatchType::Fuzzy`].
//! 2. Equal strings → `1.0`, [`MatchType::Exact`].
//! 3. The candidate starts with the query, the query starts with the
//!    candidate, or the query is a prefix of the candidate starting at any
//!    token boundary → [`MatchType::Prefix`] with
//!    `len(query) / len(candidate)` clamped to `[0.6, 0.99]`.
//! 4. Otherwise → [`MatchType::Fuzzy`] with
//!    `1 - levenshtein(query, candidate) / max(len(query), len(candidate))`.
//!
//! Lengths are measured in characters. The clamp keeps every prefix match
//! below an exact match and at or above the usual fuzzy threshold.

use crate::models::MatchType;

/// Lower bound of a prefix match similarity.
pub const PREFIX_FLOOR: f64 = 0.6;
/// Upper bound of a prefix match similarity.
pub const PREFIX_CEILING: f64 = 0.99;

/// Result of comparing a query against one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    /// In `[0.0, 1.0]`.
    pub similarity: f64,
    pub match_type: MatchType,
}

impl MatchScore {
    const NONE: MatchScore = MatchScore {
        similarity: 0.0,
        match_type: MatchType::Fuzzy,
    };
}

/// Score `candidate` against `query`. Both must already be normalized.
pub fn score(query: &str, candidate: &str) -> MatchScore {
    if query.is_empty() || candidate.is_empty() {
        return MatchScore::NONE;
    }

    if query == candidate {
        return MatchScore {
            similarity: 1.0,
            match_type: MatchType::Exact,
        };
    }

    let q_len = query.chars().count();
    let c_len = candidate.chars().count();

    if is_prefix_match(query, candidate) {
        let ratio = q_len as f64 / c_len as f64;
        return MatchScore {
            similarity: ratio.clamp(PREFIX_FLOOR, PREFIX_CEILING),
            match_type: MatchType::Prefix,
        };
    }

    let distance = strsim::levenshtein(query, candidate);
    let longest = q_len.max(c_len).max(1);
    let similarity = (1.0 - distance as f64 / longest as f64).max(0.0);

    MatchScore {
        similarity,
        match_type: MatchType::Fuzzy,
    }
}

/// True when `query` and `candidate` share a leading prefix relation, or
/// `query` is a prefix of the candidate from some token onwards
/// (`"PEDRO JAV"` matches `"GOMEZ PEDRO JAVIER"`).
fn is_prefix_match(query: &str, candidate: &str) -> bool {
    if candidate.starts_with(query) || query.starts_with(candidate) {
        return true;
    }
    candidate
        .match_indices(' ')
        .any(|(i, _)| candidate[i + 1..].starts_with(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn exact_is_one() {
        let s = score("GARCIA LOPEZ MARIA", "GARCIA LOPEZ MARIA");
        assert_eq!(s.match_type, MatchType::Exact);
        assert!(approx(s.similarity, 1.0));
    }

    #[test]
    fn empty_query_scores_zero() {
        let s = score("", "GARCIA");
        assert_eq!(s, MatchScore::NONE);
        assert_eq!(score("", ""), MatchScore::NONE);
        assert_eq!(score("GARCIA", ""), MatchScore::NONE);
    }

    #[test]
    fn leading_prefix_is_clamped_ratio() {
        // 6 / 18 = 0.33 → floor
        let s = score("GARCIA", "GARCIA LOPEZ MARIA");
        assert_eq!(s.match_type, MatchType::Prefix);
        assert!(approx(s.similarity, PREFIX_FLOOR));

        // 15 / 18 = 0.8333
        let s = score("GARCIA LOPEZ MA", "GARCIA LOPEZ MARIA");
        assert_eq!(s.match_type, MatchType::Prefix);
        assert!(approx(s.similarity, 15.0 / 18.0));
    }

    #[test]
    fn query_longer_than_candidate_prefix_hits_ceiling() {
        let s = score("GARCIA LOPEZ", "GARCIA");
        assert_eq!(s.match_type, MatchType::Prefix);
        assert!(approx(s.similarity, PREFIX_CEILING));
    }

    #[test]
    fn token_prefix_counts_as_prefix() {
        let s = score("MARIA", "GARCIA LOPEZ MARIA");
        assert_eq!(s.match_type, MatchType::Prefix);

        let s = score("PEDRO JAV", "GOMEZ PEDRO JAVIER");
        assert_eq!(s.match_type, MatchType::Prefix);

        // Substring that does not start at a token boundary is not a prefix.
        let s = score("ARCIA", "GARCIA LOPEZ MARIA");
        assert_eq!(s.match_type, MatchType::Fuzzy);
    }

    #[test]
    fn fuzzy_uses_normalized_levenshtein() {
        // one substitution over six characters
        let s = score("GARSIA", "GARCIA");
        assert_eq!(s.match_type, MatchType::Fuzzy);
        assert!(approx(s.similarity, 1.0 - 1.0 / 6.0));
    }

    #[test]
    fn fuzzy_counts_characters_not_bytes() {
        // Ñ survives only if normalization was skipped; distance stays 1 char.
        let s = score("PEÑA", "PENA");
        assert!(approx(s.similarity, 0.75));
    }

    #[test]
    fn ordinal_exact_over_prefix_over_fuzzy() {
        let exact = score("RUIZ ANA", "RUIZ ANA");
        let prefix = score("RUIZ AN", "RUIZ ANA");
        let fuzzy = score("RUIS ANA", "RUIZ ANA");
        assert!(exact.similarity > prefix.similarity);
        assert!(prefix.similarity >= PREFIX_FLOOR);
        assert!(prefix.similarity <= PREFIX_CEILING);
        assert_eq!(fuzzy.match_type, MatchType::Fuzzy);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let names = ["A", "ZZZZZZZZZZZZZZ", "GARCIA LOPEZ MARIA", "X Y Z", "12345"];
        for q in names {
            for c in names {
                let s = score(q, c);
                assert!(
                    (0.0..=1.0).contains(&s.similarity),
                    "{} vs {} gave {}",
                    q,
                    c,
                    s.similarity
                );
            }
        }
    }
}
