//! Shared parsing utilities used by every source adapter archetype (§4.7).
//!
//! `name_similarity` and its helpers are grounded directly on the exact
//! behavior pinned by `examples/original_source`'s
//! `tests/unit/utils/test_name_matching.py` — there was no surviving
//! implementation file to port, only its test suite, so the algorithm
//! below is reconstructed to satisfy those cases.

use unicode_normalization::UnicodeNormalization;

/// Default similarity threshold gating a "match" decision.
pub const DEFAULT_NAME_MATCH_THRESHOLD: f64 = 0.85;

/// Strips common punctuation (`,`, `%`, whitespace) and parses an integer,
/// returning `None` on failure rather than erroring the whole item.
#[must_use]
pub fn safe_int(s: &str) -> Option<i64> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '%').collect();
    cleaned.trim().parse().ok()
}

/// Strips common punctuation and parses a float, returning `None` on
/// failure.
#[must_use]
pub fn safe_float(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '%').collect();
    cleaned.trim().parse().ok()
}

/// Parses `MM:SS` or `M:SS` into total seconds.
#[must_use]
pub fn parse_time_mmss(s: &str) -> Option<i64> {
    let (minutes, seconds) = s.trim().split_once(':')?;
    let minutes: i64 = minutes.trim().parse().ok()?;
    let seconds: i64 = seconds.trim().parse().ok()?;
    if !(0..60).contains(&seconds) {
        return None;
    }
    Some(minutes * 60 + seconds)
}

fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];

/// Lowercases, strips accents, turns punctuation (hyphens included) into
/// spaces, collapses whitespace, and drops a trailing generational suffix
/// (`Jr`, `Sr`, `II`-`V`).
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered = strip_accents(&name.to_lowercase());
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = spaced.split_whitespace().collect();
    if tokens.len() > 1 {
        let last = *tokens.last().expect("checked len > 1");
        if NAME_SUFFIXES.contains(&last) {
            tokens.pop();
        }
    }
    tokens.join(" ")
}

/// Splits a normalized name into `(last_name, first_and_middle_parts)`.
#[must_use]
pub fn extract_name_parts(normalized: &str) -> (String, Vec<String>) {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    match tokens.split_last() {
        None => (String::new(), Vec::new()),
        Some((last, rest)) => (
            (*last).to_string(),
            rest.iter().map(|s| (*s).to_string()).collect(),
        ),
    }
}

fn first_name_part_matches(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.chars().count() == 1 {
        return b.starts_with(a);
    }
    if b.chars().count() == 1 {
        return a.starts_with(b);
    }
    let prefix_len = 3;
    if a.chars().count() >= prefix_len && b.chars().count() >= prefix_len {
        let a_prefix: String = a.chars().take(prefix_len).collect();
        let b_prefix: String = b.chars().take(prefix_len).collect();
        return a_prefix == b_prefix;
    }
    false
}

/// True if every positionally-paired first/middle name part matches
/// (exact, initial-to-full, or shared-prefix nickname). Either side being
/// empty (no first name given) is treated as a match.
#[must_use]
pub fn first_name_matches(a_parts: &[String], b_parts: &[String]) -> bool {
    if a_parts.is_empty() || b_parts.is_empty() {
        return true;
    }
    a_parts
        .iter()
        .zip(b_parts.iter())
        .all(|(a, b)| first_name_part_matches(a, b))
}

/// Ratcliff/Obershelp-style similarity ratio: `2 * matched / total_len`,
/// where `matched` is the longest common subsequence length.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            dp[i + 1][j + 1] = if a[i] == b[j] {
                dp[i][j] + 1
            } else {
                dp[i][j + 1].max(dp[i + 1][j])
            };
        }
    }
    let lcs_len = dp[a.len()][b.len()] as f64;
    (2.0 * lcs_len) / (a.len() + b.len()) as f64
}

/// Player-name similarity in `[0.0, 1.0]`. Exact normalized match is 1.0;
/// matching last names with matching first/middle name parts (exact,
/// initial, or nickname prefix) scores high; mismatched last names score
/// low. Either name being empty returns 0.0.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let (last_a, first_a) = extract_name_parts(&na);
    let (last_b, first_b) = extract_name_parts(&nb);

    let lcs_ratio = string_similarity(&last_a, &last_b);
    let jw_ratio = strsim::jaro_winkler(&last_a, &last_b);
    let last_sim = (lcs_ratio + jw_ratio) / 2.0;

    if last_sim < 0.8 {
        return last_sim * 0.5;
    }
    if first_name_matches(&first_a, &first_b) {
        0.85 + 0.15 * last_sim
    } else {
        last_sim * 0.5
    }
}

/// Returns the candidate with the highest [`name_similarity`] score at or
/// above `threshold`, or `None` if no candidate clears it.
#[must_use]
pub fn find_best_match<'a>(
    name: &str,
    candidates: &'a [String],
    threshold: f64,
) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (candidate.as_str(), name_similarity(name, candidate)))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_int_strips_punctuation() {
        assert_eq!(safe_int("1,234"), Some(1234));
        assert_eq!(safe_int("n/a"), None);
    }

    #[test]
    fn safe_float_strips_percent() {
        assert_eq!(safe_float("55.3%"), Some(55.3));
    }

    #[test]
    fn parse_time_mmss_accepts_both_widths() {
        assert_eq!(parse_time_mmss("18:32"), Some(18 * 60 + 32));
        assert_eq!(parse_time_mmss("8:05"), Some(8 * 60 + 5));
        assert_eq!(parse_time_mmss("8:75"), None);
    }

    #[test]
    fn normalize_strips_accents_hyphens_and_suffixes() {
        assert_eq!(normalize_name("Nathan MacKinnon"), "nathan mackinnon");
        assert_eq!(normalize_name("Zdeno Chára"), "zdeno chara");
        assert_eq!(normalize_name("Alex Ovechkin Jr."), "alex ovechkin");
        assert_eq!(normalize_name("Pierre-Luc Dubois"), "pierre luc dubois");
        assert_eq!(normalize_name("  Nathan   MacKinnon  "), "nathan mackinnon");
        assert_eq!(normalize_name("Henrik Lundqvist III"), "henrik lundqvist");
    }

    #[test]
    fn extract_name_parts_splits_last_from_first() {
        assert_eq!(extract_name_parts(""), (String::new(), Vec::new()));
        assert_eq!(
            extract_name_parts("nathan mackinnon"),
            ("mackinnon".to_string(), vec!["nathan".to_string()])
        );
        assert_eq!(
            extract_name_parts("jonathan tanner miller"),
            (
                "miller".to_string(),
                vec!["jonathan".to_string(), "tanner".to_string()]
            )
        );
    }

    #[test]
    fn first_name_matches_handles_initials_and_nicknames() {
        let nathan = vec!["nathan".to_string()];
        let n = vec!["n".to_string()];
        let nate = vec!["nate".to_string()];
        let alex = vec!["alex".to_string()];
        assert!(first_name_matches(&n, &nathan));
        assert!(first_name_matches(&nathan, &n));
        assert!(first_name_matches(&nate, &nathan));
        assert!(!first_name_matches(&alex, &nathan));
        assert!(first_name_matches(&[], &nathan));
    }

    #[test]
    fn string_similarity_bounds() {
        assert_eq!(string_similarity("mackinnon", "mackinnon"), 1.0);
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("test", ""), 0.0);
        let close = string_similarity("mackinnon", "mackinon");
        assert!(close > 0.8 && close < 1.0);
        assert!(string_similarity("abcd", "wxyz") < 0.5);
    }

    #[test]
    fn name_similarity_exact_and_case_insensitive() {
        assert_eq!(name_similarity("Nathan MacKinnon", "Nathan MacKinnon"), 1.0);
        assert_eq!(name_similarity("Nathan MacKinnon", "nathan mackinnon"), 1.0);
        assert_eq!(name_similarity("Zdeno Chára", "Zdeno Chara"), 1.0);
    }

    #[test]
    fn name_similarity_initial_and_suffix_and_hyphen() {
        assert!(name_similarity("N. MacKinnon", "Nathan MacKinnon") >= 0.95);
        assert!(name_similarity("Alex Ovechkin Jr.", "Alex Ovechkin") >= 0.95);
        assert!(name_similarity("Pierre-Luc Dubois", "Pierre Luc Dubois") >= 0.95);
    }

    #[test]
    fn name_similarity_different_last_names_is_low() {
        assert!(name_similarity("Nathan MacKinnon", "Nathan Crosby") < 0.5);
    }

    #[test]
    fn name_similarity_empty_is_zero() {
        assert_eq!(name_similarity("", "Nathan MacKinnon"), 0.0);
        assert_eq!(name_similarity("Nathan MacKinnon", ""), 0.0);
        assert_eq!(name_similarity("", ""), 0.0);
    }

    #[test]
    fn name_similarity_middle_initials() {
        assert!(name_similarity("J.T. Miller", "Jonathan Tanner Miller") >= 0.85);
        assert!(name_similarity("J. Miller", "Jonathan Miller") >= 0.85);
    }

    #[test]
    fn find_best_match_picks_highest_scoring_candidate_above_threshold() {
        let candidates = vec![
            "Nathan MacKinnon".to_string(),
            "Cale Makar".to_string(),
            "Mikko Rantanen".to_string(),
            "Sidney Crosby".to_string(),
            "Alex Ovechkin".to_string(),
            "Pierre-Luc Dubois".to_string(),
        ];
        assert_eq!(
            find_best_match("Nathan MacKinnon", &candidates, DEFAULT_NAME_MATCH_THRESHOLD),
            Some("Nathan MacKinnon")
        );
        assert_eq!(
            find_best_match("N. MacKinnon", &candidates, DEFAULT_NAME_MATCH_THRESHOLD),
            Some("Nathan MacKinnon")
        );
        assert_eq!(
            find_best_match("Wayne Gretzky", &candidates, DEFAULT_NAME_MATCH_THRESHOLD),
            None
        );
        assert_eq!(
            find_best_match("Pierre Luc Dubois", &candidates, DEFAULT_NAME_MATCH_THRESHOLD),
            Some("Pierre-Luc Dubois")
        );
        assert_eq!(find_best_match("Nathan MacKinnon", &[], DEFAULT_NAME_MATCH_THRESHOLD), None);
        assert_eq!(find_best_match("", &candidates, DEFAULT_NAME_MATCH_THRESHOLD), None);
    }
}
