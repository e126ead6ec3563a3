//! String similarity on normalized keys

/// Normalized Levenshtein similarity in [0, 1]
///
/// Both inputs are expected to be normalized keys. An empty key never
/// matches anything, including another empty key.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Digit runs in a key, in order
fn numbers(key: &str) -> Vec<&str> {
    key.split(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether two keys cite the same numbers (`type 1` vs `type 2`, `500mg` vs `850mg`)
///
/// Keys whose numbers differ are never fuzzy candidates, however similar the text.
pub fn numbers_agree(a: &str, b: &str) -> bool {
    numbers(a) == numbers(b)
}

/// Weakest similarity across every pair drawn from the two key sets
///
/// A pair whose numbers disagree scores 0.
pub fn complete_linkage(left: &[String], right: &[String]) -> f64 {
    let mut weakest = 1.0_f64;
    for a in left {
        for b in right {
            let score = if numbers_agree(a, b) { similarity(a, b) } else { 0.0 };
            weakest = weakest.min(score);
        }
    }
    if left.is_empty() || right.is_empty() {
        0.0
    } else {
        weakest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_keys() {
        assert_eq!(similarity("metformin 500mg", "metformin 500mg"), 1.0);
    }

    #[test]
    fn test_spacing_variant_above_threshold() {
        assert!(similarity("metformin 500mg", "metformin 500 mg") >= 0.85);
    }

    #[test]
    fn test_abbreviation_below_threshold() {
        assert!(similarity("hypertension", "htn") < 0.85);
    }

    #[test]
    fn test_empty_never_matches() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("asthma", ""), 0.0);
    }

    #[test]
    fn test_numbers_gate() {
        assert!(numbers_agree("metformin 500mg", "metformin 500 mg"));
        assert!(!numbers_agree("type 1 diabetes", "type 2 diabetes"));
        assert!(!numbers_agree("metformin 500mg", "metformin 850mg"));
        let left = vec!["type 1 diabetes".to_string()];
        let right = vec!["type 2 diabetes".to_string()];
        assert_eq!(complete_linkage(&left, &right), 0.0);
    }

    #[test]
    fn test_complete_linkage_takes_minimum() {
        let left = vec!["abcdefghij".to_string()];
        let right = vec!["abcdefghij".to_string(), "abcdefghxx".to_string()];
        assert!((complete_linkage(&left, &right) - 0.8).abs() < 1e-9);
        assert_eq!(complete_linkage(&left, &[]), 0.0);
    }
}
