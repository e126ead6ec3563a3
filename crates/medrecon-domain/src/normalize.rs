//! Entity normalizer
//!
//! Produces comparison-only keys from raw extracted text. Raw text is never
//! replaced by a key; keys exist so two mentions can be compared.

use crate::lexicon;

/// Characters kept verbatim besides alphanumerics
const CLINICAL_SYMBOLS: &[char] =
    &['/', '.', '%', '+', '-', '<', '>', '=', '°', 'µ', 'μ', '#', '^'];

/// Characters stripped from the end of a key
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '-', '/'];

/// Normalize raw text into a matching key
///
/// Lowercases, keeps alphanumerics and recognized clinical symbols, turns
/// every other character into a space, collapses whitespace, and strips
/// trailing punctuation.
///
/// ```
/// use medrecon_domain::normalize::normalize_key;
/// assert_eq!(normalize_key("  Metformin   500mg, "), "metformin 500mg");
/// assert_eq!(normalize_key("BP: 120/80."), "bp 120/80");
/// ```
pub fn normalize_key(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_alphanumeric() || CLINICAL_SYMBOLS.contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(TRAILING_PUNCTUATION).trim_end().to_string()
}

/// Normalized key with all whitespace removed
///
/// Used to compare attribute values where only formatting differs
/// (`500 mg` vs `500mg`).
pub fn compact_key(raw: &str) -> String {
    normalize_key(raw).chars().filter(|c| !c.is_whitespace()).collect()
}

/// Word tokens of the normalized key
pub fn tokens(raw: &str) -> Vec<String> {
    normalize_key(raw).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Whether the raw text reads as an abbreviation rather than a spelled-out name
///
/// True when every word token (ignoring tokens containing digits) is a known
/// medical abbreviation, or the text is a single short all-caps word
/// (`HTN`, `ASA`).
pub fn looks_abbreviated(raw: &str) -> bool {
    let trimmed = raw.trim();
    let words: Vec<String> = tokens(trimmed)
        .into_iter()
        .filter(|t| !t.chars().any(|c| c.is_ascii_digit()))
        .collect();
    if words.is_empty() {
        return false;
    }
    if words.iter().all(|t| lexicon::is_medical_abbreviation(t)) {
        return true;
    }
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    !trimmed.contains(char::is_whitespace)
        && (2..=5).contains(&letters.len())
        && letters.iter().all(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize_key("Metformin 500mg"), "metformin 500mg");
        assert_eq!(normalize_key("metformin\t 500mg"), "metformin 500mg");
    }

    #[test]
    fn test_normalize_keeps_clinical_symbols() {
        assert_eq!(normalize_key("HbA1c <7.0%"), "hba1c <7.0%");
        assert_eq!(normalize_key("Temp 98.6°F"), "temp 98.6°f");
        assert_eq!(normalize_key("K+ 4.1"), "k+ 4.1");
    }

    #[test]
    fn test_normalize_replaces_other_punctuation() {
        assert_eq!(normalize_key("Lisinopril (Zestril) 10mg"), "lisinopril zestril 10mg");
        assert_eq!(normalize_key("Type 2 diabetes; controlled."), "type 2 diabetes controlled");
    }

    #[test]
    fn test_normalize_strips_trailing_punctuation() {
        assert_eq!(normalize_key("asthma - "), "asthma");
        assert_eq!(normalize_key("120/80/"), "120/80");
        assert_eq!(normalize_key("..."), "");
    }

    #[test]
    fn test_compact_key_ignores_spacing() {
        assert_eq!(compact_key("500 mg"), compact_key("500mg"));
        assert_ne!(compact_key("500 mg"), compact_key("50 mg"));
    }

    #[test]
    fn test_tokens() {
        assert_eq!(tokens("Aspirin 81 mg daily"), vec!["aspirin", "81", "mg", "daily"]);
        assert!(tokens("  ").is_empty());
    }

    #[test]
    fn test_looks_abbreviated() {
        assert!(looks_abbreviated("HTN"));
        assert!(looks_abbreviated("ASA"));
        assert!(looks_abbreviated("htn"));
        assert!(!looks_abbreviated("Hypertension"));
        assert!(looks_abbreviated("ASA 81mg"));
        assert!(!looks_abbreviated("Metformin 500mg BID"));
        assert!(!looks_abbreviated("500"));
    }
}
