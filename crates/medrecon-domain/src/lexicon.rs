//! Abbreviation tables and uncertainty marker vocabulary

/// Common clinical abbreviations (lowercase, after normalization)
pub const MEDICAL_ABBREVIATIONS: &[&str] = &[
    // dosing and frequency
    "bid", "tid", "qid", "qd", "qod", "qhs", "qam", "qpm", "prn", "ac", "pc", "hs", "stat",
    "po", "iv", "im", "sc", "sq", "sl", "pr", "inh", "neb", "top", "od", "os", "ou",
    "mg", "mcg", "ml", "cc", "u", "iu", "gtt", "tab", "tabs", "cap", "caps",
    // problems and findings
    "htn", "dm", "dm2", "t2dm", "cad", "chf", "copd", "ckd", "gerd", "mi", "cva", "tia",
    "afib", "dvt", "pe", "uti", "uri", "osa", "bph", "hld", "oa", "ra", "sob", "cp",
    "n/v", "abd", "hx", "fhx", "shx", "pmh", "psh", "ros", "hpi", "wnl", "nad",
    // drugs
    "asa", "hctz", "ntg", "apap", "nsaid", "ssri", "ace", "arb", "ppi", "ms", "mso4", "mgso4",
    // vitals and labs
    "bp", "hr", "rr", "spo2", "temp", "wt", "ht", "bmi", "cbc", "bmp", "cmp", "lft", "tsh",
    "a1c", "hba1c", "ldl", "hdl", "bun", "cr", "egfr", "inr", "pt", "ptt", "wbc", "rbc", "hgb",
    "hct", "plt",
    // plan
    "f/u", "rtc", "dc", "d/c", "ss", "tiw",
];

/// Abbreviations that are error-prone in clinical documentation
///
/// Each entry is `(abbreviation, competing readings)`.
pub const AMBIGUOUS_ABBREVIATIONS: &[(&str, &str)] = &[
    ("qd", "daily / four times daily"),
    ("qod", "every other day / daily"),
    ("u", "units / zero / four"),
    ("iu", "international units / intravenous"),
    ("ms", "morphine sulfate / magnesium sulfate / multiple sclerosis"),
    ("mso4", "morphine sulfate / magnesium sulfate"),
    ("mgso4", "magnesium sulfate / morphine sulfate"),
    ("hs", "half-strength / at bedtime"),
    ("cc", "cubic centimeters / units / chief complaint"),
    ("dc", "discharge / discontinue"),
    ("d/c", "discharge / discontinue"),
    ("od", "right eye / once daily / overdose"),
    ("ss", "sliding scale / one-half"),
    ("pt", "patient / physical therapy / prothrombin time"),
    ("tiw", "three times a week / twice a week"),
];

/// Uncertainty markers the extraction collaborator leaves unresolved
pub const UNCERTAINTY_MARKERS: &[&str] = &["[UNCLEAR", "[ILLEGIBLE"];

/// Handwriting tag emitted by the extraction collaborator
pub const HANDWRITING_MARKER: &str = "[HANDWRITTEN";

/// Whether a lowercase token is a known medical abbreviation
pub fn is_medical_abbreviation(token: &str) -> bool {
    MEDICAL_ABBREVIATIONS.contains(&token)
}

/// Readings of an ambiguous abbreviation, if the token is one
pub fn ambiguous_meaning(token: &str) -> Option<&'static str> {
    AMBIGUOUS_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, meaning)| *meaning)
}

/// Ambiguous abbreviations present in raw text, in first-appearance order
pub fn find_ambiguous_abbreviations(raw: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for token in crate::normalize::tokens(raw) {
        if let Some((abbr, _)) = AMBIGUOUS_ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == token) {
            if !found.contains(abbr) {
                found.push(*abbr);
            }
        }
    }
    found
}

/// Whether text carries an unresolved `[UNCLEAR` / `[ILLEGIBLE` marker
pub fn has_uncertainty_marker(text: &str) -> bool {
    let upper = text.to_uppercase();
    UNCERTAINTY_MARKERS.iter().any(|m| upper.contains(m))
}

/// Count non-overlapping occurrences of a marker prefix, case-insensitively
pub fn count_marker(text: &str, marker: &str) -> u32 {
    text.to_uppercase().matches(marker).count() as u32
}

/// Text with every marker span removed, from its opening tag through the next `]`
///
/// An unclosed marker runs to the end of the text.
pub fn strip_markers(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        stripped.push_str(&rest[..start]);
        let tail = &rest[start..];
        if starts_with_marker(tail) {
            rest = tail.find(']').map_or("", |end| &tail[end + 1..]);
        } else {
            stripped.push('[');
            rest = &tail[1..];
        }
    }
    stripped.push_str(rest);
    stripped
}

fn starts_with_marker(text: &str) -> bool {
    UNCERTAINTY_MARKERS
        .iter()
        .chain(std::iter::once(&HANDWRITING_MARKER))
        .any(|m| text.get(..m.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(m)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_abbreviations() {
        assert!(is_medical_abbreviation("htn"));
        assert!(is_medical_abbreviation("bid"));
        assert!(!is_medical_abbreviation("metformin"));
    }

    #[test]
    fn test_ambiguous_lookup() {
        assert!(ambiguous_meaning("qd").is_some());
        assert!(ambiguous_meaning("bid").is_none());
    }

    #[test]
    fn test_find_ambiguous_in_text() {
        let found = find_ambiguous_abbreviations("Insulin 10 U QD, insulin 4 u hs");
        assert_eq!(found, vec!["u", "qd", "hs"]);
        assert!(find_ambiguous_abbreviations("Metformin 500mg BID").is_empty());
    }

    #[test]
    fn test_uncertainty_marker_detection() {
        assert!(has_uncertainty_marker("Lisinopril [UNCLEAR: 10 or 40] mg"));
        assert!(has_uncertainty_marker("[illegible] daily"));
        assert!(!has_uncertainty_marker("Lisinopril 10 mg"));
    }

    #[test]
    fn test_count_marker() {
        let text = "[UNCLEAR: a] and [unclear: b] then [ILLEGIBLE]";
        assert_eq!(count_marker(text, "[UNCLEAR"), 2);
        assert_eq!(count_marker(text, "[ILLEGIBLE"), 1);
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("BP [UNCLEAR: 1?0/8_] sitting"), "BP  sitting");
        assert_eq!(strip_markers("[handwritten note] ok [1] [ILLEGIBLE"), " ok [1] ");
        assert_eq!(strip_markers("no markers"), "no markers");
    }
}
