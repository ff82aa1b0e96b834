//! Name normalization and trigram extraction for fuzzy name search.
//!
//! A name is normalized (diacritics stripped, lower-cased, whitespace collapsed)
//! and cut into overlapping 3-character windows. Windows are counted in
//! characters, not bytes, so `"Æther"` and `"Lim-Dûl"` behave like ASCII names.
//! Output is deterministic: the same input always yields the same fragments in
//! the same order.

use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub const TRIGRAM_LEN: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigramEntry {
    /// Id of the entity the fragments describe.
    pub partition_key: String,
    /// Normalized name the fragments were cut from.
    pub source: String,
    /// Deduplicated, in first-occurrence order.
    pub fragments: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TrigramIndexBuilder;

impl TrigramIndexBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, partition_key: impl Into<String>, raw_name: &str) -> TrigramEntry {
        let source = normalize(raw_name);
        let fragments = fragments(&source);
        TrigramEntry {
            partition_key: partition_key.into(),
            source,
            fragments,
        }
    }
}

/// Strips diacritics, lower-cases, collapses runs of whitespace and trims.
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = stripped.to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All 3-character windows of an already normalized string, deduplicated.
/// Strings shorter than three characters are their own single fragment.
pub fn fragments(normalized: &str) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < TRIGRAM_LEN {
        return vec![normalized.to_string()];
    }

    let mut out: Vec<String> = Vec::with_capacity(chars.len() - 2);
    for window in chars.windows(TRIGRAM_LEN) {
        let fragment: String = window.iter().collect();
        if !out.contains(&fragment) {
            out.push(fragment);
        }
    }
    out
}

/// Fragments to look up for a free-text search query.
pub fn query_fragments(query: &str) -> Vec<String> {
    let normalized = normalize(query);
    if normalized.is_empty() {
        return Vec::new();
    }
    fragments(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_windows(normalized: &str) -> Vec<String> {
        let chars: Vec<char> = normalized.chars().collect();
        chars.windows(3).map(|w| w.iter().collect()).collect()
    }

    #[test]
    fn black_lotus_yields_nine_unique_fragments() {
        let entry = TrigramIndexBuilder::new().build("card-1", "Black Lotus");
        assert_eq!(entry.source, "black lotus");
        assert_eq!(
            entry.fragments,
            vec!["bla", "lac", "ack", "ck ", "k l", " lo", "lot", "otu", "tus"]
        );
        assert_eq!(entry.partition_key, "card-1");
    }

    #[test]
    fn normalization_strips_diacritics_and_collapses_whitespace() {
        assert_eq!(normalize("  Lim-Dûl's   Vault "), "lim-dul's vault");
        assert_eq!(normalize("Séance\t\nÉtude"), "seance etude");
        assert_eq!(normalize("JÖTUN GRUNT"), "jotun grunt");
    }

    #[test]
    fn window_count_matches_normalized_length_before_dedup() {
        for name in ["Black Lotus", "Æther Vial", "Ghazbán Ogre", "Aaaaaa", "Llanowar Elves"] {
            let normalized = normalize(name);
            let len = normalized.chars().count();
            assert_eq!(raw_windows(&normalized).len(), len - 2, "{name}");
        }
    }

    #[test]
    fn duplicates_keep_first_occurrence_order() {
        let entry = TrigramIndexBuilder::new().build("x", "abcabcab");
        // windows: abc bca cab abc bca cab
        assert_eq!(entry.fragments, vec!["abc", "bca", "cab"]);

        let windows = raw_windows(&entry.source);
        let mut last_seen = 0;
        for fragment in &entry.fragments {
            let first = windows.iter().position(|w| w == fragment).unwrap();
            assert!(first >= last_seen);
            last_seen = first;
        }
    }

    #[test]
    fn short_names_are_a_single_fragment() {
        let builder = TrigramIndexBuilder::new();
        assert_eq!(builder.build("a", "Ow").fragments, vec!["ow"]);
        assert_eq!(builder.build("b", " É ").fragments, vec!["e"]);
        assert_eq!(builder.build("c", "").fragments, vec![""]);
    }

    #[test]
    fn windows_are_counted_in_characters() {
        let entry = TrigramIndexBuilder::new().build("x", "Dûl");
        assert_eq!(entry.fragments, vec!["dul"]);
        let entry = TrigramIndexBuilder::new().build("y", "ÆÆÆÆ");
        assert_eq!(entry.source, "ææææ");
        assert_eq!(entry.fragments, vec!["æææ"]);
    }

    #[test]
    fn build_is_idempotent() {
        let builder = TrigramIndexBuilder::new();
        let a = builder.build("k", "Jace, the Mind Sculptor");
        let b = builder.build("k", "Jace, the Mind Sculptor");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn empty_query_has_no_fragments() {
        assert!(query_fragments("   ").is_empty());
        assert_eq!(query_fragments("LOT"), vec!["lot"]);
    }
}
