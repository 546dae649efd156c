//! Tokenization adapter.
//!
//! Contract: input is raw wikitext (possibly empty); output is a flat list
//! of tokens that, concatenated in order, reconstruct the NFC-normalized
//! input exactly. Word, whitespace, and punctuation runs are each their own
//! token (word-bound segmentation), so later diffing operates at roughly
//! word granularity rather than character or line granularity.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Normalize to NFC and split into word-bound segments.
pub fn tokenize(input: &str) -> Vec<String> {
    let normalized: String = input.nfc().collect();
    normalized.split_word_bounds().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_input_exactly() {
        let s = "The quick, brown fox.";
        let tokens = tokenize(s);
        assert_eq!(tokens.concat(), s);
    }

    #[test]
    fn splits_words_from_punctuation_and_whitespace() {
        let tokens = tokenize("Hello, world!");
        assert_eq!(tokens, vec!["Hello", ",", " ", "world", "!"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn nfc_equivalence() {
        let decomposed = "e\u{0301}cole"; // e + combining acute + cole
        let composed = "\u{00E9}cole"; // precomposed école
        assert_eq!(tokenize(decomposed), tokenize(composed));
    }
}
