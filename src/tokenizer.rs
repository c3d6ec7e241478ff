/// Lowercase a UTF-8 string and split it on runs of Unicode whitespace.
///
/// This is the only tokenizer in the engine and it MUST be identical
/// between index build and query time: no stemming, no stopword removal,
/// no punctuation stripping. Empty tokens are discarded.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Python is a High-Level language"),
            vec!["python", "is", "a", "high-level", "language"]
        );
    }

    #[test]
    fn test_tokenize_collapses_whitespace_runs() {
        assert_eq!(tokenize("  a \t b\n\nc  "), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tokenize_empty_and_whitespace_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t\n ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_punctuation() {
        assert_eq!(tokenize("scikit-learn!"), vec!["scikit-learn!"]);
    }

    #[test]
    fn test_tokenize_unicode_whitespace() {
        // U+00A0 no-break space and U+3000 ideographic space both split
        assert_eq!(tokenize("a\u{00a0}b\u{3000}c"), vec!["a", "b", "c"]);
    }
}
