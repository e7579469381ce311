//! Text normalization for response comparison.
//!
//! Transcripts and expected responses are reduced to a sequence of lowercase
//! content words before they are scored, so punctuation, casing and common
//! function words never influence the similarity of two replies.

/// Function words excluded from comparison.
pub const STOP_WORDS: [&str; 36] = [
    "a", "an", "and", "are", "the", "to", "is", "of", "on", "in", "for", "it", "this", "that",
    "please", "you", "me", "i", "he", "she", "they", "we", "am", "be", "was", "were", "will",
    "would", "could", "should", "do", "does", "did", "have", "has", "had",
];

/// Returns `true` if `token` is one of the [`STOP_WORDS`].
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Splits `text` into normalized, order-preserving content tokens.
///
/// The input is lowercased, every character other than an ASCII letter,
/// ASCII digit or whitespace becomes a space, the result is split on
/// whitespace runs and stop words are dropped. Empty or punctuation-only
/// input yields an empty vector.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !is_stop_word(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation_and_stop_words_are_removed() {
        assert_eq!(tokenize("Yes, Please."), vec!["yes"]);
    }

    #[test]
    fn test_order_is_preserved() {
        assert_eq!(
            tokenize("The next departure is scheduled at 6.45pm."),
            vec!["next", "departure", "scheduled", "at", "6", "45pm"]
        );
    }

    #[test]
    fn test_apostrophes_split_words() {
        // "don't" becomes "don" + "t"; "i" is a stop word.
        assert_eq!(tokenize("I don't know"), vec!["don", "t", "know"]);
    }

    #[test]
    fn test_empty_and_punctuation_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("?!... ,;").is_empty());
    }

    #[test]
    fn test_only_stop_words() {
        assert!(tokenize("Would you please do that?").is_empty());
    }

    #[test]
    fn test_non_ascii_letters_become_separators() {
        assert_eq!(tokenize("Café Zürich"), vec!["caf", "z", "rich"]);
    }

    #[test]
    fn test_unicode_whitespace_is_a_separator() {
        assert_eq!(tokenize("chief\u{00a0}guest\tarrived"), vec!["chief", "guest", "arrived"]);
    }

    #[test]
    fn test_stop_word_list_is_closed() {
        assert_eq!(STOP_WORDS.len(), 36);
        assert!(is_stop_word("please"));
        assert!(!is_stop_word("yes"));
    }
}
