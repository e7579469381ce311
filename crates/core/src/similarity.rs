//! Hybrid similarity scoring between a learner's reply and the expected response.
//!
//! Two metrics are combined over the tokenized text: set overlap (Jaccard)
//! rewards saying the right words in any order, while a normalized
//! Levenshtein distance over the re-joined token strings rewards saying them
//! the right way. The weighted sum is reported as an integer percentage.

use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Relative weights of the two metrics. They are expected to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub set_overlap: f64,
    pub edit: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            set_overlap: 0.5,
            edit: 0.5,
        }
    }
}

/// The components behind a single score, kept for logging and display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub jaccard: f64,
    pub normalized_edit: f64,
    /// Final score in `0..=100`.
    pub score: u8,
}

impl Similarity {
    const NONE: Similarity = Similarity {
        jaccard: 0.0,
        normalized_edit: 0.0,
        score: 0,
    };
}

/// Scores replies against expected responses with fixed metric weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoreWeights,
}

impl Scorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Computes the full similarity breakdown of `input` against `expected`.
    ///
    /// If either side tokenizes to nothing the result is zero across the
    /// board, so silence transcribed as punctuation never matches anything.
    pub fn evaluate(&self, input: &str, expected: &str) -> Similarity {
        let input_tokens = tokenize(input);
        let expected_tokens = tokenize(expected);
        if input_tokens.is_empty() || expected_tokens.is_empty() {
            return Similarity::NONE;
        }

        let jaccard = jaccard(&input_tokens, &expected_tokens);

        let joined_input = input_tokens.join(" ");
        let joined_expected = expected_tokens.join(" ");
        let distance = levenshtein(&joined_input, &joined_expected);
        let max_len = joined_input
            .chars()
            .count()
            .max(joined_expected.chars().count())
            .max(1);
        let normalized_edit = 1.0 - distance as f64 / max_len as f64;

        let raw =
            (jaccard * self.weights.set_overlap + normalized_edit * self.weights.edit) * 100.0;
        Similarity {
            jaccard,
            normalized_edit,
            score: raw.clamp(0.0, 100.0).round() as u8,
        }
    }

    /// Convenience wrapper returning only the integer score.
    pub fn score(&self, input: &str, expected: &str) -> u8 {
        self.evaluate(input, expected).score
    }
}

/// Scores `input` against `expected` with the default 0.5/0.5 weights.
pub fn score(input: &str, expected: &str) -> u8 {
    Scorer::default().score(input, expected)
}

/// Intersection over union of the two token sets.
///
/// Returns 0 when both sides are empty.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Unit-cost Levenshtein distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j]
            } else {
                1 + previous[j].min(previous[j + 1]).min(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_levenshtein_classic_cases() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_jaccard_overlap() {
        assert_abs_diff_eq!(
            jaccard(&tokens(&["next", "train"]), &tokens(&["next", "bus"])),
            1.0 / 3.0
        );
        assert_abs_diff_eq!(jaccard(&tokens(&["a", "a"]), &tokens(&["a"])), 1.0);
        assert_abs_diff_eq!(jaccard(&[], &[]), 0.0);
    }

    #[test]
    fn test_identical_text_scores_full_marks() {
        assert_eq!(score("Yes please", "Yes, Please."), 100);
        assert_eq!(
            score(
                "He has confirmed that he will reach the venue by 6 p.m.",
                "He has confirmed that he will reach the venue by 6 p.m."
            ),
            100
        );
    }

    #[test]
    fn test_empty_sides_score_zero() {
        assert_eq!(score("Mr. Joshi", ""), 0);
        assert_eq!(score("", "Mr. Joshi"), 0);
        assert_eq!(score("...", "Mr. Joshi"), 0);
        assert_eq!(score("please", "please"), 0);
    }

    #[test]
    fn test_disjoint_reply_scores_zero() {
        let similarity = Scorer::default().evaluate("I don't know", "Yes, Please.");
        assert_abs_diff_eq!(similarity.jaccard, 0.0);
        assert_abs_diff_eq!(similarity.normalized_edit, 0.0);
        assert_eq!(similarity.score, 0);
    }

    #[test]
    fn test_partial_match_breakdown() {
        // "next train" vs "next bus": jaccard 1/3, distance 5 over 10 chars.
        let similarity = Scorer::default().evaluate("next train", "next bus");
        assert_abs_diff_eq!(similarity.jaccard, 1.0 / 3.0);
        assert_abs_diff_eq!(similarity.normalized_edit, 0.5);
        assert_eq!(similarity.score, 42);
    }

    #[test]
    fn test_score_is_symmetric() {
        let pairs = [
            ("next train", "next bus"),
            ("Yes. It reaches Ahmedabad around 4 am", "reaches around four"),
            ("Sure, fill in this form", "Please fill the form"),
            ("", "anything"),
        ];
        for (a, b) in pairs {
            assert_eq!(score(a, b), score(b, a), "asymmetric for {a:?} / {b:?}");
        }
    }

    #[test]
    fn test_custom_weights_change_the_blend() {
        let set_only = Scorer::new(ScoreWeights {
            set_overlap: 1.0,
            edit: 0.0,
        });
        assert_eq!(set_only.score("next train", "next bus"), 33);

        let edit_only = Scorer::new(ScoreWeights {
            set_overlap: 0.0,
            edit: 1.0,
        });
        assert_eq!(edit_only.score("next train", "next bus"), 50);
    }

    #[test]
    fn test_out_of_range_weights_are_clamped() {
        let heavy = Scorer::new(ScoreWeights {
            set_overlap: 2.0,
            edit: 2.0,
        });
        assert_eq!(heavy.score("ticket", "ticket"), 100);

        let negative = Scorer::new(ScoreWeights {
            set_overlap: -1.0,
            edit: -1.0,
        });
        assert_eq!(negative.score("ticket", "ticket"), 0);
    }
}
