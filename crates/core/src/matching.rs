//! Answer checking for fill-in-the-blank cards.
//!
//! Case and the punctuation set `. , ! ? ; :` are ignored, surrounding and
//! repeated whitespace is collapsed, and what remains must match exactly.
//! There is no edit-distance tolerance: "Freedm" is wrong.

use crate::model::Card;

const IGNORED_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Canonical form used on both sides of the comparison.
#[must_use]
pub fn normalize_answer(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !IGNORED_PUNCTUATION.contains(c))
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[must_use]
pub fn answers_match(expected: &str, input: &str) -> bool {
    normalize_answer(expected) == normalize_answer(input)
}

/// Judge a student's input against every blank of the card, in quote order.
#[must_use]
pub fn is_correct(card: &Card, input: &str) -> bool {
    answers_match(&card.expected_answer(), input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_punctuation_are_tolerated() {
        assert!(answers_match("Freedom", "freedom."));
        assert!(answers_match("Freedom", "  FREEDOM!  "));
        assert!(answers_match("Freedom", "free:dom"));
    }

    #[test]
    fn typos_are_not_tolerated() {
        assert!(!answers_match("Freedom", "Freedm"));
        assert!(!answers_match("Freedom", "Freedoms"));
    }

    #[test]
    fn other_punctuation_is_significant() {
        assert!(!answers_match("o'clock", "oclock"));
        assert!(answers_match("o'clock", "O'Clock."));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(normalize_answer("  war   is\tpeace "), "war is peace");
        assert!(answers_match("war is peace", "War  is Peace."));
    }

    #[test]
    fn empty_input_only_matches_empty() {
        assert!(!answers_match("Freedom", ""));
        assert!(!answers_match("Freedom", "..."));
    }
}
