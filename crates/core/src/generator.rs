//! Derives fill-in-the-blank cards from quotes.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use thiserror::Error;

use crate::model::{BLANK_MARKER, CardDraft, CardError, DifficultyLevel, Quote, ThemeId};

/// Words never worth blanking out.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "just", "me", "my", "no", "not", "of", "on", "one", "or", "our", "out", "she", "so", "some",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "to", "too", "up", "us", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GeneratorError {
    #[error("quote text is empty")]
    EmptyQuote,

    #[error("at least one blank must be requested")]
    ZeroBlanks,

    #[error("requested {requested} blanks but only {available} eligible words")]
    NotEnoughEligibleWords { requested: usize, available: usize },

    #[error(transparent)]
    Card(#[from] CardError),
}

/// How blanks are picked among eligible words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlankSelection {
    /// Longest eligible words first; ties go to the earlier word.
    #[default]
    Longest,
    /// Uniformly random eligible words, reproducible from the seed.
    Random { seed: u64 },
}

/// Which words may be blanked and how many.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPolicy {
    blanks: usize,
    min_word_len: usize,
    skip_stopwords: bool,
    selection: BlankSelection,
    difficulty: Option<DifficultyLevel>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            blanks: 1,
            min_word_len: 3,
            skip_stopwords: true,
            selection: BlankSelection::Longest,
            difficulty: None,
        }
    }
}

impl RedactionPolicy {
    /// # Errors
    ///
    /// Returns `GeneratorError::ZeroBlanks` when `blanks` is zero.
    pub fn with_blanks(blanks: usize) -> Result<Self, GeneratorError> {
        if blanks == 0 {
            return Err(GeneratorError::ZeroBlanks);
        }
        Ok(Self {
            blanks,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn min_word_len(mut self, len: usize) -> Self {
        self.min_word_len = len;
        self
    }

    #[must_use]
    pub fn keep_stopwords(mut self) -> Self {
        self.skip_stopwords = false;
        self
    }

    #[must_use]
    pub fn selection(mut self, selection: BlankSelection) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn difficulty(mut self, level: DifficultyLevel) -> Self {
        self.difficulty = Some(level);
        self
    }

    #[must_use]
    pub fn blanks(&self) -> usize {
        self.blanks
    }

    /// Explicit level if set, otherwise one level per blank (capped at 5).
    #[must_use]
    pub fn effective_difficulty(&self) -> DifficultyLevel {
        self.difficulty.unwrap_or_else(|| {
            let level = u8::try_from(self.blanks)
                .unwrap_or(DifficultyLevel::MAX)
                .clamp(DifficultyLevel::MIN, DifficultyLevel::MAX);
            DifficultyLevel::new(level).unwrap_or_default()
        })
    }

    fn is_eligible(&self, word: &str) -> bool {
        let letters = word.chars().filter(|c| c.is_alphabetic()).count();
        letters >= self.min_word_len.max(1)
            && word
                .chars()
                .all(|c| c.is_alphabetic() || c == '\'' || c == '-')
            && !(self.skip_stopwords && STOPWORDS.contains(&word.to_lowercase().as_str()))
    }
}

/// A whitespace token split into leading punctuation, the word, and trailing punctuation.
struct Token<'a> {
    lead: &'a str,
    word: &'a str,
    trail: &'a str,
}

impl<'a> Token<'a> {
    fn split(raw: &'a str) -> Self {
        let start = raw
            .char_indices()
            .find(|(_, c)| c.is_alphanumeric())
            .map_or(raw.len(), |(i, _)| i);
        let end = raw
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_alphanumeric())
            .map_or(start, |(i, c)| i + c.len_utf8());
        let end = end.max(start);
        Self {
            lead: &raw[..start],
            word: &raw[start..end],
            trail: &raw[end..],
        }
    }
}

/// Generate one card draft from a quote.
///
/// The card inherits the quote's themes as its own starting theme set.
///
/// # Errors
///
/// - `EmptyQuote` if the quote text is blank.
/// - `NotEnoughEligibleWords` if fewer words qualify than blanks requested.
pub fn generate_card(
    quote: &Quote,
    quote_themes: &BTreeSet<ThemeId>,
    policy: &RedactionPolicy,
) -> Result<CardDraft, GeneratorError> {
    if quote.text.trim().is_empty() {
        return Err(GeneratorError::EmptyQuote);
    }
    if policy.blanks == 0 {
        return Err(GeneratorError::ZeroBlanks);
    }

    let tokens: Vec<Token<'_>> = quote.text.split_whitespace().map(Token::split).collect();
    let eligible: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| policy.is_eligible(token.word))
        .map(|(i, _)| i)
        .collect();

    if eligible.len() < policy.blanks {
        return Err(GeneratorError::NotEnoughEligibleWords {
            requested: policy.blanks,
            available: eligible.len(),
        });
    }

    let mut chosen: Vec<usize> = match policy.selection {
        BlankSelection::Longest => {
            let mut ranked = eligible.clone();
            ranked.sort_by(|&a, &b| {
                let len_a = tokens[a].word.chars().count();
                let len_b = tokens[b].word.chars().count();
                len_b.cmp(&len_a).then(a.cmp(&b))
            });
            ranked.truncate(policy.blanks);
            ranked
        }
        BlankSelection::Random { seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            sample(&mut rng, eligible.len(), policy.blanks)
                .into_iter()
                .map(|i| eligible[i])
                .collect()
        }
    };
    chosen.sort_unstable();

    let mut missing_words = Vec::with_capacity(chosen.len());
    let mut parts = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if chosen.binary_search(&i).is_ok() {
            missing_words.push(token.word.to_string());
            parts.push(format!("{}{BLANK_MARKER}{}", token.lead, token.trail));
        } else {
            parts.push(format!("{}{}{}", token.lead, token.word, token.trail));
        }
    }

    let draft = CardDraft {
        quote_id: quote.id,
        card_text: parts.join(" "),
        missing_words,
        missing_positions: chosen,
        difficulty: policy.effective_difficulty(),
        theme_ids: quote_themes.clone(),
    };
    draft.validate()?;
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookId, CardId, QuoteId};
    use crate::time::fixed_now;

    fn quote(text: &str) -> Quote {
        Quote::new(QuoteId::new(1), BookId::new(1), "Party slogan", text)
    }

    #[test]
    fn blanks_the_longest_word() {
        let draft = generate_card(
            &quote("War is peace. Freedom is slavery."),
            &BTreeSet::new(),
            &RedactionPolicy::default(),
        )
        .unwrap();

        // "Freedom" and "slavery" tie on length; the earlier word wins.
        assert_eq!(draft.card_text, "War is peace. _____ is slavery.");
        assert_eq!(draft.missing_words, vec!["Freedom".to_string()]);
        assert_eq!(draft.missing_positions, vec![3]);
    }

    #[test]
    fn ties_go_to_the_earlier_word() {
        let draft = generate_card(
            &quote("alpha bravo"),
            &BTreeSet::new(),
            &RedactionPolicy::default(),
        )
        .unwrap();
        assert_eq!(draft.missing_words, vec!["alpha".to_string()]);
    }

    #[test]
    fn multiple_blanks_are_recorded_in_quote_order() {
        let policy = RedactionPolicy::with_blanks(2).unwrap();
        let draft = generate_card(
            &quote("Ignorance is strength, and freedom is slavery"),
            &BTreeSet::new(),
            &policy,
        )
        .unwrap();

        assert_eq!(draft.missing_positions, vec![0, 2]);
        assert_eq!(draft.missing_words, vec!["Ignorance", "strength"]);
        assert_eq!(draft.card_text, "_____ is _____, and freedom is slavery");
        assert_eq!(draft.difficulty.value(), 2);

        let card = draft.assign_id(CardId::new(9), fixed_now()).unwrap();
        assert_eq!(card.reconstruct(), "Ignorance is strength, and freedom is slavery");
    }

    #[test]
    fn stopwords_and_short_words_are_not_eligible() {
        let err = generate_card(&quote("It is what it is, ok?"), &BTreeSet::new(), &RedactionPolicy::default())
            .unwrap_err();
        assert_eq!(
            err,
            GeneratorError::NotEnoughEligibleWords {
                requested: 1,
                available: 0
            }
        );

        let relaxed = RedactionPolicy::default().keep_stopwords().min_word_len(2);
        let draft = generate_card(&quote("It is what it is, ok?"), &BTreeSet::new(), &relaxed).unwrap();
        assert_eq!(draft.missing_words, vec!["what".to_string()]);
    }

    #[test]
    fn empty_quote_is_rejected() {
        let err = generate_card(&quote("   "), &BTreeSet::new(), &RedactionPolicy::default())
            .unwrap_err();
        assert_eq!(err, GeneratorError::EmptyQuote);
    }

    #[test]
    fn zero_blanks_is_rejected() {
        assert_eq!(
            RedactionPolicy::with_blanks(0).unwrap_err(),
            GeneratorError::ZeroBlanks
        );
    }

    #[test]
    fn random_selection_is_reproducible() {
        let text = "The clocks were striking thirteen on a bright cold April day";
        let policy = RedactionPolicy::with_blanks(3)
            .unwrap()
            .selection(BlankSelection::Random { seed: 7 });
        let first = generate_card(&quote(text), &BTreeSet::new(), &policy).unwrap();
        let second = generate_card(&quote(text), &BTreeSet::new(), &policy).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.missing_words.len(), 3);
        assert!(first.missing_positions.windows(2).all(|w| w[0] < w[1]));
        first.validate().unwrap();
    }

    #[test]
    fn card_inherits_quote_themes() {
        let themes: BTreeSet<ThemeId> = [ThemeId::new(4), ThemeId::new(8)].into();
        let draft = generate_card(&quote("Big Brother is watching you"), &themes, &RedactionPolicy::default())
            .unwrap();
        assert_eq!(draft.theme_ids, themes);
        assert_eq!(draft.missing_words, vec!["watching".to_string()]);
    }

    #[test]
    fn explicit_difficulty_wins() {
        let policy = RedactionPolicy::default().difficulty(DifficultyLevel::new(4).unwrap());
        let draft = generate_card(&quote("Big Brother is watching you"), &BTreeSet::new(), &policy)
            .unwrap();
        assert_eq!(draft.difficulty.value(), 4);
    }
}
