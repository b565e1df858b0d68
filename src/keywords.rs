//! Frequency-based keyword extraction.
//!
//! Text is split with a Treebank-style tokenizer, lowercased, filtered
//! against the stopword list and non-alphanumeric tokens, and ranked by
//! frequency. Ties keep the order in which words first appear, so the same
//! text always yields the same keywords.

use indexmap::IndexMap;

use crate::models::SearchTerms;
use crate::stopwords::Stopwords;

/// Default number of keywords returned by [`common_words`].
pub const DEFAULT_MAX_ITEMS: usize = 15;

/// English clitics split off the end of a word, as the Penn Treebank does.
const CLITICS: &[&str] = &["n't", "'s", "'re", "'ve", "'ll", "'d", "'m"];

/// Split text into word and punctuation tokens.
///
/// Leading and trailing punctuation become separate tokens, and clitics
/// (`don't` → `do`, `n't`) are split from their stem. Hyphens, periods and
/// apostrophes inside a word stay part of the token.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split_whitespace() {
        let word = word.replace('\u{2019}', "'");
        split_word(&word, &mut tokens);
    }
    tokens
}

fn split_word(word: &str, out: &mut Vec<String>) {
    let mut rest = word;

    while let Some(c) = rest.chars().next() {
        if c.is_alphanumeric() {
            break;
        }
        out.push(c.to_string());
        rest = &rest[c.len_utf8()..];
    }

    let mut trailing = Vec::new();
    while let Some(c) = rest.chars().next_back() {
        if c.is_alphanumeric() {
            break;
        }
        trailing.push(c.to_string());
        rest = &rest[..rest.len() - c.len_utf8()];
    }

    if !rest.is_empty() {
        let clitic = CLITICS.iter().find(|c| {
            rest.len() > c.len()
                && rest.is_char_boundary(rest.len() - c.len())
                && rest[rest.len() - c.len()..].eq_ignore_ascii_case(c)
        });
        match clitic {
            Some(c) => {
                let split = rest.len() - c.len();
                out.push(rest[..split].to_string());
                out.push(rest[split..].to_string());
            }
            None => out.push(rest.to_string()),
        }
    }

    out.extend(trailing.into_iter().rev());
}

fn is_alnum(word: &str) -> bool {
    !word.is_empty() && word.chars().all(char::is_alphanumeric)
}

/// Count lowercased, non-stopword, alphanumeric words.
///
/// Returns `(word, count)` pairs sorted by descending count; equal counts
/// keep first-occurrence order.
pub fn word_frequencies(text: &str, stopwords: &Stopwords) -> Vec<(String, usize)> {
    let mut freq: IndexMap<String, usize> = IndexMap::new();

    for token in tokenize(text) {
        let word = token.to_lowercase();
        if !is_alnum(&word) || stopwords.contains(&word) {
            continue;
        }
        *freq.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// The `max_items` most frequent words of `text`.
pub fn common_words(text: &str, max_items: usize, stopwords: &Stopwords) -> SearchTerms {
    let keywords = word_frequencies(text, stopwords)
        .into_iter()
        .take(max_items)
        .map(|(word, _)| word)
        .collect();

    SearchTerms {
        keywords,
        ..Default::default()
    }
}
