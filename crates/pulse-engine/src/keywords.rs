//! Topic extraction from headline batches.
//!
//! A topic is a capitalised token that recurs across a batch. Counting is
//! order-preserving so the same batch always yields the same list.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Topics returned per batch.
pub const MAX_TOPICS: usize = 5;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Capitalised words that open headlines without naming anything.
const BUILTIN_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "these", "those", "are", "was", "were",
    "has", "have", "had", "will", "would", "can", "could", "should", "its", "into", "onto",
    "over", "under", "after", "before", "amid", "about", "says", "said", "you", "your", "our",
    "his", "her", "their", "they", "them", "what", "how", "why", "who", "when", "where",
    "which", "here", "there", "not", "but", "all", "any", "more", "most", "just", "now", "out",
    "off", "top", "best", "first", "last", "breaking", "exclusive", "report", "reports",
    "watch", "video", "photos", "live", "update", "updates", "monday", "tuesday", "wednesday",
    "thursday", "friday", "saturday", "sunday", "january", "february", "march", "april", "may",
    "june", "july", "august", "september", "october", "november", "december",
];

fn stopword_set(exclusions: &[&str]) -> HashSet<String> {
    BUILTIN_STOPWORDS
        .iter()
        .chain(exclusions)
        .map(|w| w.to_lowercase())
        .collect()
}

fn is_candidate(token: &str, stopwords: &HashSet<String>) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
        && token.chars().count() > 2
        && !stopwords.contains(&token.to_lowercase())
}

/// Tally candidate tokens across `titles` and return the top
/// [`MAX_TOPICS`] by count, ties broken by first appearance.
///
/// `exclusions` extends the built-in stop-word list (case-insensitive).
#[must_use]
pub fn extract<S: AsRef<str>>(titles: &[S], exclusions: &[&str]) -> Vec<(String, usize)> {
    let stopwords = stopword_set(exclusions);
    let mut tallies: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for title in titles {
        for token in NON_WORD_RE.split(title.as_ref()) {
            if !is_candidate(token, &stopwords) {
                continue;
            }
            if let Some(&i) = index.get(token) {
                tallies[i].1 += 1;
            } else {
                index.insert(token.to_string(), tallies.len());
                tallies.push((token.to_string(), 1));
            }
        }
    }

    // Stable: equal counts keep first-seen order.
    tallies.sort_by(|a, b| b.1.cmp(&a.1));
    tallies.truncate(MAX_TOPICS);
    tallies
}

/// Whether `title` contains `topic` as a whole token.
#[must_use]
pub fn title_mentions(title: &str, topic: &str) -> bool {
    NON_WORD_RE.split(title).any(|token| token == topic)
}
