//! Keyword extraction.
//!
//! Chinese text has no whitespace between words, so simple
//! whitespace-split tokenization degenerates to character-level noise.
//! We segment on Unicode word boundaries (`unicode-segmentation`) and
//! additionally break CJK runs into overlapping bigrams, which is the
//! standard lightweight substitute for a full dictionary-based Chinese
//! segmenter and is adequate for frequency-based keyword ranking.
//! Deliberately lightweight: no ML model, no dictionary lookup.

use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

const STOPWORDS: &[&str] = &[
    "的", "了", "和", "是", "在", "就", "都", "而", "及", "与", "或", "一个", "没有", "我们",
    "你们", "他们", "这个", "那个", "一下", "可以", "这样", "因为", "所以", "但是", "表示",
    "记者", "据悉", "报道", "the", "a", "an", "and", "or", "of", "to", "in", "is", "for",
];

/// Return the top-`k` terms in `text` ordered by frequency, ties broken
/// by first occurrence. Total: returns an empty vector for empty input.
pub fn extract_keywords(text: &str, k: usize) -> Vec<String> {
    if text.trim().is_empty() || k == 0 {
        return Vec::new();
    }

    let stopwords: std::collections::HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut order = 0usize;

    for token in tokenize(text) {
        if token.chars().count() < 2 || stopwords.contains(token.as_str()) {
            continue;
        }
        *counts.entry(token.clone()).or_insert(0) += 1;
        first_seen.entry(token).or_insert_with(|| {
            order += 1;
            order
        });
    }

    let mut terms: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(term, count)| {
            let seen = first_seen[&term];
            (term, count, seen)
        })
        .collect();

    terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    terms.into_iter().take(k).map(|(term, _, _)| term).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.unicode_words() {
        if is_cjk(word) {
            tokens.extend(cjk_bigrams(word));
        } else {
            tokens.push(word.to_lowercase());
        }
    }
    tokens
}

fn is_cjk(word: &str) -> bool {
    word.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}

fn cjk_bigrams(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= 1 {
        return chars.iter().map(|c| c.to_string()).collect();
    }
    chars.windows(2).map(|w| w.iter().collect()).collect()
}
