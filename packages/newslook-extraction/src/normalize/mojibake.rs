//! Mojibake repair.
//!
//! Detects common GBK-as-UTF-8 and UTF-8-as-Latin1 misdecodings: scan
//! for replacement-character runs, then trial re-encode/re-decode and
//! keep the result only if it raises the ratio of CJK codepoints.
//! Deterministic and idempotent: running it twice is a no-op on already
//! clean text.

use encoding_rs::{GBK, WINDOWS_1252};

/// Repair text suspected of having been decoded under the wrong charset.
/// Total: returns the input unchanged if no repair improves it.
pub fn repair_mojibake(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let original_score = cjk_ratio(text);
    if original_score > 0.3 && !text.contains('\u{FFFD}') {
        // Already looks like healthy CJK text; repairing would be a no-op
        // at best and destructive at worst.
        return text.to_string();
    }

    let mut best = text.to_string();
    let mut best_score = original_score;

    if let Some(candidate) = reencode_as_gbk(text) {
        let score = cjk_ratio(&candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }

    if let Some(candidate) = reencode_as_latin1_then_utf8(text) {
        let score = cjk_ratio(&candidate);
        if score > best_score {
            best = candidate;
        }
    }

    best
}

/// Treat `text`'s bytes (re-encoded as Windows-1252, the common
/// "UTF-8-as-Latin1" mishap) as GBK and redecode.
fn reencode_as_gbk(text: &str) -> Option<String> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return None;
    }
    let (decoded, _, had_errors) = GBK.decode(&bytes);
    if had_errors {
        return None;
    }
    Some(decoded.into_owned())
}

/// Treat `text` as if its UTF-8 bytes were misinterpreted as Latin-1
/// codepoints, then redecode the original bytes as UTF-8.
fn reencode_as_latin1_then_utf8(text: &str) -> Option<String> {
    let bytes: Vec<u8> = text.chars().map(|c| c as u32).filter(|&cp| cp <= 0xFF).map(|cp| cp as u8).collect();
    if bytes.len() != text.chars().count() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn cjk_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            cjk += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_clean_cjk_text_untouched() {
        let text = "中国经济持续增长";
        assert_eq!(repair_mojibake(text), text);
    }

    #[test]
    fn is_idempotent_on_clean_text() {
        let text = "中国经济";
        let once = repair_mojibake(text);
        let twice = repair_mojibake(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_is_total() {
        assert_eq!(repair_mojibake(""), "");
    }
}
