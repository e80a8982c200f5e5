//! Text / Encoding Normalizer.
//!
//! Pure functions only: no I/O, no exceptions on empty input. A
//! regex-based HTML-to-text pass (rather than HTML-to-markdown, since
//! the pipeline stores `content` as plain text) plus CJK-aware
//! tokenization for this domain.

mod keywords;
mod mojibake;
mod sentiment;
mod stocks;

pub use keywords::extract_keywords;
pub use mojibake::repair_mojibake;
pub use sentiment::classify_sentiment;
pub use stocks::extract_stocks;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap());
static BLOCK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|br)\s*>|<br\s*/?>").unwrap()
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static UNICODE_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap());
static PERCENT_ENCODED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(%[0-9a-fA-F]{2}){3,}").unwrap());
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d+);").unwrap());
static HEX_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#[xX]([0-9a-fA-F]+);").unwrap());

/// Decode `\uXXXX` escapes, percent-encoded runs, HTML entities, collapse
/// whitespace, and NFC-normalize. Total: never panics, never errors on
/// empty input.
pub fn normalize_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text = raw.to_string();

    text = UNICODE_ESCAPE
        .replace_all(&text, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    if PERCENT_ENCODED.is_match(&text) {
        if let Ok(decoded) = percent_decode(&text) {
            text = decoded;
        }
    }

    text = HEX_ENTITY
        .replace_all(&text, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();
    text = NUMERIC_ENTITY
        .replace_all(&text, |caps: &regex::Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();
    text = decode_named_entities(&text);

    text = MULTI_SPACE.replace_all(&text, " ").into_owned();
    text = MULTI_NEWLINE.replace_all(&text, "\n\n").into_owned();
    text = text.trim().to_string();

    text.nfc().collect()
}

/// Remove script/style, collapse block-level boundaries to newlines,
/// strip remaining tags, then run through [`normalize_text`].
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut text = SCRIPT_STYLE.replace_all(html, "").into_owned();
    text = BLOCK_TAGS.replace_all(&text, "\n").into_owned();
    text = ANY_TAG.replace_all(&text, "").into_owned();

    normalize_text(&text)
}

fn decode_named_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

fn percent_decode(text: &str) -> Result<String, std::string::FromUtf8Error> {
    let mut bytes = Vec::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' && i + 2 < chars.len() {
            let hex: String = chars[i + 1..i + 3].iter().collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
        i += 1;
    }
    String::from_utf8(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_is_total_on_empty_input() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn decodes_unicode_escapes() {
        let out = normalize_text(r"中国");
        assert_eq!(out, "中国");
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(normalize_text("A &amp; B"), "A & B");
        assert_eq!(normalize_text("&#20013;&#22269;"), "中国");
    }

    #[test]
    fn html_to_text_strips_tags_and_scripts() {
        let html = "<div><script>evil()</script><p>中国经济</p><br/><p>增长</p></div>";
        let out = html_to_text(html);
        assert!(out.contains("中国经济"));
        assert!(out.contains("增长"));
        assert!(!out.contains("evil"));
        assert!(!out.contains('<'));
    }

    #[test]
    fn collapses_excess_whitespace() {
        let out = normalize_text("a\n\n\n\nb   c");
        assert_eq!(out, "a\n\nb c");
    }
}
