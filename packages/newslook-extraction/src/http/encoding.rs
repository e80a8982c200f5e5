//! Charset detection and decoding for publisher response bodies.
//!
//! Chinese financial sites are inconsistent about declaring `charset`;
//! some serve GBK/GB18030 bytes under an incorrect `utf-8` header. We
//! inspect `Content-Type` first, then fall back to a CJK-density
//! heuristic over the candidate decodings in order.

use encoding_rs::{Encoding, GB18030, GBK, UTF_8};

/// Decode `body` to a `String`, trying the declared charset first (if
/// any and recognized) and otherwise {utf-8, gbk, gb18030} in order,
/// picking whichever candidate yields the fewest replacement characters
/// and the highest density of CJK codepoints.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Option<String> {
    if body.is_empty() {
        return Some(String::new());
    }

    if let Some(declared) = content_type.and_then(extract_charset).and_then(|c| Encoding::for_label(c.as_bytes())) {
        let (text, _, had_errors) = declared.decode(body);
        if !had_errors {
            return Some(text.into_owned());
        }
    }

    [UTF_8, GBK, GB18030]
        .iter()
        .map(|enc| {
            let (text, _, had_errors) = enc.decode(body);
            (text.into_owned(), had_errors)
        })
        .filter(|(_, had_errors)| !had_errors)
        .max_by(|(a, _), (b, _)| cjk_density(a).partial_cmp(&cjk_density(b)).unwrap())
        .map(|(text, _)| text)
        .or_else(|| {
            // Nothing decoded cleanly; fall back to lossy UTF-8 so callers
            // still get a string, accepting U+FFFD replacement runs.
            let (text, _, _) = UTF_8.decode(body);
            Some(text.into_owned())
        })
}

fn extract_charset(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("charset="))
        .map(|c| c.trim_matches('"'))
}

/// Fraction of non-whitespace characters that fall in the common CJK
/// Unified Ideographs block.
fn cjk_density(text: &str) -> f64 {
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
    use encoding_rs::GBK;

    #[test]
    fn decodes_gbk_body_without_declared_charset() {
        let (bytes, _, _) = GBK.encode("中国经济");
        let decoded = decode_body(&bytes, None).unwrap();
        assert_eq!(decoded, "中国经济");
    }

    #[test]
    fn decodes_utf8_body_with_declared_charset() {
        let body = "中国经济".as_bytes();
        let decoded = decode_body(body, Some("text/html; charset=utf-8")).unwrap();
        assert_eq!(decoded, "中国经济");
    }

    #[test]
    fn empty_body_decodes_to_empty_string() {
        assert_eq!(decode_body(&[], None), Some(String::new()));
    }
}
