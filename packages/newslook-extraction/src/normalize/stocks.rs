//! Related-stock extraction: a derived set of `{code, name}` pairs,
//! possibly empty.
//!
//! A-share codes are a fixed 6-digit format per exchange (`6` Shanghai,
//! `0`/`3` Shenzhen); we match the code and take the nearest preceding
//! run of CJK characters in parentheses as the name, the common
//! in-text citation style on these sites ("贵州茅台(600519)"). No
//! dictionary lookup: deliberately lightweight, matching the keyword
//! and sentiment extraction in this module.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::article::StockRef;

static CODE_WITH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\p{Han}]{2,8})[（(]([036]\d{5})[）)]").unwrap()
});

/// Extract `{code, name}` pairs cited in `text`, deduplicated by code
/// and ordered by first occurrence. Total: returns an empty `Vec` when
/// nothing matches.
pub fn extract_stocks(text: &str) -> Vec<StockRef> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut stocks = Vec::new();
    for caps in CODE_WITH_NAME.captures_iter(text) {
        let name = caps[1].to_string();
        let code = caps[2].to_string();
        if seen.insert(code.clone()) {
            stocks.push(StockRef { code, name });
        }
    }
    stocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_stocks() {
        assert!(extract_stocks("").is_empty());
    }

    #[test]
    fn extracts_code_and_name_pair() {
        let stocks = extract_stocks("贵州茅台(600519)今日股价上涨");
        assert_eq!(stocks, vec![StockRef { code: "600519".to_string(), name: "贵州茅台".to_string() }]);
    }

    #[test]
    fn extracts_fullwidth_parentheses() {
        let stocks = extract_stocks("浦发银行（600000）发布公告");
        assert_eq!(stocks[0].code, "600000");
    }

    #[test]
    fn deduplicates_repeated_mentions_by_code() {
        let stocks = extract_stocks("贵州茅台(600519)上涨，贵州茅台(600519)尾盘走强");
        assert_eq!(stocks.len(), 1);
    }

    #[test]
    fn text_with_no_stock_citations_yields_empty() {
        assert!(extract_stocks("今日天气晴朗，无重大财经新闻").is_empty());
    }
}
