//! Built-in [`SourceConfig`] values for the five publishers this crate
//! ships extractors for out of the box. Selectors are best-effort
//! approximations of each site's current markup; a deployment is free
//! to override them without touching code, since `SourceConfig` is
//! plain data, declared rather than embedded in the extractor.

use std::collections::HashMap;

use crate::types::config::{SourceConfig, SourceSelectors};

fn category_urls(base: &str, categories: &[(&str, &str)]) -> HashMap<String, String> {
    categories
        .iter()
        .map(|(name, path)| (name.to_string(), format!("{base}{path}")))
        .collect()
}

pub fn sina() -> SourceConfig {
    SourceConfig {
        source: "sina".to_string(),
        base_url: "https://finance.sina.com.cn".to_string(),
        category_list_urls: category_urls(
            "https://finance.sina.com.cn",
            &[("stock", "/stock/"), ("macro", "/china/")],
        ),
        selectors: SourceSelectors {
            title: "h1.main-title".to_string(),
            publish_time: ".date".to_string(),
            author: ".source".to_string(),
            content: "#artibody".to_string(),
            images: "#artibody img".to_string(),
            category_crumbs: ".crumb-wrap a".to_string(),
        },
        url_pattern: r"finance\.sina\.com\.cn/.+/\d{4}-\d{2}-\d{2}/doc-\w+\.shtml".to_string(),
        hard_ad_url_patterns: vec!["/sponsor/".to_string(), "/adv/".to_string()],
        soft_ad_keywords: vec!["广告".to_string(), "推广".to_string()],
        enabled: true,
        concurrency: 5,
    }
}

pub fn eastmoney() -> SourceConfig {
    SourceConfig {
        source: "eastmoney".to_string(),
        base_url: "https://finance.eastmoney.com".to_string(),
        category_list_urls: category_urls(
            "https://finance.eastmoney.com",
            &[("stock", "/a/cgspl.html"), ("macro", "/a/ccjdd.html")],
        ),
        selectors: SourceSelectors {
            title: "h1".to_string(),
            publish_time: ".time".to_string(),
            author: ".source-data a".to_string(),
            content: "#ContentBody".to_string(),
            images: "#ContentBody img".to_string(),
            category_crumbs: ".crumb a".to_string(),
        },
        url_pattern: r"finance\.eastmoney\.com/a/\d+\.html".to_string(),
        hard_ad_url_patterns: vec!["/tg/".to_string()],
        soft_ad_keywords: vec!["广告".to_string()],
        enabled: true,
        concurrency: 5,
    }
}

pub fn tencent() -> SourceConfig {
    SourceConfig {
        source: "tencent".to_string(),
        base_url: "https://news.qq.com".to_string(),
        category_list_urls: category_urls("https://news.qq.com", &[("finance", "/ch/fortune/")]),
        selectors: SourceSelectors {
            title: ".LEFT h1".to_string(),
            publish_time: ".pub-time".to_string(),
            author: ".author".to_string(),
            content: ".content-article".to_string(),
            images: ".content-article img".to_string(),
            category_crumbs: ".breadcrumb a".to_string(),
        },
        url_pattern: r"new\.qq\.com/rain/a/\w+".to_string(),
        hard_ad_url_patterns: vec!["/ad/".to_string()],
        soft_ad_keywords: vec!["广告".to_string(), "赞助内容".to_string()],
        enabled: true,
        concurrency: 5,
    }
}

pub fn netease() -> SourceConfig {
    SourceConfig {
        source: "netease".to_string(),
        base_url: "https://money.163.com".to_string(),
        category_list_urls: category_urls("https://money.163.com", &[("stock", "/stock/")]),
        selectors: SourceSelectors {
            title: "h1.post_title".to_string(),
            publish_time: ".post_time_source".to_string(),
            author: ".ep-source cite".to_string(),
            content: "#endText".to_string(),
            images: "#endText img".to_string(),
            category_crumbs: ".post_crumb a".to_string(),
        },
        url_pattern: r"money\.163\.com/\d+/\d+/\d+/\w+\.html".to_string(),
        hard_ad_url_patterns: vec!["/sponsor/".to_string()],
        soft_ad_keywords: vec!["广告".to_string()],
        enabled: true,
        concurrency: 5,
    }
}

pub fn ifeng() -> SourceConfig {
    SourceConfig {
        source: "ifeng".to_string(),
        base_url: "https://finance.ifeng.com".to_string(),
        category_list_urls: category_urls("https://finance.ifeng.com", &[("stock", "/stock/")]),
        selectors: SourceSelectors {
            title: "h1".to_string(),
            publish_time: ".time-bar .time".to_string(),
            author: ".ss03".to_string(),
            content: ".main-content".to_string(),
            images: ".main-content img".to_string(),
            category_crumbs: ".crumbs a".to_string(),
        },
        url_pattern: r"finance\.ifeng\.com/c/\w+".to_string(),
        hard_ad_url_patterns: vec!["/tuiguang/".to_string()],
        soft_ad_keywords: vec!["广告".to_string()],
        enabled: true,
        concurrency: 5,
    }
}

/// All five built-in source configurations.
pub fn all() -> Vec<SourceConfig> {
    vec![sina(), eastmoney(), tencent(), netease(), ifeng()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_source_is_enabled_with_positive_concurrency() {
        for config in all() {
            assert!(config.enabled);
            assert!(config.concurrency > 0);
            assert!(!config.category_list_urls.is_empty());
        }
    }

    #[test]
    fn source_names_match_the_five_known_publishers() {
        let names: Vec<String> = all().into_iter().map(|c| c.source).collect();
        assert_eq!(names, vec!["sina", "eastmoney", "tencent", "netease", "ifeng"]);
    }
}
