//! CLI-side source registry: the built-in [`SourceConfig`] values from
//! `newslook_extraction`, keyed by name for the enable/concurrency
//! override lookup in `main::build`.

use std::collections::HashMap;

use newslook_extraction::extractor::sources;
use newslook_extraction::types::config::SourceConfig;

/// One [`SourceConfig`] per known source, ready to back a
/// `DeclarativeExtractor` once concurrency/enable overrides from
/// [`crate::config::Config`] are applied.
pub fn default_source_configs() -> HashMap<String, SourceConfig> {
    sources::all().into_iter().map(|c| (c.source.clone(), c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use newslook_extraction::types::article::Source;

    #[test]
    fn covers_every_known_source() {
        let configs = default_source_configs();
        for source in Source::all() {
            assert!(configs.contains_key(source.as_str()), "missing config for {source}");
        }
    }

    #[test]
    fn every_config_carries_its_category_list_urls() {
        for config in default_source_configs().values() {
            assert!(!config.category_list_urls.is_empty(), "{} has no category urls", config.source);
        }
    }
}
