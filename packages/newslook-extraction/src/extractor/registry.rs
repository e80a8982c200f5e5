//! Registry mapping a source name to its `Extractor`, keyed by name
//! rather than matched on an enum, so adding a site is additive.

use std::collections::HashMap;
use std::sync::Arc;

use super::Extractor;

/// Lookup table the Crawler Manager consults to dispatch work per source.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.name().to_string(), extractor);
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(source).cloned()
    }

    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extractors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlResult;
    use crate::extractor::ExtractOutcome;
    use crate::types::config::WorkerParams;
    use async_trait::async_trait;

    struct StubExtractor(&'static str);

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn list_urls(&self, _params: &WorkerParams, _max_per_category: usize) -> CrawlResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch_article(&self, _url: &str, _params: &WorkerParams) -> CrawlResult<ExtractOutcome> {
            Ok(ExtractOutcome::Skip(crate::types::article::SkipReason::Empty))
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn registers_and_looks_up_by_name() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(StubExtractor("sina")));
        registry.register(Arc::new(StubExtractor("eastmoney")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("sina").is_some());
        assert!(registry.get("unknown-source").is_none());
        assert_eq!(registry.sources(), vec!["eastmoney".to_string(), "sina".to_string()]);
    }
}
