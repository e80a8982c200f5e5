//! Process configuration loaded from the environment.
//!
//! A flat struct, `dotenv()` loaded once, required keys via
//! `.context(...)`, optional keys via `.ok()`/a default. A layered
//! file+flag precedence on top of this is an external collaborator's
//! job; this loader only covers the environment-variable tier.

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};

use newslook_extraction::types::article::Source;

/// Per-source knobs: an enable flag plus a concurrency cap.
#[derive(Debug, Clone)]
pub struct SourceOverride {
    pub enabled: bool,
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    pub global_qps: u32,
    pub proxy_url: Option<String>,
    pub source_overrides: HashMap<String, SourceOverride>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_path = env::var("NEWSLOOK_DB_PATH")
            .unwrap_or_else(|_| "data/db/finance_news.db".to_string());

        let log_level = env::var("NEWSLOOK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let global_qps: u32 = env::var("NEWSLOOK_GLOBAL_QPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("NEWSLOOK_GLOBAL_QPS must be a positive integer")?;
        if global_qps == 0 {
            anyhow::bail!("NEWSLOOK_GLOBAL_QPS must be greater than zero");
        }

        let proxy_url = env::var("NEWSLOOK_PROXY_URL").ok();

        let mut source_overrides = HashMap::new();
        for source in Source::all() {
            let name = source.as_str();
            let enabled = env::var(format!("NEWSLOOK_SOURCE_{}_ENABLED", name.to_uppercase()))
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true);
            let concurrency: usize = env::var(format!("NEWSLOOK_SOURCE_{}_CONCURRENCY", name.to_uppercase()))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            source_overrides.insert(name.to_string(), SourceOverride { enabled, concurrency });
        }

        Ok(Self { database_path, log_level, global_qps, proxy_url, source_overrides })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_qps() {
        std::env::set_var("NEWSLOOK_GLOBAL_QPS", "0");
        let result = Config::from_env();
        std::env::remove_var("NEWSLOOK_GLOBAL_QPS");
        assert!(result.is_err());
    }
}
