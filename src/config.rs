//! YAML configuration.
//!
//! Every field is optional in the file; anything left out takes the default
//! shown below. CLI flags are applied on top by the binary.
//!
//! ```yaml
//! user_agent: "Mozilla/5.0 ..."
//! request_timeout_secs: 10
//! max_retries: 3
//! backoff_base_ms: 500
//! jitter_min_ms: 1000
//! jitter_max_ms: 3000
//! warm_up: true
//! min_interval_ms: 1000
//! workers: 4
//! pacing_ms: 500
//! api_page_size: 20
//! api_page_cap: 5
//! sources:
//!   Meta Engineering:
//!     url: "https://code.facebook.com/posts/rss/"
//!     api_url: "https://engineering.fb.com/wp-json/wp/v2/posts"
//!     min_interval_ms: 2000
//! ```

use crate::error::ConfigError;
use crate::fetch::{DEFAULT_USER_AGENT, FetchSettings, host_key};
use crate::orchestrator::OrchestratorSettings;
use crate::paginated::{DEFAULT_PAGE_CAP, DEFAULT_PAGE_SIZE};
use crate::rate_limit::RateLimiter;
use crate::scrapers::SourceRegistry;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Per-source overrides, keyed by source name.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceOverride {
    /// Index page or feed URL.
    pub url: Option<String>,
    /// Paged API URL, for hybrid sources.
    pub api_url: Option<String>,
    pub min_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarvestConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub backoff_base_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub warm_up: bool,
    /// Minimum spacing between requests to one host.
    pub min_interval_ms: u64,
    /// Concurrent post fetches per index source.
    pub workers: usize,
    /// Pause after each processed post on index sources.
    pub pacing_ms: u64,
    pub api_page_size: u32,
    pub api_page_cap: u32,
    pub sources: HashMap<String, SourceOverride>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 500,
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
            warm_up: true,
            min_interval_ms: 1000,
            workers: 4,
            pacing_ms: 500,
            api_page_size: DEFAULT_PAGE_SIZE,
            api_page_cap: DEFAULT_PAGE_CAP,
            sources: HashMap::new(),
        }
    }
}

impl HarvestConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        let jitter_min = Duration::from_millis(self.jitter_min_ms);
        FetchSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            jitter_min,
            // An inverted range collapses to a fixed delay.
            jitter_max: Duration::from_millis(self.jitter_max_ms).max(jitter_min),
            warm_up: self.warm_up,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            workers: self.workers.max(1),
            pacing: Duration::from_millis(self.pacing_ms),
            api_page_size: self.api_page_size,
            api_page_cap: self.api_page_cap,
            ..OrchestratorSettings::default()
        }
    }

    /// Politeness interval configured for one source, if any.
    pub fn source_min_interval(&self, name: &str) -> Option<Duration> {
        self.sources
            .get(name)
            .and_then(|o| o.min_interval_ms)
            .map(Duration::from_millis)
    }

    /// Rate limiter with the global interval, plus per-host intervals for
    /// every source that sets one.
    pub fn rate_limiter(&self, registry: &SourceRegistry) -> RateLimiter {
        let mut limiter = RateLimiter::new(Duration::from_millis(self.min_interval_ms));
        for source in registry.iter() {
            let Some(interval) = source.min_interval else {
                continue;
            };
            for url in source.entry_points() {
                if let Some(key) = host_key(url.as_str()) {
                    debug!(source = %source.name, host = %key, ?interval, "Per-host interval");
                    limiter = limiter.with_interval(key, interval);
                }
            }
        }
        limiter
    }
}

/// Load a YAML configuration file.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Yaml`] if it
/// is not valid configuration.
#[instrument(level = "info")]
pub fn load_config(path: &str) -> Result<HarvestConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let config = parse_config(&raw).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })?;
    info!(sources = config.sources.len(), "Loaded configuration");
    Ok(config)
}

fn parse_config(raw: &str) -> Result<HarvestConfig, serde_yaml::Error> {
    // An empty file deserializes as null, which is not a mapping.
    if raw.trim().is_empty() {
        return Ok(HarvestConfig::default());
    }
    serde_yaml::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = parse_config("workers: 8\npacing_ms: 0\n").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.pacing_ms, 0);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.api_page_cap, 5);
        assert!(config.warm_up);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse_config("  \n").unwrap(), HarvestConfig::default());
    }

    #[test]
    fn test_source_overrides() {
        let yaml = r#"
sources:
  Meta Engineering:
    api_url: "http://127.0.0.1:8080/wp-json/wp/v2/posts"
    min_interval_ms: 2000
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(
            config.sources["Meta Engineering"],
            SourceOverride {
                url: None,
                api_url: Some("http://127.0.0.1:8080/wp-json/wp/v2/posts".to_string()),
                min_interval_ms: Some(2000),
            }
        );
        assert_eq!(
            config.source_min_interval("Meta Engineering"),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(config.source_min_interval("Lyft Engineering"), None);
    }

    #[test]
    fn test_fetch_settings_conversion() {
        let config = HarvestConfig {
            jitter_min_ms: 2000,
            jitter_max_ms: 500,
            warm_up: false,
            ..HarvestConfig::default()
        };
        let settings = config.fetch_settings();
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.backoff_base, Duration::from_millis(500));
        assert_eq!(settings.jitter_min, Duration::from_secs(2));
        assert_eq!(settings.jitter_max, Duration::from_secs(2));
        assert!(!settings.warm_up);
    }

    #[test]
    fn test_rate_limiter_uses_per_host_intervals() {
        let mut config = HarvestConfig::default();
        config.sources.insert(
            "Meta Engineering".to_string(),
            SourceOverride {
                min_interval_ms: Some(2500),
                ..SourceOverride::default()
            },
        );
        let registry = SourceRegistry::from_config(&config).unwrap();
        let limiter = config.rate_limiter(&registry);

        assert_eq!(limiter.interval_for("code.facebook.com"), Duration::from_millis(2500));
        assert_eq!(limiter.interval_for("engineering.fb.com"), Duration::from_millis(2500));
        assert_eq!(limiter.interval_for("medium.com"), Duration::from_secs(1));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries: 1\nworkers: 2").unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_load_config_errors() {
        assert!(matches!(
            load_config("/nonexistent/blog_harvest.yaml"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: [not, a, number]").unwrap();
        assert!(matches!(
            load_config(file.path().to_str().unwrap()),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
