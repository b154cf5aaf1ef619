use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::factory::{CacheOptions, DEFAULT_CACHE_NAME};
use crate::ttl::Ttl;

/// File-backed cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache: CacheSection,
    #[serde(default)]
    pub collections: HashMap<String, CollectionSection>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    pub name: String,
    /// Milliseconds; negative means never expire
    #[serde(default)]
    pub default_ttl_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSection {
    #[serde(default)]
    pub default_ttl_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache: CacheSection {
                name: DEFAULT_CACHE_NAME.to_string(),
                default_ttl_ms: Some(-1),
            },
            collections: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Convert to factory options (no corruption handler; attach one in code)
    pub fn to_cache_options(&self) -> CacheOptions {
        CacheOptions {
            corruption_handler: None,
            default_ttl: self.cache.default_ttl_ms.map(Ttl::Millis),
        }
    }

    /// Default TTL configured for `collection`, if any
    pub fn collection_ttl(&self, collection: &str) -> Option<Ttl> {
        self.collections
            .get(collection)
            .and_then(|c| c.default_ttl_ms)
            .map(Ttl::Millis)
    }
}
