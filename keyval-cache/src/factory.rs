use crate::connection::{CorruptionHandler, SharedConnection, initialize_connection};
use crate::engine::StorageEngine;
use crate::error::Result;
use crate::store::{CacheHandle, Validator};
use crate::ttl::Ttl;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Cache name used by [`CacheFactory::default_cache`]
pub const DEFAULT_CACHE_NAME: &str = "keyval-cache";

/// Options bound once per cache
#[derive(Clone, Default)]
pub struct CacheOptions {
    pub corruption_handler: Option<Arc<dyn CorruptionHandler>>,
    pub default_ttl: Option<Ttl>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corruption_handler(mut self, handler: Arc<dyn CorruptionHandler>) -> Self {
        self.corruption_handler = Some(handler);
        self
    }

    pub fn with_default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.default_ttl = Some(ttl.into());
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("corruption_handler", &self.corruption_handler.is_some())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Options for one collection; `default_ttl` overrides the cache's
pub struct CollectionOptions<T> {
    pub validate: Option<Validator<T>>,
    pub default_ttl: Option<Ttl>,
}

impl<T> CollectionOptions<T> {
    pub fn new() -> Self {
        Self {
            validate: None,
            default_ttl: None,
        }
    }

    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn with_default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.default_ttl = Some(ttl.into());
        self
    }
}

impl<T> Default for CollectionOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens typed collections of one named cache.
///
/// All handles opened from a factory share one engine connection.
pub struct CacheFactory {
    engine: Arc<dyn StorageEngine>,
    name: String,
    options: CacheOptions,
    shared: Arc<SharedConnection>,
}

impl CacheFactory {
    pub fn new(engine: Arc<dyn StorageEngine>, name: impl Into<String>, options: CacheOptions) -> Self {
        let name = name.into();
        info!(
            "Initializing cache '{}' (default_ttl={:?}, corruption_handler={})",
            name,
            options.default_ttl,
            options.corruption_handler.is_some()
        );

        Self {
            engine,
            name,
            options,
            shared: Arc::new(SharedConnection::default()),
        }
    }

    /// Factory for [`DEFAULT_CACHE_NAME`] whose entries never expire by default
    pub fn default_cache(engine: Arc<dyn StorageEngine>) -> Self {
        Self::new(
            engine,
            DEFAULT_CACHE_NAME,
            CacheOptions::new().with_default_ttl(Ttl::NEVER),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Open `collection`, creating it in the cache if needed
    pub async fn open<T>(
        &self,
        collection: &str,
        options: CollectionOptions<T>,
    ) -> Result<CacheHandle<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let _init = self.shared.init.lock().await;

        let connection = initialize_connection(
            self.engine.as_ref(),
            &self.name,
            collection,
            self.shared.current(),
            self.options.corruption_handler.as_deref(),
        )
        .await?;
        self.shared.replace(connection);

        let default_ttl = options.default_ttl.or(self.options.default_ttl);
        Ok(CacheHandle::new(
            self.name.clone(),
            collection.to_string(),
            self.shared.clone(),
            default_ttl,
            options.validate,
        ))
    }
}

impl fmt::Debug for CacheFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFactory")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Bind `name` and `options` once; call [`CacheFactory::open`] per collection
pub fn initialize_cache(
    engine: Arc<dyn StorageEngine>,
    name: impl Into<String>,
    options: CacheOptions,
) -> CacheFactory {
    CacheFactory::new(engine, name, options)
}
