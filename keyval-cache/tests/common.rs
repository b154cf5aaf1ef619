//! Common test utilities

use keyval_cache::{
    CacheFactory, CacheHandle, CacheOptions, CollectionOptions, MemoryEngine, Ttl,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Fresh in-memory engine
#[allow(dead_code)] // Used by other test modules
pub fn engine() -> Arc<MemoryEngine> {
    Arc::new(MemoryEngine::new())
}

/// Factory for `name` on `engine` with no default TTL
#[allow(dead_code)] // Used by other test modules
pub fn factory(engine: &Arc<MemoryEngine>, name: &str) -> CacheFactory {
    CacheFactory::new(engine.clone(), name, CacheOptions::new())
}

/// Open `collection` in a cache whose entries never expire by default
#[allow(dead_code)] // Used by other test modules
pub async fn open_store<T>(
    engine: &Arc<MemoryEngine>,
    cache: &str,
    collection: &str,
) -> (CacheFactory, CacheHandle<T>)
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let factory = CacheFactory::new(
        engine.clone(),
        cache,
        CacheOptions::new().with_default_ttl(Ttl::NEVER),
    );
    let handle = factory
        .open(collection, CollectionOptions::new())
        .await
        .expect("Failed to open collection");
    (factory, handle)
}
