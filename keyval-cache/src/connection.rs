//! Connection initialization.
//!
//! A cache's schema version counts the collections ever created in it. A
//! missing collection whose cache version is behind `collections + 1` is
//! created by a version bump; a version that is not behind means the
//! bookkeeping disagrees with the actual collections, and the cache is
//! recovered before anything else touches it.

use crate::adapter::{delete_handle, open_handle};
use crate::engine::{EngineConnection, SchemaEditor, StorageEngine, UpgradeHook};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The live connection behind every handle opened from one factory.
///
/// Initialization passes are serialized through `init`; handles read
/// `current` on each operation, so a version bump is picked up by all of
/// them.
#[derive(Default)]
pub(crate) struct SharedConnection {
    current: RwLock<Option<Arc<dyn EngineConnection>>>,
    pub(crate) init: tokio::sync::Mutex<()>,
}

impl SharedConnection {
    pub(crate) fn current(&self) -> Option<Arc<dyn EngineConnection>> {
        self.current.read().clone()
    }

    pub(crate) fn replace(&self, connection: Arc<dyn EngineConnection>) {
        *self.current.write() = Some(connection);
    }
}

/// Recovery strategy for a cache whose version and collections disagree
#[async_trait]
pub trait CorruptionHandler: Send + Sync {
    /// Return a connection in which the wanted collection exists.
    ///
    /// `connection` is still open; `version` is the version the cache would
    /// have had after creating the missing collection.
    async fn recover(
        &self,
        engine: &dyn StorageEngine,
        connection: Arc<dyn EngineConnection>,
        version: u32,
    ) -> Result<Arc<dyn EngineConnection>>;
}

/// Upgrade hook that creates `collection` unless it already exists
pub fn create_collection_hook(collection: &str) -> UpgradeHook {
    let collection = collection.to_string();
    Box::new(move |schema: &mut dyn SchemaEditor| {
        if schema.contains_collection(&collection) {
            Ok(())
        } else {
            schema.create_collection(&collection)
        }
    })
}

/// Produce an open connection to `cache_name` in which `collection` exists.
///
/// `existing` is reused when it is still open.
pub async fn initialize_connection(
    engine: &dyn StorageEngine,
    cache_name: &str,
    collection: &str,
    existing: Option<Arc<dyn EngineConnection>>,
    handler: Option<&dyn CorruptionHandler>,
) -> Result<Arc<dyn EngineConnection>> {
    let connection = match existing.filter(|c| !c.is_closed()) {
        Some(connection) => connection,
        None => open_handle(engine, cache_name, None, None).await?,
    };

    if connection.contains_collection(collection) {
        debug!(
            "Collection '{}' present in '{}' v{}",
            collection,
            cache_name,
            connection.version()
        );
        return Ok(connection);
    }

    let collection_count = connection.collection_names().len() as u32;
    let next_version = collection_count + 1;

    if connection.version() < next_version {
        info!(
            "Creating collection '{}' in '{}' (v{} -> v{})",
            collection,
            cache_name,
            connection.version(),
            next_version
        );
        connection.close();
        return open_handle(
            engine,
            cache_name,
            Some(next_version),
            Some(create_collection_hook(collection)),
        )
        .await;
    }

    warn!(
        "Cache '{}' is at v{} with {} collections but lacks '{}'",
        cache_name,
        connection.version(),
        collection_count,
        collection
    );

    match handler {
        Some(handler) => {
            let recovered = handler.recover(engine, connection, next_version).await?;
            if !recovered.contains_collection(collection) {
                return Err(CacheError::UnresolvedCorruption {
                    cache: cache_name.to_string(),
                    collection: collection.to_string(),
                });
            }
            Ok(recovered)
        }
        None => reset(engine, cache_name, collection, connection).await,
    }
}

/// Drop the whole cache and recreate it at version 1 holding `collection`
async fn reset(
    engine: &dyn StorageEngine,
    cache_name: &str,
    collection: &str,
    connection: Arc<dyn EngineConnection>,
) -> Result<Arc<dyn EngineConnection>> {
    warn!("Resetting cache '{}'", cache_name);

    connection.close();
    delete_handle(engine, cache_name).await?;
    open_handle(
        engine,
        cache_name,
        Some(1),
        Some(create_collection_hook(collection)),
    )
    .await
}
