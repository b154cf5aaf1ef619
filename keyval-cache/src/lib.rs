//! # keyval-cache
//!
//! Typed TTL cache over an asynchronous, transactional, versioned key-value
//! engine (the kind browsers embed per origin).
//!
//! - **Collections**: named, typed partitions of a cache, created on demand
//!   through schema version bumps
//! - **TTL**: per-write or per-collection expiry, checked on every read
//! - **Self-healing reads**: expired or malformed records are evicted and
//!   reported as absent
//! - **Recovery**: caches whose version and collections disagree are reset
//!   or handed to a caller-supplied [`CorruptionHandler`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyval_cache::{CacheFactory, CollectionOptions, MemoryEngine, Ttl};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = CacheFactory::default_cache(Arc::new(MemoryEngine::new()));
//!     let sessions = cache
//!         .open::<String>("sessions", CollectionOptions::new())
//!         .await?;
//!
//!     sessions
//!         .set("abc", &"token123".to_string(), Some(Ttl::after(Duration::from_secs(3600))))
//!         .await?;
//!     let token = sessions.get("abc").await?;
//!     println!("Token: {:?}", token);
//!
//!     sessions.close();
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod factory;
pub mod key;
pub mod logging;
pub mod store;
pub mod ttl;

pub use config::{CacheConfig, LoggingConfig};
pub use connection::{CorruptionHandler, create_collection_hook, initialize_connection};
pub use engine::{EngineConnection, Fault, MemoryEngine, StorageEngine};
pub use error::{CacheError, EngineError, OperationKind, Result};
pub use factory::{
    CacheFactory, CacheOptions, CollectionOptions, DEFAULT_CACHE_NAME, initialize_cache,
};
pub use key::Key;
pub use logging::init_tracing;
pub use store::{CacheHandle, Entries, Validator};
pub use ttl::Ttl;
