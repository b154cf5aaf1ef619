use crate::adapter;
use crate::connection::SharedConnection;
use crate::engine::EngineConnection;
use crate::error::{CacheError, EngineError, OperationKind, Result};
use crate::key::Key;
use crate::ttl::{Ttl, is_expired, now_millis, resolve_ttl};
use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Predicate a stored value must satisfy to be returned
pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Lazy, single-pass sequence of live entries
pub type Entries<T> = Pin<Box<dyn Stream<Item = Result<(Key, T)>> + Send>>;

/// Why a stored record was evicted on read
#[derive(Debug, Error)]
enum Invalid {
    #[error("ttl is not a number")]
    TtlNotNumeric,
    #[error("expired")]
    Expired,
    #[error("value does not decode: {0}")]
    Undecodable(String),
    #[error("value rejected by validator")]
    Rejected,
    #[error("value is null")]
    NullValue,
}

struct HandleInner<T> {
    cache_name: String,
    collection: String,
    shared: Arc<SharedConnection>,
    default_ttl: Option<Ttl>,
    validator: Option<Validator<T>>,
    closed: AtomicBool,
}

/// Typed handle to one collection of a cache.
///
/// Records are stored as `{ "value": <T>, "ttl": <ms> }`. Reads evict
/// records that are expired or malformed and report them as absent. After
/// [`close`](Self::close) every operation fails with
/// [`CacheError::ConnectionClosed`] without reaching the engine.
pub struct CacheHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T> CacheHandle<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(
        cache_name: String,
        collection: String,
        shared: Arc<SharedConnection>,
        default_ttl: Option<Ttl>,
        validator: Option<Validator<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cache_name,
                collection,
                shared,
                default_ttl,
                validator,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Name of the collection this handle reads and writes
    pub fn name(&self) -> &str {
        &self.inner.collection
    }

    pub fn cache_name(&self) -> &str {
        &self.inner.cache_name
    }

    pub fn default_ttl(&self) -> Option<Ttl> {
        self.inner.default_ttl
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::ConnectionClosed);
        }
        Ok(())
    }

    fn connection(&self) -> Result<Arc<dyn EngineConnection>> {
        self.ensure_open()?;
        self.inner.shared.current().ok_or_else(|| {
            EngineError::InvalidState(format!("cache '{}' has no connection", self.inner.cache_name))
                .into()
        })
    }

    /// Store `value` under `key`, replacing any previous record.
    ///
    /// `ttl` overrides the collection's default TTL; with neither set the
    /// write fails with [`CacheError::NoTtl`].
    pub async fn set(&self, key: impl Into<Key>, value: &T, ttl: Option<Ttl>) -> Result<()> {
        let key = key.into();
        let expires =
            resolve_ttl(ttl, self.inner.default_ttl, now_millis()).ok_or_else(|| {
                CacheError::NoTtl(self.inner.collection.clone())
            })?;
        let connection = self.connection()?;

        let value = serde_json::to_value(value)?;
        if value.is_null() {
            return Err(CacheError::InvalidValue(format!(
                "null value for key {key} in '{}'",
                self.inner.collection
            )));
        }

        debug!(
            "SET collection={}, key={}, ttl={}",
            self.inner.collection, key, expires
        );
        let record = json!({ "value": value, "ttl": expires });
        adapter::put(connection.as_ref(), &self.inner.collection, key, record).await
    }

    /// Store `value` under `key` with an explicit TTL
    pub async fn set_with_ttl(
        &self,
        key: impl Into<Key>,
        value: &T,
        ttl: impl Into<Ttl>,
    ) -> Result<()> {
        self.set(key, value, Some(ttl.into())).await
    }

    /// Read the live value for `key`.
    ///
    /// Returns `None` when the key is absent, and also when the record is
    /// expired, malformed, or rejected by the validator; such records are
    /// deleted first.
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<T>> {
        let key = key.into();
        let connection = self.connection()?;
        debug!("GET collection={}, key={}", self.inner.collection, key);

        let Some(record) =
            adapter::get(connection.as_ref(), &self.inner.collection, key.clone()).await?
        else {
            return Ok(None);
        };

        let reason = match self.inspect(record) {
            Ok(value) => return Ok(Some(value)),
            Err(reason) => reason,
        };

        match reason {
            Invalid::Expired => debug!(
                "Evicting expired key={} from {}",
                key, self.inner.collection
            ),
            ref other => warn!(
                "Evicting key={} from {}: {}",
                key, self.inner.collection, other
            ),
        }
        adapter::delete_as(
            connection.as_ref(),
            &self.inner.collection,
            key,
            OperationKind::Get,
        )
        .await?;
        Ok(None)
    }

    fn inspect(&self, record: Value) -> std::result::Result<T, Invalid> {
        let ttl = record
            .get("ttl")
            .and_then(Value::as_f64)
            .ok_or(Invalid::TtlNotNumeric)?;
        if is_expired(ttl, now_millis()) {
            return Err(Invalid::Expired);
        }

        let raw = record.get("value").cloned().unwrap_or(Value::Null);
        let is_null = raw.is_null();
        let value: T =
            serde_json::from_value(raw).map_err(|e| Invalid::Undecodable(e.to_string()))?;

        if let Some(validate) = &self.inner.validator {
            if !validate(&value) {
                return Err(Invalid::Rejected);
            }
        }
        if is_null {
            return Err(Invalid::NullValue);
        }
        Ok(value)
    }

    /// Delete the record for `key`; absent keys are not an error
    pub async fn remove(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let connection = self.connection()?;
        debug!("REMOVE collection={}, key={}", self.inner.collection, key);

        adapter::delete(connection.as_ref(), &self.inner.collection, key).await
    }

    /// Delete every record in the collection
    pub async fn clear(&self) -> Result<()> {
        let connection = self.connection()?;
        debug!("CLEAR collection={}", self.inner.collection);

        adapter::clear(connection.as_ref(), &self.inner.collection).await
    }

    /// Number of stored records, including expired ones not yet evicted
    pub async fn count(&self) -> Result<u64> {
        let connection = self.connection()?;
        adapter::count(connection.as_ref(), &self.inner.collection).await
    }

    /// Iterate live entries over a snapshot of the current keys.
    ///
    /// Keys written after this call are not visited. Snapshotted keys that
    /// are gone, expired or invalid by the time they are reached are
    /// skipped. Each step performs one [`get`](Self::get).
    pub async fn entries(&self) -> Result<Entries<T>> {
        let connection = self.connection()?;
        let keys = adapter::list_keys(connection.as_ref(), &self.inner.collection).await?;
        debug!(
            "ENTRIES collection={}, snapshot={}",
            self.inner.collection,
            keys.len()
        );

        let handle = Self {
            inner: self.inner.clone(),
        };
        Ok(Box::pin(stream! {
            for key in keys {
                match handle.get(key.clone()).await {
                    Ok(Some(value)) => yield Ok((key, value)),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    /// Close this handle and the cache connection it shares.
    ///
    /// Sibling handles from the same factory fail on their next operation
    /// until the factory opens another collection. Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(connection) = self.inner.shared.current() {
            connection.close();
        }
        debug!(
            "Closed handle for {}/{}",
            self.inner.cache_name, self.inner.collection
        );
    }
}

impl<T> fmt::Debug for CacheHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle")
            .field("cache", &self.inner.cache_name)
            .field("collection", &self.inner.collection)
            .field("default_ttl", &self.inner.default_ttl)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}
