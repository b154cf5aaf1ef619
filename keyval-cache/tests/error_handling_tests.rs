// Error Handling Tests
// Error messages, abort reporting per operation, engine error pass-through

mod common;

use common::{engine, open_store};
use keyval_cache::engine::{OpOutput, Request, RequestEvent, StoreOp, UpgradeHook, request};
use keyval_cache::{
    CacheError, CacheFactory, CacheOptions, CollectionOptions, EngineConnection, EngineError,
    Fault, LoggingConfig, MemoryEngine, OperationKind, StorageEngine, Ttl, init_tracing,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_error_messages() {
    assert_eq!(CacheError::ConnectionClosed.to_string(), "Connection closed");
    assert_eq!(
        CacheError::NoTtl("items".to_string()).to_string(),
        "No TTL configured for collection 'items'"
    );
    assert!(
        CacheError::Blocked("cache".to_string())
            .to_string()
            .contains("prevents the version change")
    );
    assert_eq!(
        CacheError::Engine(EngineError::NotFound("items".to_string())).to_string(),
        "Collection not found: items"
    );
    assert_eq!(
        CacheError::Engine(EngineError::Version {
            requested: 1,
            current: 2
        })
        .to_string(),
        "Requested version 1 is lower than the current version 2"
    );
}

#[test]
fn test_precondition_errors() {
    assert!(CacheError::ConnectionClosed.is_precondition());
    assert!(CacheError::NoTtl("x".to_string()).is_precondition());
    assert!(CacheError::InvalidValue("null".to_string()).is_precondition());
    assert!(!CacheError::Blocked("x".to_string()).is_precondition());
    assert!(
        !CacheError::Aborted {
            operation: OperationKind::Set
        }
        .is_precondition()
    );
}

#[tokio::test]
async fn test_aborts_are_reported_per_operation() {
    let engine = engine();
    let (_factory, store) = open_store::<i64>(&engine, "aborts", "items").await;
    store.set("k", &1, None).await.unwrap();

    engine.inject_fault(Fault::Abort);
    let err = store.set("k", &2, None).await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Set
        }
    ));

    engine.inject_fault(Fault::Abort);
    let err = store.get("k").await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Get
        }
    ));

    engine.inject_fault(Fault::Abort);
    let err = store.remove("k").await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Remove
        }
    ));

    engine.inject_fault(Fault::Abort);
    let err = store.clear().await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Clear
        }
    ));

    // Aborted writes leave the previous record in place
    assert_eq!(store.get("k").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_engine_errors_pass_through() {
    let engine = engine();
    let (_factory, store) = open_store::<i64>(&engine, "failures", "items").await;

    engine.inject_fault(Fault::Error("quota exceeded".to_string()));
    let err = store.set("k", &1, None).await.unwrap_err();

    assert!(matches!(
        err,
        CacheError::Engine(EngineError::Backend(ref msg)) if msg == "quota exceeded"
    ));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_key_is_engine_data_error() {
    let engine = engine();
    let (_factory, store) = open_store::<i64>(&engine, "keys", "items").await;

    let err = store.set(f64::NAN, &1, None).await.unwrap_err();

    assert!(matches!(err, CacheError::Engine(EngineError::Data(_))));
}

#[test]
fn test_tracing_installs_once() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: "compact".to_string(),
    };

    assert!(init_tracing(&config).is_ok());
    assert!(init_tracing(&config).is_err());
}

/// Connection whose deletes always abort
struct AbortingDeletes(Arc<dyn EngineConnection>);

impl EngineConnection for AbortingDeletes {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn version(&self) -> u32 {
        self.0.version()
    }

    fn collection_names(&self) -> Vec<String> {
        self.0.collection_names()
    }

    fn close(&self) {
        self.0.close()
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn execute(&self, collection: &str, op: StoreOp) -> Request<OpOutput> {
        match op {
            StoreOp::Delete(_) => Request::ready(RequestEvent::Abort),
            op => self.0.execute(collection, op),
        }
    }
}

struct AbortingDeletesEngine(MemoryEngine);

impl StorageEngine for AbortingDeletesEngine {
    fn open(
        &self,
        name: &str,
        version: Option<u32>,
        upgrade: Option<UpgradeHook>,
    ) -> Request<Arc<dyn EngineConnection>> {
        let inner = self.0.open(name, version, upgrade);
        let (responder, request) = request();
        tokio::spawn(async move {
            match inner.event().await {
                RequestEvent::Success(connection) => {
                    let wrapped: Arc<dyn EngineConnection> =
                        Arc::new(AbortingDeletes(connection));
                    responder.succeed(wrapped);
                }
                RequestEvent::Error(e) => responder.fail(e),
                RequestEvent::Blocked => responder.block(),
                RequestEvent::Abort => responder.abort(),
            }
        });
        request
    }

    fn delete_database(&self, name: &str) -> Request<()> {
        self.0.delete_database(name)
    }
}

#[tokio::test]
async fn test_aborted_eviction_is_reported_as_get() {
    let engine = Arc::new(AbortingDeletesEngine(MemoryEngine::new()));
    let factory = CacheFactory::new(
        engine,
        "evictions",
        CacheOptions::new().with_default_ttl(Ttl::NEVER),
    );
    let store = factory
        .open::<i64>("items", CollectionOptions::new())
        .await
        .unwrap();

    store.set("k", &1, Some(Ttl::Millis(0))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let err = store.get("k").await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Get
        }
    ));
    assert_eq!(err.to_string(), "Transaction aborted during get");

    let err = store.remove("k").await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Aborted {
            operation: OperationKind::Remove
        }
    ));
}
