//! Awaitable wrappers over the engine's request protocol.
//!
//! Nothing here retries: a blocked open means another connection has to be
//! closed by its owner first, so the condition goes straight to the caller.

use crate::engine::{
    EngineConnection, OpOutput, RequestEvent, StorageEngine, StoreOp, UpgradeHook,
};
use crate::error::{CacheError, EngineError, OperationKind, Result};
use crate::key::Key;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Open `name`, optionally at `version`, running `upgrade` if the version rises
pub async fn open_handle(
    engine: &dyn StorageEngine,
    name: &str,
    version: Option<u32>,
    upgrade: Option<UpgradeHook>,
) -> Result<Arc<dyn EngineConnection>> {
    debug!("OPEN cache={}, version={:?}", name, version);

    match engine.open(name, version, upgrade).event().await {
        RequestEvent::Success(connection) => Ok(connection),
        RequestEvent::Error(e) => Err(e.into()),
        RequestEvent::Blocked => Err(CacheError::Blocked(name.to_string())),
        RequestEvent::Abort => Err(EngineError::Backend(format!("open of '{name}' aborted")).into()),
    }
}

/// Delete the database `name`
pub async fn delete_handle(engine: &dyn StorageEngine, name: &str) -> Result<()> {
    debug!("DELETE cache={}", name);

    match engine.delete_database(name).event().await {
        RequestEvent::Success(()) => Ok(()),
        RequestEvent::Error(e) => Err(e.into()),
        RequestEvent::Blocked => Err(CacheError::Blocked(name.to_string())),
        RequestEvent::Abort => {
            Err(EngineError::Backend(format!("delete of '{name}' aborted")).into())
        }
    }
}

/// Run one collection operation, reporting an abort as a failure of `kind`
pub async fn run_operation(
    connection: &dyn EngineConnection,
    collection: &str,
    kind: OperationKind,
    op: StoreOp,
) -> Result<OpOutput> {
    match connection.execute(collection, op).event().await {
        RequestEvent::Success(output) => Ok(output),
        RequestEvent::Error(e) => Err(e.into()),
        RequestEvent::Abort => Err(CacheError::Aborted { operation: kind }),
        RequestEvent::Blocked => Err(EngineError::InvalidState(format!(
            "{kind} on '{collection}' reported blocked"
        ))
        .into()),
    }
}

fn unexpected(kind: OperationKind, output: OpOutput) -> CacheError {
    EngineError::Backend(format!("unexpected {kind} result: {output:?}")).into()
}

pub async fn put(
    connection: &dyn EngineConnection,
    collection: &str,
    key: Key,
    value: Value,
) -> Result<()> {
    let op = StoreOp::Put { key, value };
    match run_operation(connection, collection, OperationKind::Set, op).await? {
        OpOutput::Done => Ok(()),
        other => Err(unexpected(OperationKind::Set, other)),
    }
}

pub async fn get(
    connection: &dyn EngineConnection,
    collection: &str,
    key: Key,
) -> Result<Option<Value>> {
    match run_operation(connection, collection, OperationKind::Get, StoreOp::Get(key)).await? {
        OpOutput::Value(value) => Ok(value),
        other => Err(unexpected(OperationKind::Get, other)),
    }
}

pub async fn delete(connection: &dyn EngineConnection, collection: &str, key: Key) -> Result<()> {
    delete_as(connection, collection, key, OperationKind::Remove).await
}

/// Delete `key` on behalf of `kind`, so an abort names the caller's operation
pub async fn delete_as(
    connection: &dyn EngineConnection,
    collection: &str,
    key: Key,
    kind: OperationKind,
) -> Result<()> {
    match run_operation(connection, collection, kind, StoreOp::Delete(key)).await? {
        OpOutput::Done => Ok(()),
        other => Err(unexpected(kind, other)),
    }
}

pub async fn clear(connection: &dyn EngineConnection, collection: &str) -> Result<()> {
    match run_operation(connection, collection, OperationKind::Clear, StoreOp::Clear).await? {
        OpOutput::Done => Ok(()),
        other => Err(unexpected(OperationKind::Clear, other)),
    }
}

pub async fn list_keys(connection: &dyn EngineConnection, collection: &str) -> Result<Vec<Key>> {
    let op = StoreOp::ListKeys;
    match run_operation(connection, collection, OperationKind::ListKeys, op).await? {
        OpOutput::Keys(keys) => Ok(keys),
        other => Err(unexpected(OperationKind::ListKeys, other)),
    }
}

pub async fn count(connection: &dyn EngineConnection, collection: &str) -> Result<u64> {
    match run_operation(connection, collection, OperationKind::Count, StoreOp::Count).await? {
        OpOutput::Count(n) => Ok(n),
        other => Err(unexpected(OperationKind::Count, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Fault, MemoryEngine, SchemaEditor};

    fn create(name: &'static str) -> Option<UpgradeHook> {
        Some(Box::new(move |schema: &mut dyn SchemaEditor| {
            schema.create_collection(name)
        }))
    }

    #[tokio::test]
    async fn test_open_and_roundtrip() {
        let engine = MemoryEngine::new();
        let conn = open_handle(&engine, "db", Some(1), create("items"))
            .await
            .unwrap();

        put(conn.as_ref(), "items", Key::from("k"), serde_json::json!(42))
            .await
            .unwrap();
        let value = get(conn.as_ref(), "items", Key::from("k")).await.unwrap();
        assert_eq!(value, Some(serde_json::json!(42)));
        assert_eq!(count(conn.as_ref(), "items").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocked_open_is_surfaced() {
        let engine = MemoryEngine::new();
        let _conn = open_handle(&engine, "db", Some(1), None).await.unwrap();

        let err = open_handle(&engine, "db", Some(2), None).await.err().unwrap();
        assert!(matches!(err, CacheError::Blocked(name) if name == "db"));
    }

    #[tokio::test]
    async fn test_blocked_delete_is_surfaced() {
        let engine = MemoryEngine::new();
        let _conn = open_handle(&engine, "db", Some(1), None).await.unwrap();

        let err = delete_handle(&engine, "db").await.unwrap_err();
        assert!(matches!(err, CacheError::Blocked(_)));
    }

    #[tokio::test]
    async fn test_abort_reports_operation_kind() {
        let engine = MemoryEngine::new();
        let conn = open_handle(&engine, "db", Some(1), create("items"))
            .await
            .unwrap();

        engine.inject_fault(Fault::Abort);
        let err = clear(conn.as_ref(), "items").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Aborted {
                operation: OperationKind::Clear
            }
        ));
        assert_eq!(err.to_string(), "Transaction aborted during clear");
    }

    #[tokio::test]
    async fn test_engine_error_passes_through() {
        let engine = MemoryEngine::new();
        let conn = open_handle(&engine, "db", Some(1), create("items"))
            .await
            .unwrap();

        engine.inject_fault(Fault::Error("disk full".to_string()));
        let err = put(conn.as_ref(), "items", Key::from("k"), serde_json::json!(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Engine(EngineError::Backend(ref msg)) if msg == "disk full"
        ));
    }
}
