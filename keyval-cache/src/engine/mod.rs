//! Storage engine contract.
//!
//! The cache sits on top of an asynchronous, transactional, versioned
//! key-value engine. Engines report completion through a [`Responder`] the
//! way browser storage engines fire `success`/`error`/`blocked`/`abort`
//! events on a request; the matching [`Request`] is what callers hold.
//! [`crate::adapter`] turns those requests into plain `Result`s.

mod memory;

pub use memory::{Fault, MemoryEngine};

use crate::error::EngineError;
use crate::key::Key;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Terminal signal of an engine request
#[derive(Debug)]
pub enum RequestEvent<T> {
    Success(T),
    Error(EngineError),
    /// Another connection prevents a version change or deletion
    Blocked,
    /// The transaction carrying the request aborted
    Abort,
}

/// Caller side of a pending engine request
#[derive(Debug)]
pub struct Request<T> {
    receiver: oneshot::Receiver<RequestEvent<T>>,
}

/// Engine side of a pending request; signals exactly one event
#[derive(Debug)]
pub struct Responder<T> {
    sender: oneshot::Sender<RequestEvent<T>>,
}

/// Create a connected responder/request pair
pub fn request<T>() -> (Responder<T>, Request<T>) {
    let (sender, receiver) = oneshot::channel();
    (Responder { sender }, Request { receiver })
}

impl<T> Request<T> {
    /// A request that has already completed with `event`
    pub fn ready(event: RequestEvent<T>) -> Self {
        let (responder, request) = request();
        responder.signal(event);
        request
    }

    /// Wait for the engine to signal completion
    pub async fn event(self) -> RequestEvent<T> {
        self.receiver
            .await
            .unwrap_or(RequestEvent::Error(EngineError::Dropped))
    }
}

impl<T> Responder<T> {
    pub fn signal(self, event: RequestEvent<T>) {
        // The caller may have stopped waiting; nothing to report then
        let _ = self.sender.send(event);
    }

    pub fn succeed(self, value: T) {
        self.signal(RequestEvent::Success(value));
    }

    pub fn fail(self, error: EngineError) {
        self.signal(RequestEvent::Error(error));
    }

    pub fn block(self) {
        self.signal(RequestEvent::Blocked);
    }

    pub fn abort(self) {
        self.signal(RequestEvent::Abort);
    }
}

/// A single-collection operation, executed as one engine transaction
#[derive(Debug, Clone)]
pub enum StoreOp {
    Put { key: Key, value: Value },
    Get(Key),
    Delete(Key),
    Clear,
    ListKeys,
    Count,
}

/// Result payload of a [`StoreOp`]
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    Done,
    Value(Option<Value>),
    Keys(Vec<Key>),
    Count(u64),
}

/// Schema access granted to an upgrade hook while a version change runs
pub trait SchemaEditor {
    fn old_version(&self) -> u32;
    fn new_version(&self) -> u32;
    fn contains_collection(&self, name: &str) -> bool;
    fn create_collection(&mut self, name: &str) -> Result<(), EngineError>;
}

/// Runs once, inside the open, when the open raises the database version
pub type UpgradeHook = Box<dyn FnOnce(&mut dyn SchemaEditor) -> Result<(), EngineError> + Send>;

/// An open connection to one database
pub trait EngineConnection: Send + Sync {
    fn name(&self) -> &str;

    /// Schema version this connection was opened at
    fn version(&self) -> u32;

    /// Collections visible to this connection
    fn collection_names(&self) -> Vec<String>;

    fn contains_collection(&self, name: &str) -> bool {
        self.collection_names().iter().any(|c| c == name)
    }

    /// Close the connection. Closing twice is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Run `op` against `collection` in its own transaction
    fn execute(&self, collection: &str, op: StoreOp) -> Request<OpOutput>;
}

/// A versioned, transactional, per-origin key-value storage engine
pub trait StorageEngine: Send + Sync {
    /// Open `name` at `version` (or its current version when `None`)
    fn open(
        &self,
        name: &str,
        version: Option<u32>,
        upgrade: Option<UpgradeHook>,
    ) -> Request<Arc<dyn EngineConnection>>;

    /// Delete the whole database `name`
    fn delete_database(&self, name: &str) -> Request<()>;
}
