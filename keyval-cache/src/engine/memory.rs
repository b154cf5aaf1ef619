use super::{
    EngineConnection, OpOutput, Request, RequestEvent, SchemaEditor, StorageEngine, StoreOp,
    UpgradeHook,
};
use crate::error::EngineError;
use crate::key::Key;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A failure to inject into the next executed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail the operation with [`EngineError::Backend`]
    Error(String),
    /// Abort the operation's transaction
    Abort,
}

#[derive(Default)]
struct EngineShared {
    faults: Mutex<VecDeque<Fault>>,
    operations: AtomicU64,
}

#[derive(Default)]
struct DatabaseState {
    version: u32,
    collections: BTreeMap<String, BTreeMap<Key, Value>>,
}

struct Database {
    name: String,
    state: RwLock<DatabaseState>,
    connections: Mutex<Vec<Weak<MemoryConnection>>>,
}

impl Database {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(DatabaseState::default()),
            connections: Mutex::new(Vec::new()),
        }
    }

    fn open_connections(&self) -> usize {
        let mut connections = self.connections.lock();
        connections.retain(|weak| weak.upgrade().is_some_and(|c| !c.is_closed()));
        connections.len()
    }
}

/// In-process storage engine.
///
/// Databases live for the lifetime of the engine value. Every request
/// completes before the call returns, but callers still observe it through
/// the regular [`Request`] protocol.
#[derive(Default)]
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<Database>>>,
    shared: Arc<EngineShared>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault consumed by the next executed operation
    pub fn inject_fault(&self, fault: Fault) {
        self.shared.faults.lock().push_back(fault);
    }

    /// Number of collection operations submitted so far, on any connection
    pub fn operation_count(&self) -> u64 {
        self.shared.operations.load(Ordering::SeqCst)
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.databases.lock().contains_key(name)
    }

    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.databases
            .lock()
            .get(name)
            .map(|db| db.state.read().version)
    }

    pub fn collection_names(&self, name: &str) -> Vec<String> {
        self.databases
            .lock()
            .get(name)
            .map(|db| db.state.read().collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn open_connection_count(&self, name: &str) -> usize {
        self.databases
            .lock()
            .get(name)
            .map(|db| db.open_connections())
            .unwrap_or(0)
    }
}

/// Staged schema changes for one version change
struct UpgradeTransaction<'a> {
    old_version: u32,
    new_version: u32,
    existing: &'a BTreeMap<String, BTreeMap<Key, Value>>,
    created: Vec<String>,
}

impl SchemaEditor for UpgradeTransaction<'_> {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn contains_collection(&self, name: &str) -> bool {
        self.existing.contains_key(name) || self.created.iter().any(|c| c == name)
    }

    fn create_collection(&mut self, name: &str) -> Result<(), EngineError> {
        if self.contains_collection(name) {
            return Err(EngineError::Constraint(format!(
                "collection '{name}' already exists"
            )));
        }
        self.created.push(name.to_string());
        Ok(())
    }
}

impl StorageEngine for MemoryEngine {
    fn open(
        &self,
        name: &str,
        version: Option<u32>,
        upgrade: Option<UpgradeHook>,
    ) -> Request<Arc<dyn EngineConnection>> {
        let mut databases = self.databases.lock();
        let created = !databases.contains_key(name);
        let database = databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Database::new(name)))
            .clone();

        let current = database.state.read().version;
        let target = version.unwrap_or(current);

        if target < current {
            return Request::ready(RequestEvent::Error(EngineError::Version {
                requested: target,
                current,
            }));
        }

        if target > current {
            if database.open_connections() > 0 {
                debug!(
                    "Open of '{}' at v{} blocked by open connections",
                    name, target
                );
                return Request::ready(RequestEvent::Blocked);
            }

            let mut state = database.state.write();
            let mut editor = UpgradeTransaction {
                old_version: current,
                new_version: target,
                existing: &state.collections,
                created: Vec::new(),
            };

            let outcome = match upgrade {
                Some(hook) => hook(&mut editor),
                None => Ok(()),
            };
            let new_collections = editor.created;

            if let Err(e) = outcome {
                drop(state);
                if created {
                    databases.remove(name);
                }
                return Request::ready(RequestEvent::Error(e));
            }

            for collection in new_collections {
                state.collections.insert(collection, BTreeMap::new());
            }
            state.version = target;
            debug!("Upgraded '{}' from v{} to v{}", name, current, target);
        }

        let collections = database.state.read().collections.keys().cloned().collect();
        let connection = Arc::new(MemoryConnection {
            database: database.clone(),
            version: target,
            collections,
            closed: AtomicBool::new(false),
            shared: self.shared.clone(),
        });
        database.connections.lock().push(Arc::downgrade(&connection));

        let connection: Arc<dyn EngineConnection> = connection;
        Request::ready(RequestEvent::Success(connection))
    }

    fn delete_database(&self, name: &str) -> Request<()> {
        let mut databases = self.databases.lock();
        if let Some(database) = databases.get(name) {
            if database.open_connections() > 0 {
                debug!("Delete of '{}' blocked by open connections", name);
                return Request::ready(RequestEvent::Blocked);
            }
            databases.remove(name);
            debug!("Deleted database '{}'", name);
        }
        Request::ready(RequestEvent::Success(()))
    }
}

struct MemoryConnection {
    database: Arc<Database>,
    version: u32,
    collections: Vec<String>,
    closed: AtomicBool,
    shared: Arc<EngineShared>,
}

impl MemoryConnection {
    fn apply(&self, collection: &str, op: StoreOp) -> Result<OpOutput, EngineError> {
        let mut state = self.database.state.write();
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::NotFound(collection.to_string()))?;

        Ok(match op {
            StoreOp::Put { key, value } => {
                records.insert(key, value);
                OpOutput::Done
            }
            StoreOp::Get(key) => OpOutput::Value(records.get(&key).cloned()),
            StoreOp::Delete(key) => {
                records.remove(&key);
                OpOutput::Done
            }
            StoreOp::Clear => {
                records.clear();
                OpOutput::Done
            }
            StoreOp::ListKeys => OpOutput::Keys(records.keys().cloned().collect()),
            StoreOp::Count => OpOutput::Count(records.len() as u64),
        })
    }
}

fn invalid_key(op: &StoreOp) -> Option<&Key> {
    match op {
        StoreOp::Put { key, .. } | StoreOp::Get(key) | StoreOp::Delete(key) => {
            (!key.is_valid()).then_some(key)
        }
        _ => None,
    }
}

impl EngineConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.database.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn collection_names(&self) -> Vec<String> {
        self.collections.clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed connection to '{}'", self.database.name);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn execute(&self, collection: &str, op: StoreOp) -> Request<OpOutput> {
        self.shared.operations.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Request::ready(RequestEvent::Error(EngineError::InvalidState(format!(
                "connection to '{}' is closed",
                self.database.name
            ))));
        }
        if !self.collections.iter().any(|c| c == collection) {
            return Request::ready(RequestEvent::Error(EngineError::NotFound(
                collection.to_string(),
            )));
        }
        if let Some(key) = invalid_key(&op) {
            return Request::ready(RequestEvent::Error(EngineError::Data(format!(
                "invalid key {key}"
            ))));
        }

        if let Some(fault) = self.shared.faults.lock().pop_front() {
            return Request::ready(match fault {
                Fault::Error(message) => RequestEvent::Error(EngineError::Backend(message)),
                Fault::Abort => RequestEvent::Abort,
            });
        }

        Request::ready(match self.apply(collection, op) {
            Ok(output) => RequestEvent::Success(output),
            Err(e) => RequestEvent::Error(e),
        })
    }
}
