use std::fmt;
use thiserror::Error;

/// Errors reported by a storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Requested version {requested} is lower than the current version {current}")]
    Version { requested: u32, current: u32 },

    #[error("Collection not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Constraint error: {0}")]
    Constraint(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Request dropped before completion")]
    Dropped,

    #[error("Engine failure: {0}")]
    Backend(String),
}

/// The cache-level operation a transaction belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Set,
    Get,
    Remove,
    Clear,
    Count,
    ListKeys,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Remove => "remove",
            Self::Clear => "clear",
            Self::Count => "count",
            Self::ListKeys => "list keys",
        };
        f.write_str(name)
    }
}

/// Main error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Blocked: another open connection to '{0}' prevents the version change")]
    Blocked(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Transaction aborted during {operation}")]
    Aborted { operation: OperationKind },

    #[error("No TTL configured for collection '{0}'")]
    NoTtl(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unresolved corruption in cache '{cache}': collection '{collection}' still missing")]
    UnresolvedCorruption { cache: String, collection: String },
}

impl CacheError {
    /// Whether this error was raised before any engine work was attempted
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoTtl(_) | Self::ConnectionClosed | Self::InvalidValue(_)
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
