//! Error types for the state core.

use crate::types::DispatchToken;
use thiserror::Error;

/// Main error type for dispatcher, store, getter and application operations.
///
/// Every variant is raised at the point of violation and returned to the
/// caller of the triggering operation. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum FluxError {
    // --- Registry collisions ---
    #[error("Action with the same id: {0} already exists")]
    DuplicateAction(String),

    #[error("Action type: {0} already exists")]
    DuplicateActionType(String),

    #[error("Getter with the same id: {0} already exists")]
    DuplicateGetter(String),

    #[error("Store with the same id: {0} already exists")]
    DuplicateStore(String),

    #[error("Store {store} is already registered as {existing}")]
    StoreAlreadyRegistered { store: String, existing: String },

    // --- Contract violations ---
    #[error(
        "Store {store} returned no state for action {action_type}; \
         a transition must always return the new state, even if unchanged"
    )]
    TransitionReturnedNothing { store: String, action_type: String },

    #[error("Getter {0} returned no value; all getter functions must return a value")]
    GetterReturnedNothing(String),

    #[error("Store definition maps {event} to unknown handler {handler}")]
    UnknownHandler { event: String, handler: String },

    // --- Dependency resolution ---
    #[error("Getter {getter} could not find {dependency} in stores or getters")]
    UnresolvedDependency { getter: String, dependency: String },

    #[error("Getter {0} has an empty dependency id")]
    InvalidDependency(String),

    // --- Protocol misuse ---
    #[error("Cannot dispatch in the middle of a dispatch")]
    DispatchInProgress,

    #[error("wait_for must be invoked while dispatching")]
    WaitForOutsideDispatch,

    #[error("Circular dependency detected while waiting for {0}")]
    CircularWait(DispatchToken),

    #[error("{0} does not map to a registered callback")]
    UnknownDispatchToken(DispatchToken),

    #[error("Rollback was called before a snapshot was taken")]
    NoSnapshot,

    #[error("Desired state data passed was not a supported type: {0}")]
    UnsupportedBootstrapData(String),

    // --- Lookups ---
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Store not registered: {0}")]
    StoreNotRegistered(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Application has been dropped")]
    ApplicationDropped,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // --- Storage ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },
}

impl From<serde_json::Error> for FluxError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            FluxError::Deserialization(e.to_string())
        } else {
            FluxError::Serialization(e.to_string())
        }
    }
}

/// Result type for state core operations.
pub type Result<T> = std::result::Result<T, FluxError>;
