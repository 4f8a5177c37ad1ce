//! Error types for the engine.
//!
//! Each concern gets its own enum; the store keeps resolution failures per
//! cell so one failing variable never affects its siblings.

use thiserror::Error;
use weave_model::{ModelError, PathError};

/// Failures reported by the transport behind [`crate::store::Backend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("backend responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("could not decode backend response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A `{__ref}` token without a lookup entry.
    #[error("reference '{key}' not found in lookup")]
    MissingReference { key: String },

    #[error("variable '{uid}' has no value in this context")]
    Unresolvable { uid: String },

    #[error("variable '{uid}' is not resolved by the backend")]
    NotDerived { uid: String },

    /// The cell was evicted or the store cleared while a caller waited.
    #[error("resolution of '{uid}' was dropped before it settled")]
    Cancelled { uid: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("variable '{uid}' cannot be written on the client")]
    NotWritable { uid: String },

    #[error("variable '{uid}' is not bound to a backend store")]
    NoBackendStore { uid: String },

    #[error("cannot update nested value of '{uid}': {source}")]
    Path {
        uid: String,
        #[source]
        source: PathError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no handler registered for action '{name}'")]
    UnknownAction { name: String },

    #[error("action '{name}' failed")]
    Handler {
        name: String,
        #[source]
        source: Box<dyn std::error::Error>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
