//! Error types for descriptors and value trees.

use thiserror::Error;

/// Failures of a structural update against the actual shape of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("cannot descend into a non-container value at '{path}'")]
    NotAContainer { path: String },

    #[error("index {index} out of bounds at '{path}' (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("segment '{segment}' is not an array index at '{path}'")]
    InvalidIndex { path: String, segment: String },
}

/// Malformed descriptors coming from the template producer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid {kind} descriptor: {source}")]
    InvalidDescriptor {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("dependency '{dep}' of '{uid}' is not one of its variables")]
    DepNotInVariables { uid: String, dep: String },
}
