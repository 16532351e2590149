//! Error types for the entity-set layer.

use docset_store::StoreError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for entity-set operations.
pub type DalResult<T> = Result<T, DalError>;

/// The logical operation an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Insert of one or more entities.
    Add,
    /// Read of one or more entities.
    Get,
    /// Full or partial update.
    Update,
    /// Removal of one or more entities.
    Delete,
    /// Index creation, listing, or reconciliation.
    Index,
    /// Map/reduce dispatch.
    Reduce,
    /// Aggregation-pipeline dispatch.
    Aggregate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Index => "index",
            Self::Reduce => "reduce",
            Self::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// Errors raised by entity sets and contexts.
///
/// All errors surface synchronously to the caller; the only silent path in
/// the layer is plural-read access filtering. There are no automatic
/// retries.
#[derive(Debug, Error)]
pub enum DalError {
    /// A mutating call carried a default/empty identity.
    #[error("{operation} failed: entity identity is unset")]
    NullIdentity {
        /// The attempted operation.
        operation: Operation,
    },

    /// An update targeted an identity that does not exist.
    #[error("{operation} failed: entity not found")]
    NotFound {
        /// The attempted operation.
        operation: Operation,
    },

    /// An access-control observer declined the operation, or a predicate
    /// bulk operation was attempted while observers are registered.
    #[error("access restricted: {message}")]
    AccessRestricted {
        /// Why access was declined.
        message: String,
    },

    /// The backing store reported an error.
    #[error("store failure during {operation}: {message}")]
    Store {
        /// The attempted operation.
        operation: Operation,
        /// The raw backend message.
        message: String,
        /// Serialized form of the offending entities, when known.
        entities: Vec<Value>,
    },

    /// Type mismatch on the untyped surface, or a structurally invalid
    /// request.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },
}

impl DalError {
    /// Creates a null-identity error.
    pub fn null_identity(operation: Operation) -> Self {
        Self::NullIdentity { operation }
    }

    /// Creates a not-found error.
    pub fn not_found(operation: Operation) -> Self {
        Self::NotFound { operation }
    }

    /// Creates an access-restricted error.
    pub fn access_restricted(message: impl Into<String>) -> Self {
        Self::AccessRestricted {
            message: message.into(),
        }
    }

    /// Creates a store failure with no entity payload.
    pub fn store_failure(operation: Operation, message: impl Into<String>) -> Self {
        Self::Store {
            operation,
            message: message.into(),
            entities: Vec::new(),
        }
    }

    /// Creates a store failure carrying the offending entities.
    pub fn store_failure_with(
        operation: Operation,
        message: impl Into<String>,
        entities: Vec<Value>,
    ) -> Self {
        Self::Store {
            operation,
            message: message.into(),
            entities,
        }
    }

    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a backend error, tagging the logical operation.
    pub fn from_store(operation: Operation, error: StoreError) -> Self {
        Self::store_failure(operation, error.to_string())
    }

    /// Wraps an entity (de)serialization error.
    pub fn codec(error: serde_json::Error) -> Self {
        Self::invalid_operation(format!("entity codec error: {error}"))
    }
}
