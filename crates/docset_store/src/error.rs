//! Error types for the document-store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert collided with an existing document key.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// Display form of the colliding key.
        key: String,
    },

    /// A unique index rejected a document.
    #[error("unique index violation on `{index}`")]
    UniqueViolation {
        /// Name of the violated index.
        index: String,
    },

    /// The named collection does not exist.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// The named index does not exist.
    #[error("unknown index: {name}")]
    UnknownIndex {
        /// Name of the index.
        name: String,
    },

    /// The store cannot execute the requested construct.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the unsupported construct.
        message: String,
    },

    /// A batch operation failed for one or more items.
    ///
    /// Items that succeeded before the failures stay applied; the store
    /// performs no compensating rollback.
    #[error("batch failure: {}", messages.join("; "))]
    Batch {
        /// One message per failed item.
        messages: Vec<String>,
    },

    /// A stored document could not be interpreted.
    #[error("malformed document: {message}")]
    MalformedDocument {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a duplicate-key error.
    pub fn duplicate_key(key: impl std::fmt::Display) -> Self {
        Self::DuplicateKey {
            key: key.to_string(),
        }
    }

    /// Creates a unique-violation error.
    pub fn unique_violation(index: impl Into<String>) -> Self {
        Self::UniqueViolation {
            index: index.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Creates an unknown-index error.
    pub fn unknown_index(name: impl Into<String>) -> Self {
        Self::UnknownIndex { name: name.into() }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }
}
