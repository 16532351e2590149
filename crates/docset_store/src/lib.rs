//! # docset store
//!
//! Document-store abstraction for docset.
//!
//! This crate defines the seam between the typed access layer and the
//! backing document store. Stores are **opaque document containers**: they
//! hold schemaless JSON documents keyed by an identity value and execute
//! whole operations server-side (capped eviction, unique indexes,
//! map/reduce jobs, aggregation pipelines). The access layer owns all
//! entity typing.
//!
//! ## Available stores
//!
//! - [`MemoryStore`] - in-process reference store, used by tests
//!
//! ## Example
//!
//! ```rust
//! use docset_store::{DocumentStore, MemoryStore};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let doc = json!({"_id": 1, "name": "ada"}).as_object().unwrap().clone();
//! store.insert("users", doc).unwrap();
//! assert!(store.exists("users", &json!(1)).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod eval;
mod memory;
mod model;
mod store;

pub use document::{canonical_key, compare_values, doc_id, doc_size, field_path, Document, ID_FIELD};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::{
    AggregateOutputMode, Capacity, Direction, DocPredicate, FinalizeFn, IndexModel, MapFn,
    PipelineStage, ReduceFn, ReduceJob, ReduceStoreMode,
};
pub use store::DocumentStore;
