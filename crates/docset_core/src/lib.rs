//! # docset core
//!
//! Typed entity sets over a schemaless document store.
//!
//! A [`Context`] binds entity types to collections of a
//! [`DocumentStore`](docset_store::DocumentStore). Each registered type
//! gets an [`EntitySet`] offering CRUD, partial updates, predicate bulk
//! operations, access-control observers, declared secondary indexes, and
//! dispatch of map/reduce jobs and aggregation pipelines.
//!
//! ## Example
//!
//! ```rust
//! use docset_core::{Context, Entity};
//! use docset_store::MemoryStore;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     type Key = i64;
//!
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! let context = Context::builder(Arc::new(MemoryStore::new()))
//!     .entity_set::<User>("Users")
//!     .build()
//!     .unwrap();
//! let users = context.entity_set::<User>().unwrap();
//! users.add(&User { id: 1, name: "ada".into() }).unwrap();
//! assert!(users.contains(&1).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod aggregate;
mod config;
mod context;
mod entity;
mod error;
mod files;
mod index;
mod reduce;
mod set;
mod set_dyn;

pub use access::{AccessEvent, Observer};
pub use config::{NamingMode, SetOptions};
pub use context::{Context, ContextBuilder};
pub use entity::{descriptor_of, DescriptorBuilder, Entity, EntityDescriptor, EntityKey};
pub use error::{DalError, DalResult, Operation};
pub use files::FileSet;
pub use index::IndexDefinition;
pub use set::EntitySet;
pub use set_dyn::DynEntitySet;

pub use docset_store::{
    AggregateOutputMode, Capacity, Direction, IndexModel, PipelineStage, ReduceJob,
    ReduceStoreMode,
};
