//! Map/reduce dispatch.
//!
//! The layer hands [`ReduceJob`]s to the store uninterpreted and
//! deserializes the result documents for the caller. Job semantics
//! (grouping, the single-value reduce skip, store modes) live in the
//! store; see [`docset_store::ReduceJob`].

use crate::error::{DalError, DalResult, Operation};
use docset_store::{DocumentStore, ReduceJob};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Runs a job against `collection` and deserializes the results.
pub(crate) fn run<R: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    job: &ReduceJob,
) -> DalResult<Vec<R>> {
    let docs = store
        .map_reduce(collection, job)
        .map_err(|e| DalError::from_store(Operation::Reduce, e))?;
    docs.into_iter()
        .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(DalError::codec))
        .collect()
}
