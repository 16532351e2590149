//! Aggregation-pipeline dispatch.
//!
//! Stages are opaque `(name, spec)` pairs; the layer forwards them to the
//! store verbatim and deserializes the result documents. Which operators a
//! store supports is the store's business, surfaced as a store failure.

use crate::error::{DalError, DalResult, Operation};
use docset_store::{AggregateOutputMode, DocumentStore, PipelineStage};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Runs a pipeline against `collection` and deserializes the results.
pub(crate) fn run<R: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    stages: &[PipelineStage],
    mode: AggregateOutputMode,
) -> DalResult<Vec<R>> {
    let docs = store
        .aggregate(collection, stages, mode)
        .map_err(|e| DalError::from_store(Operation::Aggregate, e))?;
    docs.into_iter()
        .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(DalError::codec))
        .collect()
}
