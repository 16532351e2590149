//! Shared model types for the store contract.

use crate::document::Document;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Capacity constraint for a capped collection.
///
/// Limits are combinable; an unset limit means unlimited. A collection with
/// any limit set is capped and evicts its oldest documents first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capacity {
    /// Maximum total document bytes, if limited.
    pub max_bytes: Option<u64>,
    /// Maximum document count, if limited.
    pub max_count: Option<u64>,
}

impl Capacity {
    /// An unlimited (non-capped) capacity.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_bytes: None,
            max_count: None,
        }
    }

    /// Sets the byte cap. Values of zero or below mean unlimited.
    #[must_use]
    pub fn max_bytes(mut self, bytes: i64) -> Self {
        self.max_bytes = (bytes > 0).then_some(bytes as u64);
        self
    }

    /// Sets the document-count cap. Values of zero or below mean unlimited.
    #[must_use]
    pub fn max_count(mut self, count: i64) -> Self {
        self.max_count = (count > 0).then_some(count as u64);
        self
    }

    /// Returns true if any limit is set.
    #[must_use]
    pub const fn is_capped(&self) -> bool {
        self.max_bytes.is_some() || self.max_count.is_some()
    }
}

/// Sort direction for an index key or sort stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending order.
    Ascending,
    /// Descending order.
    Descending,
}

/// A live or requested index on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    /// Index name. The identity index is always named `_id_`.
    pub name: String,
    /// Ordered key list.
    pub fields: Vec<(String, Direction)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether documents missing a keyed field are skipped.
    pub sparse: bool,
}

impl IndexModel {
    /// Creates an index model, deriving the conventional name from the keys
    /// (`field_1` for ascending, `field_-1` for descending).
    #[must_use]
    pub fn new(fields: Vec<(String, Direction)>, unique: bool, sparse: bool) -> Self {
        let name = fields
            .iter()
            .map(|(f, d)| {
                let dir = match d {
                    Direction::Ascending => "1",
                    Direction::Descending => "-1",
                };
                format!("{f}_{dir}")
            })
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            fields,
            unique,
            sparse,
        }
    }

    /// The implicit identity index present on every collection.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            name: "_id_".to_string(),
            fields: vec![(crate::document::ID_FIELD.to_string(), Direction::Ascending)],
            unique: true,
            sparse: false,
        }
    }

    /// Returns true if this is the identity index.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.name == "_id_"
    }

    /// Returns true if both indexes cover the same ordered field-name
    /// sequence. Directions, uniqueness, and sparsity are not compared.
    #[must_use]
    pub fn same_field_sequence(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((a, _), (b, _))| a == b)
    }
}

/// A predicate over raw documents.
pub type DocPredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Map function: emits zero or more `(key, value)` pairs per input document.
pub type MapFn = Arc<dyn Fn(&Document) -> Vec<(Value, Value)> + Send + Sync>;

/// Reduce function: folds all values emitted for one key into a single value.
pub type ReduceFn = Arc<dyn Fn(&Value, &[Value]) -> Value + Send + Sync>;

/// Finalize function: post-processes each reduced `(key, value)` pair.
pub type FinalizeFn = Arc<dyn Fn(&Value, Value) -> Value + Send + Sync>;

/// Where a reduction's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReduceStoreMode {
    /// Return results inline; nothing is stored.
    #[default]
    None,
    /// Replace the named output collection with the results.
    NewSet,
    /// Merge results into the named output collection, replacing items
    /// whose keys collide.
    ReplaceItems,
    /// Reduce new results into the named output collection's existing
    /// values. Running several jobs against one output name stages a
    /// cross-collection join.
    Combine,
}

/// A map/reduce job.
///
/// The function bodies are opaque to the access layer; the store's
/// execution engine runs them. Groups with a single emitted value skip the
/// reduce step, so reduce functions must be written to be re-reducible.
#[derive(Clone)]
pub struct ReduceJob {
    /// Map function.
    pub map: MapFn,
    /// Reduce function.
    pub reduce: ReduceFn,
    /// Optional finalize function.
    pub finalize: Option<FinalizeFn>,
    /// Optional input restriction.
    pub filter: Option<DocPredicate>,
    /// Optional input sort, applied before mapping.
    pub sort: Option<(String, Direction)>,
    /// Output disposition.
    pub store_mode: ReduceStoreMode,
    /// Output collection name; required for any stored mode.
    pub output: Option<String>,
    /// Whether the caller wants the result sequence back.
    pub fetch_results: bool,
}

impl ReduceJob {
    /// Creates an inline job from map and reduce functions.
    pub fn new<M, R>(map: M, reduce: R) -> Self
    where
        M: Fn(&Document) -> Vec<(Value, Value)> + Send + Sync + 'static,
        R: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            map: Arc::new(map),
            reduce: Arc::new(reduce),
            finalize: None,
            filter: None,
            sort: None,
            store_mode: ReduceStoreMode::None,
            output: None,
            fetch_results: true,
        }
    }

    /// Sets the finalize function.
    #[must_use]
    pub fn finalize<F>(mut self, finalize: F) -> Self
    where
        F: Fn(&Value, Value) -> Value + Send + Sync + 'static,
    {
        self.finalize = Some(Arc::new(finalize));
        self
    }

    /// Restricts the input set.
    #[must_use]
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Sorts the input set before mapping.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    /// Stores results in `output` with the given mode.
    ///
    /// An empty output name downgrades the mode to
    /// [`ReduceStoreMode::None`].
    #[must_use]
    pub fn store(mut self, mode: ReduceStoreMode, output: impl Into<String>) -> Self {
        let output = output.into();
        if output.is_empty() {
            self.store_mode = ReduceStoreMode::None;
            self.output = None;
        } else {
            self.store_mode = mode;
            self.output = Some(output);
        }
        self
    }

    /// Sets whether results are fetched back to the caller.
    #[must_use]
    pub fn fetch_results(mut self, fetch: bool) -> Self {
        self.fetch_results = fetch;
        self
    }
}

impl fmt::Debug for ReduceJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceJob")
            .field("store_mode", &self.store_mode)
            .field("output", &self.output)
            .field("fetch_results", &self.fetch_results)
            .finish_non_exhaustive()
    }
}

/// How aggregation results are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateOutputMode {
    /// Stream results back as a cursor-style batch.
    #[default]
    Cursor,
    /// Materialize the whole result inline.
    Inline,
}

/// One stage of an aggregation pipeline.
///
/// A stage is an opaque `(name, spec)` pair handed to the store verbatim;
/// the access layer never interprets the spec.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    /// Stage operator name, e.g. `$match`.
    pub name: String,
    /// Stage specification document.
    pub spec: Value,
}

impl PipelineStage {
    /// An arbitrary stage; the escape hatch for operators without a
    /// dedicated constructor.
    #[must_use]
    pub fn other(name: impl Into<String>, spec: Value) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// A `$match` filter stage.
    #[must_use]
    pub fn matching(spec: Value) -> Self {
        Self::other("$match", spec)
    }

    /// A `$project` projection stage.
    #[must_use]
    pub fn project(spec: Value) -> Self {
        Self::other("$project", spec)
    }

    /// A `$group` grouping stage.
    #[must_use]
    pub fn group(spec: Value) -> Self {
        Self::other("$group", spec)
    }

    /// An `$unwind` stage over an array field path (`"$items"`).
    #[must_use]
    pub fn unwind(field_path: impl Into<String>) -> Self {
        Self::other("$unwind", Value::String(field_path.into()))
    }

    /// A `$sort` stage (`{"field": 1 | -1, ...}`).
    #[must_use]
    pub fn sort(spec: Value) -> Self {
        Self::other("$sort", spec)
    }

    /// A `$skip` stage.
    #[must_use]
    pub fn skip(count: u64) -> Self {
        Self::other("$skip", Value::from(count))
    }

    /// A `$limit` stage.
    #[must_use]
    pub fn limit(count: u64) -> Self {
        Self::other("$limit", Value::from(count))
    }

    /// A `$out` stage writing results to the named collection.
    #[must_use]
    pub fn out(collection: impl Into<String>) -> Self {
        Self::other("$out", Value::String(collection.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capacity_nonpositive_means_unlimited() {
        let cap = Capacity::unlimited().max_bytes(0).max_count(-5);
        assert!(!cap.is_capped());

        let cap = Capacity::unlimited().max_count(3);
        assert!(cap.is_capped());
        assert_eq!(cap.max_count, Some(3));
    }

    #[test]
    fn index_model_name_derivation() {
        let idx = IndexModel::new(
            vec![
                ("owner".into(), Direction::Ascending),
                ("when".into(), Direction::Descending),
            ],
            false,
            false,
        );
        assert_eq!(idx.name, "owner_1_when_-1");
        assert!(!idx.is_identity());
        assert!(IndexModel::identity().is_identity());
    }

    #[test]
    fn field_sequence_ignores_options() {
        let a = IndexModel::new(vec![("x".into(), Direction::Ascending)], true, false);
        let b = IndexModel::new(vec![("x".into(), Direction::Descending)], false, true);
        assert!(a.same_field_sequence(&b));

        let c = IndexModel::new(vec![("y".into(), Direction::Ascending)], false, false);
        assert!(!a.same_field_sequence(&c));
    }

    #[test]
    fn reduce_job_empty_output_downgrades_mode() {
        let job = ReduceJob::new(|_| vec![], |_, _| Value::Null)
            .store(ReduceStoreMode::NewSet, "");
        assert_eq!(job.store_mode, ReduceStoreMode::None);
        assert!(job.output.is_none());
    }

    #[test]
    fn pipeline_stage_constructors() {
        assert_eq!(PipelineStage::skip(3).name, "$skip");
        assert_eq!(PipelineStage::unwind("$items").spec, json!("$items"));
        assert_eq!(PipelineStage::out("totals").spec, json!("totals"));
    }
}
