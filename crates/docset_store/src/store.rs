//! Document store trait definition.

use crate::document::Document;
use crate::error::StoreResult;
use crate::model::{
    AggregateOutputMode, Capacity, DocPredicate, IndexModel, PipelineStage, ReduceJob,
};
use serde_json::Value;

/// A schemaless document store.
///
/// Stores are **opaque document containers** keyed by an identity value.
/// They execute whole operations server-side - capped eviction, unique-index
/// enforcement, map/reduce jobs, and aggregation pipelines - and report
/// failures through [`crate::StoreError`]. The access layer owns all entity
/// typing; stores never see anything but documents.
///
/// # Invariants
///
/// - `insert` rejects an existing identity with `DuplicateKey`
/// - `insert_many` keeps successfully applied items when later items fail
/// - collections spring into existence on first write; `ensure_collection`
///   exists so capped collections can be provisioned with their capacity
///   before any write
/// - every collection carries the implicit identity index (`_id_`)
/// - implementations must be `Send + Sync`; connections are assumed pooled,
///   so dropping a handle releases nothing
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - in-process reference store, used by tests
pub trait DocumentStore: Send + Sync {
    /// Creates the collection if absent, applying the capacity constraint.
    ///
    /// Calling this for an existing collection is a no-op; capacity is fixed
    /// at creation.
    fn ensure_collection(&self, name: &str, capacity: Capacity) -> StoreResult<()>;

    /// Returns true if the collection exists and is capped.
    fn is_capped(&self, name: &str) -> bool;

    /// Returns the names of all collections.
    fn collection_names(&self) -> Vec<String>;

    /// Inserts a document. The document must carry an `_id` field.
    fn insert(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Inserts a batch of documents.
    ///
    /// Per-item failures are aggregated into one `Batch` error; items that
    /// succeeded stay applied.
    fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<()>;

    /// Inserts or fully replaces a document by its `_id`.
    fn upsert(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Finds a document by identity value.
    fn find_by_id(&self, collection: &str, id: &Value) -> StoreResult<Option<Document>>;

    /// Returns true if a document with this identity exists.
    fn exists(&self, collection: &str, id: &Value) -> StoreResult<bool>;

    /// Returns all documents in insertion order.
    fn scan(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Sets the named fields on the document with this identity.
    ///
    /// Returns false if no such document exists. Other stored fields are
    /// left untouched.
    fn update_fields(
        &self,
        collection: &str,
        id: &Value,
        fields: Vec<(String, Value)>,
    ) -> StoreResult<bool>;

    /// Sets the named fields on every document matching the predicate.
    ///
    /// Returns the number of documents updated.
    fn update_where(
        &self,
        collection: &str,
        predicate: DocPredicate,
        fields: Vec<(String, Value)>,
    ) -> StoreResult<u64>;

    /// Atomically adds `delta` to a numeric field.
    ///
    /// Integer-valued fields are incremented exactly; a missing field is
    /// treated as zero. Returns false if no such document exists.
    fn increment(&self, collection: &str, id: &Value, field: &str, delta: i64)
        -> StoreResult<bool>;

    /// Deletes the document with this identity. Deleting a missing
    /// document is a no-op.
    fn delete(&self, collection: &str, id: &Value) -> StoreResult<()>;

    /// Deletes every document matching the predicate. Returns the number
    /// deleted.
    fn delete_where(&self, collection: &str, predicate: DocPredicate) -> StoreResult<u64>;

    /// Deletes every document in the collection.
    fn delete_all(&self, collection: &str) -> StoreResult<()>;

    /// Lists the live indexes, identity index included.
    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>>;

    /// Creates an index.
    ///
    /// `in_foreground` requests a blocking build; stores without the
    /// distinction may ignore it.
    fn create_index(&self, collection: &str, index: IndexModel, in_foreground: bool)
        -> StoreResult<()>;

    /// Drops the named index.
    fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()>;

    /// Executes a map/reduce job against the collection.
    ///
    /// Returns the result documents (`{"_id": key, "value": value}`), or an
    /// empty vector when the job does not fetch results.
    fn map_reduce(&self, collection: &str, job: &ReduceJob) -> StoreResult<Vec<Document>>;

    /// Executes an aggregation pipeline against the collection.
    fn aggregate(
        &self,
        collection: &str,
        stages: &[PipelineStage],
        mode: AggregateOutputMode,
    ) -> StoreResult<Vec<Document>>;

    /// Stores an opaque blob under a string key.
    fn put_blob(&self, key: &str, data: Vec<u8>) -> StoreResult<()>;

    /// Retrieves a blob by key.
    fn get_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Returns true if a blob is stored under the key, without
    /// materializing its content.
    fn blob_exists(&self, key: &str) -> StoreResult<bool>;

    /// Deletes a blob by key. Deleting a missing blob is a no-op.
    fn delete_blob(&self, key: &str) -> StoreResult<()>;
}
