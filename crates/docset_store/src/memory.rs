//! In-process document store.

use crate::document::{canonical_key, compare_values, doc_size, Document, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::eval;
use crate::model::{
    AggregateOutputMode, Capacity, Direction, DocPredicate, IndexModel, PipelineStage, ReduceJob,
    ReduceStoreMode,
};
use crate::store::DocumentStore;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// An in-process [`DocumentStore`].
///
/// `MemoryStore` implements the full store contract - capped eviction,
/// unique-index enforcement, map/reduce, and aggregation pipelines - and is
/// the reference backend for tests. Collections spring into existence on
/// first write and hold documents in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, CollectionData>,
    blobs: HashMap<String, Vec<u8>>,
}

struct CollectionData {
    capacity: Capacity,
    docs: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl CollectionData {
    fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            docs: Vec::new(),
            indexes: Vec::new(),
        }
    }

    fn position(&self, id: &Value) -> Option<usize> {
        self.docs.iter().position(|doc| doc.get(ID_FIELD) == Some(id))
    }

    /// Rejects a document that would violate a unique index.
    ///
    /// Sparse unique indexes skip documents missing any keyed field.
    /// `exclude` ignores one slot, for replacement-in-place.
    fn check_unique(&self, doc: &Document, exclude: Option<usize>) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let candidate: Vec<Option<&Value>> =
                index.fields.iter().map(|(f, _)| doc.get(f)).collect();
            if index.sparse && candidate.iter().any(Option::is_none) {
                continue;
            }
            for (pos, existing) in self.docs.iter().enumerate() {
                if Some(pos) == exclude {
                    continue;
                }
                let stored: Vec<Option<&Value>> =
                    index.fields.iter().map(|(f, _)| existing.get(f)).collect();
                if stored == candidate {
                    return Err(StoreError::unique_violation(index.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Evicts oldest documents until the capacity constraint holds.
    fn enforce_capacity(&mut self, name: &str) {
        if let Some(max) = self.capacity.max_count {
            while self.docs.len() as u64 > max {
                let evicted = self.docs.remove(0);
                debug!(collection = name, id = ?evicted.get(ID_FIELD), "evicted by count cap");
            }
        }
        if let Some(max) = self.capacity.max_bytes {
            let mut total: u64 = self.docs.iter().map(doc_size).sum();
            while total > max && self.docs.len() > 1 {
                let evicted = self.docs.remove(0);
                total -= doc_size(&evicted);
                debug!(collection = name, id = ?evicted.get(ID_FIELD), "evicted by byte cap");
            }
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_locked(inner: &mut Inner, collection: &str, doc: Document) -> StoreResult<()> {
        let id = doc
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| StoreError::malformed("document is missing _id"))?;

        let data = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionData::new(Capacity::unlimited()));

        if data.position(&id).is_some() {
            return Err(StoreError::duplicate_key(canonical_key(&id)));
        }
        data.check_unique(&doc, None)?;
        data.docs.push(doc);
        data.enforce_capacity(collection);
        Ok(())
    }

    fn scan_locked(inner: &Inner, collection: &str) -> Vec<Document> {
        inner
            .collections
            .get(collection)
            .map(|data| data.docs.clone())
            .unwrap_or_default()
    }

    fn run_map_reduce(inner: &mut Inner, collection: &str, job: &ReduceJob) -> StoreResult<Vec<Document>> {
        let mut input = Self::scan_locked(inner, collection);

        if let Some(filter) = &job.filter {
            input.retain(|doc| filter(doc));
        }
        if let Some((field, direction)) = &job.sort {
            input.sort_by(|a, b| {
                let av = a.get(field).cloned().unwrap_or(Value::Null);
                let bv = b.get(field).cloned().unwrap_or(Value::Null);
                let ord = compare_values(&av, &bv);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        // Group emissions by canonical key, preserving first-seen order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (Value, Vec<Value>)> = HashMap::new();
        for doc in &input {
            for (key, value) in (job.map)(doc) {
                let bucket = canonical_key(&key);
                groups
                    .entry(bucket.clone())
                    .or_insert_with(|| {
                        order.push(bucket.clone());
                        (key, Vec::new())
                    })
                    .1
                    .push(value);
            }
        }

        // Singleton groups skip the reduce step, so reduce functions must
        // be re-reducible.
        let mut reduced: Vec<(Value, Value)> = Vec::with_capacity(order.len());
        for bucket in &order {
            let (key, values) = &groups[bucket];
            let value = if values.len() == 1 {
                values[0].clone()
            } else {
                (job.reduce)(key, values)
            };
            reduced.push((key.clone(), value));
        }

        debug!(
            collection,
            groups = reduced.len(),
            mode = ?job.store_mode,
            "map/reduce complete"
        );

        let finalize = |key: &Value, value: Value| -> Value {
            match &job.finalize {
                Some(f) => f(key, value),
                None => value,
            }
        };
        let to_doc = |key: Value, value: Value| -> Document {
            let mut doc = Map::new();
            doc.insert(ID_FIELD.to_string(), key);
            doc.insert("value".to_string(), value);
            doc
        };

        match job.store_mode {
            ReduceStoreMode::None => {
                let results = reduced
                    .into_iter()
                    .map(|(k, v)| {
                        let fin = finalize(&k, v);
                        to_doc(k, fin)
                    })
                    .collect();
                if job.fetch_results {
                    Ok(results)
                } else {
                    Ok(Vec::new())
                }
            }
            mode => {
                let output = job
                    .output
                    .clone()
                    .ok_or_else(|| StoreError::unsupported("stored reduction requires an output name"))?;

                match mode {
                    ReduceStoreMode::NewSet => {
                        let data = inner
                            .collections
                            .entry(output.clone())
                            .or_insert_with(|| CollectionData::new(Capacity::unlimited()));
                        data.docs = reduced
                            .into_iter()
                            .map(|(k, v)| {
                                let fin = finalize(&k, v);
                                to_doc(k, fin)
                            })
                            .collect();
                    }
                    ReduceStoreMode::ReplaceItems => {
                        for (k, v) in reduced {
                            let fin = finalize(&k, v);
                            Self::upsert_locked(inner, &output, to_doc(k, fin))?;
                        }
                    }
                    ReduceStoreMode::Combine => {
                        for (k, v) in reduced {
                            let existing = inner
                                .collections
                                .get(&output)
                                .and_then(|data| data.position(&k).map(|p| data.docs[p].clone()));
                            let value = match existing {
                                Some(doc) => {
                                    let prior = doc.get("value").cloned().unwrap_or(Value::Null);
                                    (job.reduce)(&k, &[prior, v])
                                }
                                None => v,
                            };
                            let fin = finalize(&k, value);
                            Self::upsert_locked(inner, &output, to_doc(k, fin))?;
                        }
                    }
                    ReduceStoreMode::None => {}
                }

                if job.fetch_results {
                    Ok(Self::scan_locked(inner, &output))
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    fn upsert_locked(inner: &mut Inner, collection: &str, doc: Document) -> StoreResult<()> {
        let id = doc
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| StoreError::malformed("document is missing _id"))?;
        let data = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionData::new(Capacity::unlimited()));
        match data.position(&id) {
            Some(pos) => {
                data.check_unique(&doc, Some(pos))?;
                data.docs[pos] = doc;
            }
            None => {
                data.check_unique(&doc, None)?;
                data.docs.push(doc);
                data.enforce_capacity(collection);
            }
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn ensure_collection(&self, name: &str, capacity: Capacity) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner
            .collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionData::new(capacity));
        Ok(())
    }

    fn is_capped(&self, name: &str) -> bool {
        self.inner
            .read()
            .collections
            .get(name)
            .map(|data| data.capacity.is_capped())
            .unwrap_or(false)
    }

    fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().collections.keys().cloned().collect();
        names.sort();
        names
    }

    fn insert(&self, collection: &str, doc: Document) -> StoreResult<()> {
        Self::insert_locked(&mut self.inner.write(), collection, doc)
    }

    fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let mut messages = Vec::new();
        for doc in docs {
            if let Err(e) = Self::insert_locked(&mut inner, collection, doc) {
                messages.push(e.to_string());
            }
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Batch { messages })
        }
    }

    fn upsert(&self, collection: &str, doc: Document) -> StoreResult<()> {
        Self::upsert_locked(&mut self.inner.write(), collection, doc)
    }

    fn find_by_id(&self, collection: &str, id: &Value) -> StoreResult<Option<Document>> {
        let inner = self.inner.read();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|data| data.position(id).map(|pos| data.docs[pos].clone())))
    }

    fn exists(&self, collection: &str, id: &Value) -> StoreResult<bool> {
        let inner = self.inner.read();
        Ok(inner
            .collections
            .get(collection)
            .map(|data| data.position(id).is_some())
            .unwrap_or(false))
    }

    fn scan(&self, collection: &str) -> StoreResult<Vec<Document>> {
        Ok(Self::scan_locked(&self.inner.read(), collection))
    }

    fn update_fields(
        &self,
        collection: &str,
        id: &Value,
        fields: Vec<(String, Value)>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(data) = inner.collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(pos) = data.position(id) else {
            return Ok(false);
        };
        for (name, value) in fields {
            data.docs[pos].insert(name, value);
        }
        Ok(true)
    }

    fn update_where(
        &self,
        collection: &str,
        predicate: DocPredicate,
        fields: Vec<(String, Value)>,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let Some(data) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for doc in data.docs.iter_mut() {
            if predicate(doc) {
                for (name, value) in &fields {
                    doc.insert(name.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn increment(
        &self,
        collection: &str,
        id: &Value,
        field: &str,
        delta: i64,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(data) = inner.collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(pos) = data.position(id) else {
            return Ok(false);
        };
        // Integer fields stay integers so large counters never round.
        let value = match data.docs[pos].get(field) {
            None | Some(Value::Null) => Value::from(delta),
            Some(current) => match current.as_i64() {
                Some(n) => Value::from(n.saturating_add(delta)),
                None => Value::from(current.as_f64().unwrap_or(0.0) + delta as f64),
            },
        };
        data.docs[pos].insert(field.to_string(), value);
        Ok(true)
    }

    fn delete(&self, collection: &str, id: &Value) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(data) = inner.collections.get_mut(collection) {
            if let Some(pos) = data.position(id) {
                data.docs.remove(pos);
            }
        }
        Ok(())
    }

    fn delete_where(&self, collection: &str, predicate: DocPredicate) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let Some(data) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = data.docs.len();
        data.docs.retain(|doc| !predicate(doc));
        Ok((before - data.docs.len()) as u64)
    }

    fn delete_all(&self, collection: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(data) = inner.collections.get_mut(collection) {
            data.docs.clear();
        }
        Ok(())
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        let inner = self.inner.read();
        let mut indexes = vec![IndexModel::identity()];
        if let Some(data) = inner.collections.get(collection) {
            indexes.extend(data.indexes.iter().cloned());
        }
        Ok(indexes)
    }

    fn create_index(
        &self,
        collection: &str,
        index: IndexModel,
        _in_foreground: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let data = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionData::new(Capacity::unlimited()));
        if data.indexes.iter().any(|i| i.name == index.name) {
            return Ok(());
        }
        debug!(collection, index = %index.name, "created index");
        data.indexes.push(index);
        Ok(())
    }

    fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let Some(data) = inner.collections.get_mut(collection) else {
            return Err(StoreError::unknown_collection(collection));
        };
        let before = data.indexes.len();
        data.indexes.retain(|i| i.name != name);
        if data.indexes.len() == before {
            return Err(StoreError::unknown_index(name));
        }
        debug!(collection, index = name, "dropped index");
        Ok(())
    }

    fn map_reduce(&self, collection: &str, job: &ReduceJob) -> StoreResult<Vec<Document>> {
        Self::run_map_reduce(&mut self.inner.write(), collection, job)
    }

    fn aggregate(
        &self,
        collection: &str,
        stages: &[PipelineStage],
        _mode: AggregateOutputMode,
    ) -> StoreResult<Vec<Document>> {
        // Cursor and Inline both materialize here; a remote store would
        // stream the cursor variant.
        let mut docs = Self::scan_locked(&self.inner.read(), collection);

        for stage in stages {
            match stage.name.as_str() {
                "$match" => {
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if eval::matches(&doc, &stage.spec)? {
                            kept.push(doc);
                        }
                    }
                    docs = kept;
                }
                "$project" => {
                    docs = docs
                        .iter()
                        .map(|doc| eval::project(doc, &stage.spec))
                        .collect::<StoreResult<Vec<_>>>()?;
                }
                "$group" => {
                    docs = eval::group(&docs, &stage.spec)?;
                }
                "$unwind" => {
                    docs = eval::unwind(docs, &stage.spec)?;
                }
                "$sort" => {
                    eval::sort_docs(&mut docs, &stage.spec)?;
                }
                "$skip" => {
                    let n = stage.spec.as_u64().unwrap_or(0) as usize;
                    docs = docs.into_iter().skip(n).collect();
                }
                "$limit" => {
                    let n = stage.spec.as_u64().unwrap_or(0) as usize;
                    docs.truncate(n);
                }
                "$out" => {
                    let Some(target) = stage.spec.as_str() else {
                        return Err(StoreError::unsupported("$out spec must be a collection name"));
                    };
                    let mut inner = self.inner.write();
                    let data = inner
                        .collections
                        .entry(target.to_string())
                        .or_insert_with(|| CollectionData::new(Capacity::unlimited()));
                    data.docs = docs.clone();
                }
                other => {
                    return Err(StoreError::unsupported(format!(
                        "unknown pipeline stage `{other}`"
                    )))
                }
            }
        }
        Ok(docs)
    }

    fn put_blob(&self, key: &str, data: Vec<u8>) -> StoreResult<()> {
        self.inner.write().blobs.insert(key.to_string(), data);
        Ok(())
    }

    fn get_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.read().blobs.get(key).cloned())
    }

    fn blob_exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.inner.read().blobs.contains_key(key))
    }

    fn delete_blob(&self, key: &str) -> StoreResult<()> {
        self.inner.write().blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn insert_and_find() {
        let store = MemoryStore::new();
        store
            .insert("users", doc(json!({"_id": 1, "name": "ada"})))
            .unwrap();

        let found = store.find_by_id("users", &json!(1)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("ada")));
        assert!(store.exists("users", &json!(1)).unwrap());
        assert!(!store.exists("users", &json!(2)).unwrap());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert("users", doc(json!({"_id": 1}))).unwrap();
        let err = store.insert("users", doc(json!({"_id": 1}))).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn insert_many_aggregates_errors_and_keeps_successes() {
        let store = MemoryStore::new();
        store.insert("users", doc(json!({"_id": 1}))).unwrap();

        let err = store
            .insert_many(
                "users",
                vec![
                    doc(json!({"_id": 1})),
                    doc(json!({"_id": 2})),
                    doc(json!({"_id": 2})),
                ],
            )
            .unwrap_err();

        match err {
            StoreError::Batch { messages } => assert_eq!(messages.len(), 2),
            other => panic!("expected batch error, got {other}"),
        }
        // The non-colliding item stays applied.
        assert!(store.exists("users", &json!(2)).unwrap());
    }

    #[test]
    fn count_cap_evicts_oldest() {
        let store = MemoryStore::new();
        store
            .ensure_collection("log", Capacity::unlimited().max_count(3))
            .unwrap();
        assert!(store.is_capped("log"));

        for i in 0..5 {
            store.insert("log", doc(json!({"_id": i}))).unwrap();
        }

        let docs = store.scan("log").unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn byte_cap_evicts_oldest() {
        let store = MemoryStore::new();
        let one_doc = doc_size(&doc(json!({"_id": 0, "pad": "xxxxxxxxxx"})));
        store
            .ensure_collection("log", Capacity::unlimited().max_bytes(one_doc as i64 * 2))
            .unwrap();

        for i in 0..4 {
            store
                .insert("log", doc(json!({"_id": i, "pad": "xxxxxxxxxx"})))
                .unwrap();
        }

        let docs = store.scan("log").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["_id"], json!(2));
    }

    #[test]
    fn unique_index_enforced() {
        let store = MemoryStore::new();
        let index = IndexModel::new(vec![("email".into(), Direction::Ascending)], true, false);
        store.create_index("users", index, false).unwrap();

        store
            .insert("users", doc(json!({"_id": 1, "email": "a@x"})))
            .unwrap();
        let err = store
            .insert("users", doc(json!({"_id": 2, "email": "a@x"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[test]
    fn sparse_unique_index_skips_missing_fields() {
        let store = MemoryStore::new();
        let index = IndexModel::new(vec![("alias".into(), Direction::Ascending)], true, true);
        store.create_index("users", index, false).unwrap();

        store.insert("users", doc(json!({"_id": 1}))).unwrap();
        store.insert("users", doc(json!({"_id": 2}))).unwrap();
    }

    #[test]
    fn update_fields_preserves_others() {
        let store = MemoryStore::new();
        store
            .insert("users", doc(json!({"_id": 1, "a": 1, "b": 2})))
            .unwrap();

        let found = store
            .update_fields("users", &json!(1), vec![("a".into(), json!(9))])
            .unwrap();
        assert!(found);

        let updated = store.find_by_id("users", &json!(1)).unwrap().unwrap();
        assert_eq!(updated["a"], json!(9));
        assert_eq!(updated["b"], json!(2));

        let missing = store
            .update_fields("users", &json!(99), vec![("a".into(), json!(1))])
            .unwrap();
        assert!(!missing);
    }

    #[test]
    fn increment_missing_field_starts_at_zero() {
        let store = MemoryStore::new();
        store.insert("stats", doc(json!({"_id": 1}))).unwrap();

        store.increment("stats", &json!(1), "hits", 3).unwrap();
        store.increment("stats", &json!(1), "hits", 2).unwrap();

        let found = store.find_by_id("stats", &json!(1)).unwrap().unwrap();
        assert_eq!(found["hits"], json!(5));
    }

    #[test]
    fn increment_is_exact_beyond_double_precision() {
        let store = MemoryStore::new();
        let big = (1i64 << 53) + 1;
        store
            .insert("stats", doc(json!({"_id": 1, "hits": big})))
            .unwrap();

        store.increment("stats", &json!(1), "hits", 1).unwrap();

        let found = store.find_by_id("stats", &json!(1)).unwrap().unwrap();
        assert_eq!(found["hits"], json!(big + 1));
    }

    #[test]
    fn increment_keeps_float_fields_floating() {
        let store = MemoryStore::new();
        store
            .insert("stats", doc(json!({"_id": 1, "score": 1.5})))
            .unwrap();

        store.increment("stats", &json!(1), "score", 2).unwrap();

        let found = store.find_by_id("stats", &json!(1)).unwrap().unwrap();
        assert_eq!(found["score"], json!(3.5));
    }

    #[test]
    fn delete_where_counts() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.insert("n", doc(json!({"_id": i}))).unwrap();
        }
        let pred: DocPredicate = Arc::new(|d| d["_id"].as_i64().unwrap_or(0) % 2 == 0);
        assert_eq!(store.delete_where("n", pred).unwrap(), 2);
        assert_eq!(store.scan("n").unwrap().len(), 2);
    }

    #[test]
    fn list_indexes_includes_identity() {
        let store = MemoryStore::new();
        store.ensure_collection("x", Capacity::unlimited()).unwrap();
        let indexes = store.list_indexes("x").unwrap();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].is_identity());
    }

    #[test]
    fn drop_unknown_index_errors() {
        let store = MemoryStore::new();
        store.ensure_collection("x", Capacity::unlimited()).unwrap();
        assert!(matches!(
            store.drop_index("x", "nope").unwrap_err(),
            StoreError::UnknownIndex { .. }
        ));
    }

    fn sum_job() -> ReduceJob {
        ReduceJob::new(
            |doc| {
                vec![(
                    doc.get("owner").cloned().unwrap_or(Value::Null),
                    doc.get("amount").cloned().unwrap_or(Value::from(0)),
                )]
            },
            |_, values| {
                Value::from(
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .sum::<f64>(),
                )
            },
        )
    }

    #[test]
    fn map_reduce_inline_groups() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "sales",
                vec![
                    doc(json!({"_id": 1, "owner": "a", "amount": 10})),
                    doc(json!({"_id": 2, "owner": "b", "amount": 4})),
                    doc(json!({"_id": 3, "owner": "a", "amount": 5})),
                ],
            )
            .unwrap();

        let results = store.map_reduce("sales", &sum_job()).unwrap();
        assert_eq!(results.len(), 2);
        let a = results.iter().find(|d| d["_id"] == json!("a")).unwrap();
        assert!((a["value"].as_f64().unwrap() - 15.0).abs() < 1e-9);
        // Singleton group skipped reduce and kept the mapped value.
        let b = results.iter().find(|d| d["_id"] == json!("b")).unwrap();
        assert_eq!(b["value"], json!(4));
    }

    #[test]
    fn map_reduce_new_set_replaces_output() {
        let store = MemoryStore::new();
        store
            .insert("sales", doc(json!({"_id": 1, "owner": "a", "amount": 2})))
            .unwrap();
        store
            .insert("totals", doc(json!({"_id": "stale", "value": 0})))
            .unwrap();

        let job = sum_job().store(ReduceStoreMode::NewSet, "totals");
        let results = store.map_reduce("sales", &job).unwrap();
        assert_eq!(results.len(), 1);

        let stored = store.scan("totals").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["_id"], json!("a"));
    }

    #[test]
    fn map_reduce_combine_stages_cross_collection_join() {
        let store = MemoryStore::new();
        store
            .insert("east", doc(json!({"_id": 1, "owner": "a", "amount": 10})))
            .unwrap();
        store
            .insert("west", doc(json!({"_id": 1, "owner": "a", "amount": 7})))
            .unwrap();

        let first = sum_job().store(ReduceStoreMode::NewSet, "totals");
        store.map_reduce("east", &first).unwrap();

        let second = sum_job().store(ReduceStoreMode::Combine, "totals");
        let merged = store.map_reduce("west", &second).unwrap();

        assert_eq!(merged.len(), 1);
        assert!((merged[0]["value"].as_f64().unwrap() - 17.0).abs() < 1e-9);
    }

    #[test]
    fn map_reduce_without_fetch_returns_nothing() {
        let store = MemoryStore::new();
        store
            .insert("sales", doc(json!({"_id": 1, "owner": "a", "amount": 1})))
            .unwrap();

        let job = sum_job()
            .store(ReduceStoreMode::NewSet, "totals")
            .fetch_results(false);
        assert!(store.map_reduce("sales", &job).unwrap().is_empty());
        assert_eq!(store.scan("totals").unwrap().len(), 1);
    }

    #[test]
    fn aggregate_match_group_sort() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "sales",
                vec![
                    doc(json!({"_id": 1, "owner": "a", "amount": 10, "open": true})),
                    doc(json!({"_id": 2, "owner": "b", "amount": 4, "open": true})),
                    doc(json!({"_id": 3, "owner": "a", "amount": 5, "open": false})),
                    doc(json!({"_id": 4, "owner": "b", "amount": 9, "open": true})),
                ],
            )
            .unwrap();

        let stages = vec![
            PipelineStage::matching(json!({"open": true})),
            PipelineStage::group(json!({"_id": "$owner", "total": {"$sum": "$amount"}})),
            PipelineStage::sort(json!({"total": -1})),
        ];
        let results = store
            .aggregate("sales", &stages, AggregateOutputMode::Inline)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["_id"], json!("b"));
        assert!((results[0]["total"].as_f64().unwrap() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_skip_limit_out() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert("n", doc(json!({"_id": i, "v": i}))).unwrap();
        }

        let stages = vec![
            PipelineStage::sort(json!({"v": 1})),
            PipelineStage::skip(1),
            PipelineStage::limit(2),
            PipelineStage::out("window"),
        ];
        let results = store
            .aggregate("n", &stages, AggregateOutputMode::Cursor)
            .unwrap();
        assert_eq!(results.len(), 2);

        let stored = store.scan("window").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["v"], json!(1));
    }

    #[test]
    fn aggregate_unknown_stage_is_unsupported() {
        let store = MemoryStore::new();
        store.insert("n", doc(json!({"_id": 1}))).unwrap();
        let stages = vec![PipelineStage::other("$lookup", json!({}))];
        assert!(matches!(
            store
                .aggregate("n", &stages, AggregateOutputMode::Inline)
                .unwrap_err(),
            StoreError::Unsupported { .. }
        ));
    }

    #[test]
    fn blob_roundtrip() {
        let store = MemoryStore::new();
        store.put_blob("files/1", vec![1, 2, 3]).unwrap();
        assert!(store.blob_exists("files/1").unwrap());
        assert_eq!(store.get_blob("files/1").unwrap(), Some(vec![1, 2, 3]));
        store.delete_blob("files/1").unwrap();
        assert!(!store.blob_exists("files/1").unwrap());
        assert_eq!(store.get_blob("files/1").unwrap(), None);
    }
}
