//! Typed entity sets.

use crate::access::{AccessEvent, Hooks};
use crate::entity::{
    decode_document, descriptor_of, encode_document, Entity, EntityDescriptor, EntityKey,
};
use crate::error::{DalError, DalResult, Operation};
use crate::index::IndexDefinition;
use docset_store::{
    AggregateOutputMode, Capacity, Document, DocumentStore, IndexModel, PipelineStage, ReduceJob,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::sync::Arc;
use tracing::debug;

/// A typed view over one collection of a document store.
///
/// An entity set owns the mapping between entities of type `T` and the
/// stored documents of its collection, and runs every operation through
/// the set's access observers. Handles are cheap to clone and share one
/// observer list.
pub struct EntitySet<T: Entity> {
    inner: Arc<SetInner<T>>,
}

struct SetInner<T: Entity> {
    name: String,
    store: Arc<dyn DocumentStore>,
    descriptor: Arc<EntityDescriptor>,
    capacity: Capacity,
    hooks: Hooks<T>,
}

impl<T: Entity> Clone for EntitySet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> EntitySet<T> {
    /// Binds a set to its collection, provisioning it with the given
    /// capacity when absent.
    pub(crate) fn bind(
        store: Arc<dyn DocumentStore>,
        name: String,
        capacity: Capacity,
    ) -> DalResult<Self> {
        store
            .ensure_collection(&name, capacity)
            .map_err(|e| DalError::from_store(Operation::Add, e))?;
        debug!(collection = %name, capped = capacity.is_capped(), "bound entity set");
        Ok(Self {
            inner: Arc::new(SetInner {
                name,
                store,
                descriptor: descriptor_of::<T>(),
                capacity,
                hooks: Hooks::new(),
            }),
        })
    }

    /// The backing collection name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the backing collection is capped.
    pub fn is_capped(&self) -> bool {
        self.inner.capacity.is_capped()
    }

    /// Registers a get-access observer.
    pub fn on_getting<F>(&self, observer: F)
    where
        F: Fn(&mut AccessEvent<'_, T>) + Send + Sync + 'static,
    {
        self.inner.hooks.on_getting(Box::new(observer));
    }

    /// Registers a modify-access observer.
    pub fn on_modifying<F>(&self, observer: F)
    where
        F: Fn(&mut AccessEvent<'_, T>) + Send + Sync + 'static,
    {
        self.inner.hooks.on_modifying(Box::new(observer));
    }

    /// Registers a delete-access observer.
    pub fn on_deleting<F>(&self, observer: F)
    where
        F: Fn(&mut AccessEvent<'_, T>) + Send + Sync + 'static,
    {
        self.inner.hooks.on_deleting(Box::new(observer));
    }

    pub(crate) fn clear_observers(&self) {
        self.inner.hooks.clear();
    }

    fn require_id(entity: &T, operation: Operation) -> DalResult<Value> {
        let key = entity.id();
        if key.is_unset() {
            return Err(DalError::null_identity(operation));
        }
        Ok(key.to_value())
    }

    fn encode(&self, entity: &T) -> DalResult<Document> {
        encode_document(entity, &self.inner.descriptor)
    }

    fn decode(&self, doc: Document) -> DalResult<T> {
        decode_document(doc, &self.inner.descriptor)
    }

    /// Inserts a new entity. An existing identity is a store failure.
    pub fn add(&self, entity: &T) -> DalResult<()> {
        Self::require_id(entity, Operation::Add)?;
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        let payload = Value::Object(doc.clone());
        self.inner.store.insert(&self.inner.name, doc).map_err(|e| {
            DalError::store_failure_with(Operation::Add, e.to_string(), vec![payload])
        })
    }

    /// Inserts a batch of entities.
    ///
    /// Per-item failures are aggregated into one error; items that applied
    /// stay applied.
    pub fn add_many(&self, entities: &[T]) -> DalResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        for entity in entities {
            Self::require_id(entity, Operation::Add)?;
        }
        self.inner.hooks.check_modify_batch(entities)?;
        let docs = entities
            .iter()
            .map(|e| self.encode(e))
            .collect::<DalResult<Vec<_>>>()?;
        let payload: Vec<Value> = docs.iter().cloned().map(Value::Object).collect();
        self.inner
            .store
            .insert_many(&self.inner.name, docs)
            .map_err(|e| DalError::store_failure_with(Operation::Add, e.to_string(), payload))
    }

    /// Inserts the entity unless its identity already exists.
    ///
    /// Returns true if the entity was inserted.
    pub fn add_if_not_exists(&self, entity: &T) -> DalResult<bool> {
        let id = Self::require_id(entity, Operation::Add)?;
        if self.exists_value(&id)? {
            return Ok(false);
        }
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        match self.inner.store.insert(&self.inner.name, doc) {
            Ok(()) => Ok(true),
            // Lost a race with a concurrent insert of the same identity.
            Err(docset_store::StoreError::DuplicateKey { .. }) => Ok(false),
            Err(e) => Err(DalError::from_store(Operation::Add, e)),
        }
    }

    /// Inserts the entity or fully replaces the stored one.
    pub fn add_or_update(&self, entity: &T) -> DalResult<()> {
        Self::require_id(entity, Operation::Add)?;
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        self.inner
            .store
            .upsert(&self.inner.name, doc)
            .map_err(|e| DalError::from_store(Operation::Add, e))
    }

    /// Returns the stored entity with the given identity, inserting the
    /// given one when absent.
    ///
    /// `Some` carries the already-stored entity; `None` means the given
    /// entity was inserted.
    pub fn get_or_add(&self, entity: &T) -> DalResult<Option<T>> {
        let key = entity.id();
        if key.is_unset() {
            return Err(DalError::null_identity(Operation::Add));
        }
        if let Some(existing) = self.get(&key)? {
            return Ok(Some(existing));
        }
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        self.inner
            .store
            .insert(&self.inner.name, doc)
            .map_err(|e| DalError::from_store(Operation::Add, e))?;
        Ok(None)
    }

    /// Fetches an entity by identity.
    ///
    /// A get observer declining the entity is an error, not a `None`.
    pub fn get(&self, key: &T::Key) -> DalResult<Option<T>> {
        let Some(doc) = self
            .inner
            .store
            .find_by_id(&self.inner.name, &key.to_value())
            .map_err(|e| DalError::from_store(Operation::Get, e))?
        else {
            return Ok(None);
        };
        let entity = self.decode(doc)?;
        self.inner.hooks.check_get(&entity)?;
        Ok(Some(entity))
    }

    /// Fetches entities by identity, skipping missing ones.
    ///
    /// Entities a get observer declines are silently dropped.
    pub fn get_many(&self, keys: &[T::Key]) -> DalResult<Vec<T>> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(doc) = self
                .inner
                .store
                .find_by_id(&self.inner.name, &key.to_value())
                .map_err(|e| DalError::from_store(Operation::Get, e))?
            {
                found.push(self.decode(doc)?);
            }
        }
        Ok(self.inner.hooks.filter_get(found))
    }

    /// Returns true if an entity with this identity exists.
    pub fn contains(&self, key: &T::Key) -> DalResult<bool> {
        self.exists_value(&key.to_value())
    }

    fn exists_value(&self, id: &Value) -> DalResult<bool> {
        self.inner
            .store
            .exists(&self.inner.name, id)
            .map_err(|e| DalError::from_store(Operation::Get, e))
    }

    /// Replaces the stored fields of an existing entity.
    ///
    /// The identity must already exist; use [`EntitySet::add_or_update`]
    /// for upsert semantics.
    pub fn update(&self, entity: &T) -> DalResult<()> {
        let id = Self::require_id(entity, Operation::Update)?;
        if !self.exists_value(&id)? {
            return Err(DalError::not_found(Operation::Update));
        }
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        let fields = updatable_fields(doc);
        self.inner
            .store
            .update_fields(&self.inner.name, &id, fields)
            .map_err(|e| DalError::from_store(Operation::Update, e))?;
        Ok(())
    }

    /// Updates a batch of entities.
    pub fn update_many(&self, entities: &[T]) -> DalResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.inner.hooks.check_modify_batch(entities)?;
        for entity in entities {
            self.update(entity)?;
        }
        Ok(())
    }

    /// Writes a single named field from the entity's current state.
    pub fn update_field(&self, entity: &T, field: &str) -> DalResult<()> {
        self.update_fields(entity, &[field])
    }

    /// Writes the named fields from the entity's current state, leaving
    /// every other stored field untouched.
    ///
    /// Updating a missing identity is a no-op.
    pub fn update_fields(&self, entity: &T, fields: &[&str]) -> DalResult<()> {
        let id = Self::require_id(entity, Operation::Update)?;
        self.inner.hooks.check_modify(entity)?;
        let doc = self.encode(entity)?;
        let mut picked = Vec::with_capacity(fields.len());
        for field in fields {
            let value = doc.get(*field).ok_or_else(|| {
                DalError::store_failure(
                    Operation::Update,
                    format!(
                        "field `{field}` does not exist in collection `{}`",
                        self.inner.name
                    ),
                )
            })?;
            picked.push(((*field).to_owned(), value.clone()));
        }
        self.inner
            .store
            .update_fields(&self.inner.name, &id, picked)
            .map_err(|e| DalError::from_store(Operation::Update, e))?;
        Ok(())
    }

    /// Atomically adds `delta` to a numeric field of the stored document.
    ///
    /// A missing field starts from zero; a missing identity is a no-op.
    pub fn increment_field(&self, key: &T::Key, field: &str, delta: i64) -> DalResult<()> {
        if key.is_unset() {
            return Err(DalError::null_identity(Operation::Update));
        }
        if self.inner.hooks.has_modifying() {
            if let Some(entity) = self.get(key)? {
                self.inner.hooks.check_modify(&entity)?;
            }
        }
        self.inner
            .store
            .increment(&self.inner.name, &key.to_value(), field, delta)
            .map_err(|e| DalError::from_store(Operation::Update, e))?;
        Ok(())
    }

    /// Sets the given fields on every entity matching the predicate.
    ///
    /// Predicate bulk updates bypass per-entity observers, so they are
    /// refused while modify observers are registered.
    pub fn update_where<F>(&self, predicate: F, fields: &[(&str, Value)]) -> DalResult<u64>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if self.inner.hooks.has_modifying() {
            return Err(DalError::access_restricted(
                "predicate updates are unavailable while modify observers are registered",
            ));
        }
        let fields = fields
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect();
        self.inner
            .store
            .update_where(&self.inner.name, self.doc_predicate(predicate), fields)
            .map_err(|e| DalError::from_store(Operation::Update, e))
    }

    /// Deletes the entity.
    pub fn delete(&self, entity: &T) -> DalResult<()> {
        let id = Self::require_id(entity, Operation::Delete)?;
        self.inner.hooks.check_delete(entity)?;
        self.inner
            .store
            .delete(&self.inner.name, &id)
            .map_err(|e| DalError::from_store(Operation::Delete, e))
    }

    /// Deletes by identity.
    ///
    /// When delete observers are registered the stored entity is fetched
    /// first so they can inspect it; get observers run during that fetch.
    pub fn delete_key(&self, key: &T::Key) -> DalResult<()> {
        if key.is_unset() {
            return Err(DalError::null_identity(Operation::Delete));
        }
        if self.inner.hooks.has_deleting() {
            if let Some(entity) = self.get(key)? {
                self.inner.hooks.check_delete(&entity)?;
            }
        }
        self.inner
            .store
            .delete(&self.inner.name, &key.to_value())
            .map_err(|e| DalError::from_store(Operation::Delete, e))
    }

    /// Deletes a batch of entities.
    pub fn delete_many(&self, entities: &[T]) -> DalResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(Self::require_id(entity, Operation::Delete)?);
        }
        self.inner.hooks.check_delete_batch(entities)?;
        for id in &ids {
            self.inner
                .store
                .delete(&self.inner.name, id)
                .map_err(|e| DalError::from_store(Operation::Delete, e))?;
        }
        Ok(())
    }

    /// Deletes a batch by identity.
    pub fn delete_keys(&self, keys: &[T::Key]) -> DalResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        for key in keys {
            if key.is_unset() {
                return Err(DalError::null_identity(Operation::Delete));
            }
        }
        if self.inner.hooks.has_deleting() {
            let entities = self.get_many(keys)?;
            self.inner.hooks.check_delete_batch(&entities)?;
        }
        for key in keys {
            self.delete_key(key)?;
        }
        Ok(())
    }

    /// Deletes every entity matching the predicate. Returns the number
    /// deleted.
    ///
    /// Refused while delete observers are registered, for the same reason
    /// as [`EntitySet::update_where`].
    pub fn delete_where<F>(&self, predicate: F) -> DalResult<u64>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if self.inner.hooks.has_deleting() {
            return Err(DalError::access_restricted(
                "predicate deletes are unavailable while delete observers are registered",
            ));
        }
        self.inner
            .store
            .delete_where(&self.inner.name, self.doc_predicate(predicate))
            .map_err(|e| DalError::from_store(Operation::Delete, e))
    }

    /// Deletes every entity in the set.
    pub fn delete_all(&self) -> DalResult<()> {
        self.inner
            .store
            .delete_all(&self.inner.name)
            .map_err(|e| DalError::from_store(Operation::Delete, e))
    }

    /// Returns every entity matching the predicate, in insertion order.
    ///
    /// Entities a get observer declines are silently dropped.
    pub fn find<F>(&self, predicate: F) -> DalResult<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let docs = self
            .inner
            .store
            .scan(&self.inner.name)
            .map_err(|e| DalError::from_store(Operation::Get, e))?;
        let mut matched = Vec::new();
        for doc in docs {
            let entity = self.decode(doc)?;
            if predicate(&entity) {
                matched.push(entity);
            }
        }
        Ok(self.inner.hooks.filter_get(matched))
    }

    /// Wraps a typed predicate as a raw document predicate.
    ///
    /// Documents that fail to decode never match.
    fn doc_predicate<F>(&self, predicate: F) -> docset_store::DocPredicate
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let descriptor = Arc::clone(&self.inner.descriptor);
        Arc::new(move |doc: &Document| {
            decode_document::<T>(doc.clone(), &descriptor)
                .map(|entity| predicate(&entity))
                .unwrap_or(false)
        })
    }

    /// Lists the collection's live indexes, identity index included.
    pub fn indexes(&self) -> DalResult<Vec<IndexModel>> {
        self.inner
            .store
            .list_indexes(&self.inner.name)
            .map_err(|e| DalError::from_store(Operation::Index, e))
    }

    /// Creates the declared index.
    pub fn add_index(&self, definition: &IndexDefinition, in_foreground: bool) -> DalResult<()> {
        if !definition.is_for(TypeId::of::<T>()) {
            return Err(DalError::invalid_operation(format!(
                "index for entity type `{}` declared against set `{}`",
                definition.entity_name(),
                self.inner.name
            )));
        }
        self.inner
            .store
            .create_index(&self.inner.name, definition.to_model(), in_foreground)
            .map_err(|e| DalError::from_store(Operation::Index, e))
    }

    /// Reconciles the collection's live indexes against the declared list.
    ///
    /// Missing declared indexes are created. With `remove_stale`, live
    /// non-identity indexes covering a field sequence no declaration covers
    /// are dropped. Indexes are matched by ordered field names only.
    pub(crate) fn reconcile_indexes(
        &self,
        declared: &[IndexModel],
        remove_stale: bool,
        in_foreground: bool,
    ) -> DalResult<()> {
        let live = self.indexes()?;
        if remove_stale {
            for index in &live {
                if index.is_identity() {
                    continue;
                }
                if !declared.iter().any(|d| d.same_field_sequence(index)) {
                    debug!(collection = %self.inner.name, index = %index.name, "dropping stale index");
                    self.inner
                        .store
                        .drop_index(&self.inner.name, &index.name)
                        .map_err(|e| DalError::from_store(Operation::Index, e))?;
                }
            }
        }
        for model in declared {
            if live.iter().any(|l| l.same_field_sequence(model)) {
                continue;
            }
            debug!(collection = %self.inner.name, index = %model.name, "creating index");
            self.inner
                .store
                .create_index(&self.inner.name, model.clone(), in_foreground)
                .map_err(|e| DalError::from_store(Operation::Index, e))?;
        }
        Ok(())
    }

    /// Runs a map/reduce job against the set's collection.
    ///
    /// Results deserialize into `R`; store-side result documents have the
    /// shape `{"_id": key, "value": value}`.
    pub fn reduce<R: DeserializeOwned>(&self, job: &ReduceJob) -> DalResult<Vec<R>> {
        crate::reduce::run(self.inner.store.as_ref(), &self.inner.name, job)
    }

    /// Runs an aggregation pipeline against the set's collection.
    pub fn aggregate<R: DeserializeOwned>(
        &self,
        stages: &[PipelineStage],
        mode: AggregateOutputMode,
    ) -> DalResult<Vec<R>> {
        crate::aggregate::run(self.inner.store.as_ref(), &self.inner.name, stages, mode)
    }
}

/// The field list for a full update: everything except the identity.
fn updatable_fields(doc: Document) -> Vec<(String, Value)> {
    doc.into_iter()
        .filter(|(name, _)| name != docset_store::ID_FIELD)
        .collect()
}
