//! Data contexts: declarative registration and lifecycle of entity sets.

use crate::config::{short_type_name, NamingMode, SetOptions};
use crate::entity::{DescriptorBuilder, Entity};
use crate::error::{DalError, DalResult};
use crate::files::FileSet;
use crate::index::IndexDefinition;
use crate::set::EntitySet;
use crate::set_dyn::DynEntitySet;
use docset_store::{AggregateOutputMode, DocumentStore, IndexModel, PipelineStage, ReduceJob};
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type SetConstructor =
    Box<dyn FnOnce(Arc<dyn DocumentStore>, String) -> DalResult<Box<dyn DynEntitySet>>>;

struct Registration {
    member: String,
    type_name: &'static str,
    type_id: TypeId,
    options: SetOptions,
    construct: SetConstructor,
}

/// Builder assembling a [`Context`].
///
/// Everything a context knows is declared here up front: its entity sets,
/// their descriptors, their secondary indexes, and any file sets. Building
/// provisions every backing collection, so capped collections exist with
/// their capacity before the first write.
pub struct ContextBuilder {
    store: Arc<dyn DocumentStore>,
    default_naming: NamingMode,
    registrations: Vec<Registration>,
    descriptors: Vec<Box<dyn FnOnce()>>,
    indexes: Vec<IndexDefinition>,
    file_sets: Vec<String>,
}

impl ContextBuilder {
    /// Starts a builder over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            default_naming: NamingMode::default(),
            registrations: Vec::new(),
            descriptors: Vec::new(),
            indexes: Vec::new(),
            file_sets: Vec::new(),
        }
    }

    /// Sets the naming mode used by registrations that do not override it.
    #[must_use]
    pub fn default_naming(mut self, mode: NamingMode) -> Self {
        self.default_naming = mode;
        self
    }

    /// Queues a persistence descriptor for `T`, registered at build time.
    #[must_use]
    pub fn describe<T: 'static>(mut self, descriptor: DescriptorBuilder) -> Self {
        self.descriptors.push(Box::new(move || {
            descriptor.register::<T>();
        }));
        self
    }

    /// Registers an entity set for `T` with default options.
    ///
    /// `member` is the registration name; naming modes derive the
    /// collection name from it or from `T`'s short type name.
    #[must_use]
    pub fn entity_set<T: Entity>(self, member: impl Into<String>) -> Self {
        self.entity_set_with::<T>(member, SetOptions::new())
    }

    /// Registers an entity set for `T` with explicit options.
    #[must_use]
    pub fn entity_set_with<T: Entity>(mut self, member: impl Into<String>, options: SetOptions) -> Self {
        let capacity = options.effective_capacity();
        self.registrations.push(Registration {
            member: member.into(),
            type_name: short_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            options,
            construct: Box::new(move |store, name| {
                let set = EntitySet::<T>::bind(store, name, capacity)?;
                Ok(Box::new(set) as Box<dyn DynEntitySet>)
            }),
        });
        self
    }

    /// Declares a secondary index, reconciled by
    /// [`Context::update_indexes`].
    #[must_use]
    pub fn index(mut self, definition: IndexDefinition) -> Self {
        self.indexes.push(definition);
        self
    }

    /// Registers a named file set.
    #[must_use]
    pub fn file_set(mut self, name: impl Into<String>) -> Self {
        self.file_sets.push(name.into());
        self
    }

    /// Builds the context, provisioning every registered collection.
    ///
    /// # Errors
    ///
    /// Registering the same entity type twice, or declaring an index for an
    /// unregistered entity type, is an [`DalError::InvalidOperation`].
    pub fn build(self) -> DalResult<Context> {
        for register in self.descriptors {
            register();
        }
        let mut by_type: HashMap<TypeId, usize> = HashMap::new();
        let mut sets: Vec<Box<dyn DynEntitySet>> = Vec::new();
        for registration in self.registrations {
            if by_type.contains_key(&registration.type_id) {
                return Err(DalError::invalid_operation(format!(
                    "entity type `{}` is registered more than once",
                    registration.type_name
                )));
            }
            let name = registration.options.resolve_name(
                &registration.member,
                registration.type_name,
                self.default_naming,
            );
            debug!(
                member = %registration.member,
                collection = %name,
                entity = registration.type_name,
                "registering entity set"
            );
            let set = (registration.construct)(Arc::clone(&self.store), name)?;
            by_type.insert(registration.type_id, sets.len());
            sets.push(set);
        }
        for definition in &self.indexes {
            if !by_type.keys().any(|t| definition.is_for(*t)) {
                return Err(DalError::invalid_operation(format!(
                    "index declared for unregistered entity type `{}`",
                    definition.entity_name()
                )));
            }
        }
        let files = self
            .file_sets
            .into_iter()
            .map(|name| FileSet::new(Arc::clone(&self.store), name))
            .collect();
        Ok(Context {
            store: self.store,
            sets,
            by_type,
            indexes: self.indexes,
            files,
        })
    }
}

/// A set of typed entity sets sharing one document store.
///
/// Contexts are immutable after build; observers are registered on the
/// individual sets. Dropping a context drops every registered observer, so
/// cloned set handles that outlive it fall back to unrestricted access.
pub struct Context {
    store: Arc<dyn DocumentStore>,
    sets: Vec<Box<dyn DynEntitySet>>,
    by_type: HashMap<TypeId, usize>,
    indexes: Vec<IndexDefinition>,
    files: Vec<FileSet>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("sets", &self.sets.len())
            .field("indexes", &self.indexes)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Starts a [`ContextBuilder`] over the given store.
    pub fn builder(store: Arc<dyn DocumentStore>) -> ContextBuilder {
        ContextBuilder::new(store)
    }

    /// The typed set registered for `T`, if any.
    pub fn entity_set<T: Entity>(&self) -> Option<EntitySet<T>> {
        let slot = self.by_type.get(&TypeId::of::<T>())?;
        self.sets[*slot]
            .as_any()
            .downcast_ref::<EntitySet<T>>()
            .cloned()
    }

    /// Enumerates every registered set through its untyped face, in
    /// registration order.
    pub fn entity_sets(&self) -> impl Iterator<Item = &dyn DynEntitySet> {
        self.sets.iter().map(|set| &**set)
    }

    /// The file set registered under `name`, if any.
    pub fn files(&self, name: &str) -> Option<&FileSet> {
        self.files.iter().find(|f| f.name() == name)
    }

    /// Reconciles every set's live indexes against the declared
    /// definitions.
    ///
    /// Missing declared indexes are created; with `remove_stale`, live
    /// non-identity indexes no declaration covers are dropped. Matching is
    /// by ordered field names only.
    pub fn update_indexes(&self, remove_stale: bool, in_foreground: bool) -> DalResult<()> {
        for set in &self.sets {
            let declared: Vec<IndexModel> = self
                .indexes
                .iter()
                .filter(|d| d.is_for(set.entity_type_id()))
                .map(IndexDefinition::to_model)
                .collect();
            set.reconcile_indexes_dyn(&declared, remove_stale, in_foreground)?;
        }
        Ok(())
    }

    /// Deletes every document from every non-capped set.
    ///
    /// Debug-build only; intended for resetting state between test runs.
    /// Capped sets are skipped because their collections cannot be
    /// re-provisioned with the same capacity by a later write.
    #[cfg(debug_assertions)]
    pub fn delete_all(&self) -> DalResult<()> {
        tracing::warn!("deleting all documents from every non-capped entity set");
        for set in &self.sets {
            if !set.is_capped() {
                set.delete_all_dyn()?;
            }
        }
        Ok(())
    }

    /// Runs a map/reduce job against a collection by name.
    ///
    /// The by-name form reaches collections no set is registered for, such
    /// as the output collections of stored reductions.
    pub fn map_reduce<R: DeserializeOwned>(
        &self,
        collection: &str,
        job: &ReduceJob,
    ) -> DalResult<Vec<R>> {
        crate::reduce::run(self.store.as_ref(), collection, job)
    }

    /// Runs an aggregation pipeline against a collection by name.
    pub fn aggregate<R: DeserializeOwned>(
        &self,
        collection: &str,
        stages: &[PipelineStage],
        mode: AggregateOutputMode,
    ) -> DalResult<Vec<R>> {
        crate::aggregate::run(self.store.as_ref(), collection, stages, mode)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        for set in &self.sets {
            set.clear_observers_dyn();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docset_store::{Capacity, MemoryStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Author {
        id: i64,
        name: String,
    }

    impl Entity for Author {
        type Key = i64;

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: i64,
        author_id: i64,
        title: String,
    }

    impl Entity for Post {
        type Key = i64;

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn memory() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn naming_modes_drive_collection_names() {
        let context = Context::builder(memory())
            .entity_set::<Author>("Authors")
            .entity_set_with::<Post>(
                "Posts",
                SetOptions::new().naming(NamingMode::MemberName),
            )
            .build()
            .unwrap();
        let names: Vec<&str> = context.entity_sets().map(|s| s.name()).collect();
        assert_eq!(names, vec!["author", "Posts"]);
    }

    #[test]
    fn duplicate_registration_fails_at_build() {
        let err = Context::builder(memory())
            .entity_set::<Author>("A")
            .entity_set::<Author>("B")
            .build()
            .unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }

    #[test]
    fn index_for_unregistered_type_fails_at_build() {
        let err = Context::builder(memory())
            .entity_set::<Author>("Authors")
            .index(IndexDefinition::of::<Post>().ascending("title"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }

    #[test]
    fn typed_lookup_recovers_a_working_handle() {
        let context = Context::builder(memory())
            .entity_set::<Author>("Authors")
            .build()
            .unwrap();
        let authors = context.entity_set::<Author>().unwrap();
        authors
            .add(&Author {
                id: 1,
                name: "ada".into(),
            })
            .unwrap();
        assert!(authors.contains(&1).unwrap());
        assert!(context.entity_set::<Post>().is_none());
    }

    #[test]
    fn update_indexes_applies_declarations() {
        let context = Context::builder(memory())
            .entity_set::<Post>("Posts")
            .index(IndexDefinition::of::<Post>().ascending("author_id"))
            .build()
            .unwrap();
        context.update_indexes(true, true).unwrap();
        let posts = context.entity_set::<Post>().unwrap();
        assert!(posts
            .indexes()
            .unwrap()
            .iter()
            .any(|i| i.name == "author_id_1"));
    }

    #[test]
    fn delete_all_skips_capped_sets() {
        let store = memory();
        let context = Context::builder(Arc::clone(&store))
            .entity_set::<Author>("Authors")
            .entity_set_with::<Post>(
                "Posts",
                SetOptions::new().capacity(Capacity::unlimited().max_count(10)),
            )
            .build()
            .unwrap();
        let authors = context.entity_set::<Author>().unwrap();
        let posts = context.entity_set::<Post>().unwrap();
        authors.add(&Author { id: 1, name: "ada".into() }).unwrap();
        posts
            .add(&Post {
                id: 1,
                author_id: 1,
                title: "kept".into(),
            })
            .unwrap();
        context.delete_all().unwrap();
        assert!(!authors.contains(&1).unwrap());
        assert!(posts.contains(&1).unwrap());
    }

    #[test]
    fn dropping_the_context_clears_observers() {
        let store = memory();
        let authors = {
            let context = Context::builder(Arc::clone(&store))
                .entity_set::<Author>("Authors")
                .build()
                .unwrap();
            let authors = context.entity_set::<Author>().unwrap();
            authors.on_modifying(|event| event.can_access = false);
            assert!(authors
                .add(&Author { id: 1, name: "ada".into() })
                .is_err());
            authors
        };
        // The context is gone; the surviving handle is unrestricted.
        authors
            .add(&Author { id: 1, name: "ada".into() })
            .unwrap();
    }

    #[test]
    fn file_sets_are_looked_up_by_name() {
        let context = Context::builder(memory())
            .file_set("attachments")
            .build()
            .unwrap();
        let files = context.files("attachments").unwrap();
        files.store(&1i64, b"data".to_vec()).unwrap();
        assert!(context.files("missing").is_none());
    }
}
