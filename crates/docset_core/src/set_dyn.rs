//! Type-erased entity-set surface.

use crate::entity::{Entity, EntityKey};
use crate::error::{DalError, DalResult};
use crate::set::EntitySet;
use docset_store::IndexModel;
use std::any::{Any, TypeId};

/// The untyped face of an [`EntitySet`].
///
/// Contexts hold their sets behind this trait so they can be enumerated
/// and driven uniformly (index reconciliation, bulk clearing) without
/// naming entity types. The `*_dyn` methods take `&dyn Any` arguments and
/// fail with [`DalError::InvalidOperation`] when the concrete type does
/// not match the set's entity or key type; use
/// [`crate::Context::entity_set`] to recover the typed handle instead
/// when the type is known.
pub trait DynEntitySet: Send + Sync {
    /// The backing collection name.
    fn name(&self) -> &str;

    /// Short name of the set's entity type.
    fn entity_type_name(&self) -> &'static str;

    /// `TypeId` of the set's entity type.
    fn entity_type_id(&self) -> TypeId;

    /// Whether the backing collection is capped.
    fn is_capped(&self) -> bool;

    /// Untyped [`EntitySet::add`].
    fn add_dyn(&self, entity: &dyn Any) -> DalResult<()>;

    /// Untyped [`EntitySet::add_if_not_exists`].
    fn add_if_not_exists_dyn(&self, entity: &dyn Any) -> DalResult<bool>;

    /// Untyped [`EntitySet::add_or_update`].
    fn add_or_update_dyn(&self, entity: &dyn Any) -> DalResult<()>;

    /// Untyped [`EntitySet::get_or_add`]; the boxed value is a `T`.
    fn get_or_add_dyn(&self, entity: &dyn Any) -> DalResult<Option<Box<dyn Any>>>;

    /// Untyped [`EntitySet::contains`].
    fn contains_dyn(&self, key: &dyn Any) -> DalResult<bool>;

    /// Untyped [`EntitySet::get`]; the boxed value is a `T`.
    fn get_dyn(&self, key: &dyn Any) -> DalResult<Option<Box<dyn Any>>>;

    /// Untyped [`EntitySet::update`].
    fn update_dyn(&self, entity: &dyn Any) -> DalResult<()>;

    /// Untyped [`EntitySet::delete_key`].
    fn delete_key_dyn(&self, key: &dyn Any) -> DalResult<()>;

    /// Untyped [`EntitySet::delete_all`].
    fn delete_all_dyn(&self) -> DalResult<()>;

    /// Reconciles live indexes against the declared models.
    fn reconcile_indexes_dyn(
        &self,
        declared: &[IndexModel],
        remove_stale: bool,
        in_foreground: bool,
    ) -> DalResult<()>;

    /// Drops all registered access observers.
    fn clear_observers_dyn(&self);

    /// Upcast used by contexts to recover the typed handle.
    fn as_any(&self) -> &dyn Any;
}

fn expected<T>(kind: &str, set_name: &str) -> DalError {
    DalError::invalid_operation(format!(
        "set `{set_name}` expected {kind} of type `{}`",
        std::any::type_name::<T>()
    ))
}

fn cast_entity<'a, T: Entity>(entity: &'a dyn Any, set_name: &str) -> DalResult<&'a T> {
    entity
        .downcast_ref::<T>()
        .ok_or_else(|| expected::<T>("an entity", set_name))
}

fn cast_key<'a, T: Entity>(key: &'a dyn Any, set_name: &str) -> DalResult<&'a T::Key> {
    key.downcast_ref::<T::Key>()
        .ok_or_else(|| expected::<T::Key>("a key", set_name))
}

impl<T: Entity> DynEntitySet for EntitySet<T> {
    fn name(&self) -> &str {
        EntitySet::name(self)
    }

    fn entity_type_name(&self) -> &'static str {
        crate::config::short_type_name::<T>()
    }

    fn entity_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn is_capped(&self) -> bool {
        EntitySet::is_capped(self)
    }

    fn add_dyn(&self, entity: &dyn Any) -> DalResult<()> {
        self.add(cast_entity::<T>(entity, self.name())?)
    }

    fn add_if_not_exists_dyn(&self, entity: &dyn Any) -> DalResult<bool> {
        self.add_if_not_exists(cast_entity::<T>(entity, self.name())?)
    }

    fn add_or_update_dyn(&self, entity: &dyn Any) -> DalResult<()> {
        self.add_or_update(cast_entity::<T>(entity, self.name())?)
    }

    fn get_or_add_dyn(&self, entity: &dyn Any) -> DalResult<Option<Box<dyn Any>>> {
        let existing = self.get_or_add(cast_entity::<T>(entity, self.name())?)?;
        Ok(existing.map(|entity| Box::new(entity) as Box<dyn Any>))
    }

    fn contains_dyn(&self, key: &dyn Any) -> DalResult<bool> {
        self.contains(cast_key::<T>(key, self.name())?)
    }

    fn get_dyn(&self, key: &dyn Any) -> DalResult<Option<Box<dyn Any>>> {
        let found = self.get(cast_key::<T>(key, self.name())?)?;
        Ok(found.map(|entity| Box::new(entity) as Box<dyn Any>))
    }

    fn update_dyn(&self, entity: &dyn Any) -> DalResult<()> {
        self.update(cast_entity::<T>(entity, self.name())?)
    }

    fn delete_key_dyn(&self, key: &dyn Any) -> DalResult<()> {
        self.delete_key(cast_key::<T>(key, self.name())?)
    }

    fn delete_all_dyn(&self) -> DalResult<()> {
        self.delete_all()
    }

    fn reconcile_indexes_dyn(
        &self,
        declared: &[IndexModel],
        remove_stale: bool,
        in_foreground: bool,
    ) -> DalResult<()> {
        self.reconcile_indexes(declared, remove_stale, in_foreground)
    }

    fn clear_observers_dyn(&self) {
        self.clear_observers();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docset_store::{Capacity, MemoryStore};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Entity for Note {
        type Key = String;

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn erased() -> Box<dyn DynEntitySet> {
        let set: EntitySet<Note> = EntitySet::bind(
            Arc::new(MemoryStore::new()),
            "note".into(),
            Capacity::unlimited(),
        )
        .unwrap();
        Box::new(set)
    }

    #[test]
    fn dyn_round_trip() {
        let set = erased();
        let note = Note {
            id: "n1".into(),
            body: "hello".into(),
        };
        set.add_dyn(&note).unwrap();
        assert!(set.contains_dyn(&"n1".to_string()).unwrap());
        let boxed = set.get_dyn(&"n1".to_string()).unwrap().unwrap();
        assert_eq!(boxed.downcast_ref::<Note>(), Some(&note));
    }

    #[test]
    fn dyn_conditional_inserts() {
        let set = erased();
        let note = Note {
            id: "n1".into(),
            body: "first".into(),
        };
        assert!(set.add_if_not_exists_dyn(&note).unwrap());
        let again = Note {
            id: "n1".into(),
            body: "second".into(),
        };
        assert!(!set.add_if_not_exists_dyn(&again).unwrap());

        let existing = set.get_or_add_dyn(&again).unwrap().unwrap();
        assert_eq!(
            existing.downcast_ref::<Note>().map(|n| n.body.as_str()),
            Some("first")
        );
        let fresh = Note {
            id: "n2".into(),
            body: "added".into(),
        };
        assert!(set.get_or_add_dyn(&fresh).unwrap().is_none());
        assert!(set.contains_dyn(&"n2".to_string()).unwrap());
    }

    #[test]
    fn wrong_entity_type_is_invalid_operation() {
        let set = erased();
        let err = set.add_dyn(&42i64).unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }

    #[test]
    fn wrong_key_type_is_invalid_operation() {
        let set = erased();
        let err = set.get_dyn(&42i64).unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }

    #[test]
    fn typed_handle_recoverable_through_as_any() {
        let set = erased();
        let typed = set
            .as_any()
            .downcast_ref::<EntitySet<Note>>()
            .cloned()
            .unwrap();
        typed
            .add(&Note {
                id: "n2".into(),
                body: "typed".into(),
            })
            .unwrap();
        assert!(set.contains_dyn(&"n2".to_string()).unwrap());
    }
}
