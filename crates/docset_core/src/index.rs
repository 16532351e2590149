//! Typed index declarations.

use crate::config::short_type_name;
use crate::entity::Entity;
use docset_store::{Direction, IndexModel};
use std::any::TypeId;

/// A secondary index declared against one entity type.
///
/// Definitions are registered on the context builder and reconciled against
/// the store's live indexes by `Context::update_indexes`. Two indexes are
/// considered the same when their field-name sequences match, in order;
/// directions and flags do not participate in that comparison.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    entity: TypeId,
    entity_name: &'static str,
    fields: Vec<(String, Direction)>,
    unique: bool,
    sparse: bool,
}

impl IndexDefinition {
    /// Starts an empty definition for entity type `T`.
    pub fn of<T: Entity>() -> Self {
        Self {
            entity: TypeId::of::<T>(),
            entity_name: short_type_name::<T>(),
            fields: Vec::new(),
            unique: false,
            sparse: false,
        }
    }

    /// Appends an ascending field.
    #[must_use]
    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), Direction::Ascending));
        self
    }

    /// Appends a descending field.
    #[must_use]
    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), Direction::Descending));
        self
    }

    /// Requires indexed values to be unique across the collection.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Skips documents missing any indexed field.
    #[must_use]
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Short name of the entity type this index belongs to.
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub(crate) fn is_for(&self, entity: TypeId) -> bool {
        self.entity == entity
    }

    /// The store-side model for this definition.
    pub fn to_model(&self) -> IndexModel {
        IndexModel::new(self.fields.clone(), self.unique, self.sparse)
    }
}
