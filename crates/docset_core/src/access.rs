//! Access-control observers.
//!
//! Each entity set carries ordered lists of observers for the get, modify,
//! and delete hooks. An observer receives an [`AccessEvent`] and may clear
//! its `can_access` flag to decline the operation. Observers run in
//! registration order and the last write to the flag wins.

use crate::error::{DalError, DalResult};
use parking_lot::RwLock;

/// Event passed to access observers.
pub struct AccessEvent<'a, T> {
    /// The entity the operation targets.
    pub entity: &'a T,
    /// Whether the operation may proceed. Starts `true`.
    pub can_access: bool,
}

/// An access observer callback.
pub type Observer<T> = Box<dyn Fn(&mut AccessEvent<'_, T>) + Send + Sync>;

/// The three observer lists of one entity set.
pub(crate) struct Hooks<T> {
    getting: RwLock<Vec<Observer<T>>>,
    modifying: RwLock<Vec<Observer<T>>>,
    deleting: RwLock<Vec<Observer<T>>>,
}

impl<T> Hooks<T> {
    pub(crate) fn new() -> Self {
        Self {
            getting: RwLock::new(Vec::new()),
            modifying: RwLock::new(Vec::new()),
            deleting: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn on_getting(&self, observer: Observer<T>) {
        self.getting.write().push(observer);
    }

    pub(crate) fn on_modifying(&self, observer: Observer<T>) {
        self.modifying.write().push(observer);
    }

    pub(crate) fn on_deleting(&self, observer: Observer<T>) {
        self.deleting.write().push(observer);
    }

    pub(crate) fn clear(&self) {
        self.getting.write().clear();
        self.modifying.write().clear();
        self.deleting.write().clear();
    }

    pub(crate) fn has_modifying(&self) -> bool {
        !self.modifying.read().is_empty()
    }

    pub(crate) fn has_deleting(&self) -> bool {
        !self.deleting.read().is_empty()
    }

    fn run(observers: &[Observer<T>], entity: &T) -> bool {
        let mut event = AccessEvent {
            entity,
            can_access: true,
        };
        for observer in observers {
            observer(&mut event);
        }
        event.can_access
    }

    /// Singular get check: an observed denial is an error.
    pub(crate) fn check_get(&self, entity: &T) -> DalResult<()> {
        let observers = self.getting.read();
        if observers.is_empty() || Self::run(&observers, entity) {
            Ok(())
        } else {
            Err(DalError::access_restricted(
                "get operation for this entity is forbidden",
            ))
        }
    }

    /// Plural get check: denied entities are silently dropped.
    pub(crate) fn filter_get(&self, entities: Vec<T>) -> Vec<T> {
        let observers = self.getting.read();
        if observers.is_empty() {
            return entities;
        }
        entities
            .into_iter()
            .filter(|entity| Self::run(&observers, entity))
            .collect()
    }

    pub(crate) fn check_modify(&self, entity: &T) -> DalResult<()> {
        let observers = self.modifying.read();
        if observers.is_empty() || Self::run(&observers, entity) {
            Ok(())
        } else {
            Err(DalError::access_restricted(
                "modify operation for this entity is forbidden",
            ))
        }
    }

    pub(crate) fn check_delete(&self, entity: &T) -> DalResult<()> {
        let observers = self.deleting.read();
        if observers.is_empty() || Self::run(&observers, entity) {
            Ok(())
        } else {
            Err(DalError::access_restricted(
                "delete operation for this entity is forbidden",
            ))
        }
    }

    /// Batch modify check.
    ///
    /// The accept/reject sense here is inverted relative to the singular
    /// check: a batch in which every entity is allowed is rejected, and a
    /// batch containing a denial passes. Callers depend on this behavior;
    /// see the known-quirks notes in DESIGN.md before changing it.
    pub(crate) fn check_modify_batch<'a, I>(&self, entities: I) -> DalResult<()>
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let observers = self.modifying.read();
        if observers.is_empty() {
            return Ok(());
        }
        if Self::batch_allows(&observers, entities) {
            Err(DalError::access_restricted(
                "modify operation for this batch is forbidden",
            ))
        } else {
            Ok(())
        }
    }

    /// Batch delete check, with the same inverted sense as
    /// [`Hooks::check_modify_batch`].
    pub(crate) fn check_delete_batch<'a, I>(&self, entities: I) -> DalResult<()>
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let observers = self.deleting.read();
        if observers.is_empty() {
            return Ok(());
        }
        if Self::batch_allows(&observers, entities) {
            Err(DalError::access_restricted(
                "delete operation for this batch is forbidden",
            ))
        } else {
            Ok(())
        }
    }

    fn batch_allows<'a, I>(observers: &[Observer<T>], entities: I) -> bool
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entity in entities {
            if !Self::run(observers, entity) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny_negative(event: &mut AccessEvent<'_, i64>) {
        if *event.entity < 0 {
            event.can_access = false;
        }
    }

    #[test]
    fn no_observers_allow_everything() {
        let hooks: Hooks<i64> = Hooks::new();
        assert!(hooks.check_get(&1).is_ok());
        assert!(hooks.check_modify(&1).is_ok());
        assert!(hooks.check_delete(&1).is_ok());
        assert!(hooks.check_modify_batch([&1, &2]).is_ok());
    }

    #[test]
    fn singular_denial_is_an_error() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_modifying(Box::new(deny_negative));
        assert!(hooks.check_modify(&1).is_ok());
        assert!(matches!(
            hooks.check_modify(&-1),
            Err(DalError::AccessRestricted { .. })
        ));
    }

    #[test]
    fn plural_get_filters_silently() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_getting(Box::new(deny_negative));
        assert_eq!(hooks.filter_get(vec![1, -2, 3]), vec![1, 3]);
    }

    #[test]
    fn later_observers_override_earlier_ones() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_getting(Box::new(deny_negative));
        hooks.on_getting(Box::new(|event| event.can_access = true));
        assert!(hooks.check_get(&-5).is_ok());
    }

    #[test]
    fn allowed_batch_is_rejected() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_modifying(Box::new(deny_negative));
        assert!(matches!(
            hooks.check_modify_batch([&1, &2]),
            Err(DalError::AccessRestricted { .. })
        ));
    }

    #[test]
    fn batch_with_a_denial_passes() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_deleting(Box::new(deny_negative));
        assert!(hooks.check_delete_batch([&1, &-2]).is_ok());
    }

    #[test]
    fn clear_drops_all_observers() {
        let hooks: Hooks<i64> = Hooks::new();
        hooks.on_modifying(Box::new(|event| event.can_access = false));
        hooks.clear();
        assert!(hooks.check_modify(&1).is_ok());
    }
}
