//! Per-type persistence descriptors and the process-wide descriptor cache.

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

/// Describes how one entity type maps onto stored documents.
///
/// A descriptor names the fields that must never be persisted (ignored and
/// navigation fields) and, for polymorphic sets, the discriminator tag and
/// the allow-list of variant names that may appear under it.
///
/// Descriptors are registered once per type and shared process-wide; see
/// [`DescriptorBuilder::register`] and [`descriptor_of`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    ignored: BTreeSet<String>,
    navigation: BTreeSet<String>,
    discriminator: Option<String>,
    variants: BTreeSet<String>,
}

impl EntityDescriptor {
    /// Fields stripped from documents before persistence.
    pub fn ignored(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(String::as_str)
    }

    /// Relation fields stripped from documents before persistence.
    pub fn navigation(&self) -> impl Iterator<Item = &str> {
        self.navigation.iter().map(String::as_str)
    }

    /// The discriminator tag field, when the type is polymorphic.
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// Variant names allowed under the discriminator tag.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(String::as_str)
    }

    /// Whether `field` survives into the stored document.
    pub fn is_persisted_field(&self, field: &str) -> bool {
        !self.ignored.contains(field) && !self.navigation.contains(field)
    }

    /// Whether `variant` is an allowed discriminator value.
    ///
    /// Always true for non-polymorphic descriptors.
    pub fn is_allowed_variant(&self, variant: &str) -> bool {
        self.discriminator.is_none() || self.variants.contains(variant)
    }
}

/// Builder for an [`EntityDescriptor`].
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    descriptor: EntityDescriptor,
}

impl DescriptorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `field` as never persisted.
    #[must_use]
    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.descriptor.ignored.insert(field.into());
        self
    }

    /// Marks `field` as a navigation (relation) field, never persisted.
    #[must_use]
    pub fn navigation(mut self, field: impl Into<String>) -> Self {
        self.descriptor.navigation.insert(field.into());
        self
    }

    /// Declares the discriminator tag field for a polymorphic type.
    #[must_use]
    pub fn discriminator(mut self, tag: impl Into<String>) -> Self {
        self.descriptor.discriminator = Some(tag.into());
        self
    }

    /// Allows `name` as a discriminator value.
    #[must_use]
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.descriptor.variants.insert(name.into());
        self
    }

    /// Registers the descriptor for `T` in the process-wide cache.
    ///
    /// Registration is insert-if-absent: the first descriptor registered
    /// for a type wins and later registrations return the cached one
    /// unchanged.
    pub fn register<T: 'static>(self) -> Arc<EntityDescriptor> {
        let built = Arc::new(self.descriptor);
        let mut cache = descriptor_cache().write();
        Arc::clone(cache.entry(TypeId::of::<T>()).or_insert(built))
    }
}

fn descriptor_cache() -> &'static RwLock<HashMap<TypeId, Arc<EntityDescriptor>>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Looks up the descriptor registered for `T`, registering an empty one
/// when the type has none yet.
pub fn descriptor_of<T: 'static>() -> Arc<EntityDescriptor> {
    if let Some(found) = descriptor_cache().read().get(&TypeId::of::<T>()) {
        return Arc::clone(found);
    }
    DescriptorBuilder::new().register::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let descriptor = DescriptorBuilder::new()
            .ignore("cached_total")
            .navigation("orders")
            .build_for_test();
        assert!(!descriptor.is_persisted_field("cached_total"));
        assert!(!descriptor.is_persisted_field("orders"));
        assert!(descriptor.is_persisted_field("name"));
    }

    #[test]
    fn variants_gate_polymorphic_types_only() {
        let open = EntityDescriptor::default();
        assert!(open.is_allowed_variant("anything"));

        let gated = DescriptorBuilder::new()
            .discriminator("_t")
            .variant("Circle")
            .variant("Square")
            .build_for_test();
        assert!(gated.is_allowed_variant("Circle"));
        assert!(!gated.is_allowed_variant("Triangle"));
    }

    #[test]
    fn first_registration_wins() {
        struct Probe;
        let first = DescriptorBuilder::new().ignore("a").register::<Probe>();
        let second = DescriptorBuilder::new().ignore("b").register::<Probe>();
        assert_eq!(first, second);
        assert!(!second.is_persisted_field("a"));
        assert!(second.is_persisted_field("b"));
    }

    #[test]
    fn lookup_registers_empty_descriptor() {
        struct Fresh;
        let descriptor = descriptor_of::<Fresh>();
        assert_eq!(*descriptor, EntityDescriptor::default());
    }

    impl DescriptorBuilder {
        fn build_for_test(self) -> EntityDescriptor {
            self.descriptor
        }
    }
}
