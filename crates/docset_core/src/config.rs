//! Collection naming and per-set options.

use docset_store::Capacity;

/// How a set's collection name is derived.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NamingMode {
    /// Use the registration member name as given.
    MemberName,
    /// Use the registration member name, lower-cased.
    MemberNameLowerCase,
    /// Use the entity type's short name as given.
    TypeName,
    /// Use the entity type's short name, lower-cased.
    #[default]
    TypeNameLowerCase,
}

/// Options for one entity-set registration.
#[derive(Debug, Default, Clone)]
pub struct SetOptions {
    naming: Option<NamingMode>,
    explicit_name: Option<String>,
    capacity: Capacity,
}

impl SetOptions {
    /// Creates empty options: context-default naming, unlimited capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the context's naming mode for this set.
    #[must_use]
    pub fn naming(mut self, mode: NamingMode) -> Self {
        self.naming = Some(mode);
        self
    }

    /// Pins the collection name, bypassing naming modes entirely.
    #[must_use]
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.explicit_name = Some(name.into());
        self
    }

    /// Makes the backing collection capped.
    #[must_use]
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn effective_capacity(&self) -> Capacity {
        self.capacity
    }

    pub(crate) fn resolve_name(
        &self,
        member: &str,
        type_name: &str,
        default_mode: NamingMode,
    ) -> String {
        if let Some(name) = &self.explicit_name {
            return name.clone();
        }
        match self.naming.unwrap_or(default_mode) {
            NamingMode::MemberName => member.to_owned(),
            NamingMode::MemberNameLowerCase => member.to_lowercase(),
            NamingMode::TypeName => type_name.to_owned(),
            NamingMode::TypeNameLowerCase => type_name.to_lowercase(),
        }
    }
}

/// The short (unqualified) name of `T`.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
