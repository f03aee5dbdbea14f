//! The raw metadata provider contract and the in-memory model.

use crate::association::ResourceAssociationSet;
use crate::primitive::EdmPrimitiveType;
use crate::property::ResourceProperty;
use crate::resource_set::ResourceSet;
use crate::resource_type::{ResourceType, ResourceTypeId, ResourceTypeKind};
use crate::singleton::SingletonMetadata;

/// Source of the service's model declarations.
///
/// Implementations describe what exists; they do not apply configuration.
/// [`MetadataProviderWrapper`](crate::wrapper::MetadataProviderWrapper) layers
/// visibility, caching and integrity checks on top.
pub trait MetadataProvider: Send + Sync {
    fn container_name(&self) -> Option<&str>;

    fn container_namespace(&self) -> Option<&str>;

    /// Every declared set, in declaration order. Duplicates are reported as-is.
    fn resource_sets(&self) -> Vec<&ResourceSet>;

    /// Every declared complex and entity type. Primitive types are not listed.
    fn types(&self) -> Vec<&ResourceType>;

    fn resolve_resource_set(&self, name: &str) -> Option<&ResourceSet>;

    /// Lookup by simple or namespace-qualified name; `Edm.*` names resolve to
    /// the primitive types.
    fn resolve_resource_type(&self, name: &str) -> Option<&ResourceType>;

    fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceType>;

    /// Types deriving from `ty`, directly or transitively.
    fn derived_types(&self, ty: &ResourceType) -> Vec<&ResourceType>;

    fn has_derived_types(&self, ty: &ResourceType) -> bool {
        !self.derived_types(ty).is_empty()
    }

    /// The association set the navigation `property` of `ty` takes part in
    /// when reached through `set`.
    fn resource_association_set(
        &self,
        set: &ResourceSet,
        ty: &ResourceType,
        property: &ResourceProperty,
    ) -> Option<&ResourceAssociationSet>;

    fn singletons(&self) -> Vec<&SingletonMetadata> {
        Vec::new()
    }
}

/// An immutable model produced by [`ModelBuilder`](crate::builder::ModelBuilder).
#[derive(Debug, Clone)]
pub struct MetadataModel {
    pub(crate) container_name: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) types: Vec<ResourceType>,
    pub(crate) sets: Vec<ResourceSet>,
    pub(crate) association_sets: Vec<ResourceAssociationSet>,
    pub(crate) singletons: Vec<SingletonMetadata>,
}

impl MetadataModel {
    #[must_use]
    pub fn primitive_type(&self, kind: EdmPrimitiveType) -> &ResourceType {
        &self.types[kind.index()]
    }

    pub fn association_sets(&self) -> impl Iterator<Item = &ResourceAssociationSet> {
        self.association_sets.iter()
    }

    /// Whether `derived` is `base` or inherits from it.
    #[must_use]
    pub fn is_assignable(&self, base: ResourceTypeId, derived: ResourceTypeId) -> bool {
        let mut current = Some(derived);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.types.get(id.index()).and_then(ResourceType::base_type);
        }
        false
    }
}

impl MetadataProvider for MetadataModel {
    fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    fn container_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn resource_sets(&self) -> Vec<&ResourceSet> {
        self.sets.iter().collect()
    }

    fn types(&self) -> Vec<&ResourceType> {
        self.types
            .iter()
            .filter(|t| t.kind() != ResourceTypeKind::Primitive)
            .collect()
    }

    fn resolve_resource_set(&self, name: &str) -> Option<&ResourceSet> {
        self.sets.iter().find(|s| s.name() == name)
    }

    fn resolve_resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.types
            .iter()
            .find(|t| t.full_name() == name || (t.kind() != ResourceTypeKind::Primitive && t.name() == name))
    }

    fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceType> {
        self.types.get(id.index())
    }

    fn derived_types(&self, ty: &ResourceType) -> Vec<&ResourceType> {
        self.types
            .iter()
            .filter(|t| t.id() != ty.id() && self.is_assignable(ty.id(), t.id()))
            .collect()
    }

    fn resource_association_set(
        &self,
        set: &ResourceSet,
        ty: &ResourceType,
        property: &ResourceProperty,
    ) -> Option<&ResourceAssociationSet> {
        // Inherited navigation properties are bound on the declaring type.
        let mut current = Some(ty.id());
        while let Some(id) = current {
            if let Some(found) = self
                .association_sets
                .iter()
                .find(|a| a.end(set.name(), id, property.name()).is_some())
            {
                return Some(found);
            }
            current = self.types.get(id.index()).and_then(ResourceType::base_type);
        }
        None
    }

    fn singletons(&self) -> Vec<&SingletonMetadata> {
        self.singletons.iter().collect()
    }
}
