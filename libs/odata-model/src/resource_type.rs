//! Resource types: primitive, complex and entity.

use crate::primitive::EdmPrimitiveType;
use crate::property::{ResourceProperty, validate_property_name};
use indexmap::{IndexMap, IndexSet};
use odata_errors::{ODataError, ODataResult, messages};
use std::any::TypeId;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Index of a resource type inside its model.
///
/// Ids `0..13` are the primitive types, in [`EdmPrimitiveType::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTypeId(usize);

impl ResourceTypeId {
    #[must_use]
    pub const fn of_primitive(kind: EdmPrimitiveType) -> Self {
        Self(kind.index())
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identity of the host-language type backing a resource type.
///
/// The metadata layer only compares these; it never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceTypeKey(u64);

impl InstanceTypeKey {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Key derived from a Rust type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTypeKind {
    Primitive,
    Complex,
    Entity,
}

impl fmt::Display for ResourceTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primitive => "Primitive",
            Self::Complex => "Complex",
            Self::Entity => "Entity",
        })
    }
}

/// A named type in the model.
///
/// `declared_properties` holds what this type adds; `properties` is the
/// effective list with inherited properties first, filled in when the model is
/// built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    id: ResourceTypeId,
    kind: ResourceTypeKind,
    name: String,
    namespace: Option<String>,
    full_name: String,
    instance_type: Option<InstanceTypeKey>,
    base_type: Option<ResourceTypeId>,
    is_abstract: bool,
    is_media_link_entry: bool,
    primitive: Option<EdmPrimitiveType>,
    declared_properties: IndexMap<String, ResourceProperty>,
    properties: IndexMap<String, ResourceProperty>,
    declared_named_streams: IndexSet<String>,
    named_streams: IndexSet<String>,
}

impl ResourceType {
    /// The resource type standing for an EDM primitive kind.
    #[must_use]
    pub fn primitive(kind: EdmPrimitiveType) -> Self {
        Self {
            id: ResourceTypeId::of_primitive(kind),
            kind: ResourceTypeKind::Primitive,
            name: kind.short_name().to_owned(),
            namespace: Some("Edm".to_owned()),
            full_name: kind.name().to_owned(),
            instance_type: None,
            base_type: None,
            is_abstract: false,
            is_media_link_entry: false,
            primitive: Some(kind),
            declared_properties: IndexMap::new(),
            properties: IndexMap::new(),
            declared_named_streams: IndexSet::new(),
            named_streams: IndexSet::new(),
        }
    }

    pub(crate) fn structured(
        id: ResourceTypeId,
        kind: ResourceTypeKind,
        name: &str,
        namespace: Option<&str>,
        base_type: Option<ResourceTypeId>,
        is_abstract: bool,
    ) -> Self {
        let full_name = match namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
            _ => name.to_owned(),
        };
        Self {
            id,
            kind,
            name: name.to_owned(),
            namespace: namespace.map(str::to_owned),
            full_name,
            instance_type: None,
            base_type,
            is_abstract,
            is_media_link_entry: false,
            primitive: None,
            declared_properties: IndexMap::new(),
            properties: IndexMap::new(),
            declared_named_streams: IndexSet::new(),
            named_streams: IndexSet::new(),
        }
    }

    /// Declare a property on this type.
    ///
    /// # Errors
    /// Fails on primitive types, on key or etag properties of non-entity types,
    /// and on duplicate names.
    pub fn add_property(&mut self, property: ResourceProperty) -> ODataResult<()> {
        if self.kind == ResourceTypeKind::Primitive {
            return Err(ODataError::metadata(
                messages::primitive_type_cannot_have_properties(&self.full_name),
            ));
        }
        if self.kind != ResourceTypeKind::Entity {
            if property.kind().is_key() {
                return Err(ODataError::metadata(messages::key_property_on_non_entity(
                    &self.full_name,
                    property.name(),
                )));
            }
            if property.kind().is_etag() {
                return Err(ODataError::metadata(messages::etag_property_on_non_entity(
                    &self.full_name,
                    property.name(),
                )));
            }
        }
        if self.properties.contains_key(property.name())
            || self.named_streams.contains(property.name())
        {
            return Err(ODataError::metadata(messages::duplicate_property(
                &self.full_name,
                property.name(),
            )));
        }
        self.properties
            .insert(property.name().to_owned(), property.clone());
        self.declared_properties
            .insert(property.name().to_owned(), property);
        Ok(())
    }

    /// Swap in a new definition for an already declared property.
    pub(crate) fn replace_declared_property(&mut self, property: ResourceProperty) {
        if self.declared_properties.contains_key(property.name()) {
            self.properties
                .insert(property.name().to_owned(), property.clone());
            self.declared_properties
                .insert(property.name().to_owned(), property);
        }
    }

    /// # Errors
    /// Fails on non-entity types, invalid names and duplicates.
    pub fn add_named_stream(&mut self, name: &str) -> ODataResult<()> {
        if self.kind != ResourceTypeKind::Entity {
            return Err(ODataError::metadata(messages::named_stream_on_non_entity(
                &self.full_name,
            )));
        }
        validate_property_name(name)?;
        if self.named_streams.contains(name) || self.properties.contains_key(name) {
            return Err(ODataError::metadata(messages::duplicate_named_stream(
                &self.full_name,
                name,
            )));
        }
        self.named_streams.insert(name.to_owned());
        self.declared_named_streams.insert(name.to_owned());
        Ok(())
    }

    /// # Errors
    /// Fails on non-entity types.
    pub fn set_media_link_entry(&mut self, value: bool) -> ODataResult<()> {
        if self.kind != ResourceTypeKind::Entity {
            return Err(ODataError::metadata(messages::media_link_entry_on_non_entity(
                &self.full_name,
            )));
        }
        self.is_media_link_entry = value;
        Ok(())
    }

    pub fn set_instance_type(&mut self, key: InstanceTypeKey) {
        self.instance_type = Some(key);
    }

    /// Rebuild the effective property and stream lists as `base` followed by
    /// what this type declares.
    pub(crate) fn inherit_from(&mut self, base: &Self) -> ODataResult<()> {
        let mut properties = base.properties.clone();
        for (name, property) in &self.declared_properties {
            if properties.contains_key(name) || base.named_streams.contains(name) {
                return Err(ODataError::metadata(messages::duplicate_property(
                    &self.full_name,
                    name,
                )));
            }
            properties.insert(name.clone(), property.clone());
        }
        let mut streams = base.named_streams.clone();
        for name in &self.declared_named_streams {
            if !streams.insert(name.clone()) {
                return Err(ODataError::metadata(messages::duplicate_named_stream(
                    &self.full_name,
                    name,
                )));
            }
        }
        self.properties = properties;
        self.named_streams = streams;
        self.is_media_link_entry |= base.is_media_link_entry;
        Ok(())
    }

    #[must_use]
    pub const fn id(&self) -> ResourceTypeId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> ResourceTypeKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    #[must_use]
    pub const fn instance_type(&self) -> Option<InstanceTypeKey> {
        self.instance_type
    }

    #[must_use]
    pub const fn base_type(&self) -> Option<ResourceTypeId> {
        self.base_type
    }

    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[must_use]
    pub const fn is_media_link_entry(&self) -> bool {
        self.is_media_link_entry
    }

    #[must_use]
    pub const fn primitive_kind(&self) -> Option<EdmPrimitiveType> {
        self.primitive
    }

    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.kind == ResourceTypeKind::Entity
    }

    /// Declared plus inherited properties, inherited first.
    pub fn properties(&self) -> impl Iterator<Item = &ResourceProperty> {
        self.properties.values()
    }

    pub fn declared_properties(&self) -> impl Iterator<Item = &ResourceProperty> {
        self.declared_properties.values()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ResourceProperty> {
        self.properties.get(name)
    }

    /// Key properties in declaration order.
    pub fn key_properties(&self) -> impl Iterator<Item = &ResourceProperty> {
        self.properties().filter(|p| p.kind().is_key())
    }

    pub fn etag_properties(&self) -> impl Iterator<Item = &ResourceProperty> {
        self.properties().filter(|p| p.kind().is_etag())
    }

    #[must_use]
    pub fn has_etag(&self) -> bool {
        self.etag_properties().next().is_some()
    }

    pub fn named_streams(&self) -> impl Iterator<Item = &str> {
        self.named_streams.iter().map(String::as_str)
    }

    pub fn declared_named_streams(&self) -> impl Iterator<Item = &str> {
        self.declared_named_streams.iter().map(String::as_str)
    }

    #[must_use]
    pub fn has_named_stream(&self, name: &str) -> bool {
        self.named_streams.contains(name)
    }

    #[must_use]
    pub fn has_bag_property(&self) -> bool {
        self.properties().any(|p| p.kind().is_bag())
    }
}
