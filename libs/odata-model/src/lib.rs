//! OData metadata model
//!
//! - [`ModelBuilder`] / [`ModelDefinition`]: declare types, sets, navigation and singletons
//! - [`MetadataProvider`]: the raw model contract, implemented by [`MetadataModel`]
//! - [`MetadataProviderWrapper`]: configuration-aware, caching view used per service
//! - [`PrimitiveValue`] and the instance types query providers hand back
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod association;
pub mod builder;
pub mod config;
pub mod definition;
pub mod instance;
pub mod primitive;
pub mod property;
pub mod provider;
pub mod resource_set;
pub mod resource_type;
pub mod rights;
pub mod singleton;
pub mod value;
pub mod version;
pub mod wrapper;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod testing;

pub use association::{
    Multiplicity, ResourceAssociationSet, ResourceAssociationSetEnd, ResourceAssociationType,
    ResourceAssociationTypeEnd,
};
pub use builder::ModelBuilder;
pub use config::{ALL_SETS, ConfigError, ServiceConfiguration};
pub use definition::ModelDefinition;
pub use instance::{ComplexInstance, EntityCollection, EntityInstance, PropertyValue};
pub use primitive::EdmPrimitiveType;
pub use property::{PropertyKind, PropertyKindFlags, ResourceProperty};
pub use provider::{MetadataModel, MetadataProvider};
pub use resource_set::{ResourceSet, ResourceSetWrapper};
pub use resource_type::{InstanceTypeKey, ResourceType, ResourceTypeId, ResourceTypeKind};
pub use rights::EntitySetRights;
pub use singleton::{SingletonMetadata, SingletonParameter};
pub use value::PrimitiveValue;
pub use version::ProtocolVersion;
pub use wrapper::{MetadataProviderWrapper, ResolvedAssociationSet};
