//! Declarative model documents (YAML or JSON) turned into a [`MetadataModel`].

use crate::builder::ModelBuilder;
use crate::primitive::EdmPrimitiveType;
use crate::provider::MetadataModel;
use crate::resource_type::ResourceTypeId;
use crate::singleton::SingletonMetadata;
use odata_errors::{ODataError, ODataResult, messages};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinition {
    pub namespace: String,
    pub container: String,
    #[serde(default)]
    pub complex_types: Vec<TypeDefinition>,
    #[serde(default)]
    pub entity_types: Vec<TypeDefinition>,
    #[serde(default)]
    pub resource_sets: Vec<ResourceSetDefinition>,
    #[serde(default)]
    pub singletons: Vec<SingletonDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub media_link_entry: bool,
    #[serde(default)]
    pub named_streams: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub navigation: Vec<NavigationDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDefinition {
    pub name: String,
    /// `Edm.*` primitive name, or the name of a complex type.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub etag: bool,
    #[serde(default)]
    pub bag: bool,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationDefinition {
    pub name: String,
    pub target_set: String,
    /// Collection-valued when true, single-valued otherwise.
    #[serde(default)]
    pub many: bool,
    /// Navigation property on the target type forming the reverse direction.
    #[serde(default)]
    pub partner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSetDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingletonDefinition {
    pub name: String,
    pub return_type: String,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub entity_set: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ModelDefinition {
    /// # Errors
    /// Fails on unknown type references and on any model integrity error.
    pub fn build(&self) -> ODataResult<MetadataModel> {
        let mut b = ModelBuilder::new(&self.container, &self.namespace);

        for def in &self.complex_types {
            b.add_complex_type(&def.name)?;
        }
        for def in &self.entity_types {
            let base = def
                .base
                .as_deref()
                .map(|name| lookup_type(&b, name))
                .transpose()?;
            let id = b.add_entity_type(&def.name, base, def.is_abstract)?;
            if def.media_link_entry {
                b.set_media_link_entry(id, true)?;
            }
        }

        for def in self.complex_types.iter().chain(&self.entity_types) {
            let owner = lookup_type(&b, &def.name)?;
            for prop in &def.properties {
                add_property(&mut b, owner, prop)?;
            }
            for stream in &def.named_streams {
                b.add_named_stream(owner, stream)?;
            }
        }

        for set in &self.resource_sets {
            let ty = lookup_type(&b, &set.type_name)?;
            b.add_resource_set(&set.name, ty)?;
        }

        for def in &self.entity_types {
            let owner = lookup_type(&b, &def.name)?;
            for nav in &def.navigation {
                if nav.many {
                    b.add_resource_set_reference_property(owner, &nav.name, &nav.target_set)?;
                } else {
                    b.add_resource_reference_property(owner, &nav.name, &nav.target_set)?;
                }
            }
        }
        for def in &self.entity_types {
            let owner = lookup_type(&b, &def.name)?;
            for nav in &def.navigation {
                if let Some(partner) = &nav.partner {
                    let target = self
                        .resource_sets
                        .iter()
                        .find(|s| s.name == nav.target_set)
                        .ok_or_else(|| ODataError::metadata(messages::unknown_resource_set(&nav.target_set)))?;
                    let target_type = lookup_type(&b, &target.type_name)?;
                    b.link_navigation_properties((owner, &nav.name), (target_type, partner))?;
                }
            }
        }

        for def in &self.singletons {
            let mut singleton = SingletonMetadata::new(&def.name, lookup_type(&b, &def.return_type)?)?;
            if def.collection {
                singleton = singleton.returning_collection();
            }
            if let Some(set) = &def.entity_set {
                singleton = singleton.in_entity_set(set);
            }
            for param in &def.parameters {
                let kind = EdmPrimitiveType::from_name(&param.type_name)
                    .ok_or_else(|| ODataError::metadata(messages::unknown_resource_type(&param.type_name)))?;
                singleton = singleton.with_parameter(&param.name, kind);
            }
            b.add_singleton(singleton)?;
        }

        b.build()
    }
}

fn lookup_type(b: &ModelBuilder, name: &str) -> ODataResult<ResourceTypeId> {
    if let Some(kind) = name
        .strip_prefix("Edm.")
        .and_then(EdmPrimitiveType::from_name)
    {
        return Ok(ModelBuilder::primitive(kind));
    }
    let simple = b
        .namespace()
        .and_then(|ns| name.strip_prefix(ns))
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name);
    b.find_type(simple)
        .ok_or_else(|| ODataError::metadata(messages::unknown_resource_type(name)))
}

fn add_property(b: &mut ModelBuilder, owner: ResourceTypeId, def: &PropertyDefinition) -> ODataResult<()> {
    let ty = lookup_type(b, &def.type_name)?;
    let is_primitive = ty.index() < EdmPrimitiveType::ALL.len();
    if def.bag {
        b.add_bag_property(owner, &def.name, ty)?;
    } else if !is_primitive {
        b.add_complex_property(owner, &def.name, ty)?;
    } else if def.key {
        b.add_property(owner, &def.name, crate::property::PropertyKind::Key, ty)?;
    } else if def.etag {
        b.add_property(owner, &def.name, crate::property::PropertyKind::ETag, ty)?;
    } else {
        b.add_property(owner, &def.name, crate::property::PropertyKind::Primitive, ty)?;
    }
    if let Some(mime) = &def.mime_type {
        b.set_mime_type(owner, &def.name, mime)?;
    }
    Ok(())
}
