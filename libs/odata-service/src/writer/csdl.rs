//! The `$metadata` document: CSDL inside an EDMX envelope.

use super::METADATA_NS;
use super::xml::XmlWriter;
use indexmap::IndexMap;
use odata_errors::ODataResult;
use odata_model::{
    MetadataProviderWrapper, PropertyKind, ProtocolVersion, ResolvedAssociationSet, ResourceProperty,
    ResourceType, ResourceTypeId, ResourceTypeKind, SingletonMetadata,
};
use std::sync::Arc;

const EDMX_NS: &str = "http://schemas.microsoft.com/ado/2007/06/edmx";
const EDM_V1_NS: &str = "http://schemas.microsoft.com/ado/2006/04/edm";
const EDM_V3_NS: &str = "http://schemas.microsoft.com/ado/2009/11/edm";

/// A rendered metadata document and the version it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    pub body: Vec<u8>,
    /// `3.0` when a visible type has bag properties or named streams, else `1.0`.
    pub version: ProtocolVersion,
}

/// Relationship and role names for one navigation property.
struct NavigationRoles {
    relationship: String,
    from_role: String,
    to_role: String,
}

/// Render the metadata document for everything visible through `wrapper`.
///
/// # Errors
/// Metadata integrity failures surfaced while resolving sets and associations.
pub fn write_metadata(wrapper: &MetadataProviderWrapper) -> ODataResult<MetadataDocument> {
    let types = wrapper.types()?;
    let version = if types
        .iter()
        .any(|t| t.has_bag_property() || t.declared_named_streams().next().is_some())
    {
        ProtocolVersion::V3
    } else {
        ProtocolVersion::V1
    };
    let associations = wrapper.visible_association_sets()?;
    let roles = navigation_roles(&associations);
    let container_namespace = wrapper.container_namespace()?;

    let mut schemas: IndexMap<&str, Vec<&ResourceType>> = IndexMap::new();
    schemas.insert(container_namespace, Vec::new());
    for ty in types {
        schemas.entry(ty.namespace().unwrap_or_default()).or_default().push(ty);
    }

    let mut w = XmlWriter::new()?;
    let version_text = version.to_string();
    w.start("edmx:Edmx", &[("Version", "1.0"), ("xmlns:edmx", EDMX_NS)])?;
    w.start(
        "edmx:DataServices",
        &[("m:DataServiceVersion", version_text.as_str()), ("xmlns:m", METADATA_NS)],
    )?;
    let edm = if version >= ProtocolVersion::V3 { EDM_V3_NS } else { EDM_V1_NS };
    for (namespace, types) in &schemas {
        w.start(
            "Schema",
            &[
                ("Namespace", namespace),
                ("xmlns:d", super::DATA_NS),
                ("xmlns:m", METADATA_NS),
                ("xmlns", edm),
            ],
        )?;
        for ty in types {
            write_type(&mut w, wrapper, ty, &roles)?;
        }
        if *namespace == container_namespace {
            for association in &associations {
                write_association(&mut w, association)?;
            }
            write_container(&mut w, wrapper, &associations)?;
        }
        w.end("Schema")?;
    }
    w.end("edmx:DataServices")?;
    w.end("edmx:Edmx")?;

    tracing::debug!(%version, schemas = schemas.len(), associations = associations.len(), "wrote metadata document");
    Ok(MetadataDocument {
        body: w.finish(),
        version,
    })
}

fn navigation_roles(associations: &[Arc<ResolvedAssociationSet>]) -> IndexMap<(ResourceTypeId, String), NavigationRoles> {
    let mut roles = IndexMap::new();
    for association in associations {
        let ty = &association.association_type;
        for (end, other) in [(ty.end1(), ty.end2()), (ty.end2(), ty.end1())] {
            if let Some(property) = end.property() {
                roles.insert(
                    (end.type_id(), property.to_owned()),
                    NavigationRoles {
                        relationship: ty.full_name(),
                        from_role: end.name().to_owned(),
                        to_role: other.name().to_owned(),
                    },
                );
            }
        }
    }
    roles
}

fn write_type(
    w: &mut XmlWriter,
    wrapper: &MetadataProviderWrapper,
    ty: &ResourceType,
    roles: &IndexMap<(ResourceTypeId, String), NavigationRoles>,
) -> ODataResult<()> {
    let element = if ty.kind() == ResourceTypeKind::Entity { "EntityType" } else { "ComplexType" };
    let base_name = match ty.base_type() {
        Some(id) => Some(wrapper.resource_type(id)?.full_name()),
        None => None,
    };
    let mut attributes = vec![("Name", ty.name())];
    if let Some(base) = base_name {
        attributes.push(("BaseType", base));
    }
    if ty.is_abstract() {
        attributes.push(("Abstract", "true"));
    }
    if ty.is_media_link_entry() && base_name.is_none() {
        attributes.push(("m:HasStream", "true"));
    }
    w.start(element, &attributes)?;

    if ty.kind() == ResourceTypeKind::Entity && base_name.is_none() {
        w.start("Key", &[])?;
        for key in ty.key_properties() {
            w.empty("PropertyRef", &[("Name", key.name())])?;
        }
        w.end("Key")?;
    }
    for property in ty.declared_properties() {
        if property.is_navigation() {
            if let Some(role) = roles.get(&(ty.id(), property.name().to_owned())) {
                w.empty(
                    "NavigationProperty",
                    &[
                        ("Name", property.name()),
                        ("Relationship", role.relationship.as_str()),
                        ("FromRole", role.from_role.as_str()),
                        ("ToRole", role.to_role.as_str()),
                    ],
                )?;
            }
            continue;
        }
        write_property(w, property)?;
    }
    for stream in ty.declared_named_streams() {
        w.empty("Property", &[("Name", stream), ("Type", "Edm.Stream"), ("Nullable", "false")])?;
    }
    w.end(element)
}

fn write_property(w: &mut XmlWriter, property: &ResourceProperty) -> ODataResult<()> {
    let collection;
    let type_name = if property.kind().is_bag() {
        collection = format!("Collection({})", property.type_name());
        collection.as_str()
    } else {
        property.type_name()
    };
    let mut attributes = vec![("Name", property.name()), ("Type", type_name)];
    match property.kind() {
        PropertyKind::Key | PropertyKind::ComplexType | PropertyKind::PrimitiveBag | PropertyKind::ComplexBag => {
            attributes.push(("Nullable", "false"));
        }
        PropertyKind::ETag => attributes.push(("ConcurrencyMode", "Fixed")),
        PropertyKind::Primitive | PropertyKind::ResourceReference | PropertyKind::ResourceSetReference => {}
    }
    if let Some(mime) = property.mime_type() {
        attributes.push(("m:MimeType", mime));
    }
    w.empty("Property", &attributes)
}

fn write_association(w: &mut XmlWriter, association: &ResolvedAssociationSet) -> ODataResult<()> {
    let ty = &association.association_type;
    w.start("Association", &[("Name", ty.name())])?;
    for end in [ty.end1(), ty.end2()] {
        let multiplicity = end.multiplicity().to_string();
        w.empty(
            "End",
            &[
                ("Role", end.name()),
                ("Type", end.type_name()),
                ("Multiplicity", multiplicity.as_str()),
            ],
        )?;
    }
    w.end("Association")
}

fn write_container(
    w: &mut XmlWriter,
    wrapper: &MetadataProviderWrapper,
    associations: &[Arc<ResolvedAssociationSet>],
) -> ODataResult<()> {
    w.start(
        "EntityContainer",
        &[("Name", wrapper.container_name()?), ("m:IsDefaultEntityContainer", "true")],
    )?;
    for set in wrapper.resource_sets()? {
        let ty = wrapper.resource_type(set.type_id())?;
        w.empty("EntitySet", &[("Name", set.name()), ("EntityType", ty.full_name())])?;
    }
    for association in associations {
        let relationship = association.association_type.full_name();
        w.start(
            "AssociationSet",
            &[("Name", association.name()), ("Association", relationship.as_str())],
        )?;
        let type_ends = [association.association_type.end1(), association.association_type.end2()];
        let set_ends = [&association.end1_set, &association.end2_set];
        for (end, set) in type_ends.into_iter().zip(set_ends) {
            w.empty("End", &[("Role", end.name()), ("EntitySet", set.name())])?;
        }
        w.end("AssociationSet")?;
    }
    for singleton in wrapper.singletons() {
        write_function_import(w, wrapper, singleton)?;
    }
    w.end("EntityContainer")
}

fn write_function_import(
    w: &mut XmlWriter,
    wrapper: &MetadataProviderWrapper,
    singleton: &SingletonMetadata,
) -> ODataResult<()> {
    let return_type = wrapper.resource_type(singleton.return_type())?.full_name();
    let return_type = if singleton.returns_collection() {
        format!("Collection({return_type})")
    } else {
        return_type.to_owned()
    };
    let mut attributes = vec![("Name", singleton.name()), ("ReturnType", return_type.as_str())];
    if let Some(set) = singleton.entity_set() {
        attributes.push(("EntitySet", set));
    }
    attributes.push(("m:HttpMethod", "GET"));
    if singleton.parameters().is_empty() {
        return w.empty("FunctionImport", &attributes);
    }
    w.start("FunctionImport", &attributes)?;
    for parameter in singleton.parameters() {
        w.empty(
            "Parameter",
            &[("Name", parameter.name.as_str()), ("Type", parameter.kind.name()), ("Mode", "In")],
        )?;
    }
    w.end("FunctionImport")
}
