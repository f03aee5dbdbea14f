//! Format-neutral object model handed to the writers, and the serializer
//! that builds it from query results.

use crate::etag;
use odata_errors::ODataResult;
use odata_model::{
    EdmPrimitiveType, EntityCollection, EntityInstance, MetadataProviderWrapper, PrimitiveValue,
    PropertyKind, PropertyValue, ResourceProperty, ResourceSetWrapper, ResourceType, ResourceTypeId,
};
use odata_uri::{ExpandedProjectionNode, KeyPredicate};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ODataValue {
    Null,
    Primitive(PrimitiveValue),
    Complex(ODataPropertyContent),
    Bag(Vec<ODataValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ODataProperty {
    pub name: String,
    /// `Edm.Int32`, `NorthWind.Address`, `Bag(Edm.String)`.
    pub type_name: String,
    pub value: ODataValue,
}

impl ODataProperty {
    #[must_use]
    pub fn primitive_kind(&self) -> Option<EdmPrimitiveType> {
        EdmPrimitiveType::from_name(&self.type_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ODataPropertyContent {
    pub properties: Vec<ODataProperty>,
}

impl ODataPropertyContent {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ODataProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ODataExpanded {
    /// `None` for a null single-valued navigation.
    Entry(Option<Box<ODataEntry>>),
    Feed(Box<ODataFeed>),
}

/// A navigation property of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ODataLink {
    pub name: String,
    /// Relative to the service root.
    pub url: String,
    pub is_collection: bool,
    pub expanded: Option<ODataExpanded>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataMediaLink {
    /// Empty for the default stream of a media link entry.
    pub name: String,
    pub edit_link: String,
    pub src: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ODataEntry {
    /// Absolute identity URI.
    pub id: String,
    /// Relative to the service root, e.g. `Customers('ALFKI')`.
    pub edit_link: String,
    pub type_name: String,
    pub resource_set: String,
    pub etag: Option<String>,
    pub properties: ODataPropertyContent,
    pub links: Vec<ODataLink>,
    pub media_link: Option<ODataMediaLink>,
    pub named_streams: Vec<ODataMediaLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ODataFeed {
    pub id: String,
    pub title: String,
    /// Relative to the service root.
    pub self_link: String,
    pub entries: Vec<ODataEntry>,
    pub row_count: Option<u64>,
    /// Absolute.
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataUrlCollection {
    pub urls: Vec<ODataUrl>,
    pub count: Option<u64>,
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDocument {
    pub title: String,
    pub collections: Vec<String>,
}

/// Everything a writer can be asked to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataPayload {
    Feed(ODataFeed),
    Entry(ODataEntry),
    Property(ODataProperty),
    Url(ODataUrl),
    Urls(ODataUrlCollection),
    ServiceDocument(ServiceDocument),
}

/// Builds the object model for results of one request.
pub struct ObjectModelSerializer<'a> {
    wrapper: &'a MetadataProviderWrapper,
    service_root: &'a str,
}

impl<'a> ObjectModelSerializer<'a> {
    /// `service_root` is absolute and ends with `/`.
    #[must_use]
    pub const fn new(wrapper: &'a MetadataProviderWrapper, service_root: &'a str) -> Self {
        Self {
            wrapper,
            service_root,
        }
    }

    #[must_use]
    pub fn absolute(&self, relative: &str) -> String {
        format!("{}{relative}", self.service_root)
    }

    /// Relative canonical link of an entity in `set`.
    ///
    /// # Errors
    /// Fails when the entity's type is not part of the model.
    pub fn edit_link(&self, entity: &EntityInstance, set: &ResourceSetWrapper) -> ODataResult<String> {
        let ty = self.wrapper.resource_type(entity.type_id())?;
        Ok(format!(
            "{}{}",
            set.name(),
            KeyPredicate::from_entity(entity, ty).to_uri_literal()
        ))
    }

    /// # Errors
    /// Fails when an entity's type is not part of the model.
    pub fn entry(
        &self,
        entity: &EntityInstance,
        set: &Arc<ResourceSetWrapper>,
        node: Option<&ExpandedProjectionNode>,
    ) -> ODataResult<ODataEntry> {
        let ty = self.wrapper.resource_type(entity.type_id())?;
        let edit_link = self.edit_link(entity, set)?;
        let mut properties = ODataPropertyContent::default();
        let mut links = Vec::new();

        for property in ty.properties() {
            if node.is_some_and(|n| !n.includes(property.name())) {
                continue;
            }
            if property.is_navigation() {
                links.push(self.link(entity, property, &edit_link, node)?);
                continue;
            }
            let value = entity.get(property.name()).unwrap_or(&PropertyValue::Primitive(PrimitiveValue::Null));
            properties.properties.push(self.property(property.name(), property.type_id(), property.kind(), value)?);
        }

        let media_link = ty.is_media_link_entry().then(|| ODataMediaLink {
            name: String::new(),
            edit_link: format!("{edit_link}/$value"),
            src: format!("{edit_link}/$value"),
            content_type: crate::format::OCTET_STREAM.to_owned(),
        });
        let named_streams = ty
            .named_streams()
            .map(|name| ODataMediaLink {
                name: name.to_owned(),
                edit_link: format!("{edit_link}/{name}"),
                src: format!("{edit_link}/{name}"),
                content_type: crate::format::OCTET_STREAM.to_owned(),
            })
            .collect();

        Ok(ODataEntry {
            id: self.absolute(&edit_link),
            type_name: ty.full_name().to_owned(),
            resource_set: set.name().to_owned(),
            etag: etag::of_entity(entity, ty),
            edit_link,
            properties,
            links,
            media_link,
            named_streams,
        })
    }

    fn link(
        &self,
        entity: &EntityInstance,
        property: &ResourceProperty,
        edit_link: &str,
        node: Option<&ExpandedProjectionNode>,
    ) -> ODataResult<ODataLink> {
        let url = format!("{edit_link}/{}", property.name());
        let is_collection = property.kind() == PropertyKind::ResourceSetReference;
        let expanded = match (node.and_then(|n| n.expanded_child(property.name())), entity.get(property.name())) {
            (Some(child), Some(PropertyValue::Reference(target))) => Some(ODataExpanded::Entry(
                target
                    .as_deref()
                    .map(|e| self.entry(e, child.resource_set(), Some(child)).map(Box::new))
                    .transpose()?,
            )),
            (Some(child), Some(PropertyValue::Collection(collection))) => {
                let next = collection
                    .next_skiptoken
                    .as_deref()
                    .map(|token| self.absolute(&format!("{url}?$skiptoken={token}")));
                Some(ODataExpanded::Feed(Box::new(self.feed(
                    collection,
                    child.resource_set(),
                    Some(child),
                    &url,
                    next,
                )?)))
            }
            _ => None,
        };
        Ok(ODataLink {
            name: property.name().to_owned(),
            url,
            is_collection,
            expanded,
        })
    }

    /// # Errors
    /// Fails when an entity's type is not part of the model.
    pub fn feed(
        &self,
        collection: &EntityCollection,
        set: &Arc<ResourceSetWrapper>,
        node: Option<&ExpandedProjectionNode>,
        self_link: &str,
        next_link: Option<String>,
    ) -> ODataResult<ODataFeed> {
        let entries = collection
            .entities
            .iter()
            .map(|e| self.entry(e, set, node))
            .collect::<ODataResult<Vec<_>>>()?;
        Ok(ODataFeed {
            id: self.absolute(self_link),
            title: set.name().to_owned(),
            self_link: self_link.to_owned(),
            entries,
            row_count: collection.count,
            next_link,
        })
    }

    /// # Errors
    /// Fails when a complex value's type is not part of the model.
    pub fn property(
        &self,
        name: &str,
        type_id: ResourceTypeId,
        kind: PropertyKind,
        value: &PropertyValue,
    ) -> ODataResult<ODataProperty> {
        let item_type = self.wrapper.resource_type(type_id)?;
        let type_name = match kind {
            PropertyKind::PrimitiveBag | PropertyKind::ComplexBag => format!("Bag({})", item_type.full_name()),
            _ => item_type.full_name().to_owned(),
        };
        Ok(ODataProperty {
            name: name.to_owned(),
            type_name,
            value: self.value(item_type, value)?,
        })
    }

    fn value(&self, ty: &ResourceType, value: &PropertyValue) -> ODataResult<ODataValue> {
        Ok(match value {
            PropertyValue::Primitive(PrimitiveValue::Null) | PropertyValue::Complex(None) => ODataValue::Null,
            PropertyValue::Primitive(v) => ODataValue::Primitive(v.clone()),
            PropertyValue::Complex(Some(complex)) => {
                let complex_type = self.wrapper.resource_type(complex.type_id())?;
                let mut content = ODataPropertyContent::default();
                for property in complex_type.properties() {
                    let inner = complex
                        .get(property.name())
                        .unwrap_or(&PropertyValue::Primitive(PrimitiveValue::Null));
                    content
                        .properties
                        .push(self.property(property.name(), property.type_id(), property.kind(), inner)?);
                }
                ODataValue::Complex(content)
            }
            PropertyValue::Bag(items) => ODataValue::Bag(
                items
                    .iter()
                    .map(|item| self.value(ty, item))
                    .collect::<ODataResult<Vec<_>>>()?,
            ),
            PropertyValue::Reference(_) | PropertyValue::Collection(_) => ODataValue::Null,
        })
    }

    /// # Errors
    /// Fails when the entity's type is not part of the model.
    pub fn url(&self, entity: &EntityInstance, set: &ResourceSetWrapper) -> ODataResult<ODataUrl> {
        Ok(ODataUrl {
            url: self.absolute(&self.edit_link(entity, set)?),
        })
    }

    /// # Errors
    /// Fails when an entity's type is not part of the model.
    pub fn url_collection(
        &self,
        collection: &EntityCollection,
        set: &ResourceSetWrapper,
        next_link: Option<String>,
    ) -> ODataResult<ODataUrlCollection> {
        Ok(ODataUrlCollection {
            urls: collection
                .entities
                .iter()
                .map(|e| self.url(e, set))
                .collect::<ODataResult<Vec<_>>>()?,
            count: collection.count,
            next_link,
        })
    }

    /// # Errors
    /// Fails when the model has duplicate sets or no container name.
    pub fn service_document(&self) -> ODataResult<ServiceDocument> {
        Ok(ServiceDocument {
            title: self.wrapper.container_name()?.to_owned(),
            collections: self
                .wrapper
                .resource_sets()?
                .iter()
                .map(|s| s.name().to_owned())
                .collect(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};
    use odata_uri::RootProjectionNode;

    const ROOT: &str = "http://localhost/svc/";

    #[test]
    fn entry_carries_links_and_typed_properties() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let alfki = &northwind_entities(&northwind_model())["Customers"][0];

        let entry = serializer.entry(alfki, &customers, None).unwrap();
        assert!(entry.edit_link.starts_with("Customers(CustomerID='ALFKI',CustomerGuid=guid'"));
        assert_eq!(entry.id, format!("{ROOT}{}", entry.edit_link));
        assert_eq!(entry.type_name, "NorthWind.Customer");
        assert_eq!(entry.links.len(), 1);
        assert_eq!(entry.links[0].url, format!("{}/Orders", entry.edit_link));
        assert!(entry.links[0].is_collection);
        let address = entry.properties.get("Address").unwrap();
        assert_eq!(address.type_name, "NorthWind.Address");
        assert!(matches!(&address.value, ODataValue::Complex(c) if c.properties.len() == 3));
        assert_eq!(entry.properties.get("Photo").unwrap().value, ODataValue::Null);
    }

    #[test]
    fn projection_prunes_properties() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let projection =
            RootProjectionNode::parse(None, Some("CustomerName"), &wrapper, &customers).unwrap();
        let alfki = &northwind_entities(&northwind_model())["Customers"][0];
        let entry = serializer.entry(alfki, &customers, Some(projection.node())).unwrap();
        let names: Vec<_> = entry.properties.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["CustomerName"]);
        assert!(entry.links.is_empty());
    }

    #[test]
    fn media_link_entries_and_bags() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let employees = wrapper.resolve_resource_set("Employees").unwrap();
        let nancy = &northwind_entities(&northwind_model())["Employees"][0];
        let entry = serializer.entry(nancy, &employees, None).unwrap();
        assert_eq!(entry.media_link.unwrap().src, "Employees('EMP1')/$value");
        assert_eq!(entry.named_streams[0].name, "TumbNail_48X48");
        let emails = entry.properties.get("Emails").unwrap();
        assert_eq!(emails.type_name, "Bag(Edm.String)");
        assert!(matches!(&emails.value, ODataValue::Bag(items) if items.len() == 2));
    }

    #[test]
    fn product_entries_carry_etags() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let products = wrapper.resolve_resource_set("Products").unwrap();
        let chai = &northwind_entities(&northwind_model())["Products"][0];
        let entry = serializer.entry(chai, &products, None).unwrap();
        assert_eq!(entry.etag.as_deref(), Some("W/\"7L\""));
    }
}
