//! Resource path parsing: `Customers('ALFKI')/Orders/$count` into typed segments.

use crate::key::KeyPredicate;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    EntitySetRights, MetadataProviderWrapper, PropertyKind, ResourceProperty, ResourceSetWrapper,
    ResourceType, ResourceTypeId, SingletonMetadata,
};
use std::sync::Arc;

pub const METADATA: &str = "$metadata";
pub const BATCH: &str = "$batch";
pub const COUNT: &str = "$count";
pub const VALUE: &str = "$value";
pub const LINKS: &str = "$links";

/// What a segment resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Nothing,
    ServiceDirectory,
    Metadata,
    Batch,
    /// One entity or a collection of entities.
    Resource,
    ComplexObject,
    Primitive,
    /// Raw value of a primitive property, or the result of `$count`.
    PrimitiveValue,
    Bag,
    /// Target of a `$links` segment.
    Link,
    /// Default stream of a media link entry, or a named stream.
    MediaResource,
    Singleton,
}

/// Where a segment's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    None,
    EntitySet,
    Property,
}

/// One resolved path segment.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub identifier: String,
    pub target_kind: TargetKind,
    pub target_source: TargetSource,
    pub single_result: bool,
    pub key: Option<KeyPredicate>,
    /// The set the segment's entities belong to, when there is one.
    pub resource_set: Option<Arc<ResourceSetWrapper>>,
    pub target_type: Option<ResourceTypeId>,
    /// The property this segment navigates or reads.
    pub property: Option<ResourceProperty>,
    pub singleton: Option<SingletonMetadata>,
}

impl SegmentDescriptor {
    fn new(identifier: &str, target_kind: TargetKind, target_source: TargetSource) -> Self {
        Self {
            identifier: identifier.to_owned(),
            target_kind,
            target_source,
            single_result: true,
            key: None,
            resource_set: None,
            target_type: None,
            property: None,
            singleton: None,
        }
    }

    #[must_use]
    pub fn is_count(&self) -> bool {
        self.identifier == COUNT
    }

    /// A resource, link or singleton segment that yields several entities.
    #[must_use]
    pub fn is_entity_collection(&self) -> bool {
        !self.single_result
            && matches!(
                self.target_kind,
                TargetKind::Resource | TargetKind::Link | TargetKind::Singleton
            )
    }

    fn yields_entities(&self) -> bool {
        matches!(
            self.target_kind,
            TargetKind::Resource | TargetKind::Link | TargetKind::Singleton
        )
    }
}

/// Percent-decode one path segment. `+` is kept literally.
#[must_use]
pub fn decode_segment(raw: &str) -> String {
    // Protect the form separators so the whole segment decodes as one key.
    let protected = raw
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    url::form_urlencoded::parse(protected.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

/// Split `Name(key)` into its identifier and the key predicate body.
fn split_identifier(segment: &str) -> ODataResult<(&str, Option<&str>)> {
    let Some(open) = segment.find('(') else {
        return Ok((segment, None));
    };
    let Some(body) = segment[open + 1..].strip_suffix(')') else {
        return Err(ODataError::syntax_error(messages::syntax_error()));
    };
    let name = &segment[..open];
    if name.is_empty() {
        return Err(ODataError::syntax_error(messages::syntax_error()));
    }
    // `Customers()` addresses the whole set.
    Ok((name, (!body.trim().is_empty()).then_some(body)))
}

/// Resolves resource paths against a metadata wrapper.
pub struct SegmentParser<'a> {
    wrapper: &'a MetadataProviderWrapper,
}

impl<'a> SegmentParser<'a> {
    #[must_use]
    pub const fn new(wrapper: &'a MetadataProviderWrapper) -> Self {
        Self { wrapper }
    }

    /// Parse a service-relative path (no leading slash) into segments.
    ///
    /// Read rights are checked on every segment that is traversed; the rights
    /// needed on the last segment depend on the method and are left to the caller.
    ///
    /// # Errors
    /// `404` for unknown identifiers, `400` for malformed or misplaced
    /// segments and key predicates, `403` for traversed sets that cannot be read.
    pub fn parse(&self, path: &str) -> ODataResult<Vec<SegmentDescriptor>> {
        let raw: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();

        let Some((first, rest)) = raw.split_first() else {
            return Ok(vec![SegmentDescriptor::new(
                "",
                TargetKind::ServiceDirectory,
                TargetSource::None,
            )]);
        };

        let mut segments = vec![self.first_segment(first)?];
        let mut links_pending = false;
        for identifier in rest {
            let previous = segments
                .last()
                .ok_or_else(|| ODataError::internal(messages::syntax_error()))?;
            if matches!(
                previous.target_kind,
                TargetKind::Metadata
                    | TargetKind::Batch
                    | TargetKind::PrimitiveValue
                    | TargetKind::Bag
                    | TargetKind::MediaResource
            ) {
                return Err(ODataError::bad_request(messages::segment_must_be_last(
                    &previous.identifier,
                )));
            }
            if previous.yields_entities()
                && let Some(set) = &previous.resource_set
            {
                let right = if previous.single_result {
                    EntitySetRights::READ_SINGLE
                } else {
                    EntitySetRights::READ_MULTIPLE
                };
                set.check_resource_set_rights(right)?;
            }

            if identifier == LINKS {
                if links_pending || previous.target_kind == TargetKind::Link {
                    return Err(ODataError::bad_request(messages::links_requires_navigation(identifier)));
                }
                if !(previous.yields_entities() && previous.single_result) {
                    return Err(ODataError::bad_request(messages::links_requires_single_source(
                        &previous.identifier,
                    )));
                }
                links_pending = true;
                continue;
            }

            let next = if links_pending {
                links_pending = false;
                self.link_segment(previous, identifier)?
            } else {
                self.next_segment(previous, identifier)?
            };
            segments.push(next);
        }
        if links_pending {
            return Err(ODataError::bad_request(messages::links_requires_navigation(LINKS)));
        }
        tracing::debug!(path, segments = segments.len(), "resource path parsed");
        Ok(segments)
    }

    fn first_segment(&self, raw: &str) -> ODataResult<SegmentDescriptor> {
        let (name, key) = split_identifier(raw)?;
        match name {
            METADATA | BATCH => {
                if key.is_some() {
                    return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
                }
                let kind = if name == METADATA {
                    TargetKind::Metadata
                } else {
                    TargetKind::Batch
                };
                return Ok(SegmentDescriptor::new(name, kind, TargetSource::None));
            }
            COUNT | VALUE | LINKS => {
                return Err(ODataError::bad_request(messages::segment_cannot_be_first(name)));
            }
            _ => {}
        }

        if let Some(set) = self.wrapper.resolve_resource_set(name) {
            let ty = self.wrapper.resource_type(set.type_id())?;
            let mut segment = SegmentDescriptor::new(name, TargetKind::Resource, TargetSource::EntitySet);
            segment.key = key.map(|k| KeyPredicate::parse(k, ty)).transpose()?;
            segment.single_result = segment.key.is_some();
            segment.target_type = Some(ty.id());
            segment.resource_set = Some(set);
            return Ok(segment);
        }

        if let Some(singleton) = self.wrapper.singletons().into_iter().find(|s| s.name() == name) {
            if key.is_some() {
                return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
            }
            let mut segment = SegmentDescriptor::new(name, TargetKind::Singleton, TargetSource::None);
            segment.single_result = !singleton.returns_collection();
            segment.target_type = Some(singleton.return_type());
            segment.resource_set = match singleton.entity_set() {
                Some(set) => Some(
                    self.wrapper
                        .resolve_resource_set(set)
                        .ok_or_else(|| ODataError::not_found(messages::resource_not_found(name)))?,
                ),
                None => None,
            };
            segment.singleton = Some(singleton.clone());
            return Ok(segment);
        }

        Err(ODataError::not_found(messages::resource_not_found(name)))
    }

    fn previous_type(&self, previous: &SegmentDescriptor) -> ODataResult<&'a ResourceType> {
        let id = previous
            .target_type
            .ok_or_else(|| ODataError::bad_request(messages::segment_must_be_last(&previous.identifier)))?;
        self.wrapper.resource_type(id)
    }

    fn next_segment(&self, previous: &SegmentDescriptor, raw: &str) -> ODataResult<SegmentDescriptor> {
        let (name, key) = split_identifier(raw)?;

        if name == COUNT {
            if key.is_some() {
                return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
            }
            if !previous.is_entity_collection() {
                return Err(ODataError::bad_request(messages::count_requires_collection(
                    &previous.identifier,
                )));
            }
            let mut segment = SegmentDescriptor::new(COUNT, TargetKind::PrimitiveValue, TargetSource::None);
            segment.resource_set.clone_from(&previous.resource_set);
            segment.target_type = previous.target_type;
            return Ok(segment);
        }

        if name == VALUE {
            if key.is_some() {
                return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
            }
            let media = previous.yields_entities()
                && previous.single_result
                && self.previous_type(previous)?.is_media_link_entry();
            let kind = match previous.target_kind {
                TargetKind::Primitive => TargetKind::PrimitiveValue,
                _ if media => TargetKind::MediaResource,
                _ => {
                    return Err(ODataError::bad_request(messages::value_requires_primitive_or_media(
                        &previous.identifier,
                    )));
                }
            };
            let mut segment = SegmentDescriptor::new(VALUE, kind, TargetSource::None);
            segment.resource_set.clone_from(&previous.resource_set);
            segment.target_type = previous.target_type;
            segment.property.clone_from(&previous.property);
            return Ok(segment);
        }

        if !previous.single_result {
            return Err(ODataError::bad_request(messages::segment_requires_single_source(name)));
        }
        if !matches!(
            previous.target_kind,
            TargetKind::Resource | TargetKind::Singleton | TargetKind::ComplexObject
        ) {
            return Err(ODataError::bad_request(messages::segment_must_be_last(&previous.identifier)));
        }

        let ty = self.previous_type(previous)?;
        let Some(property) = ty.property(name) else {
            if ty.has_named_stream(name) {
                if key.is_some() {
                    return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
                }
                let mut segment = SegmentDescriptor::new(name, TargetKind::MediaResource, TargetSource::Property);
                segment.resource_set.clone_from(&previous.resource_set);
                segment.target_type = previous.target_type;
                return Ok(segment);
            }
            return Err(ODataError::not_found(messages::resource_not_found(name)));
        };

        if property.is_navigation() {
            return self.navigation_segment(previous, ty, property, key, TargetKind::Resource);
        }
        if key.is_some() {
            return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
        }
        let kind = match property.kind() {
            PropertyKind::ComplexType => TargetKind::ComplexObject,
            PropertyKind::PrimitiveBag | PropertyKind::ComplexBag => TargetKind::Bag,
            _ => TargetKind::Primitive,
        };
        let mut segment = SegmentDescriptor::new(name, kind, TargetSource::Property);
        segment.resource_set.clone_from(&previous.resource_set);
        segment.target_type = Some(property.type_id());
        segment.property = Some(property.clone());
        Ok(segment)
    }

    fn link_segment(&self, previous: &SegmentDescriptor, raw: &str) -> ODataResult<SegmentDescriptor> {
        let (name, key) = split_identifier(raw)?;
        let ty = self.previous_type(previous)?;
        let property = ty
            .property(name)
            .filter(|p| p.is_navigation())
            .ok_or_else(|| ODataError::bad_request(messages::links_requires_navigation(name)))?;
        self.navigation_segment(previous, ty, property, key, TargetKind::Link)
    }

    fn navigation_segment(
        &self,
        previous: &SegmentDescriptor,
        ty: &ResourceType,
        property: &ResourceProperty,
        key: Option<&str>,
        kind: TargetKind,
    ) -> ODataResult<SegmentDescriptor> {
        let name = property.name();
        let source_set = previous
            .resource_set
            .as_ref()
            .ok_or_else(|| ODataError::not_found(messages::resource_not_found(name)))?;
        let related = self
            .wrapper
            .related_resource_set(source_set, ty, property)?
            .ok_or_else(|| ODataError::not_found(messages::resource_not_found(name)))?;
        let target_type = self.wrapper.resource_type(property.type_id())?;

        let mut segment = SegmentDescriptor::new(name, kind, TargetSource::Property);
        segment.single_result = match property.kind() {
            PropertyKind::ResourceReference => {
                if key.is_some() {
                    return Err(ODataError::bad_request(messages::segment_cannot_have_key(name)));
                }
                true
            }
            _ => {
                segment.key = key.map(|k| KeyPredicate::parse(k, target_type)).transpose()?;
                segment.key.is_some()
            }
        };
        segment.target_type = Some(target_type.id());
        segment.resource_set = Some(related);
        segment.property = Some(property.clone());
        Ok(segment)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::ServiceConfiguration;
    use odata_model::testing::{ALFKI_GUID, northwind_config, northwind_wrapper};

    fn parse(path: &str) -> ODataResult<Vec<SegmentDescriptor>> {
        let wrapper = northwind_wrapper(northwind_config());
        SegmentParser::new(&wrapper).parse(path)
    }

    fn alfki() -> String {
        format!("Customers(CustomerID='ALFKI',CustomerGuid=guid'{ALFKI_GUID}')")
    }

    #[test]
    fn empty_path_is_service_directory() {
        let segments = parse("").unwrap();
        assert_eq!(segments[0].target_kind, TargetKind::ServiceDirectory);
    }

    #[test]
    fn entity_set_and_count() {
        let segments = parse("Customers/$count").unwrap();
        assert_eq!(segments.len(), 2);
        assert!(!segments[0].single_result);
        assert_eq!(segments[0].target_source, TargetSource::EntitySet);
        assert!(segments[1].is_count());
        assert_eq!(segments[1].target_kind, TargetKind::PrimitiveValue);
    }

    #[test]
    fn navigation_from_keyed_entity() {
        let segments = parse(&format!("{}/Orders(10643)/Order_Details", alfki())).unwrap();
        let kinds: Vec<_> = segments.iter().map(|s| (s.target_kind, s.single_result)).collect();
        assert_eq!(
            kinds,
            [
                (TargetKind::Resource, true),
                (TargetKind::Resource, true),
                (TargetKind::Resource, false),
            ]
        );
        assert_eq!(segments[2].resource_set.as_ref().unwrap().name(), "Order_Details");
    }

    #[test]
    fn properties_and_values() {
        let segments = parse("Orders(10643)/ShipName/$value").unwrap();
        assert_eq!(segments[1].target_kind, TargetKind::Primitive);
        assert_eq!(segments[2].target_kind, TargetKind::PrimitiveValue);

        let segments = parse(&format!("{}/Address/City", alfki())).unwrap();
        assert_eq!(segments[1].target_kind, TargetKind::ComplexObject);
        assert_eq!(segments[2].target_kind, TargetKind::Primitive);

        let segments = parse("Employees('EMP1')/Emails").unwrap();
        assert_eq!(segments[1].target_kind, TargetKind::Bag);
    }

    #[test]
    fn media_resources() {
        let segments = parse("Employees('EMP1')/$value").unwrap();
        assert_eq!(segments[1].target_kind, TargetKind::MediaResource);
        let segments = parse("Employees('EMP1')/TumbNail_48X48").unwrap();
        assert_eq!(segments[1].target_kind, TargetKind::MediaResource);
        assert!(parse("Orders(10643)/$value").is_err());
    }

    #[test]
    fn links_segment() {
        let segments = parse(&format!("{}/$links/Orders", alfki())).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].target_kind, TargetKind::Link);
        assert!(!segments[1].single_result);
        assert!(parse("Customers/$links/Orders").is_err());
        assert!(parse(&format!("{}/$links", alfki())).is_err());
        assert!(parse(&format!("{}/$links/CustomerName", alfki())).is_err());
    }

    #[test]
    fn misplaced_segments() {
        let err = parse("$count").unwrap_err();
        assert!(err.message().contains("root of the service"));
        let err = parse("Customers/$count/$value").unwrap_err();
        assert!(err.message().contains("must be the last segment"));
        let err = parse("$metadata/Customers").unwrap_err();
        assert!(err.message().contains("must be the last segment"));
        let err = parse("Customers/Orders").unwrap_err();
        assert!(err.message().contains("single resource"));
        let err = parse("Orders(10643)/$count").unwrap_err();
        assert!(err.message().contains("$count"));
        let err = parse("Orders(10643)/Customer(1)").unwrap_err();
        assert!(err.message().contains("cannot have a key predicate"));
    }

    #[test]
    fn unknown_identifiers_are_not_found() {
        let err = parse("Nope").unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
        let err = parse("Orders(10643)/Nope").unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
    }

    #[test]
    fn hidden_sets_are_not_found() {
        let mut config = ServiceConfiguration::default();
        config.set_entity_set_access_rule("Customers", EntitySetRights::ALL);
        let wrapper = northwind_wrapper(config);
        let parser = SegmentParser::new(&wrapper);
        assert_eq!(parser.parse("Orders").unwrap_err().status().as_u16(), 404);
        let err = parser.parse(&format!("{}/Orders", alfki())).unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
    }

    #[test]
    fn traversal_needs_read_rights() {
        let mut config = northwind_config();
        config.set_entity_set_access_rule("Orders", EntitySetRights::READ_MULTIPLE);
        let wrapper = northwind_wrapper(config);
        let parser = SegmentParser::new(&wrapper);
        let err = parser.parse("Orders(10643)/Customer").unwrap_err();
        assert_eq!(err.status().as_u16(), 403);
    }

    #[test]
    fn singletons_resolve() {
        let segments = parse("TopCustomer/Orders").unwrap();
        assert_eq!(segments[0].target_kind, TargetKind::Singleton);
        assert_eq!(segments[1].resource_set.as_ref().unwrap().name(), "Orders");
        let segments = parse("CustomersByCountry/$count").unwrap();
        assert!(segments[1].is_count());
    }

    #[test]
    fn segments_are_percent_decoded_once() {
        assert_eq!(decode_segment("Customers('A%20B')"), "Customers('A B')");
        assert_eq!(decode_segment("a%2520b"), "a%20b");
        assert_eq!(decode_segment("a+b"), "a+b");
    }
}
