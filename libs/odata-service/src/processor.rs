//! The URI processor: one [`ODataRequest`] in, one [`ODataResponse`] out.
//!
//! Reads walk the compiled segments left to right, asking the query provider
//! for each hop, then expand, serialize and write. Writes resolve their target
//! the same way and hand a typed entity to the provider's mutation hooks.

use crate::description::{QueryType, RequestDescription};
use crate::etag::{self, PreconditionOutcome, Preconditions};
use crate::expander::Expander;
use crate::format::{self, PayloadKind, ResponseFormat};
use crate::object_model::{ODataPayload, ObjectModelSerializer};
use crate::provider::{QueryParams, QueryProvider, QueryResult, page_in_memory};
use crate::query::{QueryOptions, SystemOption};
use crate::reader::EntryReader;
use crate::request::{HttpMethod, ODataRequest, ODataResponse};
use crate::singleton::{SingletonRegistry, SingletonValue};
use crate::version::VersionNegotiator;
use crate::writer::{self, WriteContext, csdl, error::write_error};
use http::StatusCode;
use http::header::{self, HeaderName};
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    EdmPrimitiveType, EntityCollection, EntityInstance, EntitySetRights, MetadataProviderWrapper,
    PrimitiveValue, PropertyKind, PropertyValue, ProtocolVersion, ResourceProperty, ResourceSetWrapper,
};
use odata_uri::{KeyPredicate, RootProjectionNode, SegmentDescriptor, SkipTokenInfo, TargetKind, TargetSource};
use std::sync::Arc;
use url::Url;

/// What a walk over the segments has reached so far.
enum Target {
    Start,
    Entity {
        set: Arc<ResourceSetWrapper>,
        entity: EntityInstance,
    },
    Entities {
        set: Arc<ResourceSetWrapper>,
        result: QueryResult,
    },
    Value {
        property: ResourceProperty,
        value: PropertyValue,
    },
    Raw {
        value: PrimitiveValue,
        mime_type: Option<String>,
    },
    Count(usize),
}

/// An OData service over one metadata wrapper and one query provider.
pub struct DataService {
    root: Url,
    wrapper: Arc<MetadataProviderWrapper>,
    provider: Arc<dyn QueryProvider>,
    singletons: SingletonRegistry,
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("root", &self.root.as_str())
            .field("singletons", &self.singletons)
            .finish_non_exhaustive()
    }
}

impl DataService {
    /// `service_root` is the absolute base URI every request must live under.
    ///
    /// # Errors
    /// `400` when `service_root` is not an absolute URI.
    pub fn new(
        service_root: &str,
        wrapper: Arc<MetadataProviderWrapper>,
        provider: Arc<dyn QueryProvider>,
    ) -> ODataResult<Self> {
        let mut root = Url::parse(service_root).map_err(|_| ODataError::bad_request(messages::syntax_error()))?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        root.set_query(None);
        root.set_fragment(None);
        Ok(Self {
            root,
            wrapper,
            provider,
            singletons: SingletonRegistry::new(),
        })
    }

    /// Bind singleton implementations. Declared singletons left unbound answer `501`.
    #[must_use]
    pub fn with_singletons(mut self, singletons: SingletonRegistry) -> Self {
        for name in singletons.unbound(&self.wrapper) {
            tracing::warn!(singleton = name, "singleton declared without an implementation");
        }
        self.singletons = singletons;
        self
    }

    /// Absolute, ending with `/`.
    #[must_use]
    pub fn service_root(&self) -> &str {
        self.root.as_str()
    }

    #[must_use]
    pub fn wrapper(&self) -> &MetadataProviderWrapper {
        &self.wrapper
    }

    /// Process `request`, turning failures into OData error responses.
    #[must_use]
    pub fn handle(&self, request: &ODataRequest) -> ODataResponse {
        match self.execute(request) {
            Ok(response) => {
                tracing::debug!(method = %request.method(), uri = %request.uri(), status = %response.status, "request handled");
                response
            }
            Err(err) => {
                tracing::warn!(
                    method = %request.method(),
                    uri = %request.uri(),
                    status = %err.status(),
                    code = err.code(),
                    error = err.message(),
                    "request rejected"
                );
                self.error_response(request, &err)
            }
        }
    }

    /// Process `request`.
    ///
    /// # Errors
    /// Any compilation, provider or serialization failure, carrying its status.
    pub fn execute(&self, request: &ODataRequest) -> ODataResult<ODataResponse> {
        let description = self.compile(request)?;
        match request.method() {
            HttpMethod::Get => self.read(request, description),
            HttpMethod::Post => self.create(request, &description),
            HttpMethod::Put | HttpMethod::Patch | HttpMethod::Merge => self.update(request, &description),
            HttpMethod::Delete => self.delete(request, &description),
        }
    }

    /// Check the base URI, parse the path and options, and compile the request.
    ///
    /// # Errors
    /// `400` for requests outside the service root, plus everything
    /// [`RequestDescription::compile`] reports; `403` when the target set
    /// lacks the right the method needs.
    pub fn compile(&self, request: &ODataRequest) -> ODataResult<RequestDescription> {
        let path = self.relative_path(request.uri())?;
        let options = QueryOptions::parse(request.raw_query())?;
        let versions = VersionNegotiator::from_request(request, self.wrapper.config().max_protocol_version)?;
        let description = RequestDescription::compile(&self.wrapper, path, options, versions)?;
        check_target_rights(request.method(), &description)?;
        Ok(description)
    }

    fn relative_path<'r>(&self, uri: &'r Url) -> ODataResult<&'r str> {
        let outside = || ODataError::bad_request(messages::uri_not_based_on_service(uri.as_str(), self.root.as_str()));
        if uri.scheme() != self.root.scheme()
            || uri.host_str() != self.root.host_str()
            || uri.port_or_known_default() != self.root.port_or_known_default()
        {
            return Err(outside());
        }
        let base = self.root.path().trim_end_matches('/');
        let rest = uri
            .path()
            .strip_prefix(base)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(outside)?;
        Ok(rest.trim_start_matches('/'))
    }

    fn read(&self, request: &ODataRequest, mut description: RequestDescription) -> ODataResult<ODataResponse> {
        let last = description.last_segment().clone();
        match last.target_kind {
            TargetKind::Batch => return Err(ODataError::not_implemented(messages::batch_not_supported())),
            TargetKind::MediaResource => {
                return Err(ODataError::not_implemented(messages::stream_provider_missing(&last.identifier)));
            }
            _ => {}
        }
        let kind = payload_kind(&last);
        let format = self.negotiate(request, &mut description, kind)?;

        if last.target_kind == TargetKind::Metadata {
            let document = csdl::write_metadata(&self.wrapper)?;
            description.raise_response_version(document.version)?;
            return Ok(self.respond(
                StatusCode::OK,
                description.versions(),
                Some((&format.content_type(kind), document.body)),
            ));
        }
        if last.target_kind == TargetKind::ServiceDirectory {
            let document = self.serializer().service_document()?;
            return self.write(&description, format, kind, &ODataPayload::ServiceDocument(document), None);
        }

        let target = self.resolve(&description)?;
        self.check_max_results(&target)?;
        let serializer = self.serializer();
        let path = self.relative_path(request.uri())?;

        match target {
            Target::Start => Err(ODataError::internal(messages::syntax_error())),
            Target::Count(count) => Ok(self.respond(
                StatusCode::OK,
                description.versions(),
                Some((&format.content_type(kind), count.to_string().into_bytes())),
            )),
            Target::Raw { value, mime_type } => {
                let content_type = mime_type.unwrap_or_else(|| format.content_type(kind));
                Ok(self.respond(
                    StatusCode::OK,
                    description.versions(),
                    Some((&content_type, writer::raw_value(&value))),
                ))
            }
            Target::Value { property, value } => {
                let payload = serializer.property(property.name(), property.type_id(), property.kind(), &value)?;
                self.write(&description, format, kind, &ODataPayload::Property(payload), None)
            }
            Target::Entity { set, mut entity } => {
                if last.target_kind == TargetKind::Link {
                    let payload = ODataPayload::Url(serializer.url(&entity, &set)?);
                    return self.write(&description, format, kind, &payload, Some(&links_fragment(&description)));
                }
                let ty = self.wrapper.resource_type(entity.type_id())?;
                let current = etag::of_entity(&entity, ty);
                if preconditions(request).evaluate(current.as_deref(), true)? == PreconditionOutcome::NotModified {
                    let mut response = self.respond(StatusCode::NOT_MODIFIED, description.versions(), None);
                    if let Some(tag) = &current {
                        response.set_header(header::ETAG, tag);
                    }
                    return Ok(response);
                }
                if let Some(projection) = description.projection().filter(|p| p.is_expansion_specified())
                    && Expander::new(self.provider.as_ref()).expand(&set, std::slice::from_mut(&mut entity), projection.node())?
                {
                    description.raise_response_version(ProtocolVersion::V2)?;
                }
                let node = description.projection().map(RootProjectionNode::node);
                let entry = serializer.entry(&entity, &set, node)?;
                let mut response = self.write(&description, format, kind, &ODataPayload::Entry(entry), None)?;
                if let Some(tag) = &current {
                    response.set_header(header::ETAG, tag);
                }
                Ok(response)
            }
            Target::Entities { set, result } => {
                let QueryResult {
                    mut entities,
                    count,
                    has_more,
                } = result;
                let next_link = if has_more && description.page_size().is_some() {
                    entities
                        .last()
                        .and_then(|last_entity| self.next_link(&description, path, last_entity, entities.len()))
                } else {
                    None
                };
                if next_link.is_some() {
                    description.raise_response_version(ProtocolVersion::V2)?;
                }
                if last.target_kind == TargetKind::Link {
                    let mut collection = EntityCollection::new(entities);
                    collection.count = count;
                    let payload = ODataPayload::Urls(serializer.url_collection(&collection, &set, next_link)?);
                    return self.write(&description, format, kind, &payload, Some(&links_fragment(&description)));
                }
                if let Some(projection) = description.projection().filter(|p| p.is_expansion_specified())
                    && Expander::new(self.provider.as_ref()).expand(&set, &mut entities, projection.node())?
                {
                    description.raise_response_version(ProtocolVersion::V2)?;
                }
                let mut collection = EntityCollection::new(entities);
                collection.count = count;
                let node = description.projection().map(RootProjectionNode::node);
                let feed = serializer.feed(&collection, &set, node, path, next_link)?;
                self.write(&description, format, kind, &ODataPayload::Feed(feed), None)
            }
        }
    }

    fn create(&self, request: &ODataRequest, description: &RequestDescription) -> ODataResult<ODataResponse> {
        reject_write_options(description)?;
        let last = description.last_segment();
        let set = match (last.target_kind, last.target_source, &last.key, &last.resource_set) {
            (TargetKind::Resource, TargetSource::EntitySet, None, Some(set)) => set.clone(),
            _ => return Err(method_not_allowed(request.method(), last)),
        };
        let ty = self.wrapper.resource_type(set.type_id())?;
        let entity = EntryReader::new(&self.wrapper).read(request.body(), request.header("Content-Type"), ty)?;
        let created = self.provider.create(&set, entity)?;
        tracing::debug!(set = set.name(), "entity created");

        let mut description = description.clone();
        let format = self.negotiate(request, &mut description, PayloadKind::Entry)?;
        let serializer = self.serializer();
        let entry = serializer.entry(&created, &set, None)?;
        let location = serializer.absolute(&entry.edit_link);
        let etag = entry.etag.clone();
        let mut response = self.write(&description, format, PayloadKind::Entry, &ODataPayload::Entry(entry), None)?;
        response.status = StatusCode::CREATED;
        response.set_header(header::LOCATION, &location);
        if let Some(tag) = &etag {
            response.set_header(header::ETAG, tag);
        }
        Ok(response)
    }

    fn update(&self, request: &ODataRequest, description: &RequestDescription) -> ODataResult<ODataResponse> {
        reject_write_options(description)?;
        let (set, current) = self.write_target(request.method(), description)?;
        let ty = self.wrapper.resource_type(current.type_id())?;
        preconditions(request).evaluate(etag::of_entity(&current, ty).as_deref(), false)?;

        let values = EntryReader::new(&self.wrapper).read(request.body(), request.header("Content-Type"), ty)?;
        let key = KeyPredicate::from_entity(&current, ty);
        let replace = request.method() == HttpMethod::Put;
        let updated = self
            .provider
            .update(&set, &key, values, replace)?
            .ok_or_else(|| ODataError::not_found(messages::resource_not_found(&description.last_segment().identifier)))?;
        tracing::debug!(set = set.name(), key = %key.to_uri_literal(), replace, "entity updated");

        let mut response = self.respond(StatusCode::NO_CONTENT, description.versions(), None);
        if let Some(tag) = etag::of_entity(&updated, self.wrapper.resource_type(updated.type_id())?) {
            response.set_header(header::ETAG, &tag);
        }
        Ok(response)
    }

    fn delete(&self, request: &ODataRequest, description: &RequestDescription) -> ODataResult<ODataResponse> {
        reject_write_options(description)?;
        let (set, current) = self.write_target(request.method(), description)?;
        let ty = self.wrapper.resource_type(current.type_id())?;
        preconditions(request).evaluate(etag::of_entity(&current, ty).as_deref(), false)?;

        let key = KeyPredicate::from_entity(&current, ty);
        if !self.provider.delete(&set, &key)? {
            return Err(ODataError::not_found(messages::resource_not_found(
                &description.last_segment().identifier,
            )));
        }
        tracing::debug!(set = set.name(), key = %key.to_uri_literal(), "entity deleted");
        Ok(self.respond(StatusCode::NO_CONTENT, description.versions(), None))
    }

    /// The single entity a PUT, PATCH, MERGE or DELETE addresses.
    fn write_target(
        &self,
        method: HttpMethod,
        description: &RequestDescription,
    ) -> ODataResult<(Arc<ResourceSetWrapper>, EntityInstance)> {
        let last = description.last_segment();
        if !(last.target_kind == TargetKind::Resource && last.single_result) {
            return Err(method_not_allowed(method, last));
        }
        match self.resolve(description)? {
            Target::Entity { set, entity } => Ok((set, entity)),
            _ => Err(method_not_allowed(method, last)),
        }
    }

    /// Pick the response format; JsonLight needs response version 3.0.
    fn negotiate(
        &self,
        request: &ODataRequest,
        description: &mut RequestDescription,
        kind: PayloadKind,
    ) -> ODataResult<ResponseFormat> {
        let format = format::negotiate(
            description.options().get(SystemOption::Format),
            request.header("Accept"),
            kind,
            description.versions().request_max_version(),
        )?;
        let required = format.required_version();
        if required > ProtocolVersion::V1 {
            description.raise_response_version(required).map_err(|_| {
                ODataError::not_acceptable(messages::format_requires_version(&format.to_string(), required))
            })?;
        }
        Ok(format)
    }

    fn resolve(&self, description: &RequestDescription) -> ODataResult<Target> {
        let mut target = Target::Start;
        for segment in description.segments() {
            target = match segment.target_kind {
                TargetKind::Resource | TargetKind::Link => self.navigate(description, segment, target)?,
                TargetKind::Singleton => self.invoke_singleton(description, segment)?,
                TargetKind::ComplexObject | TargetKind::Primitive | TargetKind::Bag => property_of(segment, target)?,
                TargetKind::PrimitiveValue if segment.is_count() => match target {
                    Target::Entities { result, .. } => Target::Count(result.entities.len()),
                    _ => return Err(ODataError::bad_request(messages::count_requires_collection(&segment.identifier))),
                },
                TargetKind::PrimitiveValue => raw_value_of(segment, target)?,
                TargetKind::MediaResource => {
                    return Err(ODataError::not_implemented(messages::stream_provider_missing(&segment.identifier)));
                }
                TargetKind::Nothing | TargetKind::ServiceDirectory | TargetKind::Metadata | TargetKind::Batch => target,
            };
        }
        Ok(target)
    }

    fn navigate(&self, description: &RequestDescription, segment: &SegmentDescriptor, from: Target) -> ODataResult<Target> {
        let not_found = || ODataError::not_found(messages::resource_not_found(&segment.identifier));
        let set = segment.resource_set.clone().ok_or_else(not_found)?;
        match (from, &segment.property) {
            (Target::Start, _) => {
                if let Some(key) = &segment.key {
                    let entity = self.provider.resource_from_set(&set, key)?.ok_or_else(not_found)?;
                    return Ok(Target::Entity { set, entity });
                }
                let result = self.query_collection(description, |params| self.provider.resource_set(&set, params))?;
                Ok(Target::Entities { set, result })
            }
            (
                Target::Entity {
                    set: source_set,
                    entity: source,
                },
                Some(property),
            ) => {
                if property.kind() == PropertyKind::ResourceReference {
                    let entity = self
                        .provider
                        .related_resource(&source_set, &source, &set, property)?
                        .ok_or_else(not_found)?;
                    return Ok(Target::Entity { set, entity });
                }
                if let Some(key) = &segment.key {
                    let entity = self
                        .provider
                        .related_resource_by_key(&source_set, &source, &set, property, key)?
                        .ok_or_else(not_found)?;
                    return Ok(Target::Entity { set, entity });
                }
                let result = self.query_collection(description, |params| {
                    self.provider
                        .related_resource_set(&source_set, &source, &set, property, params)
                })?;
                Ok(Target::Entities { set, result })
            }
            _ => Err(ODataError::bad_request(messages::segment_requires_single_source(
                &segment.identifier,
            ))),
        }
    }

    /// Fetch the target collection, paging in memory unless the provider pages itself.
    fn query_collection(
        &self,
        description: &RequestDescription,
        fetch: impl FnOnce(&QueryParams<'_>) -> ODataResult<QueryResult>,
    ) -> ODataResult<QueryResult> {
        let paged = paged_params(description);
        if self.provider.handles_ordered_paging() {
            return fetch(&paged);
        }
        let unpaged = QueryParams {
            filter: description.filter(),
            order_by: description.order_by(),
            ..QueryParams::default()
        };
        let QueryResult { entities, .. } = fetch(&unpaged)?;
        Ok(page_in_memory(entities, &paged))
    }

    fn invoke_singleton(&self, description: &RequestDescription, segment: &SegmentDescriptor) -> ODataResult<Target> {
        let metadata = segment
            .singleton
            .as_ref()
            .ok_or_else(|| ODataError::not_found(messages::resource_not_found(&segment.identifier)))?;
        let value = self.singletons.invoke(&self.wrapper, metadata, description.options())?;
        let Some(set) = segment.resource_set.clone() else {
            let ty = self.wrapper.resource_type(metadata.return_type())?;
            return Err(ODataError::internal(messages::singleton_returned_wrong_type(
                metadata.name(),
                ty.full_name(),
            )));
        };
        match value {
            SingletonValue::Entity(Some(entity)) => Ok(Target::Entity { set, entity }),
            SingletonValue::Entity(None) => Err(ODataError::not_found(messages::resource_not_found(metadata.name()))),
            SingletonValue::Entities(mut entities) => {
                if let Some(filter) = description.filter() {
                    entities.retain(|e| filter.matches(e));
                }
                let result = page_in_memory(entities, &paged_params(description));
                Ok(Target::Entities { set, result })
            }
        }
    }

    fn check_max_results(&self, target: &Target) -> ODataResult<()> {
        if let (Some(max), Target::Entities { result, .. }) = (self.wrapper.config().max_results_per_collection, target)
            && result.entities.len() as u64 > max
        {
            return Err(ODataError::bad_request(messages::max_results_exceeded(max)));
        }
        Ok(())
    }

    /// Absolute link to the next page: the request's options with `$skip`
    /// dropped, `$top` reduced by what this page returned, and a `$skiptoken`
    /// taken from the last entity.
    fn next_link(
        &self,
        description: &RequestDescription,
        path: &str,
        last: &EntityInstance,
        returned: usize,
    ) -> Option<String> {
        let order_by = description.order_by()?;
        let token = SkipTokenInfo::from_entity(order_by, last).to_token_string();
        let mut query = Vec::new();
        for (option, value) in description.options().system() {
            match option {
                SystemOption::Skip | SystemOption::SkipToken => {}
                SystemOption::Top => {
                    let remaining = description.top_option()?.saturating_sub(returned as u64);
                    query.push(format!("{option}={remaining}"));
                }
                _ => query.push(format!("{option}={}", encode(value))),
            }
        }
        for (name, value) in description.options().custom_options() {
            query.push(format!("{}={}", encode(name), encode(value)));
        }
        query.push(format!("{}={}", SystemOption::SkipToken, encode(&token)));
        Some(format!("{}{path}?{}", self.root, query.join("&")))
    }

    fn write(
        &self,
        description: &RequestDescription,
        format: ResponseFormat,
        kind: PayloadKind,
        payload: &ODataPayload,
        metadata_fragment: Option<&str>,
    ) -> ODataResult<ODataResponse> {
        let versions = description.versions();
        let mut ctx = WriteContext::new(self.root.as_str(), versions.response_version());
        if let Some(fragment) = metadata_fragment {
            ctx = ctx.with_metadata_fragment(fragment);
        }
        let body = writer::write_payload(payload, format, &ctx)?;
        Ok(self.respond(StatusCode::OK, versions, Some((&format.content_type(kind), body))))
    }

    fn respond(&self, status: StatusCode, versions: VersionNegotiator, body: Option<(&str, Vec<u8>)>) -> ODataResponse {
        let mut response = ODataResponse::new(status);
        if let Some((content_type, body)) = body {
            response = response.with_body(content_type, body);
        }
        response.set_header(data_service_version(), &format!("{};", versions.response_version()));
        response
    }

    fn error_response(&self, request: &ODataRequest, err: &ODataError) -> ODataResponse {
        let format = QueryOptions::parse(request.raw_query()).ok().and_then(|options| {
            format::negotiate(
                options.get(SystemOption::Format),
                request.header("Accept"),
                PayloadKind::Entry,
                ProtocolVersion::V3,
            )
            .ok()
        });
        let (content_type, body) = write_error(err, format, self.wrapper.config().use_verbose_errors);
        let mut response = ODataResponse::new(err.status()).with_body(&content_type, body);
        response.set_header(data_service_version(), &format!("{};", ProtocolVersion::V1));
        response
    }

    fn serializer(&self) -> ObjectModelSerializer<'_> {
        ObjectModelSerializer::new(&self.wrapper, self.root.as_str())
    }
}

fn data_service_version() -> HeaderName {
    HeaderName::from_static("dataserviceversion")
}

fn paged_params(description: &RequestDescription) -> QueryParams<'_> {
    QueryParams {
        filter: description.filter(),
        order_by: description.order_by(),
        skip: description.skip(),
        top: description.top(),
        skip_token: description.skip_token(),
        count: description.query_type() == QueryType::EntitiesWithCount,
    }
}

fn payload_kind(segment: &SegmentDescriptor) -> PayloadKind {
    match segment.target_kind {
        TargetKind::Nothing | TargetKind::ServiceDirectory => PayloadKind::ServiceDocument,
        TargetKind::Metadata => PayloadKind::Metadata,
        TargetKind::Resource | TargetKind::Singleton if segment.single_result => PayloadKind::Entry,
        TargetKind::Resource | TargetKind::Singleton => PayloadKind::Feed,
        TargetKind::Link => PayloadKind::Links,
        TargetKind::ComplexObject | TargetKind::Primitive | TargetKind::Bag => PayloadKind::Property,
        TargetKind::PrimitiveValue
            if segment.property.as_ref().and_then(ResourceProperty::primitive_kind) == Some(EdmPrimitiveType::Binary) =>
        {
            PayloadKind::RawBinary
        }
        TargetKind::PrimitiveValue | TargetKind::MediaResource | TargetKind::Batch => PayloadKind::RawValue,
    }
}

/// Rights the method needs on the target set, beyond the read rights the
/// segment parser checks while traversing.
fn check_target_rights(method: HttpMethod, description: &RequestDescription) -> ODataResult<()> {
    let last = description.last_segment();
    let Some(set) = description.target_set() else {
        return Ok(());
    };
    let required = match method {
        HttpMethod::Get => {
            if !matches!(
                last.target_kind,
                TargetKind::Resource | TargetKind::Link | TargetKind::Singleton
            ) {
                return Ok(());
            }
            if last.single_result {
                EntitySetRights::READ_SINGLE
            } else {
                EntitySetRights::READ_MULTIPLE
            }
        }
        HttpMethod::Post => EntitySetRights::WRITE_APPEND,
        HttpMethod::Put => EntitySetRights::WRITE_REPLACE,
        HttpMethod::Patch | HttpMethod::Merge => EntitySetRights::WRITE_MERGE,
        HttpMethod::Delete => EntitySetRights::WRITE_DELETE,
    };
    set.check_resource_set_rights(required)
}

fn reject_write_options(description: &RequestDescription) -> ODataResult<()> {
    if description.options().has_query_options() {
        return Err(ODataError::bad_request(messages::query_options_not_allowed_for_write()));
    }
    Ok(())
}

fn method_not_allowed(method: HttpMethod, segment: &SegmentDescriptor) -> ODataError {
    ODataError::method_not_allowed(messages::method_not_allowed_for_target(method.as_str(), &segment.identifier))
}

fn preconditions(request: &ODataRequest) -> Preconditions<'_> {
    Preconditions {
        if_match: request.header("If-Match"),
        if_none_match: request.header("If-None-Match"),
    }
}

/// `Customers/$links/Orders` for a links request.
fn links_fragment(description: &RequestDescription) -> String {
    let segments = description.segments();
    let source = segments
        .len()
        .checked_sub(2)
        .and_then(|i| segments[i].resource_set.as_ref())
        .map_or("", |s| s.name());
    format!("{source}/$links/{}", description.last_segment().identifier)
}

fn property_of(segment: &SegmentDescriptor, from: Target) -> ODataResult<Target> {
    let not_found = || ODataError::not_found(messages::resource_not_found(&segment.identifier));
    let property = segment.property.clone().ok_or_else(not_found)?;
    let value = match from {
        Target::Entity { entity, .. } => entity.get(property.name()).cloned(),
        Target::Value {
            value: PropertyValue::Complex(Some(complex)),
            ..
        } => complex.get(property.name()).cloned(),
        _ => return Err(not_found()),
    };
    Ok(Target::Value {
        value: value.unwrap_or(PropertyValue::Primitive(PrimitiveValue::Null)),
        property,
    })
}

fn raw_value_of(segment: &SegmentDescriptor, from: Target) -> ODataResult<Target> {
    match from {
        Target::Value {
            property,
            value: PropertyValue::Primitive(value),
        } if !matches!(value, PrimitiveValue::Null) => Ok(Target::Raw {
            value,
            mime_type: property.mime_type().map(str::to_owned),
        }),
        _ => Err(ODataError::not_found(messages::resource_not_found(&segment.identifier))),
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::InMemoryProvider;
    use odata_model::testing::{
        ALFKI_GUID, northwind_config, northwind_entities, northwind_links, northwind_model, northwind_wrapper,
    };
    use odata_model::ServiceConfiguration;
    use tracing_test::traced_test;

    const ROOT: &str = "http://localhost/svc/";

    fn service_with(config: ServiceConfiguration) -> DataService {
        let wrapper = Arc::new(northwind_wrapper(config));
        let provider = InMemoryProvider::new(wrapper.clone());
        for (set, entities) in northwind_entities(&northwind_model()) {
            provider.insert_all(&set, entities).unwrap();
        }
        for l in northwind_links() {
            provider
                .link(&l.source_set, &l.source_key, &l.property, &l.target_set, &l.target_key)
                .unwrap();
        }
        DataService::new(ROOT, wrapper, Arc::new(provider)).unwrap()
    }

    fn service() -> DataService {
        service_with(northwind_config())
    }

    fn get(service: &DataService, path: &str) -> ODataResponse {
        service.handle(&ODataRequest::get(&format!("{ROOT}{path}")).unwrap())
    }

    #[test]
    fn requests_outside_the_root_are_rejected() {
        let err = service()
            .execute(&ODataRequest::get("http://localhost/other/Customers").unwrap())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("http://localhost/svc/"));
        let err = service()
            .execute(&ODataRequest::get("http://localhost/svcx/Customers").unwrap())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn root_without_trailing_slash_is_the_service_document() {
        let response = service().handle(&ODataRequest::get("http://localhost/svc").unwrap());
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body_text().contains("<collection href=\"Customers\">"));
    }

    #[test]
    fn count_is_raw_text() {
        let response = get(&service(), "Customers/$count");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body_text(), "3");
        assert!(response.header("Content-Type").unwrap().starts_with("text/plain"));
        assert!(response.header("DataServiceVersion").is_some_and(|v| v.ends_with(';')));
    }

    #[test]
    fn property_value_is_raw() {
        let response = get(&service(), "Orders(10643)/ShipName/$value");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body_text(), "Alfreds Futterkiste");
    }

    #[test]
    fn entry_sets_etag_and_honors_if_none_match() {
        let service = service();
        let response = get(&service, "Products(1)");
        assert_eq!(response.header("ETag"), Some("W/\"7L\""));

        let request = ODataRequest::get(&format!("{ROOT}Products(1)"))
            .unwrap()
            .with_header_str("If-None-Match", "W/\"7L\"");
        let response = service.handle(&request);
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
    }

    #[test]
    fn paged_feed_links_to_the_next_page() {
        let mut config = northwind_config();
        config.set_entity_set_page_size("Orders", 2);
        let service = service_with(config);
        let response = get(&service, "Orders?$format=json&$inlinecount=allpages");
        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["odata.count"], "4");
        assert_eq!(doc["value"].as_array().unwrap().len(), 2);
        let next = doc["odata.nextLink"].as_str().unwrap();
        assert!(next.starts_with("http://localhost/svc/Orders?"), "{next}");
        assert!(next.contains("$skiptoken="), "{next}");

        let follow = next.strip_prefix(ROOT).unwrap();
        let response = get(&service, follow);
        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["value"].as_array().unwrap().len(), 2);
        assert!(doc.get("odata.nextLink").is_none());
    }

    #[test]
    fn links_use_the_links_context() {
        let path = format!("Customers(CustomerID='ALFKI',CustomerGuid=guid'{ALFKI_GUID}')/$links/Orders?$format=json");
        let response = get(&service(), &path);
        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["odata.metadata"], "http://localhost/svc/$metadata#Customers/$links/Orders");
        assert_eq!(doc["value"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn media_resources_and_batch_are_not_implemented() {
        let response = get(&service(), "Employees('EMP1')/$value");
        assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
        let response = get(&service(), "$batch");
        assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn json_light_needs_a_v3_client() {
        let request = ODataRequest::get(&format!("{ROOT}Customers"))
            .unwrap()
            .with_header_str("Accept", "application/json;odata=minimalmetadata")
            .with_header_str("MaxDataServiceVersion", "2.0");
        let response = service().handle(&request);
        assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn writes_reject_query_options() {
        let request = ODataRequest::new(HttpMethod::Delete, &format!("{ROOT}Products(2)?$select=ProductName")).unwrap();
        let err = service().execute(&request).unwrap_err();
        assert_eq!(err.message(), messages::query_options_not_allowed_for_write());
    }

    #[test]
    fn delete_then_read_is_not_found() {
        let service = service();
        let request = ODataRequest::new(HttpMethod::Delete, &format!("{ROOT}Products(2)")).unwrap();
        assert_eq!(service.handle(&request).status, StatusCode::NO_CONTENT);
        assert_eq!(get(&service, "Products(2)").status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn stale_if_match_fails_the_update() {
        let request = ODataRequest::new(HttpMethod::Merge, &format!("{ROOT}Products(1)"))
            .unwrap()
            .with_header_str("If-Match", "W/\"6L\"")
            .with_header_str("Content-Type", "application/json")
            .with_body(r#"{"ProductName":"Chai Tea"}"#);
        let response = service().handle(&request);
        assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    #[traced_test]
    fn rejected_requests_are_logged_and_rendered() {
        let response = get(&service(), "Nope?$format=json");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["error"]["message"]["value"], messages::resource_not_found("Nope"));
        assert_eq!(response.header("DataServiceVersion"), Some("1.0;"));
        assert!(logs_contain("request rejected"));
    }
}
