//! Fixed message catalog.
//!
//! Clients match on these strings, so they stay stable across releases.

use std::fmt::Display;

// ---------- access control ----------

#[must_use]
pub fn forbidden() -> String {
    "Forbidden.".to_owned()
}

// ---------- metadata model ----------

pub fn invalid_property_name(name: &str) -> String {
    format!(
        "The name '{name}' is not a valid property name. Names must be non-empty, must not start with an underscore and may only contain letters, digits and underscores"
    )
}

pub fn primitive_type_cannot_have_properties(type_name: &str) -> String {
    format!("A property cannot be added to the primitive type '{type_name}'")
}

pub fn key_property_on_non_entity(type_name: &str, property: &str) -> String {
    format!(
        "Key property '{property}' cannot be added to '{type_name}' because it is not an entity type"
    )
}

pub fn etag_property_on_non_entity(type_name: &str, property: &str) -> String {
    format!(
        "ETag property '{property}' cannot be added to '{type_name}' because it is not an entity type"
    )
}

pub fn duplicate_property(type_name: &str, property: &str) -> String {
    format!("Property with name '{property}' already exists in type '{type_name}'")
}

pub fn duplicate_named_stream(type_name: &str, stream: &str) -> String {
    format!("Named stream with the name '{stream}' already exists in type '{type_name}'")
}

pub fn named_stream_on_non_entity(type_name: &str) -> String {
    format!("Named streams can only be added to entity types; '{type_name}' is not an entity type")
}

pub fn media_link_entry_on_non_entity(type_name: &str) -> String {
    format!(
        "Only entity types can be media link entries; '{type_name}' is not an entity type"
    )
}

pub fn invalid_property_kind(kinds: impl Display) -> String {
    format!("The combination of property kinds '{kinds}' is not valid")
}

pub fn property_kind_type_mismatch(property: &str, kind: impl Display, type_name: &str) -> String {
    format!(
        "The property '{property}' of kind '{kind}' cannot be bound to the resource type '{type_name}'"
    )
}

pub fn mime_type_on_non_primitive(property: &str) -> String {
    format!("A MIME type can only be declared on primitive properties; '{property}' is not primitive")
}

pub fn base_type_not_entity(type_name: &str, base: &str) -> String {
    format!("Base type '{base}' of '{type_name}' must be an entity type")
}

pub fn entity_type_without_key(type_name: &str) -> String {
    format!(
        "The entity type '{type_name}' does not have any key properties. Entity types must define at least one key property"
    )
}

pub fn resource_set_requires_entity_type(set: &str, type_name: &str) -> String {
    format!("The resource set '{set}' must be bound to an entity type; '{type_name}' is not one")
}

pub fn unknown_resource_type(name: &str) -> String {
    format!("The resource type '{name}' is not declared in the model")
}

pub fn unknown_resource_set(name: &str) -> String {
    format!("The resource set '{name}' is not declared in the model")
}

pub fn association_ends_without_properties() -> String {
    "Both the resource properties of the association set ends cannot be null".to_owned()
}

pub fn self_referencing_association(type_name: &str, property: &str) -> String {
    format!(
        "Bidirectional self referencing association is not allowed; both ends use the property '{property}' of '{type_name}'"
    )
}

pub fn association_end_property_not_navigation(type_name: &str, property: &str) -> String {
    format!(
        "The property '{property}' of '{type_name}' used as an association end is not a navigation property"
    )
}

pub fn association_end_type_not_assignable(type_name: &str, set: &str) -> String {
    format!(
        "The resource type '{type_name}' of the association end is not assignable to the type of the resource set '{set}'"
    )
}

pub fn duplicate_entity_set(name: &str) -> String {
    format!(
        "More than one entity set with the name '{name}' was found. Entity set names must be unique"
    )
}

pub fn duplicate_entity_type(name: &str) -> String {
    format!(
        "More than one entity type with the name '{name}' was found. Entity type names must be unique"
    )
}

#[must_use]
pub fn container_name_missing() -> String {
    "The container name returned by the metadata provider must not be null or empty".to_owned()
}

#[must_use]
pub fn container_namespace_missing() -> String {
    "The container namespace returned by the metadata provider must not be null or empty"
        .to_owned()
}

pub fn invalid_association_set(association: &str, set: &str, type_name: &str, property: &str) -> String {
    format!(
        "The association set '{association}' returned by the metadata provider for the navigation property '{property}' of '{type_name}' in the resource set '{set}' does not contain an end for it"
    )
}

// ---------- configuration ----------

pub fn page_size_and_max_results_conflict(set: &str) -> String {
    format!(
        "The page size and the maximum number of results per collection cannot both be set; both are configured for '{set}'"
    )
}

pub fn feature_requires_version(feature: &str, required: impl Display, configured: impl Display) -> String {
    format!(
        "The feature '{feature}' is supported only for OData version '{required}' or greater; the configured maximum protocol version is '{configured}'"
    )
}

pub fn invalid_page_size(set: &str) -> String {
    format!("The page size configured for '{set}' must be greater than zero")
}

// ---------- resource path ----------

pub fn resource_not_found(segment: &str) -> String {
    format!("Resource not found for the segment '{segment}'")
}

#[must_use]
pub fn syntax_error() -> String {
    "Bad Request - Error in query syntax".to_owned()
}

pub fn segment_must_be_last(segment: &str) -> String {
    format!(
        "The request URI is not valid. The segment '{segment}' must be the last segment in the URI because it is one of the following: $batch, $value, $metadata, $count, a bag property, a named stream, or a service operation that does not return a value"
    )
}

pub fn segment_cannot_be_first(segment: &str) -> String {
    format!("The request URI is not valid, the segment '{segment}' cannot be applied to the root of the service")
}

pub fn segment_cannot_have_key(segment: &str) -> String {
    format!(
        "The request URI is not valid. The segment '{segment}' refers to a single resource or a property and cannot have a key predicate"
    )
}

pub fn links_requires_navigation(segment: &str) -> String {
    format!("The segment '$links' must be followed by a navigation property segment; '{segment}' is not one")
}

pub fn links_requires_single_source(segment: &str) -> String {
    format!(
        "The request URI is not valid, the segment '$links' must follow a segment that identifies a single resource, but '{segment}' does not"
    )
}

pub fn count_requires_collection(segment: &str) -> String {
    format!(
        "The request URI is not valid, $count cannot be applied to the segment '{segment}' since $count can only follow a resource segment that returns a collection"
    )
}

pub fn value_requires_primitive_or_media(segment: &str) -> String {
    format!(
        "The request URI is not valid, $value cannot be applied to the segment '{segment}'; it must follow a primitive property or a media link entry"
    )
}

pub fn segment_requires_single_source(segment: &str) -> String {
    format!(
        "The request URI is not valid. The segment '{segment}' must follow a segment that identifies a single resource"
    )
}

pub fn key_count_mismatch(type_name: &str) -> String {
    format!(
        "The number of keys specified in the URI does not match number of key properties for the resource '{type_name}'"
    )
}

pub fn key_not_found(name: &str, type_name: &str) -> String {
    format!("The key predicate contains the property '{name}' which is not a key property of '{type_name}'")
}

pub fn key_duplicate(name: &str) -> String {
    format!("The key property '{name}' is specified more than once in the key predicate")
}

pub fn key_type_mismatch(name: &str, expected: impl Display) -> String {
    format!("The value of the key property '{name}' is not a valid literal of type '{expected}'")
}

pub fn key_must_be_named(type_name: &str) -> String {
    format!(
        "Segments with multiple key values must specify them in 'name=value' form; '{type_name}' has more than one key property"
    )
}

pub fn invalid_literal(literal: &str, kind: impl Display) -> String {
    format!("The literal '{literal}' is not a valid value of type '{kind}'")
}

pub fn reserved_singleton_name(name: &str) -> String {
    format!("The name '{name}' is reserved and cannot be registered as a singleton")
}

pub fn singleton_must_return_entities(name: &str, return_type: &str) -> String {
    format!("The singleton '{name}' must return entities, but '{return_type}' is not an entity type")
}

pub fn singleton_collection_without_set(name: &str) -> String {
    format!("The singleton '{name}' returns a collection of entities and must specify their entity set")
}

pub fn query_not_utf8(part: &str) -> String {
    format!("The query string part '{part}' does not decode to valid UTF-8")
}

pub fn singleton_not_declared(name: &str) -> String {
    format!("No singleton named '{name}' is declared in the metadata")
}

pub fn singleton_not_bound(name: &str) -> String {
    format!("The singleton '{name}' is declared in the metadata but no implementation is registered for it")
}

pub fn singleton_parameter_missing(singleton: &str, parameter: &str) -> String {
    format!("The parameter '{parameter}' of '{singleton}' is required but was not supplied")
}

pub fn singleton_returned_wrong_type(singleton: &str, expected: &str) -> String {
    format!("The singleton '{singleton}' returned a value that is not an instance of '{expected}'")
}

// ---------- expressions ----------

pub fn expression_syntax(position: usize, detail: impl Display) -> String {
    format!("Syntax error at position {position}: {detail}")
}

pub fn property_not_found(name: &str, type_name: &str) -> String {
    format!("No property '{name}' exists in type '{type_name}'")
}

pub fn bag_property_not_allowed(name: &str, option: &str) -> String {
    format!("The property '{name}' is a bag property and cannot be used in the {option} query option")
}

pub fn binary_property_not_allowed(name: &str, option: &str) -> String {
    format!("The property '{name}' of type 'Edm.Binary' cannot be used in the {option} query option")
}

pub fn navigation_collection_not_allowed(name: &str, option: &str) -> String {
    format!(
        "The navigation property '{name}' refers to a collection of resources and cannot be used in the {option} query option"
    )
}

pub fn operator_incompatible(operator: &str, left: impl Display, right: impl Display, position: usize) -> String {
    format!(
        "Operator '{operator}' incompatible with operand types '{left}' and '{right}' at position {position}"
    )
}

pub fn unary_operator_incompatible(operator: &str, operand: impl Display, position: usize) -> String {
    format!("Operator '{operator}' incompatible with operand type '{operand}' at position {position}")
}

pub fn unknown_function(name: &str, position: usize) -> String {
    format!("Unknown function '{name}' at position {position}")
}

pub fn no_function_signature(name: &str, position: usize) -> String {
    format!("No applicable function found for '{name}' at position {position} with the specified arguments")
}

pub fn filter_not_boolean(found: impl Display) -> String {
    format!("The $filter expression must evaluate to 'Edm.Boolean' but evaluates to '{found}'")
}

pub fn member_access_on_primitive(name: &str, position: usize) -> String {
    format!("The property '{name}' at position {position} is primitive and cannot be followed by '/'")
}

pub fn expression_too_deep(max: usize) -> String {
    format!("The expression exceeds the maximum nesting depth of {max}")
}

// ---------- $orderby ----------

pub fn orderby_requires_primitive(path: &str) -> String {
    format!("The path '{path}' in the $orderby query option must end with a primitive property")
}

pub fn orderby_empty() -> String {
    "The $orderby query option must contain at least one ordering expression".to_owned()
}

// ---------- $expand / $select ----------

pub fn expand_requires_navigation(name: &str, type_name: &str) -> String {
    format!(
        "Only navigation properties can be expanded; the property '{name}' of '{type_name}' is not a navigation property"
    )
}

pub fn expand_depth_exceeded(max: usize) -> String {
    format!("The request includes a $expand path which is too deep. The maximum depth allowed is {max}")
}

pub fn expand_count_exceeded(max: usize) -> String {
    format!("The request includes more than the maximum number of {max} $expand paths")
}

pub fn expand_target_not_visible(name: &str) -> String {
    format!("The navigation property '{name}' cannot be expanded because its target resource set is not accessible")
}

pub fn select_traverses_non_expanded(name: &str) -> String {
    format!(
        "Only navigation properties specified in the $expand option can be traversed in $select; '{name}' was not expanded"
    )
}

pub fn select_segment_not_last(name: &str) -> String {
    format!(
        "The property '{name}' is not a navigation property and must be the last segment of a $select path"
    )
}

pub fn select_star_not_last() -> String {
    "The wildcard '*' must be the last segment of a $select path".to_owned()
}

pub fn select_empty_segment(option: &str) -> String {
    format!("The {option} query option contains an empty path segment")
}

#[must_use]
pub fn projection_disabled() -> String {
    "The ability to use the $select query option to define a projection in a data service query is disabled. To enable this functionality, set the accept_projection_requests configuration to true".to_owned()
}

// ---------- $skiptoken ----------

pub fn skiptoken_requires_ordering() -> String {
    "The $skiptoken query option cannot be applied because no ordering information is available for the requested resource".to_owned()
}

pub fn skiptoken_count_mismatch(token: &str, expected: usize) -> String {
    format!(
        "The number of values in the skip token '{token}' does not match the number of ordering constraints ({expected}) for the requested resource"
    )
}

pub fn skiptoken_type_mismatch(token: &str, path: &str, expected: impl Display) -> String {
    format!(
        "The value in the skip token '{token}' for the ordering path '{path}' is not a valid literal of type '{expected}'"
    )
}

pub fn skiptoken_syntax(token: &str) -> String {
    format!("The skip token '{token}' is not in a valid format")
}

pub fn skiptoken_non_paged(set: &str) -> String {
    format!(
        "The $skiptoken query option cannot be applied to the resource set '{set}' since server side paging is not enabled for it"
    )
}

// ---------- query options ----------

pub fn query_option_not_applicable(option: &str) -> String {
    format!("Query option {option} cannot be applied to the requested resource")
}

#[must_use]
pub fn set_query_options_not_applicable() -> String {
    "Query options $orderby, $inlinecount, $skip and $top cannot be applied to the requested resource".to_owned()
}

pub fn incorrect_argument_format(option: &str, value: &str) -> String {
    format!("Incorrect format for {option} argument '{value}'")
}

pub fn unknown_system_option(name: &str) -> String {
    format!(
        "The query parameter '{name}' begins with a system-reserved '$' character but is not recognized"
    )
}

pub fn duplicate_system_option(name: &str) -> String {
    format!("Query parameter '{name}' is specified, but it should be specified exactly once")
}

#[must_use]
pub fn invalid_inlinecount() -> String {
    "Unknown $inlinecount option, only \"allpages\" and \"none\" are supported".to_owned()
}

pub fn invalid_count_option(value: &str) -> String {
    format!("Unknown $count option '{value}', only \"true\" and \"false\" are supported")
}

#[must_use]
pub fn inlinecount_with_count_segment() -> String {
    "$inlinecount cannot be applied to the resource segment $count".to_owned()
}

#[must_use]
pub fn count_disabled() -> String {
    "The ability of the data service to return row count information is disabled. To enable this functionality, set the accept_count_requests configuration to true".to_owned()
}

pub fn invalid_format_option(value: &str) -> String {
    format!("The $format value '{value}' is not supported; use 'atom', 'xml' or 'json'")
}

// ---------- versioning ----------

pub fn request_version_too_low(requested: impl Display, required: impl Display) -> String {
    format!(
        "Request version '{requested}' is too low for the response. The lowest version supported is '{required}'"
    )
}

pub fn response_version_exceeds_protocol(required: impl Display, max: impl Display) -> String {
    format!(
        "Request version '{required}' is bigger than the protocol version '{max}' configured for the data service"
    )
}

pub fn invalid_version_header(header: &str, value: &str) -> String {
    format!("The value '{value}' of the header '{header}' is not a valid OData version")
}

// ---------- processing ----------

pub fn uri_not_based_on_service(request: &str, service: &str) -> String {
    format!(
        "The request uri '{request}' is not valid as it is not based on the configured relative uri '{service}'"
    )
}

pub fn unsupported_method(method: &str) -> String {
    format!("The HTTP method '{method}' is not supported by the data service")
}

pub fn method_not_allowed_for_target(method: &str, segment: &str) -> String {
    format!("The HTTP method '{method}' cannot be applied to the resource identified by '{segment}'")
}

#[must_use]
pub fn query_options_not_allowed_for_write() -> String {
    "Query options $select, $expand, $filter, $orderby, $inlinecount, $skip, $skiptoken and $top are not supported by this request method".to_owned()
}

#[must_use]
pub fn etag_not_allowed_on_type() -> String {
    "If-Match or If-None-Match headers cannot be specified if the target type does not have etag properties defined".to_owned()
}

#[must_use]
pub fn etag_mismatch() -> String {
    "The etag value in the request header does not match with the current etag value of the object".to_owned()
}

pub fn max_results_exceeded(max: u64) -> String {
    format!("The response exceeds the maximum {max} results per collection")
}

pub fn payload_parse_error(detail: impl Display) -> String {
    format!("Error processing request stream. {detail}")
}

pub fn unsupported_content_type(content_type: &str) -> String {
    format!("The content type '{content_type}' is not supported for request payloads")
}

pub fn unknown_payload_property(name: &str, type_name: &str) -> String {
    format!("Error processing request stream. The property name '{name}' specified for type '{type_name}' is not valid")
}

pub fn not_acceptable(accept: &str) -> String {
    format!("Unsupported media type requested: '{accept}'")
}

pub fn format_requires_version(format: &str, required: impl Display) -> String {
    format!("The response format '{format}' requires protocol version '{required}'")
}

pub fn provider_failure(detail: impl Display) -> String {
    format!("The query provider failed: {detail}")
}

pub fn serialization_failure(detail: impl Display) -> String {
    format!("Failed to write the response payload: {detail}")
}

pub fn stream_provider_missing(segment: &str) -> String {
    format!("The stream addressed by '{segment}' cannot be served: no stream provider is configured")
}

pub fn batch_not_supported() -> String {
    "Batch requests are not supported by this service".to_owned()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn catalogued_strings_are_stable() {
        assert_eq!(forbidden(), "Forbidden.");
        assert_eq!(
            query_option_not_applicable("$expand"),
            "Query option $expand cannot be applied to the requested resource"
        );
        assert!(incorrect_argument_format("$top", "-1").starts_with("Incorrect format for $top"));
        assert_eq!(
            request_version_too_low("1.0", "2.0"),
            "Request version '1.0' is too low for the response. The lowest version supported is '2.0'"
        );
    }
}
