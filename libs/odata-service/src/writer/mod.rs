//! Payload writers: object model in, response bytes out.
//!
//! - [`atom`]: Atom feeds, entries and service documents
//! - [`xml`]: plain XML properties and links, and the shared XML plumbing
//! - [`json_verbose`]: `{"d": ...}` JSON, version 1.0 and 2.0 shapes
//! - [`json_light`]: JsonLight at full, minimal and no metadata
//! - [`csdl`]: the `$metadata` document
//! - [`error`]: OData error payloads

pub mod atom;
pub mod csdl;
pub mod error;
pub mod json_light;
pub mod json_verbose;
pub mod xml;

use crate::format::ResponseFormat;
use crate::object_model::ODataPayload;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{PrimitiveValue, ProtocolVersion};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const APP_NS: &str = "http://www.w3.org/2007/app";
pub const DATA_NS: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
pub const METADATA_NS: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
pub const SCHEME: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/scheme";
pub const RELATED_REL: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/related/";
pub const MEDIARESOURCE_REL: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/mediaresource/";
pub const EDIT_MEDIA_REL: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/edit-media/";

/// What the writers need to know beyond the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    /// Absolute, ending with `/`.
    pub service_root: &'a str,
    /// Response version; picks between the 1.0 and 2.0 JSON verbose shapes.
    pub version: ProtocolVersion,
    /// JsonLight `odata.metadata` fragment, when the payload alone does not
    /// determine it (links).
    pub metadata_fragment: Option<&'a str>,
}

impl<'a> WriteContext<'a> {
    #[must_use]
    pub const fn new(service_root: &'a str, version: ProtocolVersion) -> Self {
        Self {
            service_root,
            version,
            metadata_fragment: None,
        }
    }

    #[must_use]
    pub const fn with_metadata_fragment(mut self, fragment: &'a str) -> Self {
        self.metadata_fragment = Some(fragment);
        self
    }

    pub(crate) fn absolute(&self, relative: &str) -> String {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            relative.to_owned()
        } else {
            format!("{}{relative}", self.service_root)
        }
    }
}

/// Write `payload` in `format`.
///
/// # Errors
/// `500` when the format cannot carry the payload (raw formats) or the
/// output cannot be produced.
pub fn write_payload(payload: &ODataPayload, format: ResponseFormat, ctx: &WriteContext<'_>) -> ODataResult<Vec<u8>> {
    match (format, payload) {
        (
            ResponseFormat::Atom | ResponseFormat::Xml,
            ODataPayload::Feed(_) | ODataPayload::Entry(_) | ODataPayload::ServiceDocument(_),
        ) => atom::write(payload, ctx),
        (ResponseFormat::Atom | ResponseFormat::Xml, _) => xml::write(payload, ctx),
        (ResponseFormat::JsonVerbose, _) => json_verbose::write(payload, ctx),
        (ResponseFormat::JsonLight(level), _) => json_light::write(payload, level, ctx),
        (ResponseFormat::Text | ResponseFormat::Binary, _) => Err(failure(format_args!(
            "the {format} format carries raw values only"
        ))),
    }
}

/// Body of a `$value` or `$count` response; binary values stay raw.
#[must_use]
pub fn raw_value(value: &PrimitiveValue) -> Vec<u8> {
    match value {
        PrimitiveValue::Binary(bytes) => bytes.clone(),
        other => other.to_text().into_bytes(),
    }
}

pub(crate) fn failure(detail: impl std::fmt::Display) -> ODataError {
    ODataError::internal(messages::serialization_failure(detail))
}

/// `Bag(Edm.String)` to `Edm.String`.
pub(crate) fn bag_item_type(type_name: &str) -> &str {
    type_name
        .strip_prefix("Bag(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(type_name)
}
