//! Response format negotiation from `$format` and `Accept`.

use mime::Mime;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::ProtocolVersion;
use std::fmt;

pub const ATOM: &str = "application/atom+xml";
pub const ATOM_SERVICE: &str = "application/atomsvc+xml";
pub const XML: &str = "application/xml";
pub const JSON: &str = "application/json";
pub const TEXT: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How much metadata a JsonLight payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMetadata {
    Full,
    Minimal,
    None,
}

impl JsonMetadata {
    #[must_use]
    pub const fn parameter(self) -> &'static str {
        match self {
            Self::Full => "fullmetadata",
            Self::Minimal => "minimalmetadata",
            Self::None => "nometadata",
        }
    }

    fn from_parameter(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fullmetadata" => Some(Self::Full),
            "minimalmetadata" => Some(Self::Minimal),
            "nometadata" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Atom,
    /// Plain XML for properties, links and the metadata document.
    Xml,
    JsonVerbose,
    JsonLight(JsonMetadata),
    Text,
    Binary,
}

impl ResponseFormat {
    /// Content type for a payload of `kind` in this format.
    #[must_use]
    pub fn content_type(self, kind: PayloadKind) -> String {
        match self {
            Self::Atom => match kind {
                PayloadKind::Feed => format!("{ATOM};type=feed;charset=utf-8"),
                PayloadKind::Entry => format!("{ATOM};type=entry;charset=utf-8"),
                PayloadKind::ServiceDocument => format!("{ATOM_SERVICE};charset=utf-8"),
                _ => format!("{XML};charset=utf-8"),
            },
            Self::Xml => format!("{XML};charset=utf-8"),
            Self::JsonVerbose => format!("{JSON};odata=verbose;charset=utf-8"),
            Self::JsonLight(level) => format!("{JSON};odata={};charset=utf-8", level.parameter()),
            Self::Text => format!("{TEXT};charset=utf-8"),
            Self::Binary => OCTET_STREAM.to_owned(),
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::JsonVerbose | Self::JsonLight(_))
    }

    /// Version the format itself needs.
    #[must_use]
    pub const fn required_version(self) -> ProtocolVersion {
        match self {
            Self::JsonLight(_) => ProtocolVersion::V3,
            _ => ProtocolVersion::V1,
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom => f.write_str("atom"),
            Self::Xml => f.write_str("xml"),
            Self::JsonVerbose => f.write_str("json verbose"),
            Self::JsonLight(level) => write!(f, "json {}", level.parameter()),
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Shape of the payload being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Feed,
    Entry,
    ServiceDocument,
    Metadata,
    /// A complex, primitive or bag property.
    Property,
    Links,
    RawValue,
    RawBinary,
}

impl PayloadKind {
    const fn default_format(self) -> ResponseFormat {
        match self {
            Self::Feed | Self::Entry | Self::ServiceDocument => ResponseFormat::Atom,
            Self::Metadata | Self::Property | Self::Links => ResponseFormat::Xml,
            Self::RawValue => ResponseFormat::Text,
            Self::RawBinary => ResponseFormat::Binary,
        }
    }

    const fn accepts_json(self) -> bool {
        !matches!(self, Self::Metadata | Self::RawValue | Self::RawBinary)
    }
}

/// Choose the response format.
///
/// `$format` wins over `Accept`. `json` (either way) means JsonLight with
/// minimal metadata when the client's ceiling reaches 3.0, verbose JSON
/// otherwise. `Accept` entries are tried by descending q-value; `q=0`
/// entries are never chosen.
///
/// # Errors
/// `400` on an unknown `$format`, `406` when nothing acceptable fits the payload.
pub fn negotiate(
    format_option: Option<&str>,
    accept: Option<&str>,
    kind: PayloadKind,
    client_ceiling: ProtocolVersion,
) -> ODataResult<ResponseFormat> {
    if let Some(value) = format_option {
        let chosen = match value.trim().to_ascii_lowercase().as_str() {
            "atom" => Some(ResponseFormat::Atom),
            "xml" => Some(ResponseFormat::Xml),
            "json" => Some(default_json(client_ceiling)),
            other => match other.parse::<Mime>() {
                Ok(m) => Some(from_mime(&m, client_ceiling).ok_or_else(|| {
                    ODataError::bad_request(messages::invalid_format_option(value))
                })?),
                Err(_) => None,
            },
        }
        .ok_or_else(|| ODataError::bad_request(messages::invalid_format_option(value)))?;
        return fit(chosen, kind)
            .ok_or_else(|| ODataError::not_acceptable(messages::not_acceptable(value)));
    }

    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return Ok(kind.default_format());
    };
    let mut ranges: Vec<(f32, Mime)> = accept
        .split(',')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|m| (quality(&m), m))
        .filter(|(q, _)| *q > 0.0)
        .collect();
    ranges.sort_by(|a, b| b.0.total_cmp(&a.0));

    ranges
        .iter()
        .find_map(|(_, m)| {
            if m.type_() == mime::STAR {
                return Some(kind.default_format());
            }
            from_mime(m, client_ceiling).and_then(|f| fit(f, kind))
        })
        .ok_or_else(|| ODataError::not_acceptable(messages::not_acceptable(accept)))
}

const fn default_json(client_ceiling: ProtocolVersion) -> ResponseFormat {
    if client_ceiling.major >= 3 {
        ResponseFormat::JsonLight(JsonMetadata::Minimal)
    } else {
        ResponseFormat::JsonVerbose
    }
}

fn quality(m: &Mime) -> f32 {
    m.get_param("q")
        .and_then(|q| q.as_str().parse::<f32>().ok())
        .unwrap_or(1.0)
}

fn from_mime(m: &Mime, client_ceiling: ProtocolVersion) -> Option<ResponseFormat> {
    let essence = m.essence_str();
    Some(match essence {
        ATOM | ATOM_SERVICE => ResponseFormat::Atom,
        XML | "text/xml" | "application/*" => ResponseFormat::Xml,
        JSON => match m.get_param("odata").map(|v| v.as_str().to_ascii_lowercase()) {
            None => default_json(client_ceiling),
            Some(v) if v == "verbose" => ResponseFormat::JsonVerbose,
            Some(v) => ResponseFormat::JsonLight(JsonMetadata::from_parameter(&v)?),
        },
        TEXT => ResponseFormat::Text,
        OCTET_STREAM => ResponseFormat::Binary,
        _ => return None,
    })
}

/// Adjust `format` to the payload, or `None` when the payload cannot be sent that way.
fn fit(format: ResponseFormat, kind: PayloadKind) -> Option<ResponseFormat> {
    match (format, kind) {
        (_, PayloadKind::RawValue | PayloadKind::RawBinary) => Some(kind.default_format()),
        (ResponseFormat::JsonVerbose | ResponseFormat::JsonLight(_), k) if k.accepts_json() => {
            Some(format)
        }
        (
            ResponseFormat::Atom | ResponseFormat::Xml,
            PayloadKind::Metadata | PayloadKind::Property | PayloadKind::Links,
        ) => Some(ResponseFormat::Xml),
        (ResponseFormat::Atom, PayloadKind::Feed | PayloadKind::Entry)
        | (ResponseFormat::Atom | ResponseFormat::Xml, PayloadKind::ServiceDocument) => {
            Some(ResponseFormat::Atom)
        }
        _ => None,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use ProtocolVersion as V;

    #[test]
    fn defaults_follow_payload() {
        assert_eq!(negotiate(None, None, PayloadKind::Feed, V::V2).unwrap(), ResponseFormat::Atom);
        assert_eq!(negotiate(None, Some("*/*"), PayloadKind::Metadata, V::V2).unwrap(), ResponseFormat::Xml);
        assert_eq!(negotiate(None, None, PayloadKind::RawValue, V::V2).unwrap(), ResponseFormat::Text);
    }

    #[test]
    fn format_option_wins() {
        let f = negotiate(Some("json"), Some(ATOM), PayloadKind::Entry, V::V2).unwrap();
        assert_eq!(f, ResponseFormat::JsonVerbose);
        let f = negotiate(Some("json"), None, PayloadKind::Entry, V::V3).unwrap();
        assert_eq!(f, ResponseFormat::JsonLight(JsonMetadata::Minimal));
        let f = negotiate(Some("atom"), None, PayloadKind::Property, V::V2).unwrap();
        assert_eq!(f, ResponseFormat::Xml);
        assert!(negotiate(Some("csv"), None, PayloadKind::Feed, V::V2).is_err());
    }

    #[test]
    fn q_values_order_accept_entries() {
        let accept = "application/atom+xml;q=0.5, application/json;odata=fullmetadata;q=0.9";
        let f = negotiate(None, Some(accept), PayloadKind::Feed, V::V3).unwrap();
        assert_eq!(f, ResponseFormat::JsonLight(JsonMetadata::Full));
        let f = negotiate(None, Some("application/json;q=0, application/xml"), PayloadKind::Feed, V::V3);
        assert!(f.is_err());
    }

    #[test]
    fn metadata_is_never_json() {
        let err = negotiate(None, Some(JSON), PayloadKind::Metadata, V::V3).unwrap_err();
        assert_eq!(err.status(), http::StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn content_types_carry_parameters() {
        assert_eq!(
            ResponseFormat::Atom.content_type(PayloadKind::Feed),
            "application/atom+xml;type=feed;charset=utf-8"
        );
        assert_eq!(
            ResponseFormat::JsonLight(JsonMetadata::None).content_type(PayloadKind::Entry),
            "application/json;odata=nometadata;charset=utf-8"
        );
    }
}
