//! Weak ETags built from a type's ETag properties.

use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{EntityInstance, PrimitiveValue, ResourceType};

/// `W/"lit1,lit2"` over the ETag properties in declaration order, or `None`
/// when the type declares none.
#[must_use]
pub fn of_entity(entity: &EntityInstance, ty: &ResourceType) -> Option<String> {
    if !ty.has_etag() {
        return None;
    }
    let values: Vec<String> = ty
        .etag_properties()
        .map(|p| {
            entity
                .primitive(p.name())
                .unwrap_or(&PrimitiveValue::Null)
                .to_uri_literal()
        })
        .collect();
    Some(format!("W/\"{}\"", values.join(",")))
}

/// Conditional request headers of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preconditions<'a> {
    pub if_match: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
}

/// What to do after evaluating the preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionOutcome {
    Proceed,
    NotModified,
}

impl Preconditions<'_> {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }

    /// Evaluate against the current ETag of the target.
    ///
    /// `If-None-Match` on a read yields [`PreconditionOutcome::NotModified`]
    /// when it matches; on a write a match fails the request.
    ///
    /// # Errors
    /// `400` when headers are given for a type without ETag properties,
    /// `412` when `If-Match` does not match (or `If-None-Match` matches on a write).
    pub fn evaluate(&self, current: Option<&str>, is_read: bool) -> ODataResult<PreconditionOutcome> {
        if self.is_empty() {
            return Ok(PreconditionOutcome::Proceed);
        }
        let Some(current) = current else {
            return Err(ODataError::bad_request(messages::etag_not_allowed_on_type()));
        };
        if let Some(expected) = self.if_match
            && !matches_any(expected, current)
        {
            return Err(ODataError::precondition_failed(messages::etag_mismatch()));
        }
        if let Some(expected) = self.if_none_match
            && matches_any(expected, current)
        {
            if is_read {
                return Ok(PreconditionOutcome::NotModified);
            }
            return Err(ODataError::precondition_failed(messages::etag_mismatch()));
        }
        Ok(PreconditionOutcome::Proceed)
    }
}

fn matches_any(header: &str, current: &str) -> bool {
    let header = header.trim();
    header == "*" || split_etags(header).any(|tag| tag == current)
}

/// Split a list of entity tags on the commas outside quotes.
fn split_etags(header: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in header.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(header[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_entities, northwind_model};
    use odata_model::MetadataProvider;

    #[test]
    fn etag_lists_literals_of_etag_properties() {
        let model = northwind_model();
        let product = model.resolve_resource_type("Product").unwrap();
        let chai = &northwind_entities(&model)["Products"][0];
        assert_eq!(of_entity(chai, product).as_deref(), Some("W/\"7L\""));

        let customer = model.resolve_resource_type("Customer").unwrap();
        let alfki = &northwind_entities(&model)["Customers"][0];
        assert_eq!(of_entity(alfki, customer), None);
    }

    #[test]
    fn if_none_match_on_read_is_not_modified() {
        let p = Preconditions {
            if_none_match: Some("W/\"3L\", W/\"7L\""),
            ..Preconditions::default()
        };
        assert_eq!(p.evaluate(Some("W/\"7L\""), true).unwrap(), PreconditionOutcome::NotModified);
        assert_eq!(p.evaluate(Some("W/\"8L\""), true).unwrap(), PreconditionOutcome::Proceed);
    }

    #[test]
    fn if_match_mismatch_is_precondition_failed() {
        let p = Preconditions {
            if_match: Some("W/\"3L\""),
            ..Preconditions::default()
        };
        let err = p.evaluate(Some("W/\"7L\""), false).unwrap_err();
        assert_eq!(err.status().as_u16(), 412);
        let star = Preconditions {
            if_match: Some("*"),
            ..Preconditions::default()
        };
        assert_eq!(star.evaluate(Some("W/\"7L\""), false).unwrap(), PreconditionOutcome::Proceed);
    }

    #[test]
    fn headers_on_types_without_etags_are_rejected() {
        let p = Preconditions {
            if_match: Some("*"),
            ..Preconditions::default()
        };
        assert_eq!(p.evaluate(None, true).unwrap_err().status().as_u16(), 400);
        assert!(Preconditions::default().evaluate(None, true).is_ok());
    }

    #[test]
    fn quoted_commas_do_not_split_tags() {
        let tags: Vec<_> = split_etags("W/\"'a,b',1\", W/\"2\"").collect();
        assert_eq!(tags, ["W/\"'a,b',1\"", "W/\"2\""]);
    }
}
