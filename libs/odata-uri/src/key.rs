//! Key predicates: `(123)` and `(CustomerID='ALFKI',CustomerGuid=guid'...')`.

use crate::lexer::{TokenKind, TokenStream};
use crate::literal::coerce_literal;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{EdmPrimitiveType, EntityInstance, PrimitiveValue, ResourceType};

/// Key values of one entity, in key declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPredicate {
    values: Vec<(String, PrimitiveValue)>,
}

impl KeyPredicate {
    /// Parse the text between the parentheses of a key predicate against the
    /// key properties of `ty`.
    ///
    /// # Errors
    /// Fails on malformed predicates, unknown or repeated key names, a wrong
    /// number of values, and values that are not literals of the key's kind.
    pub fn parse(body: &str, ty: &ResourceType) -> ODataResult<Self> {
        let keys: Vec<_> = ty.key_properties().collect();
        let mut tokens = TokenStream::new(body)?;
        let mut named: Vec<(String, PrimitiveValue)> = Vec::new();

        if let TokenKind::Literal(value) = &tokens.peek().kind {
            let value = value.clone();
            tokens.advance();
            tokens.expect_end()?;
            let [key] = keys.as_slice() else {
                return Err(ODataError::bad_request(messages::key_must_be_named(ty.full_name())));
            };
            named.push((key.name().to_owned(), value));
        } else {
            loop {
                let (name, _) = tokens.expect_identifier()?;
                tokens.expect(&TokenKind::Equal, "'='")?;
                let TokenKind::Literal(value) = tokens.advance().kind else {
                    return Err(ODataError::bad_request(messages::key_type_mismatch(
                        &name,
                        "literal",
                    )));
                };
                if named.iter().any(|(n, _)| n == &name) {
                    return Err(ODataError::bad_request(messages::key_duplicate(&name)));
                }
                named.push((name, value));
                if !tokens.eat(&TokenKind::Comma) {
                    break;
                }
            }
            tokens.expect_end()?;
        }

        if named.len() != keys.len() {
            return Err(ODataError::bad_request(messages::key_count_mismatch(ty.full_name())));
        }

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(position) = named.iter().position(|(n, _)| n == key.name()) else {
                let (stray, _) = named
                    .iter()
                    .find(|(n, _)| ty.key_properties().all(|k| k.name() != n))
                    .unwrap_or(&named[0]);
                return Err(ODataError::bad_request(messages::key_not_found(stray, ty.full_name())));
            };
            let (name, raw) = named.swap_remove(position);
            let kind = key.primitive_kind();
            let value = kind
                .filter(|_| !raw.is_null())
                .and_then(|k| coerce_literal(raw, k))
                .ok_or_else(|| {
                    ODataError::bad_request(messages::key_type_mismatch(
                        &name,
                        kind.map_or("?", EdmPrimitiveType::name),
                    ))
                })?;
            values.push((name, value));
        }
        Ok(Self { values })
    }

    /// Key of an existing entity.
    #[must_use]
    pub fn from_entity(entity: &EntityInstance, ty: &ResourceType) -> Self {
        Self {
            values: entity.key_values(ty),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[(String, PrimitiveValue)] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PrimitiveValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Whether `entity` carries these key values.
    #[must_use]
    pub fn matches(&self, entity: &EntityInstance) -> bool {
        self.values.iter().all(|(name, value)| {
            entity
                .primitive(name)
                .is_some_and(|actual| actual.loosely_equals(value))
        })
    }

    /// Render as it appears in a URI, parentheses included.
    #[must_use]
    pub fn to_uri_literal(&self) -> String {
        let body = match self.values.as_slice() {
            [(_, single)] => single.to_uri_literal(),
            many => many
                .iter()
                .map(|(name, value)| format!("{name}={}", value.to_uri_literal()))
                .collect::<Vec<_>>()
                .join(","),
        };
        format!("({body})")
    }
}
