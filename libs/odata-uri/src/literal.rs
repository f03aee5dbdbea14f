//! Single URI literals and their conversion to a declared primitive kind.

use crate::lexer::{TokenKind, TokenStream};
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{EdmPrimitiveType, PrimitiveValue};

/// Parse exactly one literal such as `'ALFKI'`, `10L` or `guid'...'`.
///
/// # Errors
/// Fails when `text` is not a single well-formed literal.
pub fn parse_literal(text: &str) -> ODataResult<PrimitiveValue> {
    let mut tokens = TokenStream::new(text)?;
    let token = tokens.advance();
    match token.kind {
        TokenKind::Literal(value) => {
            tokens.expect_end()?;
            Ok(value)
        }
        _ => Err(ODataError::syntax_error(messages::expression_syntax(
            token.position,
            format!("'{text}' is not a literal"),
        ))),
    }
}

/// Convert a parsed literal to `target`.
///
/// Identity and numeric widening always succeed; an integer literal also
/// narrows to a smaller integral kind when the value fits. Null converts to
/// anything. `None` means the literal is not a value of `target`.
#[must_use]
pub fn coerce_literal(value: PrimitiveValue, target: EdmPrimitiveType) -> Option<PrimitiveValue> {
    let Some(kind) = value.kind() else {
        return Some(value);
    };
    if kind == target || kind.is_assignable_to(target) {
        return value.widen_to(target);
    }
    if !(kind.is_integral() && target.is_integral()) {
        return None;
    }
    let v = value.as_i64()?;
    Some(match target {
        EdmPrimitiveType::SByte => PrimitiveValue::SByte(i8::try_from(v).ok()?),
        EdmPrimitiveType::Byte => PrimitiveValue::Byte(u8::try_from(v).ok()?),
        EdmPrimitiveType::Int16 => PrimitiveValue::Int16(i16::try_from(v).ok()?),
        EdmPrimitiveType::Int32 => PrimitiveValue::Int32(i32::try_from(v).ok()?),
        _ => return None,
    })
}

/// Parse `text` as a literal of `target`.
///
/// # Errors
/// Fails on malformed literals and on literals of another kind.
pub fn parse_typed_literal(text: &str, target: EdmPrimitiveType) -> ODataResult<PrimitiveValue> {
    let value = parse_literal(text)?;
    coerce_literal(value, target)
        .ok_or_else(|| ODataError::syntax_error(messages::invalid_literal(text, target.name())))
}
