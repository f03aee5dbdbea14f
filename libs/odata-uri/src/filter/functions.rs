//! Signatures of the built-in `$filter` functions.

use super::ast::{ExpressionType, Function};
use odata_model::EdmPrimitiveType as K;

struct Signature {
    params: &'static [K],
    returns: K,
}

const fn sig(params: &'static [K], returns: K) -> Signature {
    Signature { params, returns }
}

impl Function {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "substringof" => Self::SubstringOf,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "length" => Self::Length,
            "indexof" => Self::IndexOf,
            "replace" => Self::Replace,
            "substring" => Self::Substring,
            "tolower" => Self::ToLower,
            "toupper" => Self::ToUpper,
            "trim" => Self::Trim,
            "concat" => Self::Concat,
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "minute" => Self::Minute,
            "second" => Self::Second,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceiling" => Self::Ceiling,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SubstringOf => "substringof",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Length => "length",
            Self::IndexOf => "indexof",
            Self::Replace => "replace",
            Self::Substring => "substring",
            Self::ToLower => "tolower",
            Self::ToUpper => "toupper",
            Self::Trim => "trim",
            Self::Concat => "concat",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceiling => "ceiling",
        }
    }

    fn signatures(self) -> &'static [Signature] {
        const STR1: &[K] = &[K::String];
        const STR2: &[K] = &[K::String, K::String];
        const DATE: &[K] = &[K::DateTime];
        const STRING_TEST: &[Signature] = &[sig(STR2, K::Boolean)];
        const LENGTH: &[Signature] = &[sig(STR1, K::Int32)];
        const INDEX_OF: &[Signature] = &[sig(STR2, K::Int32)];
        const REPLACE: &[Signature] = &[sig(&[K::String, K::String, K::String], K::String)];
        const SUBSTRING: &[Signature] = &[
            sig(&[K::String, K::Int32], K::String),
            sig(&[K::String, K::Int32, K::Int32], K::String),
        ];
        const STRING_MAP: &[Signature] = &[sig(STR1, K::String)];
        const CONCAT: &[Signature] = &[sig(STR2, K::String)];
        const DATE_PART: &[Signature] = &[sig(DATE, K::Int32)];
        const ROUNDING: &[Signature] = &[sig(&[K::Double], K::Double), sig(&[K::Decimal], K::Decimal)];
        match self {
            Self::SubstringOf | Self::StartsWith | Self::EndsWith => STRING_TEST,
            Self::Length => LENGTH,
            Self::IndexOf => INDEX_OF,
            Self::Replace => REPLACE,
            Self::Substring => SUBSTRING,
            Self::ToLower | Self::ToUpper | Self::Trim => STRING_MAP,
            Self::Concat => CONCAT,
            Self::Year | Self::Month | Self::Day | Self::Hour | Self::Minute | Self::Second => DATE_PART,
            Self::Round | Self::Floor | Self::Ceiling => ROUNDING,
        }
    }

    /// Pick the first signature the argument types fit and return its result kind.
    ///
    /// A `null` argument fits any parameter. Numeric arguments fit wider
    /// numeric parameters.
    #[must_use]
    pub fn resolve(self, args: &[ExpressionType]) -> Option<K> {
        self.signatures()
            .iter()
            .find(|s| {
                s.params.len() == args.len()
                    && s.params.iter().zip(args).all(|(param, arg)| match arg {
                        ExpressionType::Null => true,
                        ExpressionType::Primitive(kind) => kind.is_assignable_to(*param),
                        ExpressionType::Complex(_) | ExpressionType::Entity(_) => false,
                    })
            })
            .map(|s| s.returns)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn overloads_resolve_by_arity_and_kind() {
        let s = ExpressionType::Primitive(K::String);
        let i = ExpressionType::Primitive(K::Int32);
        assert_eq!(Function::Substring.resolve(&[s, i]), Some(K::String));
        assert_eq!(Function::Substring.resolve(&[s, i, i]), Some(K::String));
        assert_eq!(Function::Substring.resolve(&[s]), None);
        assert_eq!(
            Function::Round.resolve(&[ExpressionType::Primitive(K::Decimal)]),
            Some(K::Decimal)
        );
        assert_eq!(Function::Round.resolve(&[i]), Some(K::Double));
        assert_eq!(Function::Year.resolve(&[ExpressionType::Null]), Some(K::Int32));
        assert_eq!(Function::from_name("isof"), None);
    }
}
