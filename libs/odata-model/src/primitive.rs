//! EDM primitive kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The thirteen EDM primitive kinds understood by the protocol.
///
/// The declaration order is significant: it fixes the ids of the primitive
/// resource types that every model pre-populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdmPrimitiveType {
    #[serde(rename = "Edm.Binary")]
    Binary,
    #[serde(rename = "Edm.Boolean")]
    Boolean,
    #[serde(rename = "Edm.Byte")]
    Byte,
    #[serde(rename = "Edm.DateTime")]
    DateTime,
    #[serde(rename = "Edm.Decimal")]
    Decimal,
    #[serde(rename = "Edm.Double")]
    Double,
    #[serde(rename = "Edm.Guid")]
    Guid,
    #[serde(rename = "Edm.Int16")]
    Int16,
    #[serde(rename = "Edm.Int32")]
    Int32,
    #[serde(rename = "Edm.Int64")]
    Int64,
    #[serde(rename = "Edm.SByte")]
    SByte,
    #[serde(rename = "Edm.Single")]
    Single,
    #[serde(rename = "Edm.String")]
    String,
}

impl EdmPrimitiveType {
    pub const ALL: [Self; 13] = [
        Self::Binary,
        Self::Boolean,
        Self::Byte,
        Self::DateTime,
        Self::Decimal,
        Self::Double,
        Self::Guid,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::SByte,
        Self::Single,
        Self::String,
    ];

    /// Name without the `Edm.` namespace.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Binary => "Binary",
            Self::Boolean => "Boolean",
            Self::Byte => "Byte",
            Self::DateTime => "DateTime",
            Self::Decimal => "Decimal",
            Self::Double => "Double",
            Self::Guid => "Guid",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::SByte => "SByte",
            Self::Single => "Single",
            Self::String => "String",
        }
    }

    /// Fully qualified name, e.g. `Edm.Int32`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binary => "Edm.Binary",
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::DateTime => "Edm.DateTime",
            Self::Decimal => "Edm.Decimal",
            Self::Double => "Edm.Double",
            Self::Guid => "Edm.Guid",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::SByte => "Edm.SByte",
            Self::Single => "Edm.Single",
            Self::String => "Edm.String",
        }
    }

    /// Accepts both `Edm.Int32` and `Int32`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix("Edm.").unwrap_or(name);
        Self::ALL.into_iter().find(|k| k.short_name() == short)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::SByte | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integral() || matches!(self, Self::Decimal | Self::Double | Self::Single)
    }

    /// Rank in the numeric promotion lattice; `None` for non-numeric kinds.
    const fn numeric_rank(self) -> Option<u8> {
        match self {
            Self::SByte => Some(0),
            Self::Byte => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 => Some(3),
            Self::Int64 => Some(4),
            Self::Single => Some(5),
            Self::Double => Some(6),
            Self::Decimal => Some(7),
            _ => None,
        }
    }

    /// Whether a value of `self` can be used where `target` is expected
    /// without loss of meaning (identity or numeric widening).
    #[must_use]
    pub fn is_assignable_to(self, target: Self) -> bool {
        if self == target {
            return true;
        }
        match (self.numeric_rank(), target.numeric_rank()) {
            (Some(from), Some(to)) => from <= to,
            _ => false,
        }
    }

    /// The common numeric kind both operands promote to.
    #[must_use]
    pub fn promote(left: Self, right: Self) -> Option<Self> {
        let (l, r) = (left.numeric_rank()?, right.numeric_rank()?);
        let widest = if l >= r { left } else { right };
        // Integral arithmetic never narrows below Int32.
        if widest.is_integral() && widest.numeric_rank() < Self::Int32.numeric_rank() {
            Some(Self::Int32)
        } else {
            Some(widest)
        }
    }
}

impl fmt::Display for EdmPrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_accepts_both_forms() {
        assert_eq!(EdmPrimitiveType::from_name("Edm.Guid"), Some(EdmPrimitiveType::Guid));
        assert_eq!(EdmPrimitiveType::from_name("Int64"), Some(EdmPrimitiveType::Int64));
        assert_eq!(EdmPrimitiveType::from_name("Edm.Geography"), None);
    }

    #[test]
    fn indices_follow_declaration_order() {
        for (i, kind) in EdmPrimitiveType::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn widening_is_one_way() {
        assert!(EdmPrimitiveType::Int32.is_assignable_to(EdmPrimitiveType::Int64));
        assert!(EdmPrimitiveType::Int32.is_assignable_to(EdmPrimitiveType::Decimal));
        assert!(!EdmPrimitiveType::Int64.is_assignable_to(EdmPrimitiveType::Int32));
        assert!(!EdmPrimitiveType::String.is_assignable_to(EdmPrimitiveType::Guid));
    }

    #[test]
    fn promotion_picks_widest_operand() {
        use EdmPrimitiveType as K;
        assert_eq!(K::promote(K::Int32, K::Double), Some(K::Double));
        assert_eq!(K::promote(K::Byte, K::Int16), Some(K::Int32));
        assert_eq!(K::promote(K::Int64, K::Decimal), Some(K::Decimal));
        assert_eq!(K::promote(K::String, K::Int32), None);
    }
}
