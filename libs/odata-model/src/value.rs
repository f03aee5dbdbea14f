//! Typed primitive values.

use crate::primitive::EdmPrimitiveType;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use uuid::Uuid;

/// A value of one of the EDM primitive kinds, or null.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Binary(Vec<u8>),
    Boolean(bool),
    Byte(u8),
    DateTime(NaiveDateTime),
    Decimal(BigDecimal),
    Double(f64),
    Guid(Uuid),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    String(String),
}

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl PrimitiveValue {
    /// `None` for null, which is untyped.
    #[must_use]
    pub const fn kind(&self) -> Option<EdmPrimitiveType> {
        Some(match self {
            Self::Null => return None,
            Self::Binary(_) => EdmPrimitiveType::Binary,
            Self::Boolean(_) => EdmPrimitiveType::Boolean,
            Self::Byte(_) => EdmPrimitiveType::Byte,
            Self::DateTime(_) => EdmPrimitiveType::DateTime,
            Self::Decimal(_) => EdmPrimitiveType::Decimal,
            Self::Double(_) => EdmPrimitiveType::Double,
            Self::Guid(_) => EdmPrimitiveType::Guid,
            Self::Int16(_) => EdmPrimitiveType::Int16,
            Self::Int32(_) => EdmPrimitiveType::Int32,
            Self::Int64(_) => EdmPrimitiveType::Int64,
            Self::SByte(_) => EdmPrimitiveType::SByte,
            Self::Single(_) => EdmPrimitiveType::Single,
            Self::String(_) => EdmPrimitiveType::String,
        })
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a URI literal, the form used in key predicates, skip tokens
    /// and ETags.
    #[must_use]
    pub fn to_uri_literal(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Binary(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Boolean(b) => b.to_string(),
            Self::Byte(v) => v.to_string(),
            Self::DateTime(dt) => format!("datetime'{}'", dt.format(DATETIME_FORMAT)),
            Self::Decimal(d) => format!("{d}M"),
            Self::Double(d) => format!("{}D", format_float(*d)),
            Self::Guid(g) => format!("guid'{g}'"),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => format!("{v}L"),
            Self::SByte(v) => v.to_string(),
            Self::Single(v) => format!("{}f", format_float(f64::from(*v))),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Render as payload text (Atom element content, JSON strings).
    ///
    /// Null renders as the empty string; callers that distinguish null check
    /// [`Self::is_null`] first.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Binary(bytes) => BASE64.encode(bytes),
            Self::Boolean(b) => b.to_string(),
            Self::Byte(v) => v.to_string(),
            Self::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Double(d) => format_float(*d),
            Self::Guid(g) => g.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::SByte(v) => v.to_string(),
            Self::Single(v) => format_float(f64::from(*v)),
            Self::String(s) => s.clone(),
        }
    }

    /// Parse payload text produced by [`Self::to_text`] back into a value of `kind`.
    #[must_use]
    pub fn from_text(kind: EdmPrimitiveType, text: &str) -> Option<Self> {
        let t = text.trim();
        Some(match kind {
            EdmPrimitiveType::Binary => Self::Binary(BASE64.decode(t).ok()?),
            EdmPrimitiveType::Boolean => Self::Boolean(match t {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return None,
            }),
            EdmPrimitiveType::Byte => Self::Byte(t.parse().ok()?),
            EdmPrimitiveType::DateTime => Self::DateTime(parse_datetime(t)?),
            EdmPrimitiveType::Decimal => Self::Decimal(t.parse().ok()?),
            EdmPrimitiveType::Double => Self::Double(parse_float(t)?),
            EdmPrimitiveType::Guid => Self::Guid(Uuid::parse_str(t).ok()?),
            EdmPrimitiveType::Int16 => Self::Int16(t.parse().ok()?),
            EdmPrimitiveType::Int32 => Self::Int32(t.parse().ok()?),
            EdmPrimitiveType::Int64 => Self::Int64(t.parse().ok()?),
            EdmPrimitiveType::SByte => Self::SByte(t.parse().ok()?),
            #[allow(clippy::cast_possible_truncation)]
            EdmPrimitiveType::Single => Self::Single(parse_float(t)? as f32),
            EdmPrimitiveType::String => Self::String(text.to_owned()),
        })
    }

    /// Convert to `target` when the conversion is a numeric widening or identity.
    #[must_use]
    pub fn widen_to(self, target: EdmPrimitiveType) -> Option<Self> {
        let Some(kind) = self.kind() else {
            return Some(self);
        };
        if kind == target {
            return Some(self);
        }
        if !kind.is_assignable_to(target) {
            return None;
        }
        let int = self.as_i64();
        Some(match target {
            EdmPrimitiveType::Int16 => Self::Int16(i16::try_from(int?).ok()?),
            EdmPrimitiveType::Int32 => Self::Int32(i32::try_from(int?).ok()?),
            EdmPrimitiveType::Int64 => Self::Int64(int?),
            EdmPrimitiveType::Byte => Self::Byte(u8::try_from(int?).ok()?),
            #[allow(clippy::cast_possible_truncation)]
            EdmPrimitiveType::Single => Self::Single(self.as_f64()? as f32),
            EdmPrimitiveType::Double => Self::Double(self.as_f64()?),
            EdmPrimitiveType::Decimal => Self::Decimal(self.as_decimal()?),
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Single(v) => Some(f64::from(*v)),
            Self::Decimal(d) => d.to_f64(),
            #[allow(clippy::cast_precision_loss)]
            other => other.as_i64().map(|v| v as f64),
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::Decimal(d) => Some(d.clone()),
            Self::Double(v) => BigDecimal::try_from(*v).ok(),
            Self::Single(v) => BigDecimal::try_from(f64::from(*v)).ok(),
            other => other.as_i64().map(BigDecimal::from),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Total-ish ordering used by `$orderby` and relational operators.
    ///
    /// Null sorts before every value. Numeric kinds compare after promotion.
    /// Returns `None` for values of incomparable kinds.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Guid(a), Self::Guid(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (a, b) => {
                if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                    return Some(x.cmp(&y));
                }
                if matches!(a, Self::Decimal(_)) || matches!(b, Self::Decimal(_)) {
                    return Some(a.as_decimal()?.cmp(&b.as_decimal()?));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
    }

    /// Equality with numeric promotion; `5` (Int32) equals `5L` (Int64).
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

/// Parse an OData datetime body: `yyyy-mm-ddThh:mm[:ss[.fffffff]]`, optional trailing `Z`.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let t = text.strip_suffix('Z').unwrap_or(text);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else if v.is_infinite() && v.is_sign_positive() {
        "INF".to_owned()
    } else if v.is_infinite() {
        "-INF".to_owned()
    } else {
        v.to_string()
    }
}

impl From<&str> for PrimitiveValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for PrimitiveValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for PrimitiveValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i16> for PrimitiveValue {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for PrimitiveValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Uuid> for PrimitiveValue {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

impl From<NaiveDateTime> for PrimitiveValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<BigDecimal> for PrimitiveValue {
    fn from(v: BigDecimal) -> Self {
        Self::Decimal(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for PrimitiveValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn uri_literals() {
        assert_eq!(PrimitiveValue::from("O'Brien").to_uri_literal(), "'O''Brien'");
        assert_eq!(PrimitiveValue::Int64(7).to_uri_literal(), "7L");
        assert_eq!(PrimitiveValue::Binary(vec![0x0a, 0xff]).to_uri_literal(), "X'0AFF'");
        assert_eq!(PrimitiveValue::Null.to_uri_literal(), "null");
        let g = Uuid::parse_str("05b242e7-52eb-46bd-8f0e-6568b72cd9a5").unwrap();
        assert_eq!(
            PrimitiveValue::Guid(g).to_uri_literal(),
            "guid'05b242e7-52eb-46bd-8f0e-6568b72cd9a5'"
        );
    }

    #[test]
    fn text_round_trip_per_kind() {
        let dt = parse_datetime("2011-03-04T10:20:30").unwrap();
        let values = [
            PrimitiveValue::Binary(vec![1, 2, 3]),
            PrimitiveValue::Boolean(true),
            PrimitiveValue::DateTime(dt),
            PrimitiveValue::Decimal("12.50".parse().unwrap()),
            PrimitiveValue::Double(1.25),
            PrimitiveValue::Int64(-9),
            PrimitiveValue::String("x y".to_owned()),
        ];
        for v in values {
            let kind = v.kind().unwrap();
            assert_eq!(PrimitiveValue::from_text(kind, &v.to_text()), Some(v));
        }
    }

    #[test]
    fn comparison_promotes_numbers_and_orders_null_first() {
        assert_eq!(
            PrimitiveValue::Int32(5).compare(&PrimitiveValue::Int64(5)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            PrimitiveValue::Int32(1).compare(&PrimitiveValue::Double(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            PrimitiveValue::Null.compare(&PrimitiveValue::from("a")),
            Some(Ordering::Less)
        );
        assert_eq!(PrimitiveValue::from("a").compare(&PrimitiveValue::Int32(1)), None);
    }

    #[test]
    fn widening_converts_representation() {
        assert_eq!(
            PrimitiveValue::Int32(3).widen_to(EdmPrimitiveType::Int64),
            Some(PrimitiveValue::Int64(3))
        );
        assert_eq!(PrimitiveValue::Int64(3).widen_to(EdmPrimitiveType::Int32), None);
        assert_eq!(
            PrimitiveValue::Null.widen_to(EdmPrimitiveType::Guid),
            Some(PrimitiveValue::Null)
        );
    }
}
