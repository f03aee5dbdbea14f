//! OData protocol versions.

use odata_errors::{ODataError, messages};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A `major.minor` protocol version. Ordering is lexicographic on (major, minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const V1: Self = Self::new(1, 0);
    pub const V2: Self = Self::new(2, 0);
    pub const V3: Self = Self::new(3, 0);

    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse a `DataServiceVersion`-style header value.
    ///
    /// Anything after the first `;` (e.g. `2.0;NetFx`) is ignored.
    ///
    /// # Errors
    /// Returns a bad request error naming `header` when the value is malformed.
    pub fn parse_header(header: &str, value: &str) -> Result<Self, ODataError> {
        value
            .parse()
            .map_err(|()| ODataError::bad_request(messages::invalid_version_header(header, value)))
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V1
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s.split(';').next().unwrap_or_default().trim();
        if core.is_empty() {
            return Err(());
        }
        let (major, minor) = match core.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (core, "0"),
        };
        let major = major.parse::<u8>().map_err(|_| ())?;
        let minor = minor.parse::<u8>().map_err(|_| ())?;
        if major == 0 {
            return Err(());
        }
        Ok(Self::new(major, minor))
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }
        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => format!("{n:.1}"),
        };
        text.parse()
            .map_err(|()| serde::de::Error::custom(format!("invalid protocol version '{text}'")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_header_forms() {
        assert_eq!("2.0".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V2));
        assert_eq!("3.0;NetFx".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V3));
        assert_eq!("1".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V1));
        assert!("abc".parse::<ProtocolVersion>().is_err());
        assert!("".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn header_error_names_header() {
        let err = ProtocolVersion::parse_header("DataServiceVersion", "x.y").unwrap_err();
        assert!(err.message().contains("DataServiceVersion"));
    }

    #[test]
    fn ordering_follows_major_then_minor() {
        assert!(ProtocolVersion::V1 < ProtocolVersion::V2);
        assert!(ProtocolVersion::new(2, 1) > ProtocolVersion::V2);
        assert!(ProtocolVersion::V3 > ProtocolVersion::new(2, 9));
    }

    #[test]
    fn deserializes_from_string_or_number() {
        let v: ProtocolVersion = serde_json::from_str("\"3.0\"").unwrap();
        assert_eq!(v, ProtocolVersion::V3);
        let v: ProtocolVersion = serde_json::from_str("2.0").unwrap();
        assert_eq!(v, ProtocolVersion::V2);
    }
}
