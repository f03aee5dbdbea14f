//! Resource properties and their kinds.

use crate::primitive::EdmPrimitiveType;
use crate::resource_type::{ResourceType, ResourceTypeId, ResourceTypeKind};
use odata_errors::{ODataError, ODataResult, messages};
use std::fmt;

/// Raw kind flags, as declared by providers that think in bit sets.
///
/// Only a handful of combinations are meaningful; [`PropertyKind::from_flags`]
/// rejects the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyKindFlags(u8);

impl PropertyKindFlags {
    pub const PRIMITIVE: Self = Self(1);
    pub const KEY: Self = Self(2);
    pub const ETAG: Self = Self(4);
    pub const COMPLEX_TYPE: Self = Self(8);
    pub const RESOURCE_REFERENCE: Self = Self(16);
    pub const RESOURCESET_REFERENCE: Self = Self(32);
    pub const BAG: Self = Self(64);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::PRIMITIVE, "PRIMITIVE"),
        (Self::KEY, "KEY"),
        (Self::ETAG, "ETAG"),
        (Self::COMPLEX_TYPE, "COMPLEX_TYPE"),
        (Self::RESOURCE_REFERENCE, "RESOURCE_REFERENCE"),
        (Self::RESOURCESET_REFERENCE, "RESOURCESET_REFERENCE"),
        (Self::BAG, "BAG"),
    ];

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PropertyKindFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for PropertyKindFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// The validated kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Primitive,
    /// Primitive and part of the entity key.
    Key,
    /// Primitive and part of the concurrency token.
    ETag,
    ComplexType,
    /// Navigation to at most one entity.
    ResourceReference,
    /// Navigation to a collection of entities.
    ResourceSetReference,
    PrimitiveBag,
    ComplexBag,
}

impl PropertyKind {
    /// # Errors
    /// Fails with a metadata error on combinations the protocol does not define,
    /// e.g. `KEY` without `PRIMITIVE` or `KEY|ETAG`.
    pub fn from_flags(flags: PropertyKindFlags) -> ODataResult<Self> {
        use PropertyKindFlags as F;
        let p = F::PRIMITIVE.bits();
        let kind = match flags.bits() {
            b if b == p => Self::Primitive,
            b if b == p | F::KEY.bits() => Self::Key,
            b if b == p | F::ETAG.bits() => Self::ETag,
            b if b == F::COMPLEX_TYPE.bits() => Self::ComplexType,
            b if b == F::RESOURCE_REFERENCE.bits() => Self::ResourceReference,
            b if b == F::RESOURCESET_REFERENCE.bits() => Self::ResourceSetReference,
            b if b == p | F::BAG.bits() => Self::PrimitiveBag,
            b if b == F::COMPLEX_TYPE.bits() | F::BAG.bits() => Self::ComplexBag,
            _ => return Err(ODataError::metadata(messages::invalid_property_kind(flags))),
        };
        Ok(kind)
    }

    #[must_use]
    pub fn flags(self) -> PropertyKindFlags {
        use PropertyKindFlags as F;
        match self {
            Self::Primitive => F::PRIMITIVE,
            Self::Key => F::PRIMITIVE | F::KEY,
            Self::ETag => F::PRIMITIVE | F::ETAG,
            Self::ComplexType => F::COMPLEX_TYPE,
            Self::ResourceReference => F::RESOURCE_REFERENCE,
            Self::ResourceSetReference => F::RESOURCESET_REFERENCE,
            Self::PrimitiveBag => F::PRIMITIVE | F::BAG,
            Self::ComplexBag => F::COMPLEX_TYPE | F::BAG,
        }
    }

    /// Single-valued primitive, including key and etag properties.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        matches!(self, Self::Primitive | Self::Key | Self::ETag)
    }

    #[must_use]
    pub const fn is_key(self) -> bool {
        matches!(self, Self::Key)
    }

    #[must_use]
    pub const fn is_etag(self) -> bool {
        matches!(self, Self::ETag)
    }

    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::ComplexType)
    }

    #[must_use]
    pub const fn is_navigation(self) -> bool {
        matches!(self, Self::ResourceReference | Self::ResourceSetReference)
    }

    #[must_use]
    pub const fn is_bag(self) -> bool {
        matches!(self, Self::PrimitiveBag | Self::ComplexBag)
    }

    /// The resource type kind the property's type must have.
    #[must_use]
    pub const fn expected_type_kind(self) -> ResourceTypeKind {
        match self {
            Self::Primitive | Self::Key | Self::ETag | Self::PrimitiveBag => {
                ResourceTypeKind::Primitive
            }
            Self::ComplexType | Self::ComplexBag => ResourceTypeKind::Complex,
            Self::ResourceReference | Self::ResourceSetReference => ResourceTypeKind::Entity,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.flags().fmt(f)
    }
}

/// A property declared on a complex or entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProperty {
    name: String,
    kind: PropertyKind,
    type_id: ResourceTypeId,
    type_name: String,
    primitive: Option<EdmPrimitiveType>,
    mime_type: Option<String>,
}

impl ResourceProperty {
    /// # Errors
    /// Fails when the name breaks the naming rules or the kind does not fit
    /// the kind of `property_type`.
    pub fn new(
        name: impl Into<String>,
        kind: PropertyKind,
        property_type: &ResourceType,
    ) -> ODataResult<Self> {
        let name = name.into();
        validate_property_name(&name)?;
        if property_type.kind() != kind.expected_type_kind() {
            return Err(ODataError::metadata(messages::property_kind_type_mismatch(
                &name,
                kind,
                property_type.full_name(),
            )));
        }
        Ok(Self {
            name,
            kind,
            type_id: property_type.id(),
            type_name: property_type.full_name().to_owned(),
            primitive: property_type.primitive_kind(),
            mime_type: None,
        })
    }

    /// # Errors
    /// Fails when the property is not primitive.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> ODataResult<Self> {
        if !self.kind.is_primitive() {
            return Err(ODataError::metadata(messages::mime_type_on_non_primitive(&self.name)));
        }
        self.mime_type = Some(mime_type.into());
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> PropertyKind {
        self.kind
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }

    /// Full name of the property's type (`Edm.String`, `NorthWind.Address`).
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The primitive kind for primitive and primitive-bag properties.
    #[must_use]
    pub const fn primitive_kind(&self) -> Option<EdmPrimitiveType> {
        self.primitive
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        self.kind.is_navigation()
    }
}

/// Protocol naming rule: non-empty, no leading underscore, letters, digits
/// and underscores only, not starting with a digit.
#[must_use]
pub fn is_valid_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_alphabetic() && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// # Errors
/// Fails with a metadata error when [`is_valid_property_name`] rejects the name.
pub fn validate_property_name(name: &str) -> ODataResult<()> {
    if is_valid_property_name(name) {
        Ok(())
    } else {
        Err(ODataError::metadata(messages::invalid_property_name(name)))
    }
}
