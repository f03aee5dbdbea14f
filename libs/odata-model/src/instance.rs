//! Entity and complex instances returned by query providers.

use crate::resource_type::{ResourceType, ResourceTypeId};
use crate::value::PrimitiveValue;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Primitive(PrimitiveValue),
    /// `None` is a null complex value.
    Complex(Option<ComplexInstance>),
    /// Items are `Primitive` or `Complex`.
    Bag(Vec<PropertyValue>),
    /// An expanded single-valued navigation property.
    Reference(Option<Box<EntityInstance>>),
    /// An expanded collection-valued navigation property.
    Collection(EntityCollection),
}

impl PropertyValue {
    #[must_use]
    pub const fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Self::Primitive(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::Collection(_))
    }
}

macro_rules! primitive_property_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for PropertyValue {
                fn from(v: $t) -> Self {
                    Self::Primitive(v.into())
                }
            }
        )*
    };
}

primitive_property_from!(
    PrimitiveValue,
    &str,
    String,
    bool,
    i16,
    i32,
    i64,
    f64,
    uuid::Uuid,
    chrono::NaiveDateTime,
    bigdecimal::BigDecimal,
);

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexInstance {
    type_id: ResourceTypeId,
    properties: IndexMap<String, PropertyValue>,
}

impl ComplexInstance {
    #[must_use]
    pub fn new(type_id: ResourceTypeId) -> Self {
        Self {
            type_id,
            properties: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One entity. Properties absent from the map are unknown, not null.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    type_id: ResourceTypeId,
    properties: IndexMap<String, PropertyValue>,
}

impl EntityInstance {
    #[must_use]
    pub fn new(type_id: ResourceTypeId) -> Self {
        Self {
            type_id,
            properties: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(name.to_owned(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.shift_remove(name)
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    #[must_use]
    pub fn primitive(&self, name: &str) -> Option<&PrimitiveValue> {
        self.get(name).and_then(PropertyValue::as_primitive)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Key values in key declaration order; missing keys read as null.
    #[must_use]
    pub fn key_values(&self, ty: &ResourceType) -> Vec<(String, PrimitiveValue)> {
        ty.key_properties()
            .map(|p| {
                let value = self.primitive(p.name()).cloned().unwrap_or(PrimitiveValue::Null);
                (p.name().to_owned(), value)
            })
            .collect()
    }

    /// Follow a property path through complex values and expanded references
    /// down to a primitive. A null or unexpanded step yields `None`.
    pub fn resolve_path<'a, I>(&self, path: I) -> Option<&PrimitiveValue>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut iter = path.into_iter();
        let first = iter.next()?;
        let mut current = self.get(first)?;
        for segment in iter {
            current = match current {
                PropertyValue::Complex(Some(c)) => c.get(segment)?,
                PropertyValue::Reference(Some(e)) => e.get(segment)?,
                _ => return None,
            };
        }
        current.as_primitive()
    }
}

/// A (possibly paged) list of entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityCollection {
    pub entities: Vec<EntityInstance>,
    /// Continuation token when server-side paging cut the list short.
    pub next_skiptoken: Option<String>,
    /// Total count when `$inlinecount=allpages` applies.
    pub count: Option<u64>,
}

impl EntityCollection {
    #[must_use]
    pub const fn new(entities: Vec<EntityInstance>) -> Self {
        Self {
            entities,
            next_skiptoken: None,
            count: None,
        }
    }
}
