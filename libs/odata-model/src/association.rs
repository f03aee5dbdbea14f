//! Associations between entity types and between resource sets.

use crate::property::ResourceProperty;
use crate::resource_type::{ResourceType, ResourceTypeId};
use odata_errors::{ODataError, ODataResult, messages};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    ZeroOrOne,
    One,
    Many,
}

impl Multiplicity {
    /// Multiplicity of the end a navigation property points at.
    ///
    /// A reference reaches at most one entity; a set reference or no property
    /// at all means many.
    #[must_use]
    pub fn of_target(from_property: Option<&ResourceProperty>) -> Self {
        match from_property {
            Some(p) if p.kind() == crate::property::PropertyKind::ResourceReference => {
                Self::ZeroOrOne
            }
            _ => Self::Many,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ZeroOrOne => "0..1",
            Self::One => "1",
            Self::Many => "*",
        })
    }
}

/// One end of a set-level association: a resource set, the type at that end,
/// and the navigation property leaving from it (if any).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAssociationSetEnd {
    set_name: String,
    type_id: ResourceTypeId,
    property: Option<String>,
}

impl ResourceAssociationSetEnd {
    pub fn new(set_name: impl Into<String>, type_id: ResourceTypeId, property: Option<&str>) -> Self {
        Self {
            set_name: set_name.into(),
            type_id,
            property: property.map(str::to_owned),
        }
    }

    #[must_use]
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }

    #[must_use]
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    #[must_use]
    pub fn is_end_for(&self, set_name: &str, type_id: ResourceTypeId, property: &str) -> bool {
        self.set_name == set_name && self.type_id == type_id && self.property.as_deref() == Some(property)
    }
}

/// Set-level association as declared by a metadata provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAssociationSet {
    name: String,
    end1: ResourceAssociationSetEnd,
    end2: ResourceAssociationSetEnd,
}

impl ResourceAssociationSet {
    /// # Errors
    /// Fails when neither end has a navigation property, or when both ends are
    /// the same property of the same type in the same set.
    pub fn new(
        name: impl Into<String>,
        end1: ResourceAssociationSetEnd,
        end2: ResourceAssociationSetEnd,
    ) -> ODataResult<Self> {
        if end1.property.is_none() && end2.property.is_none() {
            return Err(ODataError::metadata(messages::association_ends_without_properties()));
        }
        if end1 == end2 {
            return Err(ODataError::metadata(messages::self_referencing_association(
                &end1.set_name,
                end1.property.as_deref().unwrap_or_default(),
            )));
        }
        Ok(Self {
            name: name.into(),
            end1,
            end2,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn end1(&self) -> &ResourceAssociationSetEnd {
        &self.end1
    }

    #[must_use]
    pub const fn end2(&self) -> &ResourceAssociationSetEnd {
        &self.end2
    }

    #[must_use]
    pub fn end(&self, set_name: &str, type_id: ResourceTypeId, property: &str) -> Option<&ResourceAssociationSetEnd> {
        [&self.end1, &self.end2]
            .into_iter()
            .find(|e| e.is_end_for(set_name, type_id, property))
    }

    /// The end opposite to the one identified by the arguments.
    #[must_use]
    pub fn related_end(
        &self,
        set_name: &str,
        type_id: ResourceTypeId,
        property: &str,
    ) -> Option<&ResourceAssociationSetEnd> {
        if self.end1.is_end_for(set_name, type_id, property) {
            Some(&self.end2)
        } else if self.end2.is_end_for(set_name, type_id, property) {
            Some(&self.end1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAssociationTypeEnd {
    name: String,
    type_id: ResourceTypeId,
    type_name: String,
    property: Option<String>,
    multiplicity: Multiplicity,
}

impl ResourceAssociationTypeEnd {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    #[must_use]
    pub const fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }
}

/// Type-level relationship between two entity types, independent of sets and
/// of configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAssociationType {
    name: String,
    namespace: String,
    end1: ResourceAssociationTypeEnd,
    end2: ResourceAssociationTypeEnd,
}

impl ResourceAssociationType {
    /// Derive the association type from the two ends of an association set.
    ///
    /// # Errors
    /// Fails when both properties are absent or both ends are the same property.
    pub fn derive(
        namespace: &str,
        end1: (&ResourceType, Option<&ResourceProperty>),
        end2: (&ResourceType, Option<&ResourceProperty>),
    ) -> ODataResult<Self> {
        let ((type1, prop1), (type2, prop2)) = (end1, end2);
        let name = match (prop1, prop2) {
            (Some(p), _) => format!("{}_{}", type1.name(), p.name()),
            (None, Some(p)) => format!("{}_{}", type2.name(), p.name()),
            (None, None) => {
                return Err(ODataError::metadata(
                    messages::association_ends_without_properties(),
                ));
            }
        };
        if type1.id() == type2.id()
            && let (Some(p1), Some(p2)) = (prop1, prop2)
            && p1.name() == p2.name()
        {
            return Err(ODataError::metadata(messages::self_referencing_association(
                type1.full_name(),
                p1.name(),
            )));
        }

        let (mut name1, mut name2) = (type1.name().to_owned(), type2.name().to_owned());
        if name1 == name2 {
            name1 = end_name(type1, prop1, "1");
            name2 = end_name(type2, prop2, "2");
        }

        Ok(Self {
            name,
            namespace: namespace.to_owned(),
            end1: ResourceAssociationTypeEnd {
                name: name1,
                type_id: type1.id(),
                type_name: type1.full_name().to_owned(),
                property: prop1.map(|p| p.name().to_owned()),
                multiplicity: Multiplicity::of_target(prop2),
            },
            end2: ResourceAssociationTypeEnd {
                name: name2,
                type_id: type2.id(),
                type_name: type2.full_name().to_owned(),
                property: prop2.map(|p| p.name().to_owned()),
                multiplicity: Multiplicity::of_target(prop1),
            },
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    #[must_use]
    pub const fn end1(&self) -> &ResourceAssociationTypeEnd {
        &self.end1
    }

    #[must_use]
    pub const fn end2(&self) -> &ResourceAssociationTypeEnd {
        &self.end2
    }

    /// The end whose navigation property is `property` on `type_id`.
    #[must_use]
    pub fn end_for(&self, type_id: ResourceTypeId, property: &str) -> Option<&ResourceAssociationTypeEnd> {
        [&self.end1, &self.end2]
            .into_iter()
            .find(|e| e.type_id == type_id && e.property.as_deref() == Some(property))
    }

    #[must_use]
    pub fn related_end(&self, type_id: ResourceTypeId, property: &str) -> Option<&ResourceAssociationTypeEnd> {
        if self.end1.type_id == type_id && self.end1.property.as_deref() == Some(property) {
            Some(&self.end2)
        } else if self.end2.type_id == type_id && self.end2.property.as_deref() == Some(property) {
            Some(&self.end1)
        } else {
            None
        }
    }
}

fn end_name(ty: &ResourceType, property: Option<&ResourceProperty>, fallback: &str) -> String {
    match property {
        Some(p) => format!("{}_{}", ty.name(), p.name()),
        None => format!("{}{fallback}", ty.name()),
    }
}
