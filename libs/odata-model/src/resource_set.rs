//! Resource sets and their configured view.

use crate::config::ServiceConfiguration;
use crate::resource_type::ResourceTypeId;
use crate::rights::EntitySetRights;
use odata_errors::{ODataError, ODataResult};

/// A named, queryable collection of entities of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    name: String,
    type_id: ResourceTypeId,
}

impl ResourceSet {
    pub fn new(name: impl Into<String>, type_id: ResourceTypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.type_id
    }
}

/// A resource set decorated with the rights and paging the service
/// configuration assigns to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSetWrapper {
    set: ResourceSet,
    rights: EntitySetRights,
    page_size: Option<u32>,
}

impl ResourceSetWrapper {
    #[must_use]
    pub fn new(set: ResourceSet, config: &ServiceConfiguration) -> Self {
        let rights = config.rights_for(set.name());
        let page_size = config.page_size_for(set.name());
        Self {
            set,
            rights,
            page_size,
        }
    }

    #[must_use]
    pub const fn resource_set(&self) -> &ResourceSet {
        &self.set
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.set.name()
    }

    #[must_use]
    pub const fn type_id(&self) -> ResourceTypeId {
        self.set.type_id()
    }

    #[must_use]
    pub const fn rights(&self) -> EntitySetRights {
        self.rights
    }

    /// A set with no rights at all is hidden from the service.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.rights.is_none()
    }

    #[must_use]
    pub const fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    #[must_use]
    pub const fn has_paging(&self) -> bool {
        self.page_size.is_some()
    }

    /// # Errors
    /// Returns `Forbidden.` unless every right in `required` is granted.
    pub fn check_resource_set_rights(&self, required: EntitySetRights) -> ODataResult<()> {
        if self.rights.contains(required) {
            Ok(())
        } else {
            tracing::warn!(set = self.name(), granted = %self.rights, required = %required, "access denied");
            Err(ODataError::forbidden())
        }
    }

    /// Succeeds when at least one right in `any_of` is granted.
    ///
    /// # Errors
    /// Returns `Forbidden.` otherwise.
    pub fn check_any_right(&self, any_of: EntitySetRights) -> ODataResult<()> {
        if self.rights.intersects(any_of) {
            Ok(())
        } else {
            Err(ODataError::forbidden())
        }
    }
}
