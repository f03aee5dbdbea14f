//! Singleton declarations (service operations without side effects).

use crate::primitive::EdmPrimitiveType;
use crate::resource_type::ResourceTypeId;
use odata_errors::{ODataError, ODataResult, messages};

/// Names that can never be exposed as singletons, compared case-insensitively.
pub const RESERVED_SINGLETON_NAMES: [&str; 3] = ["eval", "exec", "system"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingletonParameter {
    pub name: String,
    pub kind: EdmPrimitiveType,
}

/// A named callable exposed as a top-level URI segment and as a
/// `FunctionImport` in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingletonMetadata {
    name: String,
    return_type: ResourceTypeId,
    returns_collection: bool,
    entity_set: Option<String>,
    parameters: Vec<SingletonParameter>,
}

impl SingletonMetadata {
    /// # Errors
    /// Fails on reserved or non-identifier names.
    pub fn new(name: &str, return_type: ResourceTypeId) -> ODataResult<Self> {
        validate_singleton_name(name)?;
        Ok(Self {
            name: name.to_owned(),
            return_type,
            returns_collection: false,
            entity_set: None,
            parameters: Vec::new(),
        })
    }

    #[must_use]
    pub const fn returning_collection(mut self) -> Self {
        self.returns_collection = true;
        self
    }

    /// Entities returned by the singleton belong to `set`, which makes
    /// navigation past the singleton segment possible.
    #[must_use]
    pub fn in_entity_set(mut self, set: &str) -> Self {
        self.entity_set = Some(set.to_owned());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: &str, kind: EdmPrimitiveType) -> Self {
        self.parameters.push(SingletonParameter {
            name: name.to_owned(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn return_type(&self) -> ResourceTypeId {
        self.return_type
    }

    #[must_use]
    pub const fn returns_collection(&self) -> bool {
        self.returns_collection
    }

    #[must_use]
    pub fn entity_set(&self) -> Option<&str> {
        self.entity_set.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[SingletonParameter] {
        &self.parameters
    }
}

/// # Errors
/// Fails when `name` is reserved or not a plain identifier.
pub fn validate_singleton_name(name: &str) -> ODataResult<()> {
    let reserved = RESERVED_SINGLETON_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name));
    if reserved || !crate::property::is_valid_property_name(name) {
        return Err(ODataError::metadata(messages::reserved_singleton_name(name)));
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_refused_in_any_case() {
        for name in ["eval", "EXEC", "System"] {
            assert!(validate_singleton_name(name).is_err(), "{name}");
        }
        assert!(validate_singleton_name("system_info").is_ok());
    }

    #[test]
    fn non_identifiers_are_refused() {
        assert!(validate_singleton_name("drop table").is_err());
        assert!(validate_singleton_name("").is_err());
        assert!(validate_singleton_name("TopCustomer").is_ok());
    }
}
