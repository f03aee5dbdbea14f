//! Per-service configuration: rights, paging, limits and feature switches.

use crate::rights::EntitySetRights;
use crate::version::ProtocolVersion;
use indexmap::IndexMap;
use odata_errors::{ODataError, messages};
use serde::{Deserialize, Serialize};

/// Wildcard key matching every entity set without an explicit rule.
pub const ALL_SETS: &str = "*";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{}", messages::page_size_and_max_results_conflict(.set))]
    PageSizeWithMaxResults { set: String },
    #[error("{}", messages::invalid_page_size(.set))]
    InvalidPageSize { set: String },
    #[error("{}", messages::feature_requires_version(.feature, ProtocolVersion::V2, .configured))]
    FeatureRequiresVersion {
        feature: &'static str,
        configured: ProtocolVersion,
    },
}

impl From<ConfigError> for ODataError {
    fn from(err: ConfigError) -> Self {
        Self::internal(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServiceConfiguration {
    pub max_protocol_version: ProtocolVersion,
    /// Set name (or `*`) to granted rights. Unlisted sets get no rights.
    pub entity_set_access_rules: IndexMap<String, EntitySetRights>,
    /// Set name (or `*`) to server-side page size.
    pub entity_set_page_sizes: IndexMap<String, u32>,
    pub max_results_per_collection: Option<u64>,
    pub max_expand_count: Option<usize>,
    pub max_expand_depth: Option<usize>,
    pub accept_count_requests: bool,
    pub accept_projection_requests: bool,
    pub use_verbose_errors: bool,
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self {
            max_protocol_version: ProtocolVersion::V3,
            entity_set_access_rules: IndexMap::new(),
            entity_set_page_sizes: IndexMap::new(),
            max_results_per_collection: None,
            max_expand_count: None,
            max_expand_depth: None,
            accept_count_requests: false,
            accept_projection_requests: false,
            use_verbose_errors: false,
        }
    }
}

impl ServiceConfiguration {
    pub fn set_entity_set_access_rule(&mut self, set: &str, rights: EntitySetRights) {
        self.entity_set_access_rules.insert(set.to_owned(), rights);
    }

    pub fn set_entity_set_page_size(&mut self, set: &str, size: u32) {
        self.entity_set_page_sizes.insert(set.to_owned(), size);
    }

    /// Effective rights: exact rule, else the `*` rule, else none.
    #[must_use]
    pub fn rights_for(&self, set: &str) -> EntitySetRights {
        self.entity_set_access_rules
            .get(set)
            .or_else(|| self.entity_set_access_rules.get(ALL_SETS))
            .copied()
            .unwrap_or(EntitySetRights::NONE)
    }

    /// Effective page size: exact entry, else the `*` entry. Zero means no paging.
    #[must_use]
    pub fn page_size_for(&self, set: &str) -> Option<u32> {
        self.entity_set_page_sizes
            .get(set)
            .or_else(|| self.entity_set_page_sizes.get(ALL_SETS))
            .copied()
            .filter(|size| *size > 0)
    }

    /// # Errors
    /// Fails when paging and a global result cap are both configured, or when a
    /// 2.0 feature is enabled on a 1.0 service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_results_per_collection.is_some()
            && let Some(set) = self.entity_set_page_sizes.keys().next()
        {
            return Err(ConfigError::PageSizeWithMaxResults { set: set.clone() });
        }
        if self.max_protocol_version < ProtocolVersion::V2 {
            let feature = if !self.entity_set_page_sizes.is_empty() {
                Some("entity set paging")
            } else if self.accept_count_requests {
                Some("count requests")
            } else if self.accept_projection_requests {
                Some("projection requests")
            } else {
                None
            };
            if let Some(feature) = feature {
                return Err(ConfigError::FeatureRequiresVersion {
                    feature,
                    configured: self.max_protocol_version,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let c = ServiceConfiguration::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.max_protocol_version, ProtocolVersion::V3);
        assert_eq!(c.rights_for("Anything"), EntitySetRights::NONE);
    }

    #[test]
    fn paging_conflicts_with_result_cap() {
        let mut c = ServiceConfiguration::default();
        c.set_entity_set_page_size("Customers", 10);
        c.max_results_per_collection = Some(100);
        assert_eq!(
            c.validate(),
            Err(ConfigError::PageSizeWithMaxResults { set: "Customers".to_owned() })
        );
    }

    #[test]
    fn v2_features_need_v2_service() {
        let mut c = ServiceConfiguration {
            max_protocol_version: ProtocolVersion::V1,
            accept_count_requests: true,
            ..ServiceConfiguration::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("count requests"));
        c.max_protocol_version = ProtocolVersion::V2;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_page_size_disables_paging() {
        let mut c = ServiceConfiguration::default();
        c.set_entity_set_page_size("*", 0);
        assert_eq!(c.page_size_for("Customers"), None);
    }

    #[test]
    fn deserializes_from_json() {
        let c: ServiceConfiguration = serde_json::from_str(
            r#"{
                "max_protocol_version": "2.0",
                "entity_set_access_rules": {"*": "all_read", "Orders": "all"},
                "entity_set_page_sizes": {"Orders": 20},
                "accept_count_requests": true
            }"#,
        )
        .unwrap();
        assert_eq!(c.rights_for("Orders"), EntitySetRights::ALL);
        assert_eq!(c.rights_for("Customers"), EntitySetRights::READ_ALL);
        assert_eq!(c.page_size_for("Orders"), Some(20));
        assert!(c.validate().is_ok());
    }
}
