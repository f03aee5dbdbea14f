//! Configuration-aware, caching view over a raw [`MetadataProvider`].

use crate::association::{
    ResourceAssociationSet, ResourceAssociationSetEnd, ResourceAssociationType,
};
use crate::config::ServiceConfiguration;
use crate::property::ResourceProperty;
use crate::provider::MetadataProvider;
use crate::resource_set::ResourceSetWrapper;
use crate::resource_type::{ResourceType, ResourceTypeId};
use crate::singleton::SingletonMetadata;
use odata_errors::{ODataError, ODataResult, messages};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An association set whose two ends are both visible under the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssociationSet {
    pub set: ResourceAssociationSet,
    pub end1_set: Arc<ResourceSetWrapper>,
    pub end2_set: Arc<ResourceSetWrapper>,
    pub association_type: ResourceAssociationType,
}

impl ResolvedAssociationSet {
    #[must_use]
    pub fn name(&self) -> &str {
        self.set.name()
    }

    /// The resource set on the far side of `property` when leaving from `set_name`.
    #[must_use]
    pub fn related_set(&self, set_name: &str, property: &str) -> Option<&Arc<ResourceSetWrapper>> {
        let (e1, e2) = (self.set.end1(), self.set.end2());
        if e1.set_name() == set_name && e1.property() == Some(property) {
            Some(&self.end2_set)
        } else if e2.set_name() == set_name && e2.property() == Some(property) {
            Some(&self.end1_set)
        } else {
            None
        }
    }
}

/// Applies configured visibility to the provider's declarations and caches
/// the results.
///
/// Caches fill lazily on first access and are guarded by mutexes, so one
/// wrapper can be shared across request threads.
pub struct MetadataProviderWrapper {
    provider: Arc<dyn MetadataProvider>,
    config: Arc<ServiceConfiguration>,
    set_cache: Mutex<HashMap<String, Option<Arc<ResourceSetWrapper>>>>,
    visible_sets: Mutex<Option<Vec<Arc<ResourceSetWrapper>>>>,
    association_cache: Mutex<HashMap<String, Option<Arc<ResolvedAssociationSet>>>>,
}

impl std::fmt::Debug for MetadataProviderWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataProviderWrapper")
            .field("container", &self.provider.container_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetadataProviderWrapper {
    pub fn new(provider: Arc<dyn MetadataProvider>, config: Arc<ServiceConfiguration>) -> Self {
        Self {
            provider,
            config,
            set_cache: Mutex::new(HashMap::new()),
            visible_sets: Mutex::new(None),
            association_cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &dyn MetadataProvider {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfiguration {
        &self.config
    }

    /// # Errors
    /// Fails when the provider has no container name.
    pub fn container_name(&self) -> ODataResult<&str> {
        self.provider
            .container_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ODataError::metadata(messages::container_name_missing()))
    }

    /// # Errors
    /// Fails when the provider has no container namespace.
    pub fn container_namespace(&self) -> ODataResult<&str> {
        self.provider
            .container_namespace()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ODataError::metadata(messages::container_namespace_missing()))
    }

    /// `None` when the name is unknown or the set has no rights.
    #[must_use]
    pub fn resolve_resource_set(&self, name: &str) -> Option<Arc<ResourceSetWrapper>> {
        if let Some(cached) = self.set_cache.lock().get(name) {
            return cached.clone();
        }
        let resolved = self
            .provider
            .resolve_resource_set(name)
            .map(|set| ResourceSetWrapper::new(set.clone(), &self.config))
            .filter(ResourceSetWrapper::is_visible)
            .map(Arc::new);
        self.set_cache
            .lock()
            .insert(name.to_owned(), resolved.clone());
        resolved
    }

    /// All visible resource sets, in declaration order.
    ///
    /// # Errors
    /// Fails when two sets share a name.
    pub fn resource_sets(&self) -> ODataResult<Vec<Arc<ResourceSetWrapper>>> {
        if let Some(cached) = self.visible_sets.lock().as_ref() {
            return Ok(cached.clone());
        }
        let mut seen = HashSet::new();
        let mut visible = Vec::new();
        for set in self.provider.resource_sets() {
            if !seen.insert(set.name()) {
                return Err(ODataError::metadata(messages::duplicate_entity_set(set.name())));
            }
            if let Some(wrapper) = self.resolve_resource_set(set.name()) {
                visible.push(wrapper);
            }
        }
        *self.visible_sets.lock() = Some(visible.clone());
        Ok(visible)
    }

    #[must_use]
    pub fn resolve_resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.provider.resolve_resource_type(name)
    }

    /// # Errors
    /// Fails with an internal error when the id does not belong to the model.
    pub fn resource_type(&self, id: ResourceTypeId) -> ODataResult<&ResourceType> {
        self.provider
            .resource_type(id)
            .ok_or_else(|| ODataError::internal(messages::unknown_resource_type(&id.to_string())))
    }

    /// Every complex and entity type.
    ///
    /// # Errors
    /// Fails when two types share a name.
    pub fn types(&self) -> ODataResult<Vec<&ResourceType>> {
        let types = self.provider.types();
        let mut seen = HashSet::new();
        for ty in &types {
            if !seen.insert(ty.full_name()) {
                return Err(ODataError::metadata(messages::duplicate_entity_type(ty.full_name())));
            }
        }
        Ok(types)
    }

    /// `None` when nothing derives from `ty`.
    #[must_use]
    pub fn derived_types(&self, ty: &ResourceType) -> Option<Vec<&ResourceType>> {
        let derived = self.provider.derived_types(ty);
        (!derived.is_empty()).then_some(derived)
    }

    #[must_use]
    pub fn has_derived_types(&self, ty: &ResourceType) -> bool {
        self.provider.has_derived_types(ty)
    }

    #[must_use]
    pub fn singletons(&self) -> Vec<&SingletonMetadata> {
        self.provider.singletons()
    }

    /// The association set for navigating `property` of `ty` from `set`.
    ///
    /// `Ok(None)` when the provider declares none or when either end's set is
    /// hidden by configuration.
    ///
    /// # Errors
    /// Fails when the provider returns a set that has no end for the
    /// navigation, or whose ends are invalid.
    pub fn resource_association_set(
        &self,
        set: &ResourceSetWrapper,
        ty: &ResourceType,
        property: &ResourceProperty,
    ) -> ODataResult<Option<Arc<ResolvedAssociationSet>>> {
        let key = format!("{}_{}_{}", set.name(), ty.full_name(), property.name());
        if let Some(cached) = self.association_cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let resolved = self.build_association_set(set, ty, property)?.map(Arc::new);
        self.association_cache.lock().insert(key, resolved.clone());
        Ok(resolved)
    }

    fn build_association_set(
        &self,
        set: &ResourceSetWrapper,
        ty: &ResourceType,
        property: &ResourceProperty,
    ) -> ODataResult<Option<ResolvedAssociationSet>> {
        let Some(raw) = self
            .provider
            .resource_association_set(set.resource_set(), ty, property)
        else {
            return Ok(None);
        };

        let has_end = [raw.end1(), raw.end2()]
            .into_iter()
            .any(|e| e.set_name() == set.name() && e.property() == Some(property.name()));
        if !has_end {
            return Err(ODataError::metadata(messages::invalid_association_set(
                raw.name(),
                set.name(),
                ty.full_name(),
                property.name(),
            )));
        }

        let (Some(end1_set), Some(end2_set)) = (
            self.resolve_resource_set(raw.end1().set_name()),
            self.resolve_resource_set(raw.end2().set_name()),
        ) else {
            tracing::debug!(association = raw.name(), "association end hidden by configuration");
            return Ok(None);
        };

        let association_type = ResourceAssociationType::derive(
            self.container_namespace()?,
            self.association_end_parts(raw.end1(), &end1_set)?,
            self.association_end_parts(raw.end2(), &end2_set)?,
        )?;

        Ok(Some(ResolvedAssociationSet {
            set: raw.clone(),
            end1_set,
            end2_set,
            association_type,
        }))
    }

    fn association_end_parts(
        &self,
        end: &ResourceAssociationSetEnd,
        end_set: &ResourceSetWrapper,
    ) -> ODataResult<(&ResourceType, Option<&ResourceProperty>)> {
        let end_type = self.resource_type(end.type_id())?;
        let set_type = self.resource_type(end_set.type_id())?;
        if !self.is_assignable(set_type.id(), end_type.id())
            && !self.is_assignable(end_type.id(), set_type.id())
        {
            return Err(ODataError::metadata(messages::association_end_type_not_assignable(
                end_type.full_name(),
                end_set.name(),
            )));
        }
        let end_property = match end.property() {
            Some(name) => Some(
                end_type
                    .property(name)
                    .filter(|p| p.is_navigation())
                    .ok_or_else(|| {
                        ODataError::metadata(messages::association_end_property_not_navigation(
                            end_type.full_name(),
                            name,
                        ))
                    })?,
            ),
            None => None,
        };
        Ok((end_type, end_property))
    }

    /// The set reached by navigating `property` of `ty` from `set`.
    ///
    /// # Errors
    /// Propagates association set integrity failures.
    pub fn related_resource_set(
        &self,
        set: &ResourceSetWrapper,
        ty: &ResourceType,
        property: &ResourceProperty,
    ) -> ODataResult<Option<Arc<ResourceSetWrapper>>> {
        Ok(self
            .resource_association_set(set, ty, property)?
            .and_then(|a| a.related_set(set.name(), property.name()).cloned()))
    }

    /// Every association set reachable from a visible set, each listed once.
    ///
    /// # Errors
    /// Propagates association set integrity failures.
    pub fn visible_association_sets(&self) -> ODataResult<Vec<Arc<ResolvedAssociationSet>>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for set in self.resource_sets()? {
            let root = self.resource_type(set.type_id())?;
            let mut family = vec![root];
            family.extend(self.derived_types(root).unwrap_or_default());
            for ty in family {
                for property in ty.declared_properties().filter(|p| p.is_navigation()) {
                    if let Some(assoc) = self.resource_association_set(&set, ty, property)?
                        && seen.insert(assoc.name().to_owned())
                    {
                        out.push(assoc);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Whether `derived` is `base` or inherits from it.
    #[must_use]
    pub fn is_assignable(&self, base: ResourceTypeId, derived: ResourceTypeId) -> bool {
        let mut current = Some(derived);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.provider.resource_type(id).and_then(ResourceType::base_type);
        }
        false
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::provider::MetadataModel;
    use crate::resource_set::ResourceSet;
    use crate::rights::EntitySetRights;
    use crate::testing::{northwind_config, northwind_model, northwind_wrapper};

    /// Reports every set and type twice.
    struct Doubled(MetadataModel);

    impl MetadataProvider for Doubled {
        fn container_name(&self) -> Option<&str> {
            None
        }
        fn container_namespace(&self) -> Option<&str> {
            self.0.container_namespace()
        }
        fn resource_sets(&self) -> Vec<&ResourceSet> {
            let sets = self.0.resource_sets();
            sets.iter().chain(sets.iter()).copied().collect()
        }
        fn types(&self) -> Vec<&ResourceType> {
            let types = self.0.types();
            types.iter().chain(types.iter()).copied().collect()
        }
        fn resolve_resource_set(&self, name: &str) -> Option<&ResourceSet> {
            self.0.resolve_resource_set(name)
        }
        fn resolve_resource_type(&self, name: &str) -> Option<&ResourceType> {
            self.0.resolve_resource_type(name)
        }
        fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceType> {
            self.0.resource_type(id)
        }
        fn derived_types(&self, ty: &ResourceType) -> Vec<&ResourceType> {
            self.0.derived_types(ty)
        }
        fn resource_association_set(
            &self,
            set: &ResourceSet,
            ty: &ResourceType,
            property: &ResourceProperty,
        ) -> Option<&ResourceAssociationSet> {
            self.0.resource_association_set(set, ty, property)
        }
    }

    #[test]
    fn sets_without_rights_are_invisible() {
        let mut config = ServiceConfiguration::default();
        config.set_entity_set_access_rule("Customers", EntitySetRights::READ_ALL);
        let wrapper = northwind_wrapper(config);
        assert!(wrapper.resolve_resource_set("Customers").is_some());
        assert!(wrapper.resolve_resource_set("Orders").is_none());
        assert!(wrapper.resolve_resource_set("Nope").is_none());
        let names: Vec<_> = wrapper
            .resource_sets()
            .unwrap()
            .iter()
            .map(|s| s.name().to_owned())
            .collect();
        assert_eq!(names, ["Customers"]);
    }

    #[test]
    fn resolved_sets_are_cached() {
        let wrapper = northwind_wrapper(northwind_config());
        let first = wrapper.resolve_resource_set("Orders").unwrap();
        let second = wrapper.resolve_resource_set("Orders").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn association_with_hidden_end_is_none() {
        let mut config = ServiceConfiguration::default();
        config.set_entity_set_access_rule("Customers", EntitySetRights::ALL);
        let wrapper = northwind_wrapper(config);
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let customer = wrapper.resolve_resource_type("Customer").unwrap();
        let orders = customer.property("Orders").unwrap();
        assert_eq!(
            wrapper.resource_association_set(&customers, customer, orders).unwrap(),
            None
        );
        assert!(wrapper.visible_association_sets().unwrap().is_empty());
    }

    #[test]
    fn association_type_derives_from_ends() {
        let wrapper = northwind_wrapper(northwind_config());
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let customer = wrapper.resolve_resource_type("Customer").unwrap();
        let orders = customer.property("Orders").unwrap();
        let assoc = wrapper
            .resource_association_set(&customers, customer, orders)
            .unwrap()
            .unwrap();
        assert_eq!(assoc.name(), "Customers_Orders_Orders");
        assert_eq!(assoc.association_type.name(), "Customer_Orders");
        let related = wrapper
            .related_resource_set(&customers, customer, orders)
            .unwrap()
            .unwrap();
        assert_eq!(related.name(), "Orders");
    }

    #[test]
    fn visible_association_sets_are_listed_once() {
        let wrapper = northwind_wrapper(northwind_config());
        let names: Vec<_> = wrapper
            .visible_association_sets()
            .unwrap()
            .iter()
            .map(|a| a.name().to_owned())
            .collect();
        assert_eq!(
            names,
            [
                "Customers_Orders_Orders",
                "Orders_Order_Details_Order_Details",
                "Order_Details_Product_Products",
                "Employees_Manager_Employees",
            ]
        );
    }

    #[test]
    fn duplicates_and_missing_container_are_reported() {
        let wrapper = MetadataProviderWrapper::new(
            Arc::new(Doubled(northwind_model())),
            Arc::new(northwind_config()),
        );
        assert!(wrapper.container_name().is_err());
        assert_eq!(wrapper.container_namespace().unwrap(), "NorthWind");
        let err = wrapper.resource_sets().unwrap_err();
        assert!(err.message().contains("Customers"));
        let err = wrapper.types().unwrap_err();
        assert!(err.message().contains("NorthWind.Address"));
    }
}
