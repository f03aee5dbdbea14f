//! Programmatic construction of a [`MetadataModel`].

use crate::association::{ResourceAssociationSet, ResourceAssociationSetEnd};
use crate::primitive::EdmPrimitiveType;
use crate::property::{PropertyKind, ResourceProperty};
use crate::provider::MetadataModel;
use crate::resource_set::ResourceSet;
use crate::resource_type::{ResourceType, ResourceTypeId, ResourceTypeKind};
use crate::singleton::SingletonMetadata;
use odata_errors::{ODataError, ODataResult, messages};

#[derive(Debug, Clone)]
struct NavigationDecl {
    source_type: ResourceTypeId,
    property: String,
    target_set: String,
    partner: Option<String>,
}

/// Accumulates types, sets and navigation declarations, then freezes them.
///
/// Name uniqueness across sets and types is not enforced here; the metadata
/// wrapper reports duplicates when the service starts.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    container_name: Option<String>,
    namespace: Option<String>,
    types: Vec<ResourceType>,
    sets: Vec<ResourceSet>,
    navigations: Vec<NavigationDecl>,
    singletons: Vec<SingletonMetadata>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new(container_name: &str, namespace: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_owned());
        Self {
            container_name: non_empty(container_name),
            namespace: non_empty(namespace),
            types: EdmPrimitiveType::ALL
                .into_iter()
                .map(ResourceType::primitive)
                .collect(),
            sets: Vec::new(),
            navigations: Vec::new(),
            singletons: Vec::new(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub const fn primitive(kind: EdmPrimitiveType) -> ResourceTypeId {
        ResourceTypeId::of_primitive(kind)
    }

    /// # Errors
    /// Fails on names that break the naming rules.
    pub fn add_complex_type(&mut self, name: &str) -> ODataResult<ResourceTypeId> {
        self.push_type(name, ResourceTypeKind::Complex, None, false)
    }

    /// # Errors
    /// Fails on invalid names and on a base that is not an entity type.
    pub fn add_entity_type(
        &mut self,
        name: &str,
        base: Option<ResourceTypeId>,
        is_abstract: bool,
    ) -> ODataResult<ResourceTypeId> {
        if let Some(base_id) = base {
            let base_ty = self.type_ref(base_id)?;
            if !base_ty.is_entity() {
                return Err(ODataError::metadata(messages::base_type_not_entity(
                    name,
                    base_ty.full_name(),
                )));
            }
        }
        self.push_type(name, ResourceTypeKind::Entity, base, is_abstract)
    }

    fn push_type(
        &mut self,
        name: &str,
        kind: ResourceTypeKind,
        base: Option<ResourceTypeId>,
        is_abstract: bool,
    ) -> ODataResult<ResourceTypeId> {
        crate::property::validate_property_name(name)?;
        let id = ResourceTypeId::from_index(self.types.len());
        self.types.push(ResourceType::structured(
            id,
            kind,
            name,
            self.namespace.as_deref(),
            base,
            is_abstract,
        ));
        Ok(id)
    }

    fn type_ref(&self, id: ResourceTypeId) -> ODataResult<&ResourceType> {
        self.types
            .get(id.index())
            .ok_or_else(|| ODataError::metadata(messages::unknown_resource_type(&id.to_string())))
    }

    fn type_mut(&mut self, id: ResourceTypeId) -> ODataResult<&mut ResourceType> {
        self.types
            .get_mut(id.index())
            .ok_or_else(|| ODataError::metadata(messages::unknown_resource_type(&id.to_string())))
    }

    #[must_use]
    pub fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceType> {
        self.types.get(id.index())
    }

    /// Find a declared complex or entity type by simple name.
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<ResourceTypeId> {
        self.types
            .iter()
            .find(|t| t.kind() != ResourceTypeKind::Primitive && t.name() == name)
            .map(ResourceType::id)
    }

    /// Declare a property of any kind whose type is `property_type`.
    ///
    /// # Errors
    /// Fails when the kind does not fit the types involved or the name is taken.
    pub fn add_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        kind: PropertyKind,
        property_type: ResourceTypeId,
    ) -> ODataResult<()> {
        let property = ResourceProperty::new(name, kind, self.type_ref(property_type)?)?;
        self.type_mut(owner)?.add_property(property)
    }

    /// # Errors
    /// See [`Self::add_property`].
    pub fn add_primitive_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        kind: EdmPrimitiveType,
    ) -> ODataResult<()> {
        self.add_property(owner, name, PropertyKind::Primitive, Self::primitive(kind))
    }

    /// # Errors
    /// See [`Self::add_property`].
    pub fn add_key_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        kind: EdmPrimitiveType,
    ) -> ODataResult<()> {
        self.add_property(owner, name, PropertyKind::Key, Self::primitive(kind))
    }

    /// # Errors
    /// See [`Self::add_property`].
    pub fn add_etag_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        kind: EdmPrimitiveType,
    ) -> ODataResult<()> {
        self.add_property(owner, name, PropertyKind::ETag, Self::primitive(kind))
    }

    /// # Errors
    /// See [`Self::add_property`].
    pub fn add_complex_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        complex: ResourceTypeId,
    ) -> ODataResult<()> {
        self.add_property(owner, name, PropertyKind::ComplexType, complex)
    }

    /// A bag of primitive or complex items.
    ///
    /// # Errors
    /// See [`Self::add_property`].
    pub fn add_bag_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        item_type: ResourceTypeId,
    ) -> ODataResult<()> {
        let kind = if self.type_ref(item_type)?.kind() == ResourceTypeKind::Primitive {
            PropertyKind::PrimitiveBag
        } else {
            PropertyKind::ComplexBag
        };
        self.add_property(owner, name, kind, item_type)
    }

    /// # Errors
    /// Fails when the property is not primitive or does not exist.
    pub fn set_mime_type(&mut self, owner: ResourceTypeId, name: &str, mime_type: &str) -> ODataResult<()> {
        let ty = self.type_mut(owner)?;
        let property = ty
            .declared_properties()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| ODataError::metadata(messages::property_not_found(name, ty.full_name())))?
            .with_mime_type(mime_type)?;
        ty.replace_declared_property(property);
        Ok(())
    }

    /// # Errors
    /// Fails on non-entity types and duplicate names.
    pub fn add_named_stream(&mut self, owner: ResourceTypeId, name: &str) -> ODataResult<()> {
        self.type_mut(owner)?.add_named_stream(name)
    }

    /// # Errors
    /// Fails on non-entity types.
    pub fn set_media_link_entry(&mut self, owner: ResourceTypeId, value: bool) -> ODataResult<()> {
        self.type_mut(owner)?.set_media_link_entry(value)
    }

    /// # Errors
    /// Fails when `entity_type` is not an entity type.
    pub fn add_resource_set(&mut self, name: &str, entity_type: ResourceTypeId) -> ODataResult<()> {
        let ty = self.type_ref(entity_type)?;
        if !ty.is_entity() {
            return Err(ODataError::metadata(messages::resource_set_requires_entity_type(
                name,
                ty.full_name(),
            )));
        }
        self.sets.push(ResourceSet::new(name, entity_type));
        Ok(())
    }

    /// Navigation to at most one entity of `target_set`.
    ///
    /// # Errors
    /// Fails when the target set is unknown or the name is taken.
    pub fn add_resource_reference_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        target_set: &str,
    ) -> ODataResult<()> {
        self.add_navigation(owner, name, target_set, PropertyKind::ResourceReference)
    }

    /// Navigation to a collection of entities of `target_set`.
    ///
    /// # Errors
    /// Fails when the target set is unknown or the name is taken.
    pub fn add_resource_set_reference_property(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        target_set: &str,
    ) -> ODataResult<()> {
        self.add_navigation(owner, name, target_set, PropertyKind::ResourceSetReference)
    }

    fn add_navigation(
        &mut self,
        owner: ResourceTypeId,
        name: &str,
        target_set: &str,
        kind: PropertyKind,
    ) -> ODataResult<()> {
        let target_type = self
            .sets
            .iter()
            .find(|s| s.name() == target_set)
            .map(ResourceSet::type_id)
            .ok_or_else(|| ODataError::metadata(messages::unknown_resource_set(target_set)))?;
        if !self.type_ref(owner)?.is_entity() {
            return Err(ODataError::metadata(messages::association_end_property_not_navigation(
                self.type_ref(owner)?.full_name(),
                name,
            )));
        }
        self.add_property(owner, name, kind, target_type)?;
        self.navigations.push(NavigationDecl {
            source_type: owner,
            property: name.to_owned(),
            target_set: target_set.to_owned(),
            partner: None,
        });
        Ok(())
    }

    /// Declare two navigation properties as the two directions of one
    /// association.
    ///
    /// # Errors
    /// Fails when either property was not declared as a navigation property.
    pub fn link_navigation_properties(
        &mut self,
        first: (ResourceTypeId, &str),
        second: (ResourceTypeId, &str),
    ) -> ODataResult<()> {
        if first == second {
            return Err(ODataError::metadata(messages::self_referencing_association(
                self.type_ref(first.0)?.full_name(),
                first.1,
            )));
        }
        for ((ty, prop), (_, partner)) in [(first, second), (second, first)] {
            let full_name = self.type_ref(ty)?.full_name().to_owned();
            let decl = self
                .navigations
                .iter_mut()
                .find(|n| n.source_type == ty && n.property == prop)
                .ok_or_else(|| {
                    ODataError::metadata(messages::association_end_property_not_navigation(
                        &full_name, prop,
                    ))
                })?;
            decl.partner = Some(partner.to_owned());
        }
        Ok(())
    }

    /// # Errors
    /// Fails when the return type is unknown or not an entity type, when the
    /// entity set is unknown, and for collections without an entity set.
    pub fn add_singleton(&mut self, singleton: SingletonMetadata) -> ODataResult<()> {
        let ty = self.type_ref(singleton.return_type())?;
        if !ty.is_entity() {
            return Err(ODataError::metadata(messages::singleton_must_return_entities(
                singleton.name(),
                ty.full_name(),
            )));
        }
        if singleton.returns_collection() && singleton.entity_set().is_none() {
            return Err(ODataError::metadata(messages::singleton_collection_without_set(
                singleton.name(),
            )));
        }
        if let Some(set) = singleton.entity_set()
            && !self.sets.iter().any(|s| s.name() == set)
        {
            return Err(ODataError::metadata(messages::unknown_resource_set(set)));
        }
        self.singletons.push(singleton);
        Ok(())
    }

    /// Freeze the model: resolve inheritance, check keys and bind association sets.
    ///
    /// # Errors
    /// Fails on entity types without keys, inherited name clashes and invalid
    /// association ends.
    pub fn build(mut self) -> ODataResult<MetadataModel> {
        // Bases always precede derived types, so one pass in id order suffices.
        for index in 0..self.types.len() {
            if let Some(base) = self.types[index].base_type() {
                let base_ty = self.types[base.index()].clone();
                self.types[index].inherit_from(&base_ty)?;
            }
        }

        for ty in self.types.iter().filter(|t| t.is_entity()) {
            if ty.key_properties().next().is_none() {
                return Err(ODataError::metadata(messages::entity_type_without_key(
                    ty.full_name(),
                )));
            }
        }

        let association_sets = self.bind_association_sets()?;
        tracing::debug!(
            types = self.types.len(),
            sets = self.sets.len(),
            associations = association_sets.len(),
            "metadata model built"
        );

        Ok(MetadataModel {
            container_name: self.container_name,
            namespace: self.namespace,
            types: self.types,
            sets: self.sets,
            association_sets,
            singletons: self.singletons,
        })
    }

    fn is_assignable(&self, base: ResourceTypeId, derived: ResourceTypeId) -> bool {
        let mut current = Some(derived);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.types.get(id.index()).and_then(ResourceType::base_type);
        }
        false
    }

    fn bind_association_sets(&self) -> ODataResult<Vec<ResourceAssociationSet>> {
        let mut bound: Vec<ResourceAssociationSet> = Vec::new();
        for set in &self.sets {
            for nav in &self.navigations {
                let applies = self.is_assignable(nav.source_type, set.type_id())
                    || self.is_assignable(set.type_id(), nav.source_type);
                if !applies {
                    continue;
                }
                let Some(target) = self.sets.iter().find(|s| s.name() == nav.target_set) else {
                    return Err(ODataError::metadata(messages::unknown_resource_set(&nav.target_set)));
                };
                let target_type = self
                    .navigations
                    .iter()
                    .find(|n| {
                        nav.partner.as_deref() == Some(n.property.as_str())
                            && n.partner.as_deref() == Some(nav.property.as_str())
                    })
                    .map_or(target.type_id(), |n| n.source_type);

                let end1 = ResourceAssociationSetEnd::new(set.name(), nav.source_type, Some(&nav.property));
                let end2 = ResourceAssociationSetEnd::new(target.name(), target_type, nav.partner.as_deref());

                // The partner direction was already bound from the other side.
                if nav.partner.is_some() && bound.iter().any(|a| a.end1() == &end2 && a.end2() == &end1) {
                    continue;
                }
                let name = format!("{}_{}_{}", set.name(), nav.property, target.name());
                bound.push(ResourceAssociationSet::new(name, end1, end2)?);
            }
        }
        Ok(bound)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::provider::MetadataProvider;

    fn base_builder() -> (ModelBuilder, ResourceTypeId, ResourceTypeId) {
        let mut b = ModelBuilder::new("NorthWindEntities", "NorthWind");
        let customer = b.add_entity_type("Customer", None, false).unwrap();
        b.add_key_property(customer, "CustomerID", EdmPrimitiveType::String).unwrap();
        let order = b.add_entity_type("Order", None, false).unwrap();
        b.add_key_property(order, "OrderID", EdmPrimitiveType::Int32).unwrap();
        b.add_resource_set("Customers", customer).unwrap();
        b.add_resource_set("Orders", order).unwrap();
        (b, customer, order)
    }

    #[test]
    fn primitive_types_are_prepopulated() {
        let model = ModelBuilder::new("C", "N").build().unwrap();
        let int32 = model.primitive_type(EdmPrimitiveType::Int32);
        assert_eq!(int32.full_name(), "Edm.Int32");
        assert_eq!(
            model.resolve_resource_type("Edm.Guid").map(ResourceType::id),
            Some(ResourceTypeId::of_primitive(EdmPrimitiveType::Guid))
        );
        assert!(model.types().is_empty());
    }

    #[test]
    fn entity_types_need_keys() {
        let mut b = ModelBuilder::new("C", "N");
        b.add_entity_type("Keyless", None, false).unwrap();
        let err = b.build().unwrap_err();
        assert!(err.message().contains("N.Keyless"));
    }

    #[test]
    fn bidirectional_navigation_binds_one_association_set() {
        let (mut b, customer, order) = base_builder();
        b.add_resource_set_reference_property(customer, "Orders", "Orders").unwrap();
        b.add_resource_reference_property(order, "Customer", "Customers").unwrap();
        b.link_navigation_properties((customer, "Orders"), (order, "Customer"))
            .unwrap();
        let model = b.build().unwrap();
        let sets: Vec<_> = model.association_sets().collect();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name(), "Customers_Orders_Orders");
        assert_eq!(sets[0].end2().property(), Some("Customer"));
    }

    #[test]
    fn unidirectional_navigation_leaves_target_end_open() {
        let (mut b, _customer, order) = base_builder();
        b.add_resource_reference_property(order, "Customer", "Customers").unwrap();
        let model = b.build().unwrap();
        let orders = model.resolve_resource_set("Orders").unwrap();
        let order_ty = model.resource_type(order).unwrap();
        let prop = order_ty.property("Customer").unwrap();
        let assoc = model.resource_association_set(orders, order_ty, prop).unwrap();
        assert_eq!(assoc.end2().set_name(), "Customers");
        assert_eq!(assoc.end2().property(), None);
    }

    #[test]
    fn navigation_to_unknown_set_fails() {
        let (mut b, customer, _) = base_builder();
        assert!(b.add_resource_set_reference_property(customer, "Things", "Things").is_err());
    }

    #[test]
    fn derived_types_inherit_keys_and_navigation() {
        let (mut b, customer, _order) = base_builder();
        b.add_resource_set_reference_property(customer, "Orders", "Orders").unwrap();
        let vip = b.add_entity_type("VipCustomer", Some(customer), false).unwrap();
        b.add_primitive_property(vip, "Level", EdmPrimitiveType::Int32).unwrap();
        let model = b.build().unwrap();
        let vip_ty = model.resource_type(vip).unwrap();
        assert_eq!(vip_ty.key_properties().count(), 1);
        let customers = model.resolve_resource_set("Customers").unwrap();
        let prop = vip_ty.property("Orders").unwrap();
        assert!(model.resource_association_set(customers, vip_ty, prop).is_some());
        let customer_ty = model.resource_type(customer).unwrap();
        assert!(model.has_derived_types(customer_ty));
    }

    #[test]
    fn inherited_name_clash_fails_at_build() {
        let (mut b, customer, _) = base_builder();
        let vip = b.add_entity_type("VipCustomer", Some(customer), false).unwrap();
        b.add_primitive_property(vip, "CustomerID", EdmPrimitiveType::String)
            .unwrap();
        assert!(b.build().is_err());
    }

    #[test]
    fn complex_types_cannot_be_bases() {
        let mut b = ModelBuilder::new("C", "N");
        let address = b.add_complex_type("Address").unwrap();
        assert!(b.add_entity_type("Bad", Some(address), false).is_err());
    }

    #[test]
    fn singletons_return_entities_from_a_set() {
        let (mut b, customer, _) = base_builder();
        let address = b.add_complex_type("Address").unwrap();
        let err = b
            .add_singleton(SingletonMetadata::new("Headquarters", address).unwrap())
            .unwrap_err();
        assert!(err.message().contains("'Headquarters'"));

        let err = b
            .add_singleton(SingletonMetadata::new("AllCustomers", customer).unwrap().returning_collection())
            .unwrap_err();
        assert!(err.message().contains("entity set"));

        b.add_singleton(
            SingletonMetadata::new("AllCustomers", customer)
                .unwrap()
                .returning_collection()
                .in_entity_set("Customers"),
        )
        .unwrap();
        b.add_singleton(SingletonMetadata::new("Someone", customer).unwrap()).unwrap();
        assert_eq!(b.build().unwrap().singletons().len(), 2);
    }

    #[test]
    fn mime_type_only_on_primitive() {
        let (mut b, customer, _) = base_builder();
        b.add_primitive_property(customer, "Photo", EdmPrimitiveType::Binary).unwrap();
        b.set_mime_type(customer, "Photo", "image/png").unwrap();
        b.add_resource_set_reference_property(customer, "Orders", "Orders").unwrap();
        assert!(b.set_mime_type(customer, "Orders", "text/plain").is_err());
        let model = b.build().unwrap();
        let ty = model.resource_type(customer).unwrap();
        assert_eq!(ty.property("Photo").and_then(ResourceProperty::mime_type), Some("image/png"));
    }
}
