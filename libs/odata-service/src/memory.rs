//! In-memory query provider with a YAML/JSON data document loader.

use crate::provider::{QueryParams, QueryProvider, QueryResult, page_in_memory};
use crate::reader::EntryReader;
use indexmap::IndexMap;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    EntityInstance, MetadataProviderWrapper, PropertyKind, PropertyValue, ResourceProperty,
    ResourceSetWrapper, ResourceType,
};
use odata_uri::KeyPredicate;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;

/// A relationship between two stored entities, keys in canonical literal form.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredLink {
    source_set: String,
    source_key: String,
    property: String,
    target_set: String,
    target_key: String,
}

/// Serialized seed data: entities per set plus the links between them.
///
/// ```yaml
/// sets:
///   Customers:
///     - { CustomerID: ALFKI, CustomerName: Alfreds }
/// links:
///   - { source: "Customers('ALFKI')", property: Orders, target: "Orders(10643)" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataDocument {
    #[serde(default)]
    pub sets: IndexMap<String, Vec<serde_json::Value>>,
    #[serde(default)]
    pub links: Vec<LinkDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDefinition {
    /// `Set(key)` of the source entity.
    pub source: String,
    pub property: String,
    /// `Set(key)` of the target entity.
    pub target: String,
}

/// Entities kept in memory, per resource set.
///
/// Navigation values are attached on read for the navigation paths a
/// `$filter` or `$orderby` reads, so the built-in evaluator can follow them.
pub struct InMemoryProvider {
    wrapper: Arc<MetadataProviderWrapper>,
    sets: RwLock<IndexMap<String, Vec<EntityInstance>>>,
    links: RwLock<Vec<StoredLink>>,
    ordered_paging: bool,
}

impl std::fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("sets", &self.sets.read().keys().collect::<Vec<_>>())
            .field("links", &self.links.read().len())
            .field("ordered_paging", &self.ordered_paging)
            .finish_non_exhaustive()
    }
}

impl InMemoryProvider {
    #[must_use]
    pub fn new(wrapper: Arc<MetadataProviderWrapper>) -> Self {
        Self {
            wrapper,
            sets: RwLock::new(IndexMap::new()),
            links: RwLock::new(Vec::new()),
            ordered_paging: false,
        }
    }

    /// Let this provider apply ordering and paging itself instead of the processor.
    #[must_use]
    pub const fn with_ordered_paging(mut self, enabled: bool) -> Self {
        self.ordered_paging = enabled;
        self
    }

    /// Add entities to a set.
    ///
    /// # Errors
    /// `404` when the set is not visible.
    pub fn insert_all(&self, set: &str, entities: impl IntoIterator<Item = EntityInstance>) -> ODataResult<()> {
        self.visible_set(set)?;
        self.sets
            .write()
            .entry(set.to_owned())
            .or_default()
            .extend(entities);
        Ok(())
    }

    /// Relate two stored entities; keys are key predicate bodies.
    ///
    /// # Errors
    /// Fails on unknown sets or properties and on malformed keys.
    pub fn link(&self, source_set: &str, source_key: &str, property: &str, target_set: &str, target_key: &str) -> ODataResult<()> {
        let source = self.canonical_key(source_set, source_key)?;
        let target = self.canonical_key(target_set, target_key)?;
        let source_type = self.set_type(source_set)?;
        if !source_type.property(property).is_some_and(ResourceProperty::is_navigation) {
            return Err(ODataError::bad_request(messages::links_requires_navigation(property)));
        }
        self.links.write().push(StoredLink {
            source_set: source_set.to_owned(),
            source_key: source,
            property: property.to_owned(),
            target_set: target_set.to_owned(),
            target_key: target,
        });
        Ok(())
    }

    /// Load a data document, typing every value against the model.
    ///
    /// # Errors
    /// Unknown sets or properties, values of the wrong type, malformed link ends.
    pub fn load(&self, document: &DataDocument) -> ODataResult<()> {
        let reader = EntryReader::new(&self.wrapper);
        for (set, rows) in &document.sets {
            let ty = self.set_type(set)?;
            let entities = rows
                .iter()
                .map(|row| reader.read_json_entry(row, ty))
                .collect::<ODataResult<Vec<_>>>()?;
            self.insert_all(set, entities)?;
        }
        for link in &document.links {
            let (source_set, source_key) = split_entity_ref(&link.source)?;
            let (target_set, target_key) = split_entity_ref(&link.target)?;
            self.link(source_set, source_key, &link.property, target_set, target_key)?;
        }
        tracing::debug!(
            sets = document.sets.len(),
            links = document.links.len(),
            "loaded data document"
        );
        Ok(())
    }

    fn visible_set(&self, name: &str) -> ODataResult<Arc<ResourceSetWrapper>> {
        self.wrapper
            .resolve_resource_set(name)
            .ok_or_else(|| ODataError::not_found(messages::resource_not_found(name)))
    }

    fn set_type(&self, set: &str) -> ODataResult<&ResourceType> {
        let set = self.visible_set(set)?;
        self.wrapper.resource_type(set.type_id())
    }

    fn canonical_key(&self, set: &str, body: &str) -> ODataResult<String> {
        Ok(KeyPredicate::parse(body, self.set_type(set)?)?.to_uri_literal())
    }

    fn key_of(&self, entity: &EntityInstance) -> ODataResult<String> {
        let ty = self.wrapper.resource_type(entity.type_id())?;
        Ok(KeyPredicate::from_entity(entity, ty).to_uri_literal())
    }

    fn find(&self, set: &str, key: &str) -> ODataResult<Option<EntityInstance>> {
        let sets = self.sets.read();
        for entity in sets.get(set).map(Vec::as_slice).unwrap_or_default() {
            if self.key_of(entity)? == key {
                return Ok(Some(entity.clone()));
            }
        }
        Ok(None)
    }

    /// Keys of the entities related to `source` through `property`, from
    /// links stored in either direction.
    fn related_keys(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        property: &ResourceProperty,
    ) -> ODataResult<Vec<(String, String)>> {
        let source_key = self.key_of(source)?;
        let ty = self.wrapper.resource_type(source.type_id())?;
        let partner = self
            .wrapper
            .resource_association_set(source_set, ty, property)?
            .and_then(|assoc| {
                let (e1, e2) = (assoc.set.end1(), assoc.set.end2());
                if e1.set_name() == source_set.name() && e1.property() == Some(property.name()) {
                    e2.property().map(|p| (e2.set_name().to_owned(), p.to_owned()))
                } else {
                    e1.property().map(|p| (e1.set_name().to_owned(), p.to_owned()))
                }
            });

        let links = self.links.read();
        let mut keys = Vec::new();
        for link in links.iter() {
            if link.source_set == source_set.name() && link.property == property.name() && link.source_key == source_key {
                keys.push((link.target_set.clone(), link.target_key.clone()));
            } else if let Some((partner_set, partner_property)) = &partner
                && &link.source_set == partner_set
                && &link.property == partner_property
                && link.target_set == source_set.name()
                && link.target_key == source_key
            {
                keys.push((link.source_set.clone(), link.source_key.clone()));
            }
        }
        keys.dedup();
        Ok(keys)
    }

    fn related(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        property: &ResourceProperty,
    ) -> ODataResult<Vec<EntityInstance>> {
        let mut out = Vec::new();
        for (set, key) in self.related_keys(source_set, source, property)? {
            if let Some(entity) = self.find(&set, &key)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Attach the navigation values that `params` read.
    fn hydrate(&self, set: &ResourceSetWrapper, entity: &mut EntityInstance, params: &QueryParams<'_>) -> ODataResult<()> {
        let mut paths: Vec<Vec<ResourceProperty>> = Vec::new();
        if let Some(filter) = params.filter {
            paths.extend(
                filter
                    .navigation_paths()
                    .iter()
                    .map(|p| p.iter().map(|step| step.property.clone()).collect()),
            );
        }
        if let Some(order_by) = params.order_by {
            paths.extend(order_by.navigation_paths().iter().cloned());
        }
        for path in &paths {
            self.hydrate_path(set, entity, path)?;
        }
        Ok(())
    }

    fn hydrate_path(&self, set: &ResourceSetWrapper, entity: &mut EntityInstance, path: &[ResourceProperty]) -> ODataResult<()> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(());
        };
        if first.kind() != PropertyKind::ResourceReference {
            return Ok(());
        }
        let ty = self.wrapper.resource_type(entity.type_id())?;
        let Some(target_set) = self.wrapper.related_resource_set(set, ty, first)? else {
            return Ok(());
        };
        let existing = match entity.get(first.name()) {
            Some(PropertyValue::Reference(existing)) => Some(existing.as_deref().cloned()),
            _ => None,
        };
        let mut related = match existing {
            Some(value) => value,
            None => self.related(set, entity, first)?.into_iter().next(),
        };
        if let Some(related) = related.as_mut() {
            self.hydrate_path(&target_set, related, rest)?;
        }
        entity.set(first.name(), PropertyValue::Reference(related.map(Box::new)));
        Ok(())
    }

    fn query(&self, set: &ResourceSetWrapper, entities: Vec<EntityInstance>, params: &QueryParams<'_>) -> ODataResult<QueryResult> {
        let mut matched = Vec::with_capacity(entities.len());
        for mut entity in entities {
            self.hydrate(set, &mut entity, params)?;
            if params.filter.is_none_or(|f| f.matches(&entity)) {
                matched.push(entity);
            }
        }
        if self.ordered_paging {
            return Ok(page_in_memory(matched, params));
        }
        Ok(QueryResult::new(matched))
    }
}

fn split_entity_ref(text: &str) -> ODataResult<(&str, &str)> {
    let malformed = || ODataError::bad_request(messages::resource_not_found(text));
    let open = text.find('(').ok_or_else(malformed)?;
    let body = text[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    Ok((&text[..open], body))
}

impl QueryProvider for InMemoryProvider {
    fn handles_ordered_paging(&self) -> bool {
        self.ordered_paging
    }

    fn resource_set(&self, set: &ResourceSetWrapper, params: &QueryParams<'_>) -> ODataResult<QueryResult> {
        let rows = self.sets.read().get(set.name()).cloned().unwrap_or_default();
        self.query(set, rows, params)
    }

    fn resource_from_set(&self, set: &ResourceSetWrapper, key: &KeyPredicate) -> ODataResult<Option<EntityInstance>> {
        self.find(set.name(), &key.to_uri_literal())
    }

    fn related_resource_set(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        target_set: &ResourceSetWrapper,
        property: &ResourceProperty,
        params: &QueryParams<'_>,
    ) -> ODataResult<QueryResult> {
        let related = self.related(source_set, source, property)?;
        self.query(target_set, related, params)
    }

    fn related_resource(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        _target_set: &ResourceSetWrapper,
        property: &ResourceProperty,
    ) -> ODataResult<Option<EntityInstance>> {
        Ok(self.related(source_set, source, property)?.into_iter().next())
    }

    fn create(&self, set: &ResourceSetWrapper, entity: EntityInstance) -> ODataResult<EntityInstance> {
        let key = self.key_of(&entity)?;
        if self.find(set.name(), &key)?.is_some() {
            return Err(ODataError::bad_request(messages::provider_failure(format_args!(
                "an entity with key {key} already exists in '{}'",
                set.name()
            ))));
        }
        self.sets
            .write()
            .entry(set.name().to_owned())
            .or_default()
            .push(entity.clone());
        tracing::debug!(set = set.name(), key = %key, "entity created");
        Ok(entity)
    }

    fn update(
        &self,
        set: &ResourceSetWrapper,
        key: &KeyPredicate,
        values: EntityInstance,
        replace: bool,
    ) -> ODataResult<Option<EntityInstance>> {
        let ty = self.set_type(set.name())?;
        let mut sets = self.sets.write();
        let Some(entity) = sets
            .get_mut(set.name())
            .and_then(|rows| rows.iter_mut().find(|e| key.matches(e)))
        else {
            return Ok(None);
        };
        let keys: Vec<(String, _)> = entity.key_values(ty);
        if replace {
            let mut replaced = EntityInstance::new(entity.type_id());
            for (name, value) in keys {
                replaced.set(&name, value);
            }
            *entity = replaced;
        }
        for (name, value) in values.properties() {
            if ty.property(name).is_some_and(|p| !p.kind().is_key()) {
                entity.set(name, value.clone());
            }
        }
        tracing::debug!(set = set.name(), key = %key.to_uri_literal(), replace, "entity updated");
        Ok(Some(entity.clone()))
    }

    fn delete(&self, set: &ResourceSetWrapper, key: &KeyPredicate) -> ODataResult<bool> {
        let removed = {
            let mut sets = self.sets.write();
            let Some(rows) = sets.get_mut(set.name()) else {
                return Ok(false);
            };
            let before = rows.len();
            rows.retain(|e| !key.matches(e));
            before != rows.len()
        };
        if removed {
            let literal = key.to_uri_literal();
            self.links.write().retain(|l| {
                !(l.source_set == set.name() && l.source_key == literal)
                    && !(l.target_set == set.name() && l.target_key == literal)
            });
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_links, northwind_model, northwind_wrapper};
    use odata_uri::{FilterInfo, OrderByInfo};

    fn provider() -> (Arc<MetadataProviderWrapper>, InMemoryProvider) {
        let wrapper = Arc::new(northwind_wrapper(northwind_config()));
        let provider = InMemoryProvider::new(Arc::clone(&wrapper));
        for (set, rows) in northwind_entities(&northwind_model()) {
            provider.insert_all(&set, rows).unwrap();
        }
        for l in northwind_links() {
            provider
                .link(l.source_set, l.source_key, l.property, l.target_set, l.target_key)
                .unwrap();
        }
        (wrapper, provider)
    }

    #[test]
    fn navigation_works_in_both_directions() {
        let (wrapper, provider) = provider();
        let orders = wrapper.resolve_resource_set("Orders").unwrap();
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let order_type = wrapper.resolve_resource_type("NorthWind.Order").unwrap();
        let key = KeyPredicate::parse("10759", order_type).unwrap();
        let order = provider.resource_from_set(&orders, &key).unwrap().unwrap();
        let customer = provider
            .related_resource(&orders, &order, &customers, order_type.property("Customer").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(customer.primitive("CustomerID").and_then(|v| v.as_str()), Some("ANATR"));

        let customer_type = wrapper.resolve_resource_type("NorthWind.Customer").unwrap();
        let related = provider
            .related_resource_set(
                &customers,
                &customer,
                &orders,
                customer_type.property("Orders").unwrap(),
                &QueryParams::default(),
            )
            .unwrap();
        assert_eq!(related.entities.len(), 1);
    }

    #[test]
    fn filter_reads_hydrated_navigation() {
        let (wrapper, provider) = provider();
        let orders = wrapper.resolve_resource_set("Orders").unwrap();
        let filter = FilterInfo::parse("Customer/Country eq 'Germany'", &wrapper, &orders).unwrap();
        let result = provider
            .resource_set(&orders, &QueryParams {
                filter: Some(&filter),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(result.entities.len(), 2);
    }

    #[test]
    fn ordered_paging_is_applied_when_enabled() {
        let (wrapper, provider) = provider();
        let provider = provider.with_ordered_paging(true);
        let customers = wrapper.resolve_resource_set("Customers").unwrap();
        let order_by = OrderByInfo::parse("Rating desc", &wrapper, &customers).unwrap();
        let result = provider
            .resource_set(&customers, &QueryParams {
                order_by: Some(&order_by),
                top: Some(1),
                count: true,
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(result.entities[0].primitive("CustomerID").and_then(|v| v.as_str()), Some("BERGS"));
        assert_eq!(result.count, Some(3));
        assert!(result.has_more);
    }

    #[test]
    fn writes_change_stored_rows() {
        let (wrapper, provider) = provider();
        let products = wrapper.resolve_resource_set("Products").unwrap();
        let ty = wrapper.resolve_resource_type("NorthWind.Product").unwrap();
        let created = provider
            .create(&products, EntityInstance::new(ty.id()).with("ProductID", 9).with("ProductName", "Tofu"))
            .unwrap();
        assert!(provider.create(&products, created).is_err());

        let key = KeyPredicate::parse("9", ty).unwrap();
        let merged = provider
            .update(&products, &key, EntityInstance::new(ty.id()).with("Discontinued", true), false)
            .unwrap()
            .unwrap();
        assert_eq!(merged.primitive("ProductName").and_then(|v| v.as_str()), Some("Tofu"));
        let replaced = provider
            .update(&products, &key, EntityInstance::new(ty.id()).with("ProductName", "Konbu"), true)
            .unwrap()
            .unwrap();
        assert!(replaced.get("Discontinued").is_none());

        assert!(provider.delete(&products, &key).unwrap());
        assert!(!provider.delete(&products, &key).unwrap());
    }

    #[test]
    fn data_documents_load_from_yaml() {
        let wrapper = Arc::new(northwind_wrapper(northwind_config()));
        let provider = InMemoryProvider::new(Arc::clone(&wrapper));
        let yaml = r"
sets:
  Products:
    - { ProductID: 1, ProductName: Chai, UnitPrice: '18.00', RowVersion: 1 }
  Order_Details:
    - { OrderID: 1, ProductID: 1, Quantity: 4 }
links:
  - { source: 'Order_Details(ProductID=1,OrderID=1)', property: Product, target: 'Products(1)' }
";
        let document: DataDocument = serde_saphyr::from_str(yaml).unwrap();
        provider.load(&document).unwrap();
        let products = wrapper.resolve_resource_set("Products").unwrap();
        let rows = provider.resource_set(&products, &QueryParams::default()).unwrap();
        assert_eq!(rows.entities.len(), 1);

        let bad: DataDocument = serde_saphyr::from_str("sets:\n  Nope: []\n").unwrap();
        assert_eq!(provider.load(&bad).unwrap_err().status().as_u16(), 404);
    }
}
