//! `$expand` execution: fetches related entities level by level and attaches
//! them to the navigation slots of their parents.

use crate::provider::{QueryParams, QueryProvider, QueryResult, page_in_memory};
use odata_errors::ODataResult;
use odata_model::{EntityCollection, EntityInstance, PropertyValue, ResourceProperty, ResourceSetWrapper};
use odata_uri::{ExpandedProjectionNode, SkipTokenInfo};
use std::fmt;
use std::sync::Arc;

/// Navigation names from the root to the level being expanded.
///
/// Values are immutable; descending yields a new path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionPath {
    steps: Vec<String>,
}

impl ExpansionPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut steps = self.steps.clone();
        steps.push(name.to_owned());
        Self { steps }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for ExpansionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.steps.join("/"))
    }
}

pub struct Expander<'a> {
    provider: &'a dyn QueryProvider,
}

impl<'a> Expander<'a> {
    #[must_use]
    pub const fn new(provider: &'a dyn QueryProvider) -> Self {
        Self { provider }
    }

    /// Expand every navigation the tree below `node` names, for each of `entities`.
    ///
    /// Returns whether paging truncated any expanded collection, in which
    /// case the payload carries a next link.
    ///
    /// # Errors
    /// Provider failures.
    pub fn expand(
        &self,
        set: &ResourceSetWrapper,
        entities: &mut [EntityInstance],
        node: &ExpandedProjectionNode,
    ) -> ODataResult<bool> {
        self.expand_level(set, entities, node, &ExpansionPath::root())
    }

    fn expand_level(
        &self,
        set: &ResourceSetWrapper,
        entities: &mut [EntityInstance],
        node: &ExpandedProjectionNode,
        path: &ExpansionPath,
    ) -> ODataResult<bool> {
        let mut truncated = false;
        for child in node.expanded_children() {
            let Some(property) = child.property() else {
                continue;
            };
            let child_path = path.child(child.name());
            tracing::trace!(path = %child_path, parents = entities.len(), "expanding navigation");
            for entity in entities.iter_mut() {
                let (value, cut) = self.expand_one(set, entity, child, property, &child_path)?;
                truncated |= cut;
                entity.set(property.name(), value);
            }
        }
        Ok(truncated)
    }

    fn expand_one(
        &self,
        set: &ResourceSetWrapper,
        entity: &EntityInstance,
        child: &ExpandedProjectionNode,
        property: &ResourceProperty,
        path: &ExpansionPath,
    ) -> ODataResult<(PropertyValue, bool)> {
        let target: &Arc<ResourceSetWrapper> = child.resource_set();
        if !child.is_collection() {
            let mut related = self.provider.related_resource(set, entity, target, property)?;
            let truncated = match related.as_mut() {
                Some(related) => self.expand_level(target, std::slice::from_mut(related), child, path)?,
                None => false,
            };
            return Ok((PropertyValue::Reference(related.map(Box::new)), truncated));
        }

        let paged = QueryParams {
            order_by: child.order_by(),
            top: child.page_size().map(u64::from),
            ..QueryParams::default()
        };
        let result = if self.provider.handles_ordered_paging() {
            self.provider
                .related_resource_set(set, entity, target, property, &paged)?
        } else {
            let unpaged = QueryParams {
                order_by: child.order_by(),
                ..QueryParams::default()
            };
            let QueryResult { entities, .. } = self
                .provider
                .related_resource_set(set, entity, target, property, &unpaged)?;
            page_in_memory(entities, &paged)
        };

        let QueryResult {
            mut entities,
            has_more,
            ..
        } = result;
        let next_skiptoken = match (has_more, child.order_by(), entities.last()) {
            (true, Some(order_by), Some(last)) => Some(SkipTokenInfo::from_entity(order_by, last).to_token_string()),
            _ => None,
        };
        if next_skiptoken.is_some() {
            tracing::trace!(path = %path, "expanded collection truncated by paging");
        }
        let nested = self.expand_level(target, &mut entities, child, path)?;
        let truncated = nested || next_skiptoken.is_some();
        Ok((
            PropertyValue::Collection(EntityCollection {
                entities,
                next_skiptoken,
                count: None,
            }),
            truncated,
        ))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::InMemoryProvider;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_links, northwind_model, northwind_wrapper};
    use odata_model::{MetadataProviderWrapper, ServiceConfiguration};
    use odata_uri::RootProjectionNode;

    fn provider(config: ServiceConfiguration) -> (Arc<MetadataProviderWrapper>, InMemoryProvider) {
        let wrapper = Arc::new(northwind_wrapper(config));
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

    fn customers(wrapper: &MetadataProviderWrapper, provider: &InMemoryProvider) -> (Arc<ResourceSetWrapper>, Vec<EntityInstance>) {
        let set = wrapper.resolve_resource_set("Customers").unwrap();
        let rows = provider.resource_set(&set, &QueryParams::default()).unwrap().entities;
        (set, rows)
    }

    #[test]
    fn paths_are_values() {
        let root = ExpansionPath::root();
        let orders = root.child("Orders");
        let details = orders.child("Order_Details");
        assert_eq!(root.depth(), 0);
        assert_eq!(orders.to_string(), "Orders");
        assert_eq!(details.to_string(), "Orders/Order_Details");
    }

    #[test]
    fn nested_expansion_fills_navigation_slots() {
        let (wrapper, provider) = provider(northwind_config());
        let (set, mut rows) = customers(&wrapper, &provider);
        let tree = RootProjectionNode::parse(Some("Orders/Order_Details/Product"), None, &wrapper, &set).unwrap();
        assert!(!Expander::new(&provider).expand(&set, &mut rows, tree.node()).unwrap());

        let Some(PropertyValue::Collection(orders)) = rows[0].get("Orders") else {
            panic!("Orders not expanded");
        };
        assert_eq!(orders.entities.len(), 2);
        assert!(orders.next_skiptoken.is_none());
        let Some(PropertyValue::Collection(details)) = orders.entities[0].get("Order_Details") else {
            panic!("Order_Details not expanded");
        };
        assert_eq!(details.entities.len(), 2);
        assert!(matches!(details.entities[0].get("Product"), Some(PropertyValue::Reference(Some(_)))));
    }

    #[test]
    fn paged_expansion_leaves_a_skiptoken() {
        let mut config = northwind_config();
        config.set_entity_set_page_size("Orders", 1);
        let (wrapper, provider) = provider(config);
        let (set, mut rows) = customers(&wrapper, &provider);
        let tree = RootProjectionNode::parse(Some("Orders"), None, &wrapper, &set).unwrap();
        assert!(Expander::new(&provider).expand(&set, &mut rows, tree.node()).unwrap());

        let Some(PropertyValue::Collection(orders)) = rows[0].get("Orders") else {
            panic!("Orders not expanded");
        };
        assert_eq!(orders.entities.len(), 1);
        assert_eq!(orders.next_skiptoken.as_deref(), Some("10643"));
    }

    #[test]
    fn null_references_expand_to_none() {
        let (wrapper, provider) = provider(northwind_config());
        let set = wrapper.resolve_resource_set("Employees").unwrap();
        let mut rows = provider.resource_set(&set, &QueryParams::default()).unwrap().entities;
        let tree = RootProjectionNode::parse(Some("Manager"), None, &wrapper, &set).unwrap();
        assert!(!Expander::new(&provider).expand(&set, &mut rows, tree.node()).unwrap());
        assert!(matches!(rows[0].get("Manager"), Some(PropertyValue::Reference(Some(_)))));
        assert!(matches!(rows[1].get("Manager"), Some(PropertyValue::Reference(None))));
    }
}
