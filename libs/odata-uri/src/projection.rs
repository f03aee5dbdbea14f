//! `$expand` / `$select` projection tree.

use crate::orderby::OrderByInfo;
use indexmap::IndexMap;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    MetadataProviderWrapper, PropertyKind, ResourceProperty, ResourceSetWrapper, ResourceType,
    ResourceTypeId,
};
use std::sync::Arc;

const EXPAND: &str = "$expand";
const SELECT: &str = "$select";
const STAR: &str = "*";

/// A selected property that is not expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionNode {
    property: ResourceProperty,
}

impl ProjectionNode {
    #[must_use]
    pub fn name(&self) -> &str {
        self.property.name()
    }

    #[must_use]
    pub const fn property(&self) -> &ResourceProperty {
        &self.property
    }
}

#[derive(Debug, Clone)]
pub enum ProjectionChild {
    Selected(ProjectionNode),
    Expanded(ExpandedProjectionNode),
}

/// A level of the tree: the root set, or one expanded navigation property.
#[derive(Debug, Clone)]
pub struct ExpandedProjectionNode {
    property: Option<ResourceProperty>,
    resource_set: Arc<ResourceSetWrapper>,
    resource_type: ResourceTypeId,
    /// Ordering for a paged, collection-valued expansion.
    order_by: Option<OrderByInfo>,
    children: IndexMap<String, ProjectionChild>,
    /// No `$select` narrows this level, or it selected `*`.
    select_all: bool,
    /// Some `$select` path named this level or something under it.
    selection_touched: bool,
}

impl ExpandedProjectionNode {
    fn new(
        property: Option<ResourceProperty>,
        resource_set: Arc<ResourceSetWrapper>,
        resource_type: ResourceTypeId,
        order_by: Option<OrderByInfo>,
    ) -> Self {
        Self {
            property,
            resource_set,
            resource_type,
            order_by,
            children: IndexMap::new(),
            select_all: true,
            selection_touched: false,
        }
    }

    /// The navigation property name; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.property.as_ref().map_or("", ResourceProperty::name)
    }

    #[must_use]
    pub const fn property(&self) -> Option<&ResourceProperty> {
        self.property.as_ref()
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.property
            .as_ref()
            .is_some_and(|p| p.kind() == PropertyKind::ResourceSetReference)
    }

    #[must_use]
    pub const fn resource_set(&self) -> &Arc<ResourceSetWrapper> {
        &self.resource_set
    }

    #[must_use]
    pub const fn resource_type(&self) -> ResourceTypeId {
        self.resource_type
    }

    #[must_use]
    pub const fn order_by(&self) -> Option<&OrderByInfo> {
        self.order_by.as_ref()
    }

    /// Page size of the expanded set when it is a paged collection.
    #[must_use]
    pub fn page_size(&self) -> Option<u32> {
        self.order_by
            .as_ref()
            .and_then(|_| self.resource_set.page_size())
    }

    #[must_use]
    pub const fn children(&self) -> &IndexMap<String, ProjectionChild> {
        &self.children
    }

    pub fn expanded_children(&self) -> impl Iterator<Item = &Self> {
        self.children.values().filter_map(|c| match c {
            ProjectionChild::Expanded(node) => Some(node),
            ProjectionChild::Selected(_) => None,
        })
    }

    #[must_use]
    pub fn expanded_child(&self, name: &str) -> Option<&Self> {
        match self.children.get(name) {
            Some(ProjectionChild::Expanded(node)) => Some(node),
            _ => None,
        }
    }

    #[must_use]
    pub const fn select_all(&self) -> bool {
        self.select_all
    }

    /// Whether the property `name` appears in the projected output.
    /// Expanded navigation properties always do.
    #[must_use]
    pub fn includes(&self, name: &str) -> bool {
        self.select_all || self.children.contains_key(name)
    }

    fn has_paged_descendant(&self) -> bool {
        self.expanded_children()
            .any(|c| c.page_size().is_some() || c.has_paged_descendant())
    }
}

/// Root of the projection tree for one request.
#[derive(Debug, Clone)]
pub struct RootProjectionNode {
    node: ExpandedProjectionNode,
    expansion_specified: bool,
    selection_specified: bool,
    expanded_count: usize,
    max_depth: usize,
}

struct Limits {
    max_count: Option<usize>,
    max_depth: Option<usize>,
}

impl RootProjectionNode {
    /// Build the tree for `set` from the raw `$expand` and `$select` values.
    ///
    /// # Errors
    /// Fails when an expand segment is not a navigation property or leads to
    /// an invisible set, when the configured expand count or depth is
    /// exceeded, and on malformed select paths.
    pub fn parse(
        expand: Option<&str>,
        select: Option<&str>,
        wrapper: &MetadataProviderWrapper,
        set: &Arc<ResourceSetWrapper>,
    ) -> ODataResult<Self> {
        let config = wrapper.config();
        let limits = Limits {
            max_count: config.max_expand_count,
            max_depth: config.max_expand_depth,
        };
        let mut root = Self {
            node: ExpandedProjectionNode::new(None, Arc::clone(set), set.type_id(), None),
            expansion_specified: false,
            selection_specified: false,
            expanded_count: 0,
            max_depth: 0,
        };
        if let Some(expand) = expand {
            for path in split_paths(expand, EXPAND)? {
                root.add_expand_path(&path, wrapper, &limits)?;
            }
            root.expansion_specified = true;
        }
        if let Some(select) = select {
            for path in split_paths(select, SELECT)? {
                apply_select_path(&mut root.node, &path, wrapper)?;
            }
            root.selection_specified = true;
        }
        tracing::debug!(
            expanded = root.expanded_count,
            depth = root.max_depth,
            selection = root.selection_specified,
            "built projection tree"
        );
        Ok(root)
    }

    #[must_use]
    pub const fn node(&self) -> &ExpandedProjectionNode {
        &self.node
    }

    #[must_use]
    pub const fn is_expansion_specified(&self) -> bool {
        self.expansion_specified
    }

    #[must_use]
    pub const fn is_selection_specified(&self) -> bool {
        self.selection_specified
    }

    /// Number of distinct expanded navigation properties in the tree.
    #[must_use]
    pub const fn expanded_count(&self) -> usize {
        self.expanded_count
    }

    /// Length of the longest expand path.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether any expanded collection is server-paged.
    #[must_use]
    pub fn has_paged_expanded_result(&self) -> bool {
        self.node.has_paged_descendant()
    }

    fn add_expand_path(
        &mut self,
        path: &[String],
        wrapper: &MetadataProviderWrapper,
        limits: &Limits,
    ) -> ODataResult<()> {
        if let Some(max) = limits.max_depth
            && path.len() > max
        {
            return Err(ODataError::bad_request(messages::expand_depth_exceeded(max)));
        }
        self.max_depth = self.max_depth.max(path.len());

        let mut node = &mut self.node;
        for name in path {
            if node.expanded_child(name).is_none() {
                let child = expanded_child(node, name, wrapper)?;
                self.expanded_count += 1;
                if let Some(max) = limits.max_count
                    && self.expanded_count > max
                {
                    return Err(ODataError::bad_request(messages::expand_count_exceeded(max)));
                }
                node.children
                    .insert(name.clone(), ProjectionChild::Expanded(child));
            }
            let Some(ProjectionChild::Expanded(next)) = node.children.get_mut(name) else {
                return Err(ODataError::internal(messages::expand_target_not_visible(name)));
            };
            node = next;
        }
        Ok(())
    }
}

/// Resolve `name` on `parent`'s type as an expandable navigation property.
fn expanded_child(
    parent: &ExpandedProjectionNode,
    name: &str,
    wrapper: &MetadataProviderWrapper,
) -> ODataResult<ExpandedProjectionNode> {
    let parent_type = wrapper.resource_type(parent.resource_type)?;
    let property = parent_type.property(name).ok_or_else(|| {
        ODataError::bad_request(messages::property_not_found(name, parent_type.full_name()))
    })?;
    if !property.is_navigation() {
        return Err(ODataError::bad_request(messages::expand_requires_navigation(
            name,
            parent_type.full_name(),
        )));
    }
    let target_set = wrapper
        .related_resource_set(&parent.resource_set, parent_type, property)?
        .ok_or_else(|| ODataError::bad_request(messages::expand_target_not_visible(name)))?;
    let target_type: &ResourceType = wrapper.resource_type(property.type_id())?;
    let paged = property.kind() == PropertyKind::ResourceSetReference && target_set.has_paging();
    let order_by = paged.then(|| OrderByInfo::from_keys(target_type));
    Ok(ExpandedProjectionNode::new(
        Some(property.clone()),
        target_set,
        property.type_id(),
        order_by,
    ))
}

fn apply_select_path(
    root: &mut ExpandedProjectionNode,
    path: &[String],
    wrapper: &MetadataProviderWrapper,
) -> ODataResult<()> {
    let mut node = root;
    for (i, name) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        if !node.selection_touched {
            node.selection_touched = true;
            node.select_all = false;
        }
        if name == STAR {
            if !last {
                return Err(ODataError::bad_request(messages::select_star_not_last()));
            }
            node.select_all = true;
            return Ok(());
        }
        if node.expanded_child(name).is_some() {
            let Some(ProjectionChild::Expanded(next)) = node.children.get_mut(name) else {
                return Err(ODataError::internal(messages::select_traverses_non_expanded(name)));
            };
            if last {
                next.selection_touched = true;
                next.select_all = true;
                return Ok(());
            }
            node = next;
            continue;
        }

        let ty = wrapper.resource_type(node.resource_type)?;
        let property = ty.property(name).ok_or_else(|| {
            ODataError::bad_request(messages::property_not_found(name, ty.full_name()))
        })?;
        if !last {
            return Err(ODataError::bad_request(if property.is_navigation() {
                messages::select_traverses_non_expanded(name)
            } else {
                messages::select_segment_not_last(name)
            }));
        }
        node.children
            .entry(name.clone())
            .or_insert_with(|| {
                ProjectionChild::Selected(ProjectionNode {
                    property: property.clone(),
                })
            });
    }
    Ok(())
}

/// Split `A/B, C` into `[[A, B], [C]]`.
fn split_paths(value: &str, option: &str) -> ODataResult<Vec<Vec<String>>> {
    value
        .split(',')
        .map(|item| {
            item.split('/')
                .map(|segment| {
                    let segment = segment.trim();
                    if segment.is_empty() {
                        Err(ODataError::bad_request(messages::select_empty_segment(option)))
                    } else {
                        Ok(segment.to_owned())
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_wrapper};
    use odata_model::{EntitySetRights, ServiceConfiguration};

    fn build(
        config: ServiceConfiguration,
        set: &str,
        expand: Option<&str>,
        select: Option<&str>,
    ) -> ODataResult<RootProjectionNode> {
        let wrapper = northwind_wrapper(config);
        let set = wrapper.resolve_resource_set(set).unwrap();
        RootProjectionNode::parse(expand, select, &wrapper, &set)
    }

    #[test]
    fn expand_builds_nested_nodes() {
        let root = build(
            northwind_config(),
            "Customers",
            Some("Orders/Order_Details/Product, Orders"),
            None,
        )
        .unwrap();
        assert!(root.is_expansion_specified());
        assert_eq!(root.expanded_count(), 3);
        assert_eq!(root.max_depth(), 3);
        let orders = root.node().expanded_child("Orders").unwrap();
        assert!(orders.is_collection());
        assert_eq!(orders.resource_set().name(), "Orders");
        let details = orders.expanded_child("Order_Details").unwrap();
        assert!(details.expanded_child("Product").is_some());
        assert!(root.node().includes("CustomerName"));
    }

    #[test]
    fn select_narrows_but_keeps_expanded() {
        let root = build(
            northwind_config(),
            "Customers",
            Some("Orders"),
            Some("CustomerName,Orders/ShipName"),
        )
        .unwrap();
        let node = root.node();
        assert!(node.includes("CustomerName"));
        assert!(node.includes("Orders"));
        assert!(!node.includes("Country"));
        let orders = node.expanded_child("Orders").unwrap();
        assert!(orders.includes("ShipName"));
        assert!(!orders.includes("Price"));

        let root = build(northwind_config(), "Customers", Some("Orders"), Some("CustomerName")).unwrap();
        let orders = root.node().expanded_child("Orders").unwrap();
        assert!(orders.select_all());

        let root = build(northwind_config(), "Customers", Some("Orders"), Some("Orders/*,*")).unwrap();
        assert!(root.node().select_all());
        assert!(root.node().expanded_child("Orders").unwrap().select_all());
    }

    #[test]
    fn paged_expansion_gets_key_ordering() {
        let mut config = northwind_config();
        config.set_entity_set_page_size("Orders", 2);
        let root = build(config, "Customers", Some("Orders"), None).unwrap();
        let orders = root.node().expanded_child("Orders").unwrap();
        assert_eq!(orders.page_size(), Some(2));
        assert_eq!(orders.order_by().unwrap().to_string(), "OrderID asc");
        assert!(root.has_paged_expanded_result());

        let mut config = northwind_config();
        config.set_entity_set_page_size("Customers", 2);
        let root = build(config, "Orders", Some("Customer"), None).unwrap();
        assert!(!root.has_paged_expanded_result());
    }

    #[test]
    fn expand_errors() {
        let err = build(northwind_config(), "Customers", Some("CustomerName"), None).unwrap_err();
        assert!(err.message().contains("Only navigation properties can be expanded"));
        let err = build(northwind_config(), "Customers", Some("Orders//Customer"), None).unwrap_err();
        assert!(err.message().contains("empty path segment"));

        let mut config = northwind_config();
        config.set_entity_set_access_rule("Orders", EntitySetRights::NONE);
        let err = build(config, "Customers", Some("Orders"), None).unwrap_err();
        assert!(err.message().contains("not accessible"));

        let mut config = northwind_config();
        config.max_expand_depth = Some(1);
        let err = build(config, "Customers", Some("Orders/Customer"), None).unwrap_err();
        assert!(err.message().contains("too deep"));

        let mut config = northwind_config();
        config.max_expand_count = Some(1);
        assert!(build(config.clone(), "Customers", Some("Orders,Orders"), None).is_ok());
        let err = build(config, "Customers", Some("Orders/Customer"), None).unwrap_err();
        assert!(err.message().contains("maximum number of 1"));
    }

    #[test]
    fn select_errors() {
        let err = build(northwind_config(), "Customers", None, Some("Orders/ShipName")).unwrap_err();
        assert!(err.message().contains("was not expanded"));
        let err = build(northwind_config(), "Customers", None, Some("Address/City")).unwrap_err();
        assert!(err.message().contains("must be the last segment"));
        let err = build(northwind_config(), "Customers", Some("Orders"), Some("*/ShipName")).unwrap_err();
        assert!(err.message().contains("wildcard"));
        let err = build(northwind_config(), "Customers", None, Some("Nope")).unwrap_err();
        assert!(err.message().contains("No property 'Nope'"));
        let root = build(northwind_config(), "Customers", None, Some("Orders")).unwrap();
        assert!(root.node().includes("Orders"));
        assert!(!root.is_expansion_specified());
    }
}
