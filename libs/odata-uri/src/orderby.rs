//! `$orderby`: ordering clauses plus key synthesis for stable paging.

use crate::lexer::{TokenKind, TokenStream};
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    EdmPrimitiveType, EntityInstance, MetadataProviderWrapper, PrimitiveValue, PropertyKind,
    ResourceProperty, ResourceSetWrapper, ResourceType,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

const OPTION: &str = "$orderby";

/// One ordering clause: a property path ending at a primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByClause {
    path: Vec<ResourceProperty>,
    ascending: bool,
}

impl OrderByClause {
    #[must_use]
    pub fn path(&self) -> &[ResourceProperty] {
        &self.path
    }

    #[must_use]
    pub const fn ascending(&self) -> bool {
        self.ascending
    }

    /// Kind of the primitive the path ends at.
    #[must_use]
    pub fn kind(&self) -> EdmPrimitiveType {
        self.path
            .last()
            .and_then(ResourceProperty::primitive_kind)
            .unwrap_or(EdmPrimitiveType::String)
    }

    /// `Customer/Address/City`
    #[must_use]
    pub fn path_text(&self) -> String {
        self.path
            .iter()
            .map(ResourceProperty::name)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The value this clause sorts `entity` by; null when unreachable.
    #[must_use]
    pub fn value_of(&self, entity: &EntityInstance) -> PrimitiveValue {
        entity
            .resolve_path(self.path.iter().map(ResourceProperty::name))
            .cloned()
            .unwrap_or(PrimitiveValue::Null)
    }

    fn covers_key(&self, key: &ResourceProperty) -> bool {
        matches!(self.path.as_slice(), [only] if only.name() == key.name())
    }
}

/// Compiled ordering for a collection.
///
/// Explicit clauses come first; synthesized key clauses, when present,
/// follow them so that the order is total.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderByInfo {
    clauses: Vec<OrderByClause>,
    synthesized: usize,
    navigation_paths: Vec<Vec<ResourceProperty>>,
}

impl OrderByInfo {
    /// Parse an explicit `$orderby` value against the type of `set`.
    ///
    /// # Errors
    /// Fails on empty input, unknown properties, paths that do not end at a
    /// primitive, and paths through bags or collection navigations.
    pub fn parse(
        text: &str,
        wrapper: &MetadataProviderWrapper,
        set: &Arc<ResourceSetWrapper>,
    ) -> ODataResult<Self> {
        if text.trim().is_empty() {
            return Err(ODataError::bad_request(messages::orderby_empty()));
        }
        let root = wrapper.resource_type(set.type_id())?;
        let mut tokens = TokenStream::new(text)?;
        let mut info = Self::default();
        loop {
            let path = info.parse_path(&mut tokens, wrapper, set, root)?;
            let ascending = if tokens.peek().is_keyword("desc") {
                tokens.advance();
                false
            } else {
                if tokens.peek().is_keyword("asc") {
                    tokens.advance();
                }
                true
            };
            info.clauses.push(OrderByClause { path, ascending });
            if !tokens.eat(&TokenKind::Comma) {
                break;
            }
        }
        tokens.expect_end()?;
        tracing::debug!(orderby = %info, "parsed $orderby");
        Ok(info)
    }

    /// Ascending order over the key properties of `ty`, in declaration order.
    #[must_use]
    pub fn from_keys(ty: &ResourceType) -> Self {
        Self::default().with_key_synthesis(ty)
    }

    /// Append ascending key clauses for every key of `ty` that no explicit
    /// single-step clause already orders by.
    #[must_use]
    pub fn with_key_synthesis(mut self, ty: &ResourceType) -> Self {
        for key in ty.key_properties() {
            if self.clauses.iter().any(|c| c.covers_key(key)) {
                continue;
            }
            self.clauses.push(OrderByClause {
                path: vec![key.clone()],
                ascending: true,
            });
            self.synthesized += 1;
        }
        self
    }

    #[must_use]
    pub fn clauses(&self) -> &[OrderByClause] {
        &self.clauses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of trailing clauses added by key synthesis.
    #[must_use]
    pub const fn synthesized(&self) -> usize {
        self.synthesized
    }

    /// Navigation prefixes the clauses traverse, each listed once.
    #[must_use]
    pub fn navigation_paths(&self) -> &[Vec<ResourceProperty>] {
        &self.navigation_paths
    }

    /// Compare two entities clause by clause; nulls sort first.
    #[must_use]
    pub fn compare(&self, left: &EntityInstance, right: &EntityInstance) -> Ordering {
        self.compare_values(&self.values_of(left), &self.values_of(right))
    }

    /// Compare two ordering key tuples as produced by [`Self::values_of`].
    #[must_use]
    pub fn compare_values(&self, left: &[PrimitiveValue], right: &[PrimitiveValue]) -> Ordering {
        self.clauses
            .iter()
            .zip(left.iter().zip(right))
            .map(|(clause, (l, r))| {
                let ordering = l.compare(r).unwrap_or(Ordering::Equal);
                if clause.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Ordering key tuple of `entity`.
    #[must_use]
    pub fn values_of(&self, entity: &EntityInstance) -> Vec<PrimitiveValue> {
        self.clauses.iter().map(|c| c.value_of(entity)).collect()
    }

    /// Sort `entities` in place; the sort is stable.
    pub fn sort(&self, entities: &mut [EntityInstance]) {
        entities.sort_by(|a, b| self.compare(a, b));
    }

    fn parse_path(
        &mut self,
        tokens: &mut TokenStream,
        wrapper: &MetadataProviderWrapper,
        set: &Arc<ResourceSetWrapper>,
        root: &ResourceType,
    ) -> ODataResult<Vec<ResourceProperty>> {
        let mut path: Vec<ResourceProperty> = Vec::new();
        let mut current_type = root;
        let mut current_set = Arc::clone(set);
        loop {
            let (name, _) = tokens.expect_identifier()?;
            let property = current_type
                .property(&name)
                .ok_or_else(|| {
                    ODataError::bad_request(messages::property_not_found(
                        &name,
                        current_type.full_name(),
                    ))
                })?
                .clone();
            match property.kind() {
                PropertyKind::PrimitiveBag | PropertyKind::ComplexBag => {
                    return Err(ODataError::bad_request(messages::bag_property_not_allowed(
                        &name, OPTION,
                    )));
                }
                PropertyKind::ResourceSetReference => {
                    return Err(ODataError::bad_request(
                        messages::navigation_collection_not_allowed(&name, OPTION),
                    ));
                }
                PropertyKind::Primitive | PropertyKind::Key | PropertyKind::ETag => {
                    if property.primitive_kind() == Some(EdmPrimitiveType::Binary) {
                        return Err(ODataError::bad_request(
                            messages::binary_property_not_allowed(&name, OPTION),
                        ));
                    }
                    path.push(property);
                    if tokens.peek().kind == TokenKind::Slash {
                        let text = path_text(&path);
                        return Err(ODataError::bad_request(messages::orderby_requires_primitive(
                            &text,
                        )));
                    }
                    return Ok(path);
                }
                PropertyKind::ComplexType => {
                    current_type = wrapper.resource_type(property.type_id())?;
                    path.push(property);
                }
                PropertyKind::ResourceReference => {
                    let related = wrapper
                        .related_resource_set(&current_set, current_type, &property)?
                        .ok_or_else(|| {
                            ODataError::bad_request(messages::property_not_found(
                                &name,
                                current_type.full_name(),
                            ))
                        })?;
                    current_type = wrapper.resource_type(property.type_id())?;
                    current_set = related;
                    path.push(property);
                    if !self.navigation_paths.contains(&path) {
                        self.navigation_paths.push(path.clone());
                    }
                }
            }
            if !tokens.eat(&TokenKind::Slash) {
                return Err(ODataError::bad_request(messages::orderby_requires_primitive(
                    &path_text(&path),
                )));
            }
        }
    }
}

fn path_text(path: &[ResourceProperty]) -> String {
    path.iter().map(ResourceProperty::name).collect::<Vec<_>>().join("/")
}

impl fmt::Display for OrderByInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let direction = if clause.ascending { "asc" } else { "desc" };
            write!(f, "{} {direction}", clause.path_text())?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::MetadataProvider;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};

    fn parse_on(set: &str, text: &str) -> ODataResult<OrderByInfo> {
        let wrapper = northwind_wrapper(northwind_config());
        let set = wrapper.resolve_resource_set(set).unwrap();
        OrderByInfo::parse(text, &wrapper, &set)
    }

    #[test]
    fn clauses_with_direction() {
        let info = parse_on("Orders", "ShipName desc, Customer/Address/City,OrderID asc").unwrap();
        assert_eq!(info.to_string(), "ShipName desc,Customer/Address/City asc,OrderID asc");
        assert_eq!(info.navigation_paths().len(), 1);
        assert_eq!(info.clauses()[1].kind(), EdmPrimitiveType::String);
    }

    #[test]
    fn key_synthesis_skips_covered_keys() {
        let model = northwind_model();
        let customer = model.resolve_resource_type("Customer").unwrap();
        let info = OrderByInfo::from_keys(customer);
        assert_eq!(info.to_string(), "CustomerID asc,CustomerGuid asc");
        assert_eq!(info.synthesized(), 2);

        let info = parse_on("Customers", "CustomerGuid desc,Country")
            .unwrap()
            .with_key_synthesis(customer);
        assert_eq!(info.to_string(), "CustomerGuid desc,Country asc,CustomerID asc");
        assert_eq!(info.synthesized(), 1);
    }

    #[test]
    fn rejected_paths() {
        assert!(parse_on("Orders", "").unwrap_err().message().contains("at least one"));
        let err = parse_on("Customers", "Address").unwrap_err();
        assert!(err.message().contains("must end with a primitive"));
        let err = parse_on("Orders", "Customer").unwrap_err();
        assert!(err.message().contains("'Customer'"));
        let err = parse_on("Orders", "ShipName/Foo").unwrap_err();
        assert!(err.message().contains("ShipName"));
        let err = parse_on("Customers", "Orders/OrderID").unwrap_err();
        assert!(err.message().contains("refers to a collection"));
        assert!(parse_on("Employees", "Emails").is_err());
        assert!(parse_on("Customers", "Photo").is_err());
        assert!(parse_on("Orders", "ShipName sideways").is_err());
    }

    #[test]
    fn sorts_entities_with_nulls_first() {
        let model = northwind_model();
        let mut customers = northwind_entities(&model).swap_remove("Customers").unwrap();
        customers[1].set("Country", PrimitiveValue::Null);
        let info = parse_on("Customers", "Country desc").unwrap();
        info.sort(&mut customers);
        let ids: Vec<_> = customers
            .iter()
            .map(|c| c.primitive("CustomerID").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(ids, ["BERGS", "ALFKI", "ANATR"]);

        let info = parse_on("Customers", "Rating").unwrap();
        info.sort(&mut customers);
        let ratings: Vec<_> = customers.iter().map(|c| info.values_of(c)).collect();
        assert!(ratings.windows(2).all(|w| info.compare_values(&w[0], &w[1]).is_le()));
    }
}
