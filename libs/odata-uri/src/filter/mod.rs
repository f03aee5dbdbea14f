//! `$filter`: parsing, type checking, translation and in-memory evaluation.

pub mod ast;
pub mod evaluator;
pub mod functions;
mod parser;
pub mod provider;

pub use ast::{BinaryOperator, Expression, ExpressionType, Function, PathStep, UnaryOperator};
pub use parser::MAX_DEPTH;
pub use provider::{CanonicalText, ExpressionProvider, translate};

use odata_errors::ODataResult;
use odata_model::{EntityInstance, MetadataProviderWrapper, ResourceSetWrapper};
use std::sync::Arc;

/// A checked `$filter` predicate plus the navigation paths it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterInfo {
    expression: Expression,
    navigation_paths: Vec<Vec<PathStep>>,
}

impl FilterInfo {
    /// Parse `text` against the entity type of `set`.
    ///
    /// # Errors
    /// Syntax errors, unknown properties, properties that cannot be filtered
    /// on (bags, binary values, collection navigations), operand type
    /// mismatches, and a result that is not `Edm.Boolean`.
    pub fn parse(
        text: &str,
        wrapper: &MetadataProviderWrapper,
        set: &Arc<ResourceSetWrapper>,
    ) -> ODataResult<Self> {
        let root = wrapper.resource_type(set.type_id())?;
        let mut parser = parser::Parser::new(text, wrapper, Arc::clone(set), root)?;
        let expression = parser.parse_filter()?;
        tracing::debug!(
            filter = %text,
            navigations = parser.navigations.len(),
            "parsed $filter"
        );
        Ok(Self {
            expression,
            navigation_paths: parser.navigations,
        })
    }

    #[must_use]
    pub const fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Every navigation path the predicate traverses, prefixes included,
    /// in first-use order.
    #[must_use]
    pub fn navigation_paths(&self) -> &[Vec<PathStep>] {
        &self.navigation_paths
    }

    #[must_use]
    pub fn matches(&self, entity: &EntityInstance) -> bool {
        evaluator::matches(&self.expression, entity)
    }

    /// Canonical, fully parenthesised text of the predicate.
    #[must_use]
    pub fn canonical_text(&self) -> String {
        translate(&self.expression, &mut CanonicalText).unwrap_or_default()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_wrapper};
    use odata_model::{EdmPrimitiveType, EntitySetRights};

    fn parse(text: &str) -> ODataResult<FilterInfo> {
        parse_on("Orders", text)
    }

    fn parse_on(set: &str, text: &str) -> ODataResult<FilterInfo> {
        let wrapper = northwind_wrapper(northwind_config());
        let set = wrapper.resolve_resource_set(set).unwrap();
        FilterInfo::parse(text, &wrapper, &set)
    }

    #[test]
    fn precedence_is_reflected_in_canonical_text() {
        let info = parse("OrderID add 2 mul 3 gt 10 and not (ShipName eq 'x') or Price lt 1.5M").unwrap();
        assert_eq!(
            info.canonical_text(),
            "((((OrderID add (2 mul 3)) gt 10) and not (ShipName eq 'x')) or (Price lt 1.5M))"
        );
    }

    #[test]
    fn numeric_promotion_types_the_tree() {
        let info = parse("OrderID add 1L eq 2").unwrap();
        let Expression::Binary { left, .. } = info.expression() else {
            panic!("expected binary");
        };
        assert_eq!(left.ty(), ExpressionType::Primitive(EdmPrimitiveType::Int64));
    }

    #[test]
    fn navigation_paths_are_recorded() {
        let info = parse("Customer/CustomerName eq 'A' and Customer/Address/City eq 'B'").unwrap();
        let paths: Vec<_> = info
            .navigation_paths()
            .iter()
            .map(|p| Expression::path_text(p))
            .collect();
        assert_eq!(paths, ["Customer"]);

        let info = parse_on("Order_Details", "Order/Customer/Country eq 'DE'").unwrap();
        let paths: Vec<_> = info
            .navigation_paths()
            .iter()
            .map(|p| Expression::path_text(p))
            .collect();
        assert_eq!(paths, ["Order", "Order/Customer"]);
    }

    #[test]
    fn null_comparisons_on_structured_values() {
        assert!(parse("Customer eq null").is_ok());
        assert!(parse("Customer eq 'x'").is_err());
        assert!(parse_on("Customers", "Address eq null").is_ok());
        assert!(parse_on("Customers", "Address gt null").is_err());
    }

    #[test]
    fn rejects_unfilterable_properties() {
        let err = parse_on("Customers", "Orders eq null").unwrap_err();
        assert!(err.message().contains("refers to a collection"));
        let err = parse_on("Customers", "Photo eq null").unwrap_err();
        assert!(err.message().contains("Edm.Binary"));
        let err = parse_on("Employees", "Emails eq null").unwrap_err();
        assert!(err.message().contains("bag property"));
        let err = parse("Nope eq 1").unwrap_err();
        assert!(err.message().contains("No property 'Nope'"));
        let err = parse("ShipName/Length eq 1").unwrap_err();
        assert!(err.message().contains("is primitive"));
    }

    #[test]
    fn type_errors() {
        let err = parse("ShipName add 1 eq 2").unwrap_err();
        assert!(err.message().contains("Operator 'add'"));
        let err = parse("OrderID").unwrap_err();
        assert!(err.message().contains("Edm.Int32"));
        let err = parse("OrderID eq 1 and 2").unwrap_err();
        assert!(err.message().contains("Operator 'and'"));
        let err = parse("-ShipName eq 'a'").unwrap_err();
        assert!(err.message().contains("Operator '-'"));
        let err = parse("isof(ShipName)").unwrap_err();
        assert!(err.message().contains("Unknown function 'isof'"));
        let err = parse("length(OrderID) eq 1").unwrap_err();
        assert!(err.message().contains("No applicable function"));
        assert!(parse("OrderDate lt datetime'2012-01-01T00:00'").is_ok());
        assert!(parse("ShipName lt 'M'").is_ok());
    }

    #[test]
    fn syntax_errors_report_position() {
        let err = parse("OrderID eq").unwrap_err();
        assert!(err.message().contains("position 10"));
        let err = parse("(OrderID eq 1").unwrap_err();
        assert!(err.message().contains("')'"));
        assert!(parse("OrderID eq 1 2").is_err());
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let deep = format!("{}true{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        let err = parse(&deep).unwrap_err();
        assert!(err.message().contains("maximum nesting depth"));
        let ok = format!("{}true{}", "(".repeat(10), ")".repeat(10));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn navigation_to_hidden_set_is_unknown() {
        let mut config = northwind_config();
        config.set_entity_set_access_rule("Customers", EntitySetRights::NONE);
        let wrapper = northwind_wrapper(config);
        let set = wrapper.resolve_resource_set("Orders").unwrap();
        let err = FilterInfo::parse("Customer/Country eq 'x'", &wrapper, &set).unwrap_err();
        assert!(err.message().contains("No property 'Customer'"));
    }
}
