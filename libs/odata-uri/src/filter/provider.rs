//! Translation of a checked expression tree into a provider-native form.

use super::ast::{BinaryOperator, Expression, ExpressionType, Function, PathStep, UnaryOperator};
use odata_errors::ODataResult;
use odata_model::PrimitiveValue;

/// Bottom-up visitor a query provider implements to turn a `$filter` tree
/// into its own predicate representation (SQL fragment, closure, ...).
///
/// Children are translated before their parent, so each callback receives
/// already-translated operands.
pub trait ExpressionProvider {
    type Output;

    /// # Errors
    /// Provider-specific.
    fn constant(&mut self, value: &PrimitiveValue, ty: ExpressionType) -> ODataResult<Self::Output>;

    /// # Errors
    /// Provider-specific.
    fn property(&mut self, path: &[PathStep], ty: ExpressionType) -> ODataResult<Self::Output>;

    /// # Errors
    /// Provider-specific.
    fn unary(
        &mut self,
        op: UnaryOperator,
        operand: Self::Output,
        ty: ExpressionType,
    ) -> ODataResult<Self::Output>;

    /// # Errors
    /// Provider-specific.
    fn binary(
        &mut self,
        op: BinaryOperator,
        left: Self::Output,
        right: Self::Output,
        ty: ExpressionType,
    ) -> ODataResult<Self::Output>;

    /// # Errors
    /// Provider-specific.
    fn call(
        &mut self,
        function: Function,
        args: Vec<Self::Output>,
        ty: ExpressionType,
    ) -> ODataResult<Self::Output>;
}

/// Walk `expression` bottom-up through `provider`.
///
/// # Errors
/// Propagates the first provider failure.
pub fn translate<P: ExpressionProvider + ?Sized>(
    expression: &Expression,
    provider: &mut P,
) -> ODataResult<P::Output> {
    match expression {
        Expression::Constant { value, ty } => provider.constant(value, *ty),
        Expression::Property { path, ty } => provider.property(path, *ty),
        Expression::Unary { op, operand, ty } => {
            let operand = translate(operand, provider)?;
            provider.unary(*op, operand, *ty)
        }
        Expression::Binary { op, left, right, ty } => {
            let left = translate(left, provider)?;
            let right = translate(right, provider)?;
            provider.binary(*op, left, right, *ty)
        }
        Expression::Call { function, args, ty } => {
            let args = args
                .iter()
                .map(|arg| translate(arg, provider))
                .collect::<ODataResult<Vec<_>>>()?;
            provider.call(*function, args, *ty)
        }
    }
}

/// Renders the tree back to fully parenthesised `$filter` text.
///
/// Used for logging compiled requests and by hosts that forward the
/// predicate to another OData service.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalText;

impl ExpressionProvider for CanonicalText {
    type Output = String;

    fn constant(&mut self, value: &PrimitiveValue, _ty: ExpressionType) -> ODataResult<String> {
        Ok(value.to_uri_literal())
    }

    fn property(&mut self, path: &[PathStep], _ty: ExpressionType) -> ODataResult<String> {
        Ok(Expression::path_text(path))
    }

    fn unary(&mut self, op: UnaryOperator, operand: String, _ty: ExpressionType) -> ODataResult<String> {
        Ok(match op {
            UnaryOperator::Not => format!("not {operand}"),
            UnaryOperator::Negate => format!("-{operand}"),
        })
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        left: String,
        right: String,
        _ty: ExpressionType,
    ) -> ODataResult<String> {
        Ok(format!("({left} {op} {right})"))
    }

    fn call(&mut self, function: Function, args: Vec<String>, _ty: ExpressionType) -> ODataResult<String> {
        Ok(format!("{}({})", function.name(), args.join(",")))
    }
}
