//! Recursive-descent parser and type checker for `$filter`.
//!
//! Precedence, loosest first: `or`, `and`, comparison, additive,
//! multiplicative, unary (`not`, `-`), primary.

use super::ast::{
    BinaryOperator, Expression, ExpressionType, Function, PathStep, UnaryOperator,
};
use crate::lexer::{TokenKind, TokenStream};
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    EdmPrimitiveType, MetadataProviderWrapper, PropertyKind, ResourceSetWrapper, ResourceType,
};
use std::sync::Arc;

/// Nesting limit for parentheses, unary operators and function arguments.
pub const MAX_DEPTH: usize = 100;

const OPTION: &str = "$filter";

pub(super) struct Parser<'a> {
    tokens: TokenStream,
    wrapper: &'a MetadataProviderWrapper,
    set: Arc<ResourceSetWrapper>,
    root: &'a ResourceType,
    depth: usize,
    pub(super) navigations: Vec<Vec<PathStep>>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(
        text: &str,
        wrapper: &'a MetadataProviderWrapper,
        set: Arc<ResourceSetWrapper>,
        root: &'a ResourceType,
    ) -> ODataResult<Self> {
        Ok(Self {
            tokens: TokenStream::new(text)?,
            wrapper,
            set,
            root,
            depth: 0,
            navigations: Vec::new(),
        })
    }

    /// Parse the whole input as one boolean expression.
    pub(super) fn parse_filter(&mut self) -> ODataResult<Expression> {
        let expression = self.parse_or()?;
        self.tokens.expect_end()?;
        match expression.ty() {
            ExpressionType::Primitive(EdmPrimitiveType::Boolean) => Ok(expression),
            other => Err(ODataError::bad_request(messages::filter_not_boolean(other))),
        }
    }

    fn enter(&mut self) -> ODataResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ODataError::bad_request(messages::expression_too_deep(MAX_DEPTH)));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// The binary operator keyword at the cursor, if it is one of `accepted`.
    fn peek_operator(&self, accepted: fn(BinaryOperator) -> bool) -> Option<(BinaryOperator, usize)> {
        let token = self.tokens.peek();
        token
            .identifier()
            .and_then(BinaryOperator::from_keyword)
            .filter(|op| accepted(*op))
            .map(|op| (op, token.position))
    }

    fn parse_or(&mut self) -> ODataResult<Expression> {
        let mut left = self.parse_and()?;
        while let Some((op, position)) = self.peek_operator(|op| op == BinaryOperator::Or) {
            self.tokens.advance();
            let right = self.parse_and()?;
            left = binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ODataResult<Expression> {
        let mut left = self.parse_comparison()?;
        while let Some((op, position)) = self.peek_operator(|op| op == BinaryOperator::And) {
            self.tokens.advance();
            let right = self.parse_comparison()?;
            left = binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ODataResult<Expression> {
        let mut left = self.parse_additive()?;
        while let Some((op, position)) =
            self.peek_operator(|op| op.is_equality() || op.is_relational())
        {
            self.tokens.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ODataResult<Expression> {
        let mut left = self.parse_multiplicative()?;
        while let Some((op, position)) =
            self.peek_operator(|op| matches!(op, BinaryOperator::Add | BinaryOperator::Sub))
        {
            self.tokens.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ODataResult<Expression> {
        let mut left = self.parse_unary()?;
        while let Some((op, position)) = self.peek_operator(|op| {
            matches!(op, BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod)
        }) {
            self.tokens.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ODataResult<Expression> {
        let token = self.tokens.peek();
        let position = token.position;
        let op = if token.kind == TokenKind::Minus {
            UnaryOperator::Negate
        } else if token.is_keyword("not") && self.tokens.peek_at(1).kind != TokenKind::Slash {
            UnaryOperator::Not
        } else {
            return self.parse_primary();
        };
        self.tokens.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        unary(op, operand, position)
    }

    fn parse_primary(&mut self) -> ODataResult<Expression> {
        let token = self.tokens.peek().clone();
        match token.kind {
            TokenKind::OpenParen => {
                self.tokens.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.tokens.expect(&TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Literal(value) => {
                self.tokens.advance();
                let ty = value
                    .kind()
                    .map_or(ExpressionType::Null, ExpressionType::Primitive);
                Ok(Expression::Constant { value, ty })
            }
            TokenKind::Identifier(name) => {
                if self.tokens.peek_at(1).kind == TokenKind::OpenParen {
                    self.parse_call(&name, token.position)
                } else {
                    self.parse_member_access()
                }
            }
            _ => Err(self.tokens.unexpected("expression")),
        }
    }

    fn parse_call(&mut self, name: &str, position: usize) -> ODataResult<Expression> {
        let function = Function::from_name(name)
            .ok_or_else(|| syntax_error(messages::unknown_function(name, position)))?;
        self.tokens.advance();
        self.tokens.advance();
        self.enter()?;
        let mut args = Vec::new();
        if !self.tokens.eat(&TokenKind::CloseParen) {
            loop {
                args.push(self.parse_or()?);
                if self.tokens.eat(&TokenKind::Comma) {
                    continue;
                }
                self.tokens.expect(&TokenKind::CloseParen, "',' or ')'")?;
                break;
            }
        }
        self.leave();
        let arg_types: Vec<_> = args.iter().map(Expression::ty).collect();
        let returns = function
            .resolve(&arg_types)
            .ok_or_else(|| syntax_error(messages::no_function_signature(name, position)))?;
        Ok(Expression::Call {
            function,
            args,
            ty: ExpressionType::Primitive(returns),
        })
    }

    /// `Prop`, `Complex/Prop`, `Nav/Prop`: each step resolves against the type
    /// reached by the previous one.
    fn parse_member_access(&mut self) -> ODataResult<Expression> {
        let mut path: Vec<PathStep> = Vec::new();
        let mut current_type = self.root;
        let mut current_set = Arc::clone(&self.set);
        loop {
            let (name, position) = self.tokens.expect_identifier()?;
            let property = current_type
                .property(&name)
                .ok_or_else(|| {
                    ODataError::bad_request(messages::property_not_found(
                        &name,
                        current_type.full_name(),
                    ))
                })?
                .clone();
            let continues = self.tokens.peek().kind == TokenKind::Slash;

            let ty = match property.kind() {
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
                    let kind = property.primitive_kind().unwrap_or(EdmPrimitiveType::String);
                    if kind == EdmPrimitiveType::Binary {
                        return Err(ODataError::bad_request(
                            messages::binary_property_not_allowed(&name, OPTION),
                        ));
                    }
                    if continues {
                        return Err(syntax_error(messages::member_access_on_primitive(
                            &name, position,
                        )));
                    }
                    ExpressionType::Primitive(kind)
                }
                PropertyKind::ComplexType => {
                    let id = property.type_id();
                    current_type = self.wrapper.resource_type(id)?;
                    ExpressionType::Complex(id)
                }
                PropertyKind::ResourceReference => {
                    let related = self
                        .wrapper
                        .related_resource_set(&current_set, current_type, &property)?
                        .ok_or_else(|| {
                            ODataError::bad_request(messages::property_not_found(
                                &name,
                                current_type.full_name(),
                            ))
                        })?;
                    let id = property.type_id();
                    current_type = self.wrapper.resource_type(id)?;
                    current_set = related;
                    ExpressionType::Entity(id)
                }
            };

            let is_navigation = property.is_navigation();
            path.push(PathStep { property });
            if is_navigation && !self.navigations.contains(&path) {
                self.navigations.push(path.clone());
            }
            if !continues {
                return Ok(Expression::Property { path, ty });
            }
            self.tokens.advance();
        }
    }
}

fn syntax_error(message: String) -> ODataError {
    ODataError::syntax_error(message)
}

fn incompatible(op: BinaryOperator, left: &Expression, right: &Expression, position: usize) -> ODataError {
    syntax_error(messages::operator_incompatible(
        op.as_str(),
        left.ty(),
        right.ty(),
        position,
    ))
}

/// Type-check a binary node.
fn binary(
    op: BinaryOperator,
    left: Expression,
    right: Expression,
    position: usize,
) -> ODataResult<Expression> {
    let (lt, rt) = (left.ty(), right.ty());
    let ty = if op.is_logical() {
        if !(lt.is_boolean_or_null() && rt.is_boolean_or_null()) {
            return Err(incompatible(op, &left, &right, position));
        }
        ExpressionType::Primitive(EdmPrimitiveType::Boolean)
    } else if op.is_equality() {
        let comparable = lt.is_null()
            || rt.is_null()
            || matches!((lt.primitive(), rt.primitive()), (Some(l), Some(r)) if comparable_kinds(l, r));
        if !comparable {
            return Err(incompatible(op, &left, &right, position));
        }
        ExpressionType::Primitive(EdmPrimitiveType::Boolean)
    } else if op.is_relational() {
        let ordered = match (lt, rt) {
            (ExpressionType::Primitive(l), ExpressionType::Primitive(r)) => {
                comparable_kinds(l, r) && orderable(l)
            }
            (ExpressionType::Null, ExpressionType::Primitive(k))
            | (ExpressionType::Primitive(k), ExpressionType::Null) => orderable(k),
            _ => false,
        };
        if !ordered {
            return Err(incompatible(op, &left, &right, position));
        }
        ExpressionType::Primitive(EdmPrimitiveType::Boolean)
    } else {
        let promoted = match (lt, rt) {
            (ExpressionType::Primitive(l), ExpressionType::Primitive(r)) => {
                EdmPrimitiveType::promote(l, r)
            }
            (ExpressionType::Null, ExpressionType::Primitive(k))
            | (ExpressionType::Primitive(k), ExpressionType::Null) => {
                EdmPrimitiveType::promote(k, k)
            }
            _ => None,
        };
        let Some(kind) = promoted else {
            return Err(incompatible(op, &left, &right, position));
        };
        ExpressionType::Primitive(kind)
    };
    Ok(Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty,
    })
}

fn unary(op: UnaryOperator, operand: Expression, position: usize) -> ODataResult<Expression> {
    let ty = match (op, operand.ty()) {
        (UnaryOperator::Not, t) if t.is_boolean_or_null() => {
            ExpressionType::Primitive(EdmPrimitiveType::Boolean)
        }
        (UnaryOperator::Negate, ExpressionType::Primitive(k)) if k.is_numeric() => {
            ExpressionType::Primitive(EdmPrimitiveType::promote(k, k).unwrap_or(k))
        }
        (_, other) => {
            return Err(syntax_error(messages::unary_operator_incompatible(
                op.as_str(),
                other,
                position,
            )));
        }
    };
    Ok(Expression::Unary {
        op,
        operand: Box::new(operand),
        ty,
    })
}

fn comparable_kinds(left: EdmPrimitiveType, right: EdmPrimitiveType) -> bool {
    left == right || EdmPrimitiveType::promote(left, right).is_some()
}

fn orderable(kind: EdmPrimitiveType) -> bool {
    kind.is_numeric()
        || matches!(
            kind,
            EdmPrimitiveType::String | EdmPrimitiveType::DateTime | EdmPrimitiveType::Guid
        )
}
