//! Typed `$filter` expression tree.

use odata_model::{EdmPrimitiveType, PrimitiveValue, ResourceProperty, ResourceTypeId};
use std::fmt;

/// Static type of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionType {
    /// The untyped `null` literal.
    Null,
    Primitive(EdmPrimitiveType),
    Complex(ResourceTypeId),
    Entity(ResourceTypeId),
}

impl ExpressionType {
    #[must_use]
    pub const fn primitive(self) -> Option<EdmPrimitiveType> {
        match self {
            Self::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// Types of values that carry properties; `Complex` and `Entity`.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Complex(_) | Self::Entity(_))
    }

    #[must_use]
    pub const fn is_boolean_or_null(self) -> bool {
        matches!(self, Self::Null | Self::Primitive(EdmPrimitiveType::Boolean))
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Primitive(kind) => f.write_str(kind.name()),
            Self::Complex(id) => write!(f, "complex type {id}"),
            Self::Entity(id) => write!(f, "entity type {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "and" => Self::And,
            "or" => Self::Or,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "le" => Self::Le,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            "add" => Self::Add,
            "sub" => Self::Sub,
            "mul" => Self::Mul,
            "div" => Self::Div,
            "mod" => Self::Mod,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
        }
    }

    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl UnaryOperator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Negate => "-",
        }
    }
}

/// Built-in `$filter` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    SubstringOf,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Replace,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Round,
    Floor,
    Ceiling,
}

/// One property step of a member access path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub property: ResourceProperty,
}

impl PathStep {
    #[must_use]
    pub fn name(&self) -> &str {
        self.property.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant {
        value: PrimitiveValue,
        ty: ExpressionType,
    },
    /// Member access from the current entity, e.g. `Customer/Address/City`.
    Property {
        path: Vec<PathStep>,
        ty: ExpressionType,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
        ty: ExpressionType,
    },
    /// Operands may differ in numeric kind; evaluation promotes them.
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        ty: ExpressionType,
    },
    Call {
        function: Function,
        args: Vec<Expression>,
        ty: ExpressionType,
    },
}

impl Expression {
    #[must_use]
    pub const fn ty(&self) -> ExpressionType {
        match self {
            Self::Constant { ty, .. }
            | Self::Property { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Call { ty, .. } => *ty,
        }
    }

    /// Dotted form of a property path, e.g. `Customer/CustomerName`.
    #[must_use]
    pub fn path_text(path: &[PathStep]) -> String {
        path.iter().map(PathStep::name).collect::<Vec<_>>().join("/")
    }
}
