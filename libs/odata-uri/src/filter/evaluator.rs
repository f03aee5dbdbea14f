//! In-memory evaluation of a checked `$filter` tree against entity instances.
//!
//! Null propagates through arithmetic and functions. Relational operators
//! with a null operand are false; `eq`/`ne` treat null as a value. Logical
//! operators read null as false. Integer overflow and division by zero
//! yield null.

use super::ast::{BinaryOperator, Expression, ExpressionType, Function, PathStep, UnaryOperator};
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{Datelike, Timelike};
use odata_model::{EdmPrimitiveType as K, EntityInstance, PrimitiveValue, PropertyValue};
use std::cmp::Ordering;

/// Result of evaluating a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Value(PrimitiveValue),
    /// A non-null complex value or related entity.
    Instance,
}

impl Operand {
    const NULL: Self = Self::Value(PrimitiveValue::Null);

    fn into_value(self) -> PrimitiveValue {
        match self {
            Self::Value(v) => v,
            Self::Instance => PrimitiveValue::Null,
        }
    }
}

/// Whether `entity` satisfies the boolean `expression`.
#[must_use]
pub fn matches(expression: &Expression, entity: &EntityInstance) -> bool {
    evaluate(expression, entity).as_bool() == Some(true)
}

/// Evaluate `expression` for `entity`. Navigation steps read the expanded
/// values attached to the instance; an unexpanded reference reads as null.
#[must_use]
pub fn evaluate(expression: &Expression, entity: &EntityInstance) -> PrimitiveValue {
    eval(expression, entity).into_value()
}

fn eval(expression: &Expression, entity: &EntityInstance) -> Operand {
    match expression {
        Expression::Constant { value, .. } => Operand::Value(value.clone()),
        Expression::Property { path, .. } => read_path(entity, path),
        Expression::Unary { op, operand, .. } => unary(*op, eval(operand, entity).into_value()),
        Expression::Binary { op, left, right, ty } => {
            let left = eval(left, entity);
            let right = eval(right, entity);
            binary(*op, left, right, *ty)
        }
        Expression::Call { function, args, ty } => {
            let args: Vec<_> = args.iter().map(|a| eval(a, entity).into_value()).collect();
            if args.iter().any(PrimitiveValue::is_null) {
                return Operand::NULL;
            }
            Operand::Value(call(*function, &args, *ty).unwrap_or(PrimitiveValue::Null))
        }
    }
}

fn read_path(entity: &EntityInstance, path: &[PathStep]) -> Operand {
    let Some((first, rest)) = path.split_first() else {
        return Operand::NULL;
    };
    let mut current = entity.get(first.name());
    for step in rest {
        current = match current {
            Some(PropertyValue::Complex(Some(c))) => c.get(step.name()),
            Some(PropertyValue::Reference(Some(e))) => e.get(step.name()),
            _ => None,
        };
    }
    match current {
        Some(PropertyValue::Primitive(v)) => Operand::Value(v.clone()),
        Some(PropertyValue::Complex(Some(_)) | PropertyValue::Reference(Some(_))) => {
            Operand::Instance
        }
        _ => Operand::NULL,
    }
}

fn unary(op: UnaryOperator, value: PrimitiveValue) -> Operand {
    let out = match (op, value) {
        (UnaryOperator::Not, PrimitiveValue::Boolean(b)) => PrimitiveValue::Boolean(!b),
        (UnaryOperator::Negate, PrimitiveValue::Double(v)) => PrimitiveValue::Double(-v),
        (UnaryOperator::Negate, PrimitiveValue::Single(v)) => PrimitiveValue::Single(-v),
        (UnaryOperator::Negate, PrimitiveValue::Decimal(d)) => PrimitiveValue::Decimal(-d),
        (UnaryOperator::Negate, PrimitiveValue::Int64(v)) => {
            v.checked_neg().map_or(PrimitiveValue::Null, PrimitiveValue::Int64)
        }
        (UnaryOperator::Negate, other) => other
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .and_then(i32::checked_neg)
            .map_or(PrimitiveValue::Null, PrimitiveValue::Int32),
        (UnaryOperator::Not, _) => PrimitiveValue::Null,
    };
    Operand::Value(out)
}

fn binary(op: BinaryOperator, left: Operand, right: Operand, ty: ExpressionType) -> Operand {
    let boolean = |b: bool| Operand::Value(PrimitiveValue::Boolean(b));
    match op {
        BinaryOperator::And => boolean(truthy(&left) && truthy(&right)),
        BinaryOperator::Or => boolean(truthy(&left) || truthy(&right)),
        BinaryOperator::Eq => boolean(equals(&left, &right)),
        BinaryOperator::Ne => boolean(!equals(&left, &right)),
        BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge => {
            let (Operand::Value(l), Operand::Value(r)) = (left, right) else {
                return boolean(false);
            };
            if l.is_null() || r.is_null() {
                return boolean(false);
            }
            let Some(ordering) = l.compare(&r) else {
                return boolean(false);
            };
            boolean(match op {
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::Le => ordering != Ordering::Greater,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => {
            let (l, r) = (left.into_value(), right.into_value());
            let Some(kind) = ty.primitive() else {
                return Operand::NULL;
            };
            Operand::Value(arithmetic(op, kind, &l, &r).unwrap_or(PrimitiveValue::Null))
        }
    }
}

fn truthy(operand: &Operand) -> bool {
    matches!(operand, Operand::Value(PrimitiveValue::Boolean(true)))
}

fn equals(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::Value(l), Operand::Value(r)) => l.loosely_equals(r),
        (Operand::Instance, Operand::Instance) => true,
        _ => false,
    }
}

/// Apply an arithmetic operator after promoting both operands to `kind`.
fn arithmetic(
    op: BinaryOperator,
    kind: K,
    left: &PrimitiveValue,
    right: &PrimitiveValue,
) -> Option<PrimitiveValue> {
    if left.is_null() || right.is_null() {
        return None;
    }
    match kind {
        K::Int32 => {
            let (l, r) = (i32::try_from(left.as_i64()?).ok()?, i32::try_from(right.as_i64()?).ok()?);
            let v = match op {
                BinaryOperator::Add => l.checked_add(r),
                BinaryOperator::Sub => l.checked_sub(r),
                BinaryOperator::Mul => l.checked_mul(r),
                BinaryOperator::Div => l.checked_div(r),
                _ => l.checked_rem(r),
            }?;
            Some(PrimitiveValue::Int32(v))
        }
        K::Int64 => {
            let (l, r) = (left.as_i64()?, right.as_i64()?);
            let v = match op {
                BinaryOperator::Add => l.checked_add(r),
                BinaryOperator::Sub => l.checked_sub(r),
                BinaryOperator::Mul => l.checked_mul(r),
                BinaryOperator::Div => l.checked_div(r),
                _ => l.checked_rem(r),
            }?;
            Some(PrimitiveValue::Int64(v))
        }
        K::Decimal => {
            let (l, r) = (left.as_decimal()?, right.as_decimal()?);
            if matches!(op, BinaryOperator::Div | BinaryOperator::Mod) && r.is_zero() {
                return None;
            }
            Some(PrimitiveValue::Decimal(match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Sub => l - r,
                BinaryOperator::Mul => l * r,
                BinaryOperator::Div => l / r,
                _ => l % r,
            }))
        }
        K::Single | K::Double => {
            let (l, r) = (left.as_f64()?, right.as_f64()?);
            let v = match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Sub => l - r,
                BinaryOperator::Mul => l * r,
                BinaryOperator::Div => l / r,
                _ => l % r,
            };
            if kind == K::Single {
                #[allow(clippy::cast_possible_truncation)]
                return Some(PrimitiveValue::Single(v as f32));
            }
            Some(PrimitiveValue::Double(v))
        }
        _ => None,
    }
}

fn call(function: Function, args: &[PrimitiveValue], ty: ExpressionType) -> Option<PrimitiveValue> {
    let text = |i: usize| args.get(i).and_then(PrimitiveValue::as_str);
    let int = |i: usize| args.get(i).and_then(PrimitiveValue::as_i64);
    let date = |i: usize| match args.get(i) {
        Some(PrimitiveValue::DateTime(d)) => Some(*d),
        _ => None,
    };
    let part = |v: u32| i32::try_from(v).ok().map(PrimitiveValue::Int32);

    match function {
        Function::SubstringOf => Some(PrimitiveValue::Boolean(text(1)?.contains(text(0)?))),
        Function::StartsWith => Some(PrimitiveValue::Boolean(text(0)?.starts_with(text(1)?))),
        Function::EndsWith => Some(PrimitiveValue::Boolean(text(0)?.ends_with(text(1)?))),
        Function::Length => i32::try_from(text(0)?.chars().count())
            .ok()
            .map(PrimitiveValue::Int32),
        Function::IndexOf => {
            let (haystack, needle) = (text(0)?, text(1)?);
            let index = haystack
                .find(needle)
                .map_or(Some(-1), |byte| i32::try_from(haystack[..byte].chars().count()).ok())?;
            Some(PrimitiveValue::Int32(index))
        }
        Function::Replace => Some(PrimitiveValue::String(text(0)?.replace(text(1)?, text(2)?))),
        Function::Substring => {
            let source = text(0)?;
            let start = usize::try_from(int(1)?.max(0)).ok()?;
            let chars = source.chars().skip(start);
            let out: String = match args.get(2) {
                Some(_) => chars.take(usize::try_from(int(2)?.max(0)).ok()?).collect(),
                None => chars.collect(),
            };
            Some(PrimitiveValue::String(out))
        }
        Function::ToLower => Some(PrimitiveValue::String(text(0)?.to_lowercase())),
        Function::ToUpper => Some(PrimitiveValue::String(text(0)?.to_uppercase())),
        Function::Trim => Some(PrimitiveValue::String(text(0)?.trim().to_owned())),
        Function::Concat => Some(PrimitiveValue::String(format!("{}{}", text(0)?, text(1)?))),
        Function::Year => Some(PrimitiveValue::Int32(date(0)?.year())),
        Function::Month => part(date(0)?.month()),
        Function::Day => part(date(0)?.day()),
        Function::Hour => part(date(0)?.hour()),
        Function::Minute => part(date(0)?.minute()),
        Function::Second => part(date(0)?.second()),
        Function::Round | Function::Floor | Function::Ceiling => {
            let value = args.first()?;
            if ty.primitive() == Some(K::Decimal) {
                let mode = match function {
                    Function::Floor => RoundingMode::Floor,
                    Function::Ceiling => RoundingMode::Ceiling,
                    _ => RoundingMode::HalfUp,
                };
                let d: BigDecimal = value.as_decimal()?;
                return Some(PrimitiveValue::Decimal(d.with_scale_round(0, mode)));
            }
            let v = value.as_f64()?;
            Some(PrimitiveValue::Double(match function {
                Function::Floor => v.floor(),
                Function::Ceiling => v.ceil(),
                _ => v.round(),
            }))
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::filter::FilterInfo;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};

    fn selected(filter: &str) -> Vec<String> {
        let wrapper = northwind_wrapper(northwind_config());
        let customers = northwind_entities(&northwind_model())
            .swap_remove("Customers")
            .unwrap();
        let set = wrapper.resolve_resource_set("Customers").unwrap();
        let info = FilterInfo::parse(filter, &wrapper, &set).unwrap();
        customers
            .iter()
            .filter(|e| info.matches(e))
            .map(|e| e.primitive("CustomerID").unwrap().as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(selected("CustomerID eq 'ALFKI'"), ["ALFKI"]);
        assert_eq!(selected("Rating gt 3 and Rating lt 5"), ["ALFKI"]);
        assert_eq!(selected("not (Rating le 3) or CustomerID eq 'ANATR'").len(), 3);
        assert!(selected("CustomerID eq null").is_empty());
        assert_eq!(selected("CustomerID ne null").len(), 3);
        assert!(selected("Rating lt null").is_empty());
    }

    #[test]
    fn arithmetic_promotes_and_null_propagates() {
        assert_eq!(selected("Rating add 1L eq 6L"), ["BERGS"]);
        assert_eq!(selected("Rating mul 2 sub 1 eq 7"), ["ALFKI"]);
        assert_eq!(selected("Rating div 2.0 gt 2.4"), ["BERGS"]);
        assert_eq!(selected("-Rating lt -4"), ["BERGS"]);
        assert_eq!(selected("Rating mod 2 eq 1"), ["ANATR", "BERGS"]);
        assert_eq!(selected("1 div 0 eq null").len(), 3);
    }

    #[test]
    fn string_functions() {
        assert_eq!(selected("startswith(CustomerID, 'AL')"), ["ALFKI"]);
        assert_eq!(selected("endswith(CustomerID, 'GS')"), ["BERGS"]);
        assert_eq!(selected("substringof('NAT', CustomerID)"), ["ANATR"]);
        assert_eq!(selected("tolower(CustomerID) eq 'bergs'"), ["BERGS"]);
        assert_eq!(selected("length(CustomerID) eq 5").len(), 3);
        assert_eq!(selected("indexof(CustomerID, 'FKI') eq 2"), ["ALFKI"]);
        assert_eq!(selected("substring(CustomerID, 1, 2) eq 'LF'"), ["ALFKI"]);
        assert_eq!(selected("substring(CustomerID, 3) eq 'GS'"), ["BERGS"]);
        assert_eq!(selected("concat(CustomerID, 'x') eq 'BERGSx'"), ["BERGS"]);
        assert_eq!(selected("replace(Country, 'many', '') eq 'Ger'"), ["ALFKI"]);
        assert_eq!(selected("trim(concat(' ', Country)) eq 'Sweden'"), ["BERGS"]);
    }

    #[test]
    fn complex_member_access() {
        assert_eq!(selected("Address ne null").len(), 3);
        assert_eq!(selected("Address/City eq 'Berlin'"), ["ALFKI"]);
    }

    #[test]
    fn date_parts() {
        let wrapper = northwind_wrapper(northwind_config());
        let orders = northwind_entities(&northwind_model()).swap_remove("Orders").unwrap();
        let set = wrapper.resolve_resource_set("Orders").unwrap();
        let info = FilterInfo::parse(
            "year(OrderDate) eq 2011 and month(OrderDate) eq 3 and hour(OrderDate) eq 10",
            &wrapper,
            &set,
        )
        .unwrap();
        assert_eq!(orders.iter().filter(|e| info.matches(e)).count(), orders.len());
        let info = FilterInfo::parse("day(DeliveryDate) eq 4", &wrapper, &set).unwrap();
        assert_eq!(orders.iter().filter(|e| info.matches(e)).count(), 0);
    }

    #[test]
    fn rounding() {
        let round = |f: Function, v: PrimitiveValue, ty: K| call(f, &[v], ExpressionType::Primitive(ty));
        assert_eq!(
            round(Function::Round, PrimitiveValue::Double(2.5), K::Double),
            Some(PrimitiveValue::Double(3.0))
        );
        assert_eq!(
            round(Function::Floor, PrimitiveValue::Double(-2.5), K::Double),
            Some(PrimitiveValue::Double(-3.0))
        );
        let d: BigDecimal = "2.5".parse().unwrap();
        assert_eq!(
            round(Function::Ceiling, PrimitiveValue::Decimal(d), K::Decimal),
            Some(PrimitiveValue::Decimal(BigDecimal::from(3)))
        );
    }
}
