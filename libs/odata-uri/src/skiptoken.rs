//! `$skiptoken`: ordering-key continuation values for server-side paging.
//!
//! A token is the comma-separated URI literals of the last entity's ordering
//! values, e.g. `'ALFKI',guid'05b242e7-...'`.

use crate::lexer::{TokenKind, tokenize};
use crate::literal::coerce_literal;
use crate::orderby::OrderByInfo;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{EntityInstance, PrimitiveValue};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct SkipTokenInfo {
    values: Vec<PrimitiveValue>,
}

impl SkipTokenInfo {
    /// Parse `token` against the compiled ordering, one literal per clause.
    ///
    /// # Errors
    /// Fails when no ordering is available, when the token is malformed,
    /// when the value count differs from the clause count, and when a value
    /// is not a literal of its clause's primitive kind.
    pub fn parse(token: &str, order_by: Option<&OrderByInfo>) -> ODataResult<Self> {
        let Some(order_by) = order_by.filter(|o| !o.is_empty()) else {
            return Err(ODataError::bad_request(messages::skiptoken_requires_ordering()));
        };
        let malformed = || ODataError::bad_request(messages::skiptoken_syntax(token));
        let tokens = tokenize(token).map_err(|_| malformed())?;

        let mut literals = Vec::new();
        let mut expect_value = true;
        for t in tokens {
            match (t.kind, expect_value) {
                (TokenKind::Literal(value), true) => {
                    literals.push(value);
                    expect_value = false;
                }
                (TokenKind::Comma, false) => expect_value = true,
                (TokenKind::End, false) => break,
                _ => return Err(malformed()),
            }
        }

        if literals.len() != order_by.len() {
            return Err(ODataError::bad_request(messages::skiptoken_count_mismatch(
                token,
                order_by.len(),
            )));
        }

        let values = literals
            .into_iter()
            .zip(order_by.clauses())
            .map(|(literal, clause)| {
                coerce_literal(literal, clause.kind()).ok_or_else(|| {
                    ODataError::bad_request(messages::skiptoken_type_mismatch(
                        token,
                        &clause.path_text(),
                        clause.kind(),
                    ))
                })
            })
            .collect::<ODataResult<Vec<_>>>()?;
        Ok(Self { values })
    }

    /// Token resuming after `entity` under `order_by`.
    #[must_use]
    pub fn from_entity(order_by: &OrderByInfo, entity: &EntityInstance) -> Self {
        Self {
            values: order_by.values_of(entity),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[PrimitiveValue] {
        &self.values
    }

    /// Whether the token position sorts strictly before `entity`.
    #[must_use]
    pub fn precedes(&self, order_by: &OrderByInfo, entity: &EntityInstance) -> bool {
        order_by.compare_values(&order_by.values_of(entity), &self.values) == Ordering::Greater
    }

    /// Text of the token as it appears in a next link.
    #[must_use]
    pub fn to_token_string(&self) -> String {
        self.values
            .iter()
            .map(PrimitiveValue::to_uri_literal)
            .collect::<Vec<_>>()
            .join(",")
    }
}
