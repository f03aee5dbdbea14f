//! OData request URI compiler
//!
//! Turns the pieces of a request URI into typed, metadata-checked structures:
//!
//! - [`segment`]: resource path into [`SegmentDescriptor`]s, with [`KeyPredicate`]s
//! - [`filter`]: `$filter` into a typed [`Expression`] tree ([`FilterInfo`])
//! - [`orderby`]: `$orderby` into [`OrderByInfo`], with key synthesis for paging
//! - [`projection`]: `$expand` / `$select` into a [`RootProjectionNode`]
//! - [`skiptoken`]: `$skiptoken` into [`SkipTokenInfo`] against the compiled ordering
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod filter;
pub mod key;
pub mod lexer;
pub mod literal;
pub mod orderby;
pub mod projection;
pub mod segment;
pub mod skiptoken;

pub use filter::{Expression, ExpressionProvider, ExpressionType, FilterInfo};
pub use key::KeyPredicate;
pub use literal::{coerce_literal, parse_literal, parse_typed_literal};
pub use orderby::{OrderByClause, OrderByInfo};
pub use projection::{ExpandedProjectionNode, ProjectionChild, ProjectionNode, RootProjectionNode};
pub use segment::{SegmentDescriptor, SegmentParser, TargetKind, TargetSource};
pub use skiptoken::SkipTokenInfo;
