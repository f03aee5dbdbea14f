//! Error types shared by the OData crates
//!
//! - [`ODataError`]: the one error every component raises
//! - [`ErrDef`]: static definitions fixing status and machine code
//! - [`messages`]: the fixed client-visible message catalog
//! - [`Problem`]: RFC 9457 mapping for hosts
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod catalog;
pub mod error;
pub mod messages;
pub mod problem;

pub use catalog::ErrDef;
pub use error::ODataError;
pub use problem::{APPLICATION_PROBLEM_JSON, Problem};

pub type ODataResult<T> = Result<T, ODataError>;

/// Attach request-specific context to a Problem before returning it.
pub fn finalize(mut p: Problem, instance: &str, trace_id: Option<String>) -> Problem {
    p = p.with_instance(instance);
    if let Some(tid) = trace_id {
        p = p.with_trace_id(tid);
    }
    p
}
