use crate::catalog::{self, ErrDef};
use crate::messages;
use crate::problem::Problem;
use http::StatusCode;

/// The single structured error raised by every OData component.
///
/// The definition fixes the HTTP status and machine code; the message is the
/// catalogued, client-visible text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ODataError {
    def: ErrDef,
    message: String,
}

impl ODataError {
    pub fn new(def: ErrDef, message: impl Into<String>) -> Self {
        Self {
            def,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(catalog::BAD_REQUEST, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(catalog::SYNTAX_ERROR, message)
    }

    #[must_use]
    pub fn forbidden() -> Self {
        Self::new(catalog::FORBIDDEN, messages::forbidden())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(catalog::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(catalog::METHOD_NOT_ALLOWED, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(catalog::NOT_ACCEPTABLE, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(catalog::PRECONDITION_FAILED, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(catalog::UNSUPPORTED_MEDIA_TYPE, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(catalog::NOT_IMPLEMENTED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(catalog::INTERNAL, message)
    }

    /// Metadata integrity failure: the provider declared an invalid model.
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::new(catalog::METADATA_INTEGRITY, message)
    }

    /// The response would need a version above the client's ceiling.
    pub fn version_too_low(requested: impl std::fmt::Display, required: impl std::fmt::Display) -> Self {
        Self::new(
            catalog::REQUEST_VERSION_TOO_LOW,
            messages::request_version_too_low(requested, required),
        )
    }

    /// The response would need a version above the service's configured protocol.
    pub fn version_exceeds_protocol(required: impl std::fmt::Display, max: impl std::fmt::Display) -> Self {
        Self::new(
            catalog::RESPONSE_VERSION_EXCEEDS_PROTOCOL,
            messages::response_version_exceeds_protocol(required, max),
        )
    }

    #[must_use]
    pub fn def(&self) -> ErrDef {
        self.def
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.def.code
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.def.status_code()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ODataError> for Problem {
    fn from(err: ODataError) -> Self {
        err.def.as_problem(err.message)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn forbidden_carries_403_and_catalog_text() {
        let err = ODataError::forbidden();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Forbidden.");
        assert_eq!(err.to_string(), "Forbidden.");
    }

    #[test]
    fn version_errors_identify_the_breached_ceiling() {
        let low = ODataError::version_too_low("1.0", "2.0");
        let high = ODataError::version_exceeds_protocol("3.0", "2.0");
        assert_eq!(low.code(), "request_version_too_low");
        assert_eq!(high.code(), "response_version_exceeds_protocol");
        assert_eq!(low.status(), StatusCode::BAD_REQUEST);
        assert_eq!(high.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn converts_into_problem() {
        let problem: Problem = ODataError::not_found(messages::resource_not_found("Foo")).into();
        assert_eq!(problem.status, StatusCode::NOT_FOUND);
        assert_eq!(problem.code, "not_found");
        assert_eq!(problem.detail, "Resource not found for the segment 'Foo'");
    }

    #[test]
    fn metadata_errors_are_server_errors() {
        let err = ODataError::metadata(messages::duplicate_entity_set("Customers"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "metadata_integrity");
    }
}
