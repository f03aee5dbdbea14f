//! Static error definitions.
//!
//! Every [`ODataError`](crate::ODataError) carries one of these definitions. The
//! definition fixes the HTTP status and the machine-readable code; the message
//! text comes from [`messages`](crate::messages).

use crate::problem::Problem;
use http::StatusCode;

/// Static error definition from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrDef {
    pub status: u16,
    pub title: &'static str,
    pub code: &'static str,
    pub type_url: &'static str,
}

impl ErrDef {
    /// Convert this error definition into a Problem with the given detail
    #[inline]
    pub fn as_problem(&self, detail: impl Into<String>) -> Problem {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Problem::new(status, self.title, detail.into())
            .with_code(self.code)
            .with_type(self.type_url)
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub const BAD_REQUEST: ErrDef = ErrDef {
    status: 400,
    title: "Bad Request",
    code: "bad_request",
    type_url: "urn:odata:errors:bad_request",
};

pub const SYNTAX_ERROR: ErrDef = ErrDef {
    status: 400,
    title: "Bad Request - Error in query syntax",
    code: "syntax_error",
    type_url: "urn:odata:errors:syntax_error",
};

pub const REQUEST_VERSION_TOO_LOW: ErrDef = ErrDef {
    status: 400,
    title: "Request Version Too Low",
    code: "request_version_too_low",
    type_url: "urn:odata:errors:request_version_too_low",
};

pub const RESPONSE_VERSION_EXCEEDS_PROTOCOL: ErrDef = ErrDef {
    status: 400,
    title: "Response Version Exceeds Protocol Version",
    code: "response_version_exceeds_protocol",
    type_url: "urn:odata:errors:response_version_exceeds_protocol",
};

pub const FORBIDDEN: ErrDef = ErrDef {
    status: 403,
    title: "Forbidden",
    code: "forbidden",
    type_url: "urn:odata:errors:forbidden",
};

pub const NOT_FOUND: ErrDef = ErrDef {
    status: 404,
    title: "Not Found",
    code: "not_found",
    type_url: "urn:odata:errors:not_found",
};

pub const METHOD_NOT_ALLOWED: ErrDef = ErrDef {
    status: 405,
    title: "Method Not Allowed",
    code: "method_not_allowed",
    type_url: "urn:odata:errors:method_not_allowed",
};

pub const NOT_ACCEPTABLE: ErrDef = ErrDef {
    status: 406,
    title: "Not Acceptable",
    code: "not_acceptable",
    type_url: "urn:odata:errors:not_acceptable",
};

pub const PRECONDITION_FAILED: ErrDef = ErrDef {
    status: 412,
    title: "Precondition Failed",
    code: "precondition_failed",
    type_url: "urn:odata:errors:precondition_failed",
};

pub const UNSUPPORTED_MEDIA_TYPE: ErrDef = ErrDef {
    status: 415,
    title: "Unsupported Media Type",
    code: "unsupported_media_type",
    type_url: "urn:odata:errors:unsupported_media_type",
};

pub const INTERNAL: ErrDef = ErrDef {
    status: 500,
    title: "Internal Server Error",
    code: "internal",
    type_url: "urn:odata:errors:internal",
};

pub const METADATA_INTEGRITY: ErrDef = ErrDef {
    status: 500,
    title: "Invalid Metadata",
    code: "metadata_integrity",
    type_url: "urn:odata:errors:metadata_integrity",
};

pub const NOT_IMPLEMENTED: ErrDef = ErrDef {
    status: 501,
    title: "Not Implemented",
    code: "not_implemented",
    type_url: "urn:odata:errors:not_implemented",
};

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn err_def_to_problem_works() {
        let problem = FORBIDDEN.as_problem("Forbidden.");
        assert_eq!(problem.status, StatusCode::FORBIDDEN);
        assert_eq!(problem.title, "Forbidden");
        assert_eq!(problem.detail, "Forbidden.");
        assert_eq!(problem.code, "forbidden");
        assert_eq!(problem.type_url, "urn:odata:errors:forbidden");
    }

    #[test]
    fn invalid_status_falls_back_to_internal() {
        let def = ErrDef {
            status: 1000,
            title: "Broken",
            code: "broken",
            type_url: "about:blank",
        };
        assert_eq!(def.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
