//! Host-facing request and response values.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use odata_errors::{ODataError, ODataResult, messages};
use std::fmt;
use url::Url;

pub const DATA_SERVICE_VERSION: &str = "DataServiceVersion";
pub const MAX_DATA_SERVICE_VERSION: &str = "MaxDataServiceVersion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Merge,
    Delete,
}

impl HttpMethod {
    /// # Errors
    /// Fails for methods the service does not implement.
    pub fn parse(method: &str) -> ODataResult<Self> {
        Ok(match method.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "MERGE" => Self::Merge,
            "DELETE" => Self::Delete,
            _ => {
                return Err(ODataError::method_not_allowed(messages::unsupported_method(method)));
            }
        })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Merge => "MERGE",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incoming request, already detached from the hosting framework.
#[derive(Debug, Clone)]
pub struct ODataRequest {
    method: HttpMethod,
    uri: Url,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ODataRequest {
    /// # Errors
    /// Fails when `uri` is not an absolute URI.
    pub fn new(method: HttpMethod, uri: &str) -> ODataResult<Self> {
        let uri = Url::parse(uri).map_err(|_| ODataError::bad_request(messages::syntax_error()))?;
        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Vec::new(),
        })
    }

    /// # Errors
    /// Fails when `uri` is not an absolute URI.
    pub fn get(uri: &str) -> ODataResult<Self> {
        Self::new(HttpMethod::Get, uri)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header from text; values that are not valid header text are dropped.
    #[must_use]
    pub fn with_header_str(self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => self.with_header(name, value),
            _ => {
                tracing::warn!(header = name, "dropping invalid request header");
                self
            }
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub const fn uri(&self) -> &Url {
        &self.uri
    }

    /// Raw query string, still percent-encoded.
    #[must_use]
    pub fn raw_query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header text; `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl TryFrom<http::Request<Vec<u8>>> for ODataRequest {
    type Error = ODataError;

    fn try_from(request: http::Request<Vec<u8>>) -> ODataResult<Self> {
        let (parts, body) = request.into_parts();
        let method = HttpMethod::parse(parts.method.as_str())?;
        let mut out = Self::new(method, &parts.uri.to_string())?;
        out.headers = parts.headers;
        out.body = body;
        Ok(out)
    }
}

/// A finished response ready to be handed back to the host.
#[derive(Debug, Clone)]
pub struct ODataResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ODataResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.set_header(header::CONTENT_TYPE, content_type);
        self.set_header(header::CONTENT_LENGTH, &body.len().to_string());
        self.body = body;
        self
    }

    /// Set a header; values that are not valid header text are skipped.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!(HttpMethod::parse("merge").unwrap(), HttpMethod::Merge);
        assert!(HttpMethod::Post.is_write());
        let err = HttpMethod::parse("OPTIONS").unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn converts_from_http_request() {
        let request = http::Request::builder()
            .method("PATCH")
            .uri("http://localhost/service.svc/Customers?$top=1")
            .header(DATA_SERVICE_VERSION, "2.0")
            .body(b"{}".to_vec())
            .unwrap();
        let request = ODataRequest::try_from(request).unwrap();
        assert_eq!(request.method(), HttpMethod::Patch);
        assert_eq!(request.raw_query(), "$top=1");
        assert_eq!(request.header(DATA_SERVICE_VERSION), Some("2.0"));
        assert_eq!(request.body(), b"{}");
    }

    #[test]
    fn response_sets_length_with_body() {
        let response = ODataResponse::new(StatusCode::OK).with_body("text/plain", b"42".to_vec());
        assert_eq!(response.header("content-length"), Some("2"));
        assert_eq!(response.into_http().status(), StatusCode::OK);
    }
}
