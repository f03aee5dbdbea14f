//! Protocol version negotiation.
//!
//! The response version only ever rises. Each raise is checked against the
//! client's ceiling first and the service's configured protocol second.

use crate::request::{DATA_SERVICE_VERSION, MAX_DATA_SERVICE_VERSION, ODataRequest};
use odata_errors::{ODataError, ODataResult};
use odata_model::ProtocolVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNegotiator {
    request_version: ProtocolVersion,
    request_max_version: ProtocolVersion,
    service_max_version: ProtocolVersion,
    response_version: ProtocolVersion,
}

impl VersionNegotiator {
    /// Build from the client's declared versions.
    ///
    /// The client's ceiling is `MaxDataServiceVersion`, else
    /// `DataServiceVersion`, else the service's version. Without
    /// `DataServiceVersion` the request is taken to speak the service's
    /// version, and a 3.0+ service starts the response at the ceiling.
    /// Otherwise the response starts at 1.0.
    #[must_use]
    pub fn new(
        request_version: Option<ProtocolVersion>,
        request_max_version: Option<ProtocolVersion>,
        service_max_version: ProtocolVersion,
    ) -> Self {
        let declared = request_version.is_some();
        let request_max_version = request_max_version
            .or(request_version)
            .unwrap_or(service_max_version);
        let request_version = request_version.unwrap_or(service_max_version);
        let response_version = if service_max_version >= ProtocolVersion::V3 && !declared {
            request_max_version
        } else {
            ProtocolVersion::V1
        };
        Self {
            request_version,
            request_max_version,
            service_max_version,
            response_version,
        }
    }

    /// # Errors
    /// Fails when a version header is present but malformed.
    pub fn from_request(request: &ODataRequest, service_max_version: ProtocolVersion) -> ODataResult<Self> {
        let read = |name: &str| {
            request
                .header(name)
                .map(|value| ProtocolVersion::parse_header(name, value))
                .transpose()
        };
        Ok(Self::new(
            read(DATA_SERVICE_VERSION)?,
            read(MAX_DATA_SERVICE_VERSION)?,
            service_max_version,
        ))
    }

    #[must_use]
    pub const fn request_version(&self) -> ProtocolVersion {
        self.request_version
    }

    #[must_use]
    pub const fn request_max_version(&self) -> ProtocolVersion {
        self.request_max_version
    }

    #[must_use]
    pub const fn service_max_version(&self) -> ProtocolVersion {
        self.service_max_version
    }

    #[must_use]
    pub const fn response_version(&self) -> ProtocolVersion {
        self.response_version
    }

    /// Raise the response version to at least `version`.
    ///
    /// A version at or below the current one is a no-op.
    ///
    /// # Errors
    /// `request_version_too_low` when `version` exceeds the client's ceiling,
    /// `response_version_exceeds_protocol` when it exceeds the service's.
    pub fn raise(self, version: ProtocolVersion) -> ODataResult<Self> {
        if version <= self.response_version {
            return Ok(self);
        }
        if version > self.request_max_version {
            return Err(ODataError::version_too_low(self.request_max_version, version));
        }
        if version > self.service_max_version {
            return Err(ODataError::version_exceeds_protocol(version, self.service_max_version));
        }
        tracing::debug!(from = %self.response_version, to = %version, "response version raised");
        Ok(Self {
            response_version: version,
            ..self
        })
    }

    /// Check the declared request version against what the request itself needs.
    ///
    /// # Errors
    /// `request_version_too_low` when the request declares less than `required`.
    pub fn require_request_version(&self, required: ProtocolVersion) -> ODataResult<()> {
        if self.request_version < required {
            return Err(ODataError::version_too_low(self.request_version, required));
        }
        Ok(())
    }
}
