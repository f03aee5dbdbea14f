//! OData request processing
//!
//! Everything between an HTTP request and its OData response:
//!
//! - [`request`]: transport-neutral [`ODataRequest`] / [`ODataResponse`]
//! - [`version`]: `DataServiceVersion` / `MaxDataServiceVersion` negotiation
//! - [`query`] and [`description`]: query options compiled into a [`RequestDescription`]
//! - [`provider`]: the [`QueryProvider`] seam, with [`memory::InMemoryProvider`] as a reference
//! - [`expander`], [`singleton`], [`etag`]: `$expand`, service operations, concurrency
//! - [`object_model`], [`reader`], [`writer`]: payload model, request bodies, Atom / JSON / CSDL output
//! - [`processor`]: [`DataService`], which ties the above together
//!
//! Hosts load [`settings::AppSettings`] and install logging with
//! [`telemetry::init_logging`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod description;
pub mod etag;
pub mod expander;
pub mod format;
pub mod memory;
pub mod object_model;
pub mod processor;
pub mod provider;
pub mod query;
pub mod reader;
pub mod request;
pub mod settings;
pub mod singleton;
pub mod telemetry;
pub mod version;
pub mod writer;

pub use description::{QueryType, RequestDescription};
pub use format::{JsonMetadata, PayloadKind, ResponseFormat};
pub use memory::{DataDocument, InMemoryProvider};
pub use processor::DataService;
pub use provider::{QueryParams, QueryProvider, QueryResult};
pub use query::{QueryOptions, SystemOption};
pub use request::{HttpMethod, ODataRequest, ODataResponse};
pub use settings::{AppSettings, SettingsError};
pub use singleton::{SingletonArgs, SingletonRegistry, SingletonValue};
pub use telemetry::{LogFormat, LoggingConfig, init_logging};
pub use version::VersionNegotiator;
