//! Layered host settings: defaults, then a YAML file, then `ODATA__*` environment variables.

use crate::telemetry::LoggingConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use odata_model::{ConfigError, ModelDefinition, ServiceConfiguration};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "ODATA__";

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse '{path}': {reason}")]
    Document { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    /// Absolute base URI every request URI must be based on.
    pub service_root: String,
    pub service: ServiceConfiguration,
    pub logging: LoggingConfig,
    /// Model definition document (YAML or JSON).
    pub model: Option<PathBuf>,
    /// In-memory data document (YAML or JSON).
    pub data: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            service_root: "http://localhost/service.svc/".to_owned(),
            service: ServiceConfiguration::default(),
            logging: LoggingConfig::default(),
            model: None,
            data: None,
        }
    }
}

impl AppSettings {
    /// Merge defaults, the optional YAML file and the environment, then
    /// validate the service configuration.
    ///
    /// # Errors
    /// Fails when a layer cannot be read or does not match the schema, and
    /// when the resulting service configuration is inconsistent.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        settings.service.validate()?;
        tracing::debug!(
            service_root = %settings.service_root,
            max_protocol_version = %settings.service.max_protocol_version,
            "settings loaded"
        );
        Ok(settings)
    }

    /// # Errors
    /// Fails when no model is configured or the document cannot be read.
    pub fn model_definition(&self) -> Result<Option<ModelDefinition>, SettingsError> {
        self.model.as_deref().map(read_document).transpose()
    }
}

/// Read a YAML or JSON document; `.json` files are parsed as JSON.
///
/// # Errors
/// Fails on I/O errors and documents that do not match `T`.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_saphyr::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| SettingsError::Document {
        path: path.to_path_buf(),
        reason,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::{EntitySetRights, ProtocolVersion};
    use std::io::Write;

    fn yaml_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        temp_env::with_vars_unset(["ODATA__SERVICE_ROOT"], || {
            let settings = AppSettings::load(None).unwrap();
            assert_eq!(settings, AppSettings::default());
        });
    }

    #[test]
    fn yaml_then_environment() {
        let file = yaml_file(
            r#"
service_root: "http://example.org/northwind.svc/"
service:
  max_protocol_version: "2.0"
  entity_set_access_rules:
    "*": all_read
  entity_set_page_sizes:
    Customers: 10
logging:
  level: debug
"#,
        );
        temp_env::with_vars(
            [
                ("ODATA__LOGGING__FORMAT", Some("json")),
                ("ODATA__SERVICE__ACCEPT_COUNT_REQUESTS", Some("true")),
            ],
            || {
                let settings = AppSettings::load(Some(file.path())).unwrap();
                assert_eq!(settings.service_root, "http://example.org/northwind.svc/");
                assert_eq!(settings.service.max_protocol_version, ProtocolVersion::V2);
                assert_eq!(settings.service.rights_for("Orders"), EntitySetRights::READ_ALL);
                assert_eq!(settings.service.page_size_for("Customers"), Some(10));
                assert!(settings.service.accept_count_requests);
                assert_eq!(settings.logging.level, "debug");
                assert_eq!(settings.logging.format, crate::telemetry::LogFormat::Json);
            },
        );
    }

    #[test]
    fn inconsistent_service_configuration_is_rejected() {
        let file = yaml_file(
            r#"
service:
  max_protocol_version: "1.0"
  accept_count_requests: true
"#,
        );
        let err = AppSettings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)), "{err}");
    }

    #[test]
    fn reads_model_documents() {
        let file = yaml_file(
            r"
namespace: Shop
container: ShopEntities
entity_types:
  - name: Item
    properties:
      - { name: Id, type: Edm.Int32, key: true }
resource_sets:
  - { name: Items, type: Item }
",
        );
        let settings = AppSettings {
            model: Some(file.path().to_path_buf()),
            ..AppSettings::default()
        };
        let definition = settings.model_definition().unwrap().unwrap();
        assert_eq!(definition.container, "ShopEntities");
        assert!(definition.build().is_ok());
    }
}
