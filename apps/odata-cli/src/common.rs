use anyhow::Context;
use clap::Args;
use odata_model::MetadataProviderWrapper;
use odata_service::settings::read_document;
use odata_service::{AppSettings, DataDocument, DataService, HttpMethod, InMemoryProvider, ODataRequest, init_logging};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct CommonArgs {
    /// Path to the YAML settings file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CommonArgs {
    /// Layered settings (defaults, file, `ODATA__*`), logging, then the service.
    pub fn load(&self) -> anyhow::Result<DataService> {
        if let Some(path) = &self.config
            && !path.is_file()
        {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
        let mut settings = AppSettings::load(self.config.as_deref()).context("failed to load settings")?;
        if let Some(level) = verbosity(self.verbose) {
            level.clone_into(&mut settings.logging.level);
        }
        init_logging(&settings.logging).context("failed to install logging")?;
        build_service(&settings)
    }
}

fn verbosity(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Build the model from the configured definition and seed the in-memory provider.
pub fn build_service(settings: &AppSettings) -> anyhow::Result<DataService> {
    let definition = settings
        .model_definition()?
        .context("no model definition configured; set `model` in the settings file or ODATA__MODEL")?;
    let model = definition.build().context("invalid model definition")?;
    let wrapper = Arc::new(MetadataProviderWrapper::new(
        Arc::new(model),
        Arc::new(settings.service.clone()),
    ));
    let provider = InMemoryProvider::new(wrapper.clone());
    if let Some(path) = &settings.data {
        let document: DataDocument = read_document(path)?;
        provider
            .load(&document)
            .with_context(|| format!("failed to load data from {}", path.display()))?;
    }
    let service = DataService::new(&settings.service_root, wrapper, Arc::new(provider))?;
    tracing::info!(service_root = service.service_root(), "service ready");
    Ok(service)
}

#[derive(Args)]
pub struct RequestArgs {
    /// Request URI, absolute or relative to the service root
    uri: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as `Name: value`; repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    data_file: Option<PathBuf>,
}

impl RequestArgs {
    pub fn to_request(&self, service_root: &str) -> anyhow::Result<ODataRequest> {
        let method = HttpMethod::parse(&self.method)?;
        let mut request = ODataRequest::new(method, &resolve_uri(service_root, &self.uri))?;
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            request = request.with_header_str(name, value);
        }
        if let Some(data) = &self.data {
            request = request.with_body(data.as_bytes());
        } else if let Some(path) = &self.data_file {
            let body = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            request = request.with_body(body);
        }
        Ok(request)
    }
}

fn resolve_uri(service_root: &str, uri: &str) -> String {
    if uri.contains("://") {
        uri.to_owned()
    } else {
        format!("{service_root}{}", uri.trim_start_matches('/'))
    }
}

fn parse_header(raw: &str) -> anyhow::Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header '{raw}' is not `Name: value`"))?;
    Ok((name.trim(), value.trim()))
}
