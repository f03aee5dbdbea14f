use crate::common::{CommonArgs, RequestArgs};
use clap::Args;
use odata_errors::Problem;
use odata_service::{QueryType, RequestDescription};
use odata_uri::TargetKind;

#[derive(Args)]
pub struct CompileArgs {
    #[command(flatten)]
    request: RequestArgs,
    #[command(flatten)]
    common_args: CommonArgs,
}

impl CompileArgs {
    pub fn run(&self) -> anyhow::Result<()> {
        let service = self.common_args.load()?;
        let request = self.request.to_request(service.service_root())?;
        match service.compile(&request) {
            Ok(description) => {
                println!("{}", describe(&description));
                Ok(())
            }
            Err(err) => {
                let summary = err.to_string();
                println!("{}", serde_json::to_string_pretty(&Problem::from(err))?);
                anyhow::bail!("request did not compile: {summary}")
            }
        }
    }
}

fn describe(d: &RequestDescription) -> String {
    let mut lines: Vec<String> = d
        .segments()
        .iter()
        .map(|s| {
            let set = s.resource_set.as_ref().map_or("-", |set| set.name());
            let cardinality = if s.single_result { "single" } else { "many" };
            format!("{:<24} {:<16} {set} ({cardinality})", s.identifier, kind_name(s.target_kind))
        })
        .collect();
    lines.push(format!("query type: {}", query_type_name(d.query_type())));
    if let Some(order_by) = d.order_by() {
        lines.push(format!("orderby: {order_by}"));
    }
    if let Some(skip) = d.skip() {
        lines.push(format!("skip: {skip}"));
    }
    if let Some(top) = d.top() {
        lines.push(format!("top: {top}"));
    }
    if let Some(page_size) = d.page_size() {
        lines.push(format!("page size: {page_size}"));
    }
    if d.filter().is_some() {
        lines.push("filter: yes".to_owned());
    }
    if let Some(projection) = d.projection() {
        lines.push(format!(
            "projection: expand={} select={}",
            projection.is_expansion_specified(),
            projection.is_selection_specified()
        ));
    }
    let versions = d.versions();
    lines.push(format!("response version: {}", versions.response_version()));
    lines.push(format!("request max version: {}", versions.request_max_version()));
    lines.join("\n")
}

const fn kind_name(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Nothing => "nothing",
        TargetKind::ServiceDirectory => "service",
        TargetKind::Metadata => "metadata",
        TargetKind::Batch => "batch",
        TargetKind::Resource => "resource",
        TargetKind::ComplexObject => "complex",
        TargetKind::Primitive => "primitive",
        TargetKind::PrimitiveValue => "value",
        TargetKind::Bag => "bag",
        TargetKind::Link => "link",
        TargetKind::MediaResource => "media",
        TargetKind::Singleton => "singleton",
    }
}

const fn query_type_name(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::Entities => "entities",
        QueryType::EntitiesWithCount => "entities with count",
        QueryType::Count => "count",
    }
}
