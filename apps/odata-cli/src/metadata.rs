use crate::common::CommonArgs;
use clap::Args;
use odata_service::ODataRequest;
use std::io::Write;

#[derive(Args)]
pub struct MetadataArgs {
    #[command(flatten)]
    common_args: CommonArgs,
}

impl MetadataArgs {
    pub fn run(&self) -> anyhow::Result<()> {
        let service = self.common_args.load()?;
        let request = ODataRequest::get(&format!("{}$metadata", service.service_root()))?;
        let response = service.handle(&request);
        if !response.status.is_success() {
            anyhow::bail!("metadata request failed with status {}: {}", response.status, response.body_text());
        }
        let mut out = std::io::stdout().lock();
        out.write_all(&response.body)?;
        writeln!(out)?;
        Ok(())
    }
}
