use crate::common::{CommonArgs, RequestArgs};
use clap::Args;
use http::StatusCode;
use std::io::Write;

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Print the status line and response headers before the body
    #[arg(short = 'i', long)]
    include: bool,

    #[command(flatten)]
    common_args: CommonArgs,
}

impl QueryArgs {
    pub fn run(&self) -> anyhow::Result<()> {
        let service = self.common_args.load()?;
        let request = self.request.to_request(service.service_root())?;
        let response = service.handle(&request);
        tracing::info!(status = %response.status, bytes = response.body.len(), "request completed");

        let mut out = std::io::stdout().lock();
        if self.include {
            writeln!(out, "{}", response.status)?;
            for (name, value) in &response.headers {
                writeln!(out, "{name}: {}", value.to_str().unwrap_or_default())?;
            }
            writeln!(out)?;
        }
        out.write_all(&response.body)?;
        writeln!(out)?;

        if response.status.is_success() || response.status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else {
            anyhow::bail!("request failed with status {}", response.status)
        }
    }
}
