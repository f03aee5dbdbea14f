#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use clap::{Parser, Subcommand};

mod common;
mod compile;
mod metadata;
mod query;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(name = "odata-cli")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a request URI and print what it resolves to
    Compile(compile::CompileArgs),
    /// Execute a request against the in-memory data and print the response
    Query(query::QueryArgs),
    /// Print the `$metadata` document
    Metadata(metadata::MetadataArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile(compile) => compile.run(),
        Commands::Query(query) => query.run(),
        Commands::Metadata(metadata) => metadata.run(),
    }
}
