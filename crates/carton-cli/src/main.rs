//! carton - pack, verify and run carton packages

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use carton_cli::cmd;
use carton_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack {
            declaration,
            from,
            output,
        } => cmd::pack::pack(&declaration, &from, &output),
        Commands::Inspect { package } => cmd::inspect::inspect(&package),
        Commands::Verify { package } => cmd::verify::verify(&package),
        Commands::Unpack {
            package,
            output,
            all_platforms,
            platform,
        } => cmd::unpack::unpack(&package, &output, all_platforms, platform.as_deref()),
        Commands::Runtime {
            package,
            platform,
            cache_dir,
        } => cmd::runtime::runtime(&package, platform.as_deref(), cache_dir).await,
        Commands::Hash { algorithm, files } => cmd::hash::hash(&algorithm, &files),
    }
}
