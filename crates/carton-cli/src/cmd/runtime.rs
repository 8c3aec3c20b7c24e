//! Runtime command

use anyhow::{Context, Result};
use carton_core::{PackageReader, Workspace, WorkspaceConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};

/// Provision the runtime a package declares and print its location
pub async fn runtime(
    package: &Path,
    platform: Option<&str>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let platform = crate::parse_platform(platform)?;
    let base_dir = match cache_dir {
        Some(dir) => dir,
        None => carton_core::paths::runtime_cache_path()
            .context("Could not determine home directory. Set CARTON_HOME to override.")?,
    };

    tracing::debug!(%platform, cache = %base_dir.display(), "resolving runtime");
    let mut reader = PackageReader::open(package)?;
    let config = WorkspaceConfig::for_package(base_dir, &reader, platform)?;
    reader.close();

    let client = carton_core::default_http_client().context("Failed to build HTTP client")?;
    let workspace = Workspace::open(config, client)?;

    let mut progress = workspace.java_runtime_download();
    let reporter = tokio::spawn(async move {
        let mut last_percent = None;
        while let Some(event) = progress.next().await {
            let percent = event.fraction().map(|f| (f * 100.0) as u8);
            if percent != last_percent {
                if let Some(p) = percent {
                    eprint!("\rDownloading runtime... {p:>3}%");
                }
                last_percent = percent;
            }
        }
        if last_percent.is_some() {
            eprintln!();
        }
    });

    let result = workspace.java_runtime().await;
    reporter.await.ok();
    let path = result?;

    println!("{}", path.display());
    Ok(())
}
