//! Reading, writing and running carton packages.
//!
//! - [`container`]: the archive format (declaration plus hash-checked payload)
//! - [`workspace`]: the runtime cache that downloads and extracts the Java
//!   runtime a package needs
//! - [`io`]: download, extraction and progress plumbing behind the workspace

pub mod container;
pub mod io;
pub mod paths;
pub mod workspace;

pub use container::{
    AllPlatforms, ContainerError, PackageReader, PackageWriter, Placement, PlatformPolicy,
    SinglePlatform, UnpackSummary,
};
pub use io::progress::DownloadProgress;
pub use paths::*;
pub use workspace::{
    RuntimeError, RuntimeFuture, RuntimePaths, RuntimeSource, Workspace, WorkspaceConfig,
};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("carton-core/", env!("CARGO_PKG_VERSION"));

/// HTTP client with the carton user agent.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn default_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}
