//! carton - pack, verify and run carton packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Thin front end over `carton-core`.
//!
//! # Cache Layout
//!
//! ```text
//! ~/.carton/
//! └── cache/
//!     └── runtime/    # Workspace: jdk-archive, jdk/, jdk-ok, work/
//! ```

pub mod cmd;

pub use carton_core::USER_AGENT;
pub use carton_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "carton")]
#[command(author, version, about = "carton - pack, verify and run carton packages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a package from a declaration and a payload directory
    Pack {
        /// Declaration document (PACKAGE.XML)
        #[arg(short, long)]
        declaration: PathBuf,
        /// Directory holding the declared entries
        #[arg(short, long)]
        from: PathBuf,
        /// Package to write
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show the declaration and manifest of a package
    Inspect {
        /// Package file
        package: PathBuf,
    },
    /// Check every entry against its declared hash
    Verify {
        /// Package file
        package: PathBuf,
    },
    /// Unpack a package into a directory
    Unpack {
        /// Package file
        package: PathBuf,
        /// Output directory
        output: PathBuf,
        /// Keep platform modules of every platform under lib/<arch>/<os>
        #[arg(long, conflicts_with = "platform")]
        all_platforms: bool,
        /// Platform whose modules are merged into lib/ (default: current)
        #[arg(long)]
        platform: Option<String>,
    },
    /// Download and extract the runtime a package declares
    Runtime {
        /// Package file
        package: PathBuf,
        /// Platform to fetch the runtime for (default: current)
        #[arg(long)]
        platform: Option<String>,
        /// Runtime cache directory
        #[arg(long, env = "CARTON_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
    },
    /// Compute the hash of files (for package authoring)
    Hash {
        /// Digest algorithm
        #[arg(short, long, default_value = "SHA-256")]
        algorithm: String,
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Parse an `os/arch` argument, defaulting to the current platform.
pub fn parse_platform(arg: Option<&str>) -> anyhow::Result<carton_schema::Platform> {
    match arg {
        Some(value) => value.parse().map_err(anyhow::Error::msg),
        None => Ok(carton_schema::Platform::current()),
    }
}
