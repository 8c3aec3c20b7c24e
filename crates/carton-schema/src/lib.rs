//! Shared types and document format for carton archives.
//!
//! Identity primitives ([`FileName`], [`Hash`], [`Platform`]), the manifest
//! model and the [`PackageDeclaration`] embedded in every archive. Nothing
//! here touches the filesystem; reading and writing archives lives in
//! `carton-core`.

pub mod declaration;
pub mod file_name;
pub mod hash;
pub mod manifest;
pub mod platform;

// Re-exports
pub use declaration::*;
pub use file_name::*;
pub use hash::*;
pub use manifest::*;
pub use platform::*;

/// Reserved archive path of the declaration document.
///
/// Matched case-insensitively when reading; never a valid manifest entry.
pub const DECLARATION_PATH: &str = "META-INF/CARTON/PACKAGE.XML";
