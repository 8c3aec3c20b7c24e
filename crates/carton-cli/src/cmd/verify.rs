//! Verify command

use anyhow::{Context, Result};
use carton_core::PackageReader;
use std::path::Path;

/// Check every declared entry of a package against its hash
pub fn verify(package: &Path) -> Result<()> {
    let mut reader = PackageReader::open(package)?;
    let verified = reader
        .verify_all()
        .with_context(|| format!("{} failed verification", package.display()))?;
    reader.close();

    println!("{}: {verified} entries OK", package.display());
    Ok(())
}
