//! Unpack command

use anyhow::Result;
use carton_core::{AllPlatforms, PackageReader, PlatformPolicy, SinglePlatform};
use std::path::Path;

/// Unpack a package into `output`
pub fn unpack(
    package: &Path,
    output: &Path,
    all_platforms: bool,
    platform: Option<&str>,
) -> Result<()> {
    let policy: Box<dyn PlatformPolicy> = if all_platforms {
        Box::new(AllPlatforms)
    } else {
        Box::new(SinglePlatform(crate::parse_platform(platform)?))
    };

    let mut reader = PackageReader::open(package)?;
    let summary = reader.unpack_into(output, policy.as_ref())?;
    reader.close();

    println!(
        "Unpacked {} entries into {} ({} skipped)",
        summary.written,
        output.display(),
        summary.ignored
    );
    Ok(())
}
