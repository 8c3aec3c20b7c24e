//! Pack command

use anyhow::{Context, Result};
use carton_core::PackageWriter;
use carton_schema::PackageDeclaration;
use std::path::Path;

/// Build `output` from the declaration document and the files under `from`
pub fn pack(declaration: &Path, from: &Path, output: &Path) -> Result<()> {
    let xml = std::fs::read(declaration)
        .with_context(|| format!("Failed to read {}", declaration.display()))?;
    let declaration = PackageDeclaration::from_bytes(&xml)
        .with_context(|| format!("Failed to parse {}", declaration.display()))?;

    let mut temporary = output.as_os_str().to_owned();
    temporary.push(".tmp");

    let mut writer = PackageWriter::create(output, temporary, declaration)?;
    let added = writer
        .pack_from(from)
        .with_context(|| format!("Failed to pack {}", from.display()))?;
    writer.close()?;

    println!("Packed {added} entries into {}", output.display());
    Ok(())
}
