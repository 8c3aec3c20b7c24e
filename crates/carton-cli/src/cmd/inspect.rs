//! Inspect command

use anyhow::Result;
use carton_core::PackageReader;
use carton_schema::ManifestEntry;
use std::path::Path;

/// Print the declaration and manifest of a package
pub fn inspect(package: &Path) -> Result<()> {
    let mut reader = PackageReader::open(package)?;
    let declaration = reader.declaration();
    let lw = 12;

    println!();
    println!(
        "  {} {}",
        declaration.display_name.as_deref().unwrap_or(&declaration.name),
        declaration.version
    );
    if let Some(description) = &declaration.description {
        println!("  {description}");
    }
    println!();
    if let Some(vendor) = &declaration.vendor {
        println!("  {:<lw$}{vendor}", "vendor");
    }
    if !declaration.licenses.is_empty() {
        println!("  {:<lw$}{}", "license", declaration.licenses.join(", "));
    }
    for link in &declaration.links {
        println!("  {:<lw$}{}", link.rel, link.href);
    }
    for runtime in &declaration.runtimes {
        println!(
            "  {:<lw$}{} {} {}",
            "runtime",
            runtime.platform(),
            runtime.format,
            runtime.url
        );
    }

    println!();
    println!("  {} entries", declaration.manifest.len());
    for entry in &declaration.manifest {
        let detail = match entry {
            ManifestEntry::Module(_) => String::new(),
            ManifestEntry::PlatformModule(module) => module.platform().to_string(),
            ManifestEntry::Resource(resource) => resource.role.to_string(),
        };
        println!(
            "  {:<16}{:<40}{detail:<16}{}",
            entry.kind(),
            entry.name().as_str(),
            entry.hash()
        );
    }
    println!();

    reader.close();
    Ok(())
}
