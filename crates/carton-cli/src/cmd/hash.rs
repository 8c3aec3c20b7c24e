//! Hash command

use anyhow::{Context, Result};
use carton_schema::{Hash, HashAlgorithm};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Print `<digest> <path>` for each file
pub fn hash(algorithm: &str, files: &[PathBuf]) -> Result<()> {
    let algorithm = HashAlgorithm::from_name(algorithm)
        .with_context(|| format!("Unsupported hash algorithm: {algorithm}"))?;
    for file in files {
        let hash = compute_file_hash(algorithm, file)?;
        println!("{} {}", hash.digest(), file.display());
    }
    Ok(())
}

fn compute_file_hash(algorithm: HashAlgorithm, path: &Path) -> Result<Hash> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Hash::compute(algorithm, BufReader::new(file))
        .with_context(|| format!("Failed to read {}", path.display()))
}
