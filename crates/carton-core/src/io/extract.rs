//! Archive extraction module
//!
//! Handles the runtime distribution formats: zip archives are extracted as
//! they are, gzip tarballs lose their single top-level directory.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use carton_schema::RuntimeFormat;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Entry escapes the destination: {}", .0.display())]
    UnsafePath(PathBuf),
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether this is an executable
    pub is_executable: bool,
}

/// Permission bits for a regular file extracted from a runtime tarball: read
/// and write for owner and group, plus the owner execute bit if the archive
/// had it.
pub fn runtime_file_mode(archive_mode: u32) -> u32 {
    0o660 | (archive_mode & 0o100)
}

/// Extract `archive_path` in `format` into `dest_dir`.
pub fn extract(
    format: RuntimeFormat,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    match format {
        RuntimeFormat::Zip => extract_zip(archive_path, dest_dir),
        RuntimeFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
    }
}

/// Extract a tar.gz archive to a destination directory, dropping the first
/// path component of every entry.
pub fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;
    let root = dest_dir.canonicalize()?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted_files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let Some(relative_path) = strip_first_component(&entry_path)? else {
            continue;
        };
        let absolute_path = root.join(&relative_path);
        let entry_type = entry.header().entry_type();

        // A symlink placed by an earlier entry must not redirect writes.
        let parent = absolute_path.parent().unwrap_or(&root);
        ensure_within(&root, parent, &relative_path)?;
        fs::create_dir_all(parent)?;
        ensure_within(&root, parent, &relative_path)?;

        if entry_type.is_dir() {
            remove_symlink(&absolute_path)?;
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if entry_type.is_symlink() {
            let Some(target) = entry.link_name()? else {
                continue;
            };
            create_symlink(&target, &absolute_path)?;
            continue;
        }

        if entry_type.is_hard_link() {
            let Some(target) = entry.link_name()? else {
                continue;
            };
            let Some(target) = strip_first_component(&target)? else {
                continue;
            };
            let source = root.join(&target);
            ensure_within(&root, source.parent().unwrap_or(&root), &target)?;
            remove_symlink(&absolute_path)?;
            fs::hard_link(source, &absolute_path)?;
            continue;
        }

        if !entry_type.is_file() {
            debug!(path = %entry_path.display(), "skipping special tar entry");
            continue;
        }

        let mode = entry.header().mode().unwrap_or(0o644);
        remove_symlink(&absolute_path)?;
        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut entry, &mut outfile)?;
        drop(outfile);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                &absolute_path,
                fs::Permissions::from_mode(runtime_file_mode(mode)),
            )?;
        }

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable: mode & 0o100 != 0,
        });
    }

    Ok(extracted_files)
}

/// Drop the first component. `Ok(None)` when nothing is left (the top-level
/// directory itself).
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>, ExtractError> {
    let mut components = path.components().skip_while(|c| matches!(c, Component::CurDir));
    components.next();
    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => return Err(ExtractError::UnsafePath(path.to_path_buf())),
        }
    }
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(stripped))
}

/// Fail unless the deepest existing ancestor of `path` resolves inside `root`.
fn ensure_within(root: &Path, path: &Path, relative: &Path) -> Result<(), ExtractError> {
    let existing = path.ancestors().find(|p| p.exists()).unwrap_or(root);
    if existing.canonicalize()?.starts_with(root) {
        Ok(())
    } else {
        Err(ExtractError::UnsafePath(relative.to_path_buf()))
    }
}

/// Drop a symlink sitting where a file or directory is about to be written.
fn remove_symlink(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(path),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    debug!(
        link = %link.display(),
        target = %target.display(),
        "symlinks are not extracted on this platform"
    );
    Ok(())
}

/// Extract a zip archive
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            return Err(ExtractError::UnsafePath(PathBuf::from(file.name())));
        };

        if file.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative_path))?;
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        let is_executable = if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
            mode & 0o111 != 0
        } else {
            false
        };
        #[cfg(not(unix))]
        let is_executable = false;

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}
