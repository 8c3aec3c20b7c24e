//! Building carton archives.
//!
//! The archive is written to a temporary path and only renamed onto the
//! final path once every declared entry has been written with matching
//! content. Entry timestamps, order and compression are fixed, so the same
//! declaration and content always produce the same bytes.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use carton_schema::{DECLARATION_PATH, FileName, PackageDeclaration};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{ARCHIVE_EPOCH, ContainerError, HashingWriter, check_digest, resolve_algorithm};

/// Sources at or above this size are stored with ZIP64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

enum WriterState {
    Open(ZipWriter<BufWriter<File>>),
    Committed,
    Abandoned(Vec<FileName>),
    Failed,
}

/// Streams declared entries into a new archive.
///
/// ```no_run
/// # use carton_core::container::PackageWriter;
/// # use carton_schema::{FileName, Hash, Manifest, ManifestEntry, PackageDeclaration};
/// # fn demo(hash: Hash) -> Result<(), carton_core::container::ContainerError> {
/// let name = FileName::new("lib/app.jar").unwrap();
/// let manifest = Manifest::new(vec![ManifestEntry::module(name.clone(), hash)]).unwrap();
/// let declaration = PackageDeclaration::new("app", "1.0.0", manifest);
///
/// let mut writer = PackageWriter::create("app.carton", "app.carton.tmp", declaration)?;
/// writer.add_file(&name, "build/app.jar".as_ref())?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct PackageWriter {
    final_path: PathBuf,
    temporary_path: PathBuf,
    declaration: PackageDeclaration,
    written: HashSet<FileName>,
    state: WriterState,
}

impl std::fmt::Debug for PackageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            WriterState::Open(_) => "open",
            WriterState::Committed => "committed",
            WriterState::Abandoned(_) => "abandoned",
            WriterState::Failed => "failed",
        };
        f.debug_struct("PackageWriter")
            .field("final_path", &self.final_path)
            .field("temporary_path", &self.temporary_path)
            .field("written", &self.written.len())
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl PackageWriter {
    /// Start an archive at `temporary_path` and write the declaration into it.
    /// The declaration is stored [normalized](PackageDeclaration::normalized).
    ///
    /// # Errors
    ///
    /// [`ContainerError::Io`] if the temporary file cannot be created,
    /// [`ContainerError::Declaration`] if the declaration cannot be serialized.
    pub fn create(
        final_path: impl Into<PathBuf>,
        temporary_path: impl Into<PathBuf>,
        declaration: PackageDeclaration,
    ) -> Result<Self, ContainerError> {
        let final_path = final_path.into();
        let temporary_path = temporary_path.into();
        let declaration = declaration.normalized();
        let xml = declaration.to_xml().map_err(ContainerError::Declaration)?;

        let file = File::create(&temporary_path).map_err(ContainerError::io(&temporary_path))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        zip.start_file(DECLARATION_PATH, entry_options(false))
            .map_err(ContainerError::archive(&temporary_path))?;
        zip.write_all(xml.as_bytes())
            .map_err(ContainerError::io(&temporary_path))?;

        debug!(
            temporary = %temporary_path.display(),
            entries = declaration.manifest.len(),
            "started package"
        );
        Ok(Self {
            final_path,
            temporary_path,
            declaration,
            written: HashSet::new(),
            state: WriterState::Open(zip),
        })
    }

    /// The declaration being written, in the normalized form readers see.
    pub fn declaration(&self) -> &PackageDeclaration {
        &self.declaration
    }

    /// Copy the file at `source` into the archive as `name`.
    ///
    /// # Errors
    ///
    /// See [`add_reader`](Self::add_reader).
    pub fn add_file(&mut self, name: &FileName, source: &Path) -> Result<(), ContainerError> {
        let file = File::open(source).map_err(ContainerError::io(source))?;
        let large = file
            .metadata()
            .is_ok_and(|meta| meta.len() >= LARGE_FILE_THRESHOLD);
        self.add_entry(name, BufReader::new(file), source, large)
    }

    /// Stream `reader` into the archive as `name`, hashing it on the way.
    ///
    /// On a hash mismatch the partial entry is removed from the archive and
    /// `name` may be written again.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::Reserved`] for the declaration path
    /// - [`ContainerError::NotDeclared`] if `name` is not in the manifest
    /// - [`ContainerError::AlreadyWritten`] if `name` was written before
    /// - [`ContainerError::HashMismatch`] if the content does not match
    /// - [`ContainerError::Closed`] after [`close`](Self::close)
    pub fn add_reader<R: Read>(&mut self, name: &FileName, reader: R) -> Result<(), ContainerError> {
        let origin = self.temporary_path.clone();
        self.add_entry(name, reader, &origin, false)
    }

    /// Add every regular file below `directory`, in sorted order, named by
    /// its path relative to `directory`. A file at the declaration path is
    /// skipped. Returns the number of files added.
    ///
    /// # Errors
    ///
    /// [`ContainerError::InvalidName`] for paths that are not valid entry
    /// names, plus every error of [`add_file`](Self::add_file).
    pub fn pack_from(&mut self, directory: &Path) -> Result<usize, ContainerError> {
        let mut added = 0;
        for entry in WalkDir::new(directory).sort_by_file_name() {
            let entry = entry.map_err(|e| ContainerError::Io {
                path: directory.to_path_buf(),
                source: io::Error::from(e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(directory) else {
                continue;
            };
            let name = FileName::from_relative_path(relative).map_err(|source| {
                ContainerError::InvalidName {
                    path: entry.path().to_path_buf(),
                    source,
                }
            })?;
            if name.matches(DECLARATION_PATH) {
                debug!(path = %entry.path().display(), "skipping declaration file");
                continue;
            }
            self.add_file(&name, entry.path())?;
            added += 1;
        }
        Ok(added)
    }

    /// Finish the archive and move it onto the final path.
    ///
    /// If declared entries were never written, the temporary file is left
    /// finalized in place and [`ContainerError::FileMissed`] is returned (now
    /// and on every later call). After a successful commit further calls do
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`ContainerError::FileMissed`], [`ContainerError::Commit`] if the
    /// rename fails, [`ContainerError::Io`] / [`ContainerError::Archive`] while
    /// finishing the file, [`ContainerError::Closed`] after an earlier failure.
    pub fn close(&mut self) -> Result<(), ContainerError> {
        let zip = match std::mem::replace(&mut self.state, WriterState::Failed) {
            WriterState::Open(zip) => zip,
            WriterState::Committed => {
                self.state = WriterState::Committed;
                return Ok(());
            }
            WriterState::Abandoned(names) => {
                self.state = WriterState::Abandoned(names.clone());
                return Err(ContainerError::FileMissed { names });
            }
            WriterState::Failed => return Err(ContainerError::Closed),
        };

        let missing: Vec<FileName> = self
            .declaration
            .manifest
            .iter()
            .map(|entry| entry.name())
            .filter(|name| !self.written.contains(*name))
            .cloned()
            .collect();

        self.finish_archive(zip)?;

        if !missing.is_empty() {
            warn!(
                temporary = %self.temporary_path.display(),
                missing = missing.len(),
                "declared entries were never written, not committing"
            );
            self.state = WriterState::Abandoned(missing.clone());
            return Err(ContainerError::FileMissed { names: missing });
        }

        fs::rename(&self.temporary_path, &self.final_path).map_err(|source| {
            ContainerError::Commit {
                from: self.temporary_path.clone(),
                to: self.final_path.clone(),
                source,
            }
        })?;
        self.state = WriterState::Committed;
        info!(
            path = %self.final_path.display(),
            entries = self.written.len(),
            "committed package"
        );
        Ok(())
    }

    fn add_entry<R: Read>(
        &mut self,
        name: &FileName,
        mut reader: R,
        origin: &Path,
        large: bool,
    ) -> Result<(), ContainerError> {
        let WriterState::Open(zip) = &mut self.state else {
            return Err(ContainerError::Closed);
        };
        if name.matches(DECLARATION_PATH) {
            return Err(ContainerError::Reserved { name: name.clone() });
        }
        let entry = self
            .declaration
            .manifest
            .get(name)
            .ok_or_else(|| ContainerError::NotDeclared { name: name.clone() })?;
        if self.written.contains(name) {
            return Err(ContainerError::AlreadyWritten { name: name.clone() });
        }
        let algorithm = resolve_algorithm(name, entry.hash())?;
        let temporary = &self.temporary_path;

        zip.start_file(entry.name().as_str(), entry_options(large))
            .map_err(ContainerError::archive(temporary))?;
        let mut tee = HashingWriter::new(&mut *zip, algorithm.hasher());
        let copied = io::copy(&mut reader, &mut tee).and_then(|_| tee.finish());
        let actual = match copied {
            Ok(actual) => actual,
            Err(source) => {
                zip.abort_file().map_err(ContainerError::archive(temporary))?;
                return Err(ContainerError::Io {
                    path: origin.to_path_buf(),
                    source,
                });
            }
        };

        if let Err(err) = check_digest(name, entry.hash(), actual) {
            warn!(entry = %name, "hash mismatch, dropping entry");
            zip.abort_file().map_err(ContainerError::archive(temporary))?;
            return Err(err);
        }

        debug!(entry = %name, "wrote entry");
        self.written.insert(entry.name().clone());
        Ok(())
    }

    fn finish_archive(&self, zip: ZipWriter<BufWriter<File>>) -> Result<(), ContainerError> {
        let temporary = &self.temporary_path;
        let buffered = zip.finish().map_err(ContainerError::archive(temporary))?;
        let mut file = buffered
            .into_inner()
            .map_err(|e| ContainerError::io(temporary)(e.into_error()))?;
        // Dropped entries can leave stale bytes past the central directory.
        let end = file.stream_position().map_err(ContainerError::io(temporary))?;
        file.set_len(end).map_err(ContainerError::io(temporary))?;
        file.sync_all().map_err(ContainerError::io(temporary))
    }
}

fn entry_options(large: bool) -> SimpleFileOptions {
    let (year, month, day, hour, minute, second) = ARCHIVE_EPOCH;
    let timestamp =
        DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap_or_default();
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(timestamp)
        .unix_permissions(0o644)
        .large_file(large)
}
