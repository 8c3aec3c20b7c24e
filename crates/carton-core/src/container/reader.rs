//! Opening, verifying and unpacking carton archives.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use carton_schema::{DECLARATION_PATH, FileName, Manifest, ManifestEntry, PackageDeclaration};
use filetime::FileTime;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::layout::{PlatformPolicy, target_dir};
use super::{ContainerError, HashingWriter, UNPACK_EPOCH, check_digest, resolve_algorithm};

/// Counts reported by [`PackageReader::unpack_into`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Entries written to disk (the declaration not included).
    pub written: usize,
    /// Platform modules skipped by the policy.
    pub ignored: usize,
}

/// A read-only view of a carton archive.
///
/// Opening parses the declaration and confirms every declared entry exists.
/// Content is only hashed when asked ([`check_hash`](Self::check_hash),
/// [`verify_all`](Self::verify_all)) or while unpacking.
#[derive(Debug)]
pub struct PackageReader {
    path: PathBuf,
    archive: Option<ZipArchive<BufReader<File>>>,
    declaration: PackageDeclaration,
    declaration_bytes: Vec<u8>,
    entries: HashMap<FileName, usize>,
}

impl PackageReader {
    /// Open the archive at `path`.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::Io`] / [`ContainerError::Archive`] if the file
    ///   cannot be read as a zip archive
    /// - [`ContainerError::MissingManifest`] without a declaration
    /// - [`ContainerError::Unparseable`] for an invalid declaration
    /// - [`ContainerError::MissingEntry`] if a declared entry is absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(ContainerError::io(&path))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(ContainerError::archive(&path))?;

        let mut declaration_index = None;
        let mut physical: HashMap<FileName, usize> = HashMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(ContainerError::archive(&path))?;
            if entry.is_dir() {
                continue;
            }
            let Ok(name) = FileName::new(entry.name()) else {
                debug!(entry = entry.name(), "skipping unaddressable archive entry");
                continue;
            };
            if name.matches(DECLARATION_PATH) {
                declaration_index = Some(index);
            } else {
                physical.entry(name).or_insert(index);
            }
        }

        let index = declaration_index.ok_or_else(|| ContainerError::MissingManifest {
            path: path.clone(),
        })?;
        let mut declaration_bytes = Vec::new();
        archive
            .by_index(index)
            .map_err(ContainerError::archive(&path))?
            .read_to_end(&mut declaration_bytes)
            .map_err(ContainerError::io(&path))?;
        let declaration = PackageDeclaration::from_bytes(&declaration_bytes).map_err(|source| {
            ContainerError::Unparseable {
                path: path.clone(),
                source,
            }
        })?;

        let mut entries = HashMap::with_capacity(declaration.manifest.len());
        for entry in &declaration.manifest {
            let index = physical
                .get(entry.name())
                .ok_or_else(|| ContainerError::MissingEntry {
                    name: entry.name().clone(),
                })?;
            entries.insert(entry.name().clone(), *index);
        }

        let undeclared = physical.len() - entries.len();
        if undeclared > 0 {
            debug!(count = undeclared, "archive carries undeclared entries");
        }
        info!(
            path = %path.display(),
            package = %declaration.name,
            version = %declaration.version,
            entries = entries.len(),
            "opened package"
        );

        Ok(Self {
            path,
            archive: Some(archive),
            declaration,
            declaration_bytes,
            entries,
        })
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed declaration.
    pub fn declaration(&self) -> &PackageDeclaration {
        &self.declaration
    }

    /// The declared payload.
    pub fn manifest(&self) -> &Manifest {
        &self.declaration.manifest
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.archive.is_none()
    }

    /// Stream the raw content of a declared entry. No hash check is applied.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NoSuchEntry`] for undeclared names,
    /// [`ContainerError::Closed`] after [`close`](Self::close).
    pub fn read_file(&mut self, name: &FileName) -> Result<impl Read + '_, ContainerError> {
        let Self {
            path,
            archive,
            entries,
            ..
        } = self;
        let archive = archive.as_mut().ok_or(ContainerError::Closed)?;
        let index = *entries
            .get(name)
            .ok_or_else(|| ContainerError::NoSuchEntry { name: name.clone() })?;
        archive
            .by_index(index)
            .map_err(ContainerError::archive(path.as_path()))
    }

    /// Hash the content of `name` and compare it with the declared hash.
    ///
    /// # Errors
    ///
    /// [`ContainerError::HashMismatch`] on a mismatch,
    /// [`ContainerError::HashAlgorithmUnsupported`] when the declared algorithm
    /// is unknown, plus the errors of [`read_file`](Self::read_file).
    pub fn check_hash(&mut self, name: &FileName) -> Result<(), ContainerError> {
        self.ensure_open()?;
        let expected = self
            .manifest()
            .get(name)
            .ok_or_else(|| ContainerError::NoSuchEntry { name: name.clone() })?
            .hash()
            .clone();
        let algorithm = resolve_algorithm(name, &expected)?;
        let path = self.path.clone();

        let mut hasher = algorithm.hasher();
        let mut content = self.read_file(name)?;
        io::copy(&mut content, &mut hasher).map_err(ContainerError::io(path))?;
        check_digest(name, &expected, hasher.finalize_hex())
    }

    /// [`check_hash`](Self::check_hash) every declared entry in manifest
    /// order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first error raised by [`check_hash`](Self::check_hash).
    pub fn verify_all(&mut self) -> Result<usize, ContainerError> {
        let names: Vec<FileName> = self.manifest().iter().map(|e| e.name().clone()).collect();
        for name in &names {
            self.check_hash(name)?;
        }
        debug!(entries = names.len(), "all entry hashes verified");
        Ok(names.len())
    }

    /// Unpack into `output_dir` following the layout in
    /// [`layout`](super::layout), verifying each entry while it is copied.
    ///
    /// Every written file and every directory created on the way gets the
    /// [`UNPACK_EPOCH`] modification time.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::LayoutConflict`] when two entries land on the same
    ///   path
    /// - [`ContainerError::HashMismatch`] if content does not match; the
    ///   offending file is removed
    /// - [`ContainerError::Io`] for filesystem failures
    pub fn unpack_into(
        &mut self,
        output_dir: &Path,
        policy: &dyn PlatformPolicy,
    ) -> Result<UnpackSummary, ContainerError> {
        self.ensure_open()?;
        let mut summary = UnpackSummary::default();
        let mut directories = BTreeSet::new();

        let declaration_target = output_dir.join(DECLARATION_PATH);
        create_parent(output_dir, &declaration_target, &mut directories)?;
        fs::write(&declaration_target, &self.declaration_bytes)
            .map_err(ContainerError::io(&declaration_target))?;
        stamp(&declaration_target)?;

        let entries: Vec<ManifestEntry> = self.manifest().entries().to_vec();
        let mut placed: HashMap<String, FileName> = HashMap::new();
        for entry in &entries {
            let Some(dir) = target_dir(entry, policy) else {
                debug!(entry = %entry.name(), "ignored by platform policy");
                summary.ignored += 1;
                continue;
            };
            let relative = dir.join(entry.name().file_name());
            let key = relative.to_string_lossy().to_lowercase();
            if let Some(existing) = placed.insert(key, entry.name().clone()) {
                return Err(ContainerError::LayoutConflict {
                    name: entry.name().clone(),
                    existing,
                    target: output_dir.join(relative),
                });
            }

            let target = output_dir.join(&relative);
            create_parent(output_dir, &target, &mut directories)?;
            self.unpack_entry(entry, &target)?;
            summary.written += 1;
        }

        for dir in &directories {
            stamp(dir)?;
        }
        info!(
            output = %output_dir.display(),
            written = summary.written,
            ignored = summary.ignored,
            "unpacked package"
        );
        Ok(summary)
    }

    /// Release the archive. Safe to call more than once; every later
    /// operation that touches content fails with [`ContainerError::Closed`].
    pub fn close(&mut self) {
        if self.archive.take().is_some() {
            debug!(path = %self.path.display(), "closed package");
        }
    }

    fn ensure_open(&self) -> Result<(), ContainerError> {
        if self.archive.is_none() {
            return Err(ContainerError::Closed);
        }
        Ok(())
    }

    fn unpack_entry(&mut self, entry: &ManifestEntry, target: &Path) -> Result<(), ContainerError> {
        let name = entry.name();
        let algorithm = resolve_algorithm(name, entry.hash())?;

        let file = File::create(target).map_err(ContainerError::io(target))?;
        let mut writer = HashingWriter::new(BufWriter::new(file), algorithm.hasher());
        let mut content = self.read_file(name)?;
        io::copy(&mut content, &mut writer).map_err(ContainerError::io(target))?;
        drop(content);
        let actual = writer.finish().map_err(ContainerError::io(target))?;

        if let Err(err) = check_digest(name, entry.hash(), actual) {
            warn!(entry = %name, "hash mismatch while unpacking, removing output");
            fs::remove_file(target).ok();
            return Err(err);
        }
        stamp(target)
    }
}

/// Create the parents of `target` below `root`, remembering each one.
fn create_parent(
    root: &Path,
    target: &Path,
    directories: &mut BTreeSet<PathBuf>,
) -> Result<(), ContainerError> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(ContainerError::io(parent))?;
    for ancestor in parent.ancestors() {
        if ancestor == root || !ancestor.starts_with(root) {
            break;
        }
        directories.insert(ancestor.to_path_buf());
    }
    Ok(())
}

fn stamp(path: &Path) -> Result<(), ContainerError> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(UNPACK_EPOCH, 0))
        .map_err(ContainerError::io(path))
}
