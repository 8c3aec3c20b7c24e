//! Runtime cache workspace.
//!
//! A [`Workspace`] owns one cache directory and provisions a single Java
//! runtime into it: download, verify, extract, mark ready. However many
//! callers ask concurrently, the pipeline runs at most once per workspace,
//! and a ready marker left by an earlier process short-circuits it entirely.
//!
//! ```text
//! <base>/jdk-archive.tmp   download in progress
//! <base>/jdk-archive       verified archive
//! <base>/jdk/              extracted runtime
//! <base>/jdk-ok            ready marker
//! <base>/work/<random>/    scratch directories
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use carton_schema::{Hash, HashAlgorithm, Platform, RuntimeFormat};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use rand::Rng;
use rand::distr::Alphanumeric;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::container::PackageReader;
use crate::io::download::{DownloadError, DownloadRequest};
use crate::io::extract::{self, ExtractError};
use crate::io::progress::{DownloadProgress, ProgressHub};

/// Archive being downloaded.
pub const ARCHIVE_TEMP_FILE: &str = "jdk-archive.tmp";
/// Verified archive.
pub const ARCHIVE_FILE: &str = "jdk-archive";
/// Extracted runtime directory.
pub const RUNTIME_DIR: &str = "jdk";
/// Written last; its presence means the runtime is ready.
pub const READY_MARKER: &str = "jdk-ok";
/// Parent of scratch directories.
pub const WORK_DIR: &str = "work";

const WORK_DIR_NAME_LEN: usize = 12;

/// Failures of the runtime pipeline.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("checksum mismatch for {uri} ({}): expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        uri: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("HTTP {status} fetching {uri} into {}", path.display())]
    Http {
        uri: String,
        path: PathBuf,
        status: u16,
    },

    #[error("transport error fetching {uri} into {}: {source}", path.display())]
    Transport {
        uri: String,
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("IO error for {uri} at {}: {source}", path.display())]
    Io {
        uri: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot extract {uri} from {}: {source}", path.display())]
    Extract {
        uri: String,
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("unsupported hash algorithm '{algorithm}' for {uri}")]
    HashAlgorithmUnsupported { uri: String, algorithm: String },

    #[error("package declares no runtime for {platform}")]
    NoRuntimeForPlatform { platform: Platform },

    #[error("workspace must be opened inside a Tokio runtime")]
    NoExecutor,

    #[error("workspace is closed")]
    Closed,

    #[error("runtime pipeline aborted: {0}")]
    Aborted(String),
}

impl RuntimeError {
    /// Stable short tag for display and log aggregation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChecksumMismatch { .. } => "checksum-mismatch",
            Self::Http { .. } => "http",
            Self::Transport { .. } => "transport",
            Self::Io { .. } => "io",
            Self::Extract { .. } => "extract",
            Self::HashAlgorithmUnsupported { .. } => "hash-algorithm-unsupported",
            Self::NoRuntimeForPlatform { .. } => "no-runtime-for-platform",
            Self::NoExecutor => "no-executor",
            Self::Closed => "closed",
            Self::Aborted(_) => "aborted",
        }
    }

    /// Named values describing the failure.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let located = |uri: &str, path: &Path| {
            vec![("uri", uri.to_string()), ("path", path.display().to_string())]
        };
        match self {
            Self::ChecksumMismatch {
                uri,
                path,
                expected,
                actual,
            } => {
                let mut attributes = located(uri, path);
                attributes.push(("expected", expected.clone()));
                attributes.push(("actual", actual.clone()));
                attributes
            }
            Self::Http { uri, path, status } => {
                let mut attributes = located(uri, path);
                attributes.push(("status", status.to_string()));
                attributes
            }
            Self::Transport { uri, path, .. }
            | Self::Io { uri, path, .. }
            | Self::Extract { uri, path, .. } => located(uri, path),
            Self::HashAlgorithmUnsupported { uri, algorithm } => {
                vec![("uri", uri.clone()), ("algorithm", algorithm.clone())]
            }
            Self::NoRuntimeForPlatform { platform } => vec![("platform", platform.to_string())],
            Self::Aborted(reason) => vec![("reason", reason.clone())],
            Self::NoExecutor | Self::Closed => Vec::new(),
        }
    }

    fn from_download(err: DownloadError, uri: &str, path: &Path) -> Self {
        let uri = uri.to_string();
        let path = path.to_path_buf();
        match err {
            DownloadError::Status { status } => Self::Http { uri, path, status },
            DownloadError::Transport(source) => Self::Transport { uri, path, source },
            DownloadError::Io(source) => Self::Io { uri, path, source },
            DownloadError::HashMismatch { expected, actual } => Self::ChecksumMismatch {
                uri,
                path,
                expected,
                actual,
            },
            DownloadError::UnsupportedAlgorithm(algorithm) => {
                Self::HashAlgorithmUnsupported { uri, algorithm }
            }
        }
    }
}

/// Where the runtime comes from and how to check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSource {
    /// Download URL.
    pub url: String,
    /// Expected hash of the whole archive.
    pub hash: Hash,
    /// Archive format.
    pub format: RuntimeFormat,
}

/// Settings for one [`Workspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Cache directory owned by the workspace.
    pub base_dir: PathBuf,
    /// Runtime to provision.
    pub runtime: RuntimeSource,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    base_dir: Option<PathBuf>,
    runtime: RuntimeSection,
}

#[derive(Debug, Deserialize)]
struct RuntimeSection {
    url: String,
    #[serde(default = "default_algorithm")]
    algorithm: String,
    digest: String,
    format: Option<RuntimeFormat>,
}

fn default_algorithm() -> String {
    HashAlgorithm::Sha256.name().to_string()
}

impl WorkspaceConfig {
    /// Create a configuration.
    pub fn new(base_dir: impl Into<PathBuf>, runtime: RuntimeSource) -> Self {
        Self {
            base_dir: base_dir.into(),
            runtime,
        }
    }

    /// Configuration for the runtime a package declares for `platform`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NoRuntimeForPlatform`] when the package has none.
    pub fn for_package(
        base_dir: impl Into<PathBuf>,
        package: &PackageReader,
        platform: Platform,
    ) -> Result<Self, RuntimeError> {
        let requirement = package
            .declaration()
            .runtime_for(platform)
            .ok_or(RuntimeError::NoRuntimeForPlatform { platform })?;
        Ok(Self::new(
            base_dir,
            RuntimeSource {
                url: requirement.url.clone(),
                hash: requirement.hash.clone(),
                format: requirement.format,
            },
        ))
    }

    /// Load a TOML configuration file.
    ///
    /// ```toml
    /// base_dir = "/var/cache/carton/demo"   # optional
    ///
    /// [runtime]
    /// url = "https://example.com/jdk-21.tar.gz"
    /// algorithm = "SHA-256"                 # optional
    /// digest = "9f86d0..."
    /// format = "tar.gz"                     # optional, guessed from the url
    /// ```
    ///
    /// Without `base_dir` the runtime cache under the carton home is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, the format
    /// cannot be determined, or no base directory can be resolved.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let format = match file.runtime.format {
            Some(format) => format,
            None => RuntimeFormat::detect(&file.runtime.url)
                .with_context(|| format!("Cannot tell archive format of {}", file.runtime.url))?,
        };
        let base_dir = match file.base_dir {
            Some(dir) => dir,
            None => crate::paths::runtime_cache_path()
                .context("Could not determine home directory. Set CARTON_HOME to override.")?,
        };

        Ok(Self::new(
            base_dir,
            RuntimeSource {
                url: file.runtime.url,
                hash: Hash::new(file.runtime.algorithm, file.runtime.digest),
                format,
            },
        ))
    }
}

/// On-disk locations inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Cache root.
    pub base_dir: PathBuf,
    /// Download target.
    pub archive_temp: PathBuf,
    /// Verified archive.
    pub archive: PathBuf,
    /// Extracted runtime.
    pub runtime: PathBuf,
    /// Ready marker.
    pub marker: PathBuf,
    /// Scratch directory parent.
    pub work: PathBuf,
}

impl RuntimePaths {
    /// Layout under `base_dir`.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            archive_temp: base_dir.join(ARCHIVE_TEMP_FILE),
            archive: base_dir.join(ARCHIVE_FILE),
            runtime: base_dir.join(RUNTIME_DIR),
            marker: base_dir.join(READY_MARKER),
            work: base_dir.join(WORK_DIR),
        }
    }
}

/// Resolves to the extracted runtime directory. Clones share one result.
pub type RuntimeFuture = Shared<BoxFuture<'static, Result<PathBuf, Arc<RuntimeError>>>>;

enum RuntimeState {
    NotStarted,
    InFlight {
        future: RuntimeFuture,
        abort: AbortHandle,
    },
    Done(PathBuf),
    Closed,
}

struct Inner {
    source: RuntimeSource,
    paths: RuntimePaths,
    client: Client,
    progress: ProgressHub,
    state: Mutex<RuntimeState>,
    pipeline: tokio::sync::Mutex<()>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn provision(&self) -> Result<PathBuf, RuntimeError> {
        let _running = self.pipeline.lock().await;
        let paths = &self.paths;
        if paths.marker.exists() {
            debug!(path = %paths.runtime.display(), "runtime became ready while waiting");
            return Ok(paths.runtime.clone());
        }

        let uri = self.source.url.as_str();
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| RuntimeError::Io {
                uri: uri.to_string(),
                path,
                source,
            }
        };

        tokio::fs::create_dir_all(&paths.base_dir)
            .await
            .map_err(io_error(&paths.base_dir))?;

        info!(url = uri, dest = %paths.archive_temp.display(), "downloading runtime");
        let request = DownloadRequest::new(&self.client, uri, &paths.archive_temp, &self.source.hash)
            .with_progress(&self.progress);
        if let Err(err) = request.execute().await {
            tokio::fs::remove_file(&paths.archive_temp).await.ok();
            return Err(RuntimeError::from_download(err, uri, &paths.archive_temp));
        }
        tokio::fs::rename(&paths.archive_temp, &paths.archive)
            .await
            .map_err(io_error(&paths.archive))?;

        if tokio::fs::try_exists(&paths.runtime).await.unwrap_or(false) {
            debug!(path = %paths.runtime.display(), "clearing stale runtime directory");
            tokio::fs::remove_dir_all(&paths.runtime)
                .await
                .map_err(io_error(&paths.runtime))?;
        }

        info!(format = %self.source.format, dest = %paths.runtime.display(), "extracting runtime");
        let format = self.source.format;
        let archive = paths.archive.clone();
        let dest = paths.runtime.clone();
        let extracted = tokio::task::spawn_blocking(move || extract::extract(format, &archive, &dest))
            .await
            .map_err(|e| io_error(&paths.runtime)(io::Error::other(e)))?
            .map_err(|source| RuntimeError::Extract {
                uri: uri.to_string(),
                path: paths.archive.clone(),
                source,
            })?;

        tokio::fs::write(&paths.marker, b"")
            .await
            .map_err(io_error(&paths.marker))?;
        info!(files = extracted.len(), path = %paths.runtime.display(), "runtime ready");
        Ok(paths.runtime.clone())
    }

    /// Record the outcome and end this run's progress streams. The hub is
    /// only touched under the state lock, so a retry cannot race it.
    fn complete(&self, result: &Result<PathBuf, RuntimeError>) {
        let mut state = self.state();
        self.progress.finish();
        if matches!(*state, RuntimeState::Closed) {
            return;
        }
        *state = match result {
            Ok(path) => RuntimeState::Done(path.clone()),
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "runtime provisioning failed");
                self.progress.reset();
                RuntimeState::NotStarted
            }
        };
    }
}

/// A runtime cache directory with single-flight provisioning.
///
/// Must be opened inside a Tokio runtime; the pipeline runs as a task on that
/// runtime. Dropping the workspace closes it.
pub struct Workspace {
    inner: Arc<Inner>,
    handle: Handle,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("paths", &self.inner.paths)
            .field("source", &self.inner.source)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Open a workspace. Nothing is touched on disk until it is needed.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NoExecutor`] outside a Tokio runtime.
    pub fn open(config: WorkspaceConfig, client: Client) -> Result<Self, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoExecutor)?;
        let paths = RuntimePaths::new(&config.base_dir);
        debug!(base = %paths.base_dir.display(), url = %config.runtime.url, "opened workspace");
        Ok(Self {
            inner: Arc::new(Inner {
                source: config.runtime,
                paths,
                client,
                progress: ProgressHub::new(),
                state: Mutex::new(RuntimeState::NotStarted),
                pipeline: tokio::sync::Mutex::new(()),
            }),
            handle,
        })
    }

    /// Locations inside this workspace.
    pub fn paths(&self) -> &RuntimePaths {
        &self.inner.paths
    }

    /// Progress of the runtime download.
    ///
    /// Each call returns an independent stream that ends when the pipeline
    /// finishes. The download only advances as fast as the slowest live
    /// stream is consumed. After a failed run, new streams follow the retry;
    /// once the runtime is ready they end immediately.
    pub fn java_runtime_download(&self) -> ReceiverStream<DownloadProgress> {
        self.inner.progress.subscribe()
    }

    /// The extracted runtime directory, provisioning it on first use.
    ///
    /// Concurrent callers share one pipeline run. A failure is delivered to
    /// every caller of that run; the next call starts over.
    pub fn java_runtime(&self) -> RuntimeFuture {
        let mut state = self.inner.state();
        match &*state {
            RuntimeState::Done(path) => return ready(Ok(path.clone())),
            RuntimeState::InFlight { future, .. } => return future.clone(),
            RuntimeState::Closed => return ready(Err(Arc::new(RuntimeError::Closed))),
            RuntimeState::NotStarted => {}
        }

        let paths = &self.inner.paths;
        if paths.marker.exists() {
            debug!(path = %paths.runtime.display(), "runtime already provisioned");
            self.inner.progress.finish();
            *state = RuntimeState::Done(paths.runtime.clone());
            return ready(Ok(paths.runtime.clone()));
        }

        let inner = Arc::clone(&self.inner);
        let task = self.handle.spawn(async move {
            let result = inner.provision().await;
            inner.complete(&result);
            result
        });
        let abort = task.abort_handle();
        let future = async move {
            match task.await {
                Ok(result) => result.map_err(Arc::new),
                Err(err) if err.is_cancelled() => Err(Arc::new(RuntimeError::Closed)),
                Err(err) => Err(Arc::new(RuntimeError::Aborted(err.to_string()))),
            }
        }
        .boxed()
        .shared();

        *state = RuntimeState::InFlight {
            future: future.clone(),
            abort,
        };
        future
    }

    /// Create a fresh, uniquely named directory under `work/`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Io`] if the directory cannot be created,
    /// [`RuntimeError::Closed`] after [`close`](Self::close).
    pub fn create_work_directory(&self) -> Result<PathBuf, RuntimeError> {
        if matches!(*self.inner.state(), RuntimeState::Closed) {
            return Err(RuntimeError::Closed);
        }
        let work = &self.inner.paths.work;
        let io_error = |path: &Path, source: io::Error| RuntimeError::Io {
            uri: self.inner.source.url.clone(),
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(work).map_err(|e| io_error(work, e))?;

        loop {
            let name: String = rand::rng()
                .sample_iter(Alphanumeric)
                .take(WORK_DIR_NAME_LEN)
                .map(char::from)
                .collect();
            let dir = work.join(name.to_lowercase());
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "created work directory");
                    return Ok(dir);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(io_error(&dir, e)),
            }
        }
    }

    /// Cancel any in-flight pipeline and end progress streams. Later
    /// operations fail with [`RuntimeError::Closed`]. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state();
        let previous = std::mem::replace(&mut *state, RuntimeState::Closed);
        self.inner.progress.finish();
        drop(state);
        if let RuntimeState::InFlight { abort, .. } = previous {
            info!("aborting in-flight runtime provisioning");
            abort.abort();
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.close();
    }
}

fn ready(result: Result<PathBuf, Arc<RuntimeError>>) -> RuntimeFuture {
    futures::future::ready(result).boxed().shared()
}
