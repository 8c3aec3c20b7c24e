//! Network and filesystem plumbing for the runtime cache.

pub mod download;
pub mod extract;
pub mod progress;

pub use download::{DownloadError, DownloadRequest};
pub use extract::{ExtractError, ExtractedFile};
pub use progress::{DownloadProgress, ProgressHub};
