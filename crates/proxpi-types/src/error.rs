use thiserror::Error;

/// Error kinds shared by the index cache and the file cache, matching the
/// HTTP-facing error contract (not a taxonomy of underlying transport
/// failures, which each component keeps to itself and maps down to one of
/// these).
#[derive(Debug, Clone, Error)]
pub enum ProxpiError {
    /// A source failed and no cached data covers the request.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Every source reports the project or file as unknown.
    #[error("not found")]
    NotFound,

    /// A project name contains characters that cannot be normalized.
    #[error("invalid project name: {0}")]
    InvalidName(String),

    /// A local disk write or rename failed.
    #[error("local cache I/O error: {0}")]
    IoError(String),
}
