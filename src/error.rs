//! Error types for gateway orchestration and chat.

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration load/parse error.
    #[error("config error: {0}")]
    Config(String),

    /// Release feed request failed (network, timeout, unexpected status).
    #[error("release feed error: {0}")]
    ResolveTransport(String),

    /// The requested release tag does not exist.
    #[error("no release found for tag '{0}'")]
    NoReleaseFound(String),

    /// The release carries no asset for the running OS/architecture.
    #[error("no matching asset: {0}")]
    NoMatchingAsset(String),

    /// Asset download failed.
    #[error("download error: {0}")]
    Download(String),

    /// Archive could not be unpacked.
    #[error("extract error: {0}")]
    Extract(String),

    /// Extraction finished but no gateway binary was found.
    #[error("no gateway binary after extraction: {0}")]
    BinaryNotFoundAfterExtract(String),

    /// Provisioning ran but the binary still cannot be executed.
    #[error("gateway binary still missing: {0}")]
    BinaryStillMissing(String),

    /// Child process could not be spawned.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// Child process exited unexpectedly.
    #[error("gateway process exited with code {0}")]
    ProcessCrashed(i32),

    /// Chat endpoint returned a non-success HTTP status.
    #[error("chat endpoint returned HTTP {0}")]
    StreamHttp(u16),

    /// Chat request failed before or during the response (connection,
    /// protocol, or body-read failure that is not a timeout).
    #[error("chat request failed: {0}")]
    ChatTransport(String),

    /// Request exceeded its wall-clock deadline.
    #[error("request timed out: {0}")]
    RequestTimeout(String),

    /// In-flight request was cancelled. Callers treat this as silence,
    /// never as a failure.
    #[error("request cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GatewayError>;
