//! Semantic error types for the stevedore client.
//!
//! This module defines the error hierarchy for stevedore, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or retry, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! The hierarchy separates configuration problems detected before any network
//! I/O, transport failures talking to the engine, protocol failures while
//! decoding a response body, and failures reported by the remote engine
//! itself.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while resolving or talking to the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The endpoint string could not be parsed or uses an unsupported scheme.
    #[error("endpoint is not valid: {endpoint}")]
    InvalidEndpoint {
        /// The endpoint string as supplied by the caller.
        endpoint: String,
    },

    /// The engine actively refused the connection.
    #[error("connection refused by container engine at {endpoint}")]
    ConnectionRefused {
        /// The endpoint that refused the connection.
        endpoint: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Failed to connect to the container engine.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The request could not be built or its exchange failed mid-flight.
    #[error("engine request failed: {message}")]
    RequestFailed {
        /// A description of the request failure.
        message: String,
    },

    /// TLS material could not be loaded or applied.
    #[error("failed to configure TLS: {message}")]
    TlsSetupFailed {
        /// A description of the TLS failure.
        message: String,
    },

    /// The engine answered with a status code outside `[200, 400)`.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the engine.
        status: u16,
        /// Response body returned alongside the status.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Failed to create the tokio runtime used by blocking wrappers.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime creation failure.
        message: String,
    },
}

/// Protocol errors raised while decoding a response body.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A progress event was not valid JSON.
    #[error("malformed progress event: {message}")]
    MalformedJson {
        /// A description of the JSON error.
        message: String,
    },

    /// A multiplexed frame named a channel other than stdout or stderr.
    #[error("malformed stream frame: unknown channel selector {selector}")]
    InvalidChannel {
        /// The selector byte read from the frame header.
        selector: u8,
    },

    /// The stream ended inside a frame header or payload.
    #[error("stream ended mid-frame: expected {expected} bytes, received {received}")]
    TruncatedFrame {
        /// Number of bytes the frame declared.
        expected: u64,
        /// Number of bytes available before end of stream.
        received: u64,
    },

    /// Reading the response body failed.
    #[error("failed reading response stream: {message}")]
    ReadFailed {
        /// A description of the read failure.
        message: String,
    },

    /// Writing decoded output to a caller sink failed.
    #[error("failed writing {sink} output: {message}")]
    WriteFailed {
        /// The sink that rejected the write (`stdout` or `stderr`).
        sink: &'static str,
        /// A description of the write failure.
        message: String,
    },
}

/// Errors specific to image build requests.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No output sink was supplied for build progress.
    #[error("output stream is missing")]
    MissingOutputStream,

    /// Neither an input stream nor a context directory was supplied.
    #[error("build context is missing")]
    MissingContext,

    /// Both an input stream and a context directory were supplied.
    #[error("multiple build contexts are present")]
    MultipleContexts,

    /// The remote engine reported a build failure in its progress stream.
    #[error("remote build failed: {message}")]
    RemoteBuild {
        /// The error message reported by the engine.
        message: String,
    },

    /// Registry credentials could not be encoded into a request header.
    #[error("failed to encode registry auth header: {message}")]
    AuthEncoding {
        /// A description of the encoding failure.
        message: String,
    },

    /// Build options could not be encoded into a query string.
    #[error("failed to encode build query: {message}")]
    QueryEncoding {
        /// A description of the encoding failure.
        message: String,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

impl FilesystemError {
    /// Classify an I/O failure at `path`.
    #[must_use]
    pub fn from_io(path: &camino::Utf8Path, error: &std::io::Error) -> Self {
        let owned = path.as_std_path().to_path_buf();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path: owned },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: owned },
            _ => Self::IoError {
                path: owned,
                message: error.to_string(),
            },
        }
    }
}

/// Top-level error type for the stevedore client.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the library. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum StevedoreError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred resolving or talking to the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An error occurred decoding a response stream.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// An error occurred preparing or running a build.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl StevedoreError {
    /// Returns true when the engine could not be reached because it refused
    /// the connection.
    ///
    /// Callers use this to decide whether to retry with their own backoff.
    #[must_use]
    pub const fn is_connection_refused(&self) -> bool {
        matches!(self, Self::Engine(EngineError::ConnectionRefused { .. }))
    }

    /// Returns true when the remote engine rejected the build, as opposed to
    /// a local transport or protocol failure.
    #[must_use]
    pub const fn is_remote_build_failure(&self) -> bool {
        matches!(self, Self::Build(BuildError::RemoteBuild { .. }))
    }
}

/// A specialised `Result` type for stevedore operations.
pub type Result<T> = std::result::Result<T, StevedoreError>;
