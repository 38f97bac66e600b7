//! Request dispatch over the engine's HTTP control API.
//!
//! Two transport strategies exist: a pooled HTTP client for `http` and
//! `https` endpoints, and a one-connection-per-request dialer for Unix
//! sockets. The strategy is chosen once, when the client is built, and
//! hidden behind the [`Transport`] seam so callers and tests never branch on
//! the endpoint scheme.

mod error_classification;
mod http;
mod unix;

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use ::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::task::JoinHandle;

pub use self::http::{HttpTransport, TlsMaterial};
pub use self::unix::UnixSocketTransport;
use super::endpoint::Endpoint;
use crate::error::EngineError;

/// Boxed future type returned by [`Transport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<EngineResponse, EngineError>> + Send + 'a>>;

/// Behaviour required to issue one request against the engine.
///
/// This abstraction keeps the dispatcher and build flow testable without a
/// live daemon.
pub trait Transport: Send + Sync {
    /// Send a fully prepared request and return the response head with a
    /// streaming body.
    fn send(&self, request: EngineRequest) -> SendFuture<'_>;
}

/// The closed set of transport strategies.
#[derive(Debug)]
pub enum EngineTransport {
    /// Pooled HTTP or HTTPS client.
    Http(HttpTransport),
    /// One raw Unix-domain socket connection per request.
    Unix(UnixSocketTransport),
}

impl EngineTransport {
    /// Select the transport for a resolved endpoint.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::TlsSetupFailed` when `tls` is supplied for a
    /// `unix` endpoint or the TLS material is rejected, and
    /// `EngineError::ConnectionFailed` when the HTTP client cannot be built.
    pub fn for_endpoint(
        endpoint: &Endpoint,
        tls: Option<&TlsMaterial>,
    ) -> Result<Self, EngineError> {
        match (endpoint.socket_path(), tls) {
            (Some(_), Some(_)) => Err(EngineError::TlsSetupFailed {
                message: format!("TLS is not supported for socket endpoint {endpoint}"),
            }),
            (Some(path), None) => Ok(Self::Unix(UnixSocketTransport::new(path))),
            (None, _) => HttpTransport::new(endpoint, tls).map(Self::Http),
        }
    }
}

impl Transport for EngineTransport {
    fn send(&self, request: EngineRequest) -> SendFuture<'_> {
        match self {
            Self::Http(transport) => transport.send(request),
            Self::Unix(transport) => transport.send(request),
        }
    }
}

/// Body attached to an outgoing request.
#[derive(Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// An in-memory body.
    Bytes(Bytes),
    /// A body streamed from a reader, such as a build context archive.
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl RequestBody {
    /// Returns true when no body is attached.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// A request ready for a transport.
#[derive(Debug)]
pub struct EngineRequest {
    /// HTTP method.
    pub method: Method,
    /// Request target: absolute for network transports, origin-form for
    /// Unix sockets.
    pub url: String,
    /// Final request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
}

/// Response head plus a streaming body.
#[derive(Debug)]
pub struct EngineResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: ResponseBody,
}

impl EngineResponse {
    /// Create a response from its parts.
    #[must_use]
    pub const fn new(status: StatusCode, content_type: Option<String>, body: ResponseBody) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the declared `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns true for status codes in `[200, 400)`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status.as_u16())
    }

    /// Consume the response, yielding its body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Streaming response body.
///
/// For Unix-socket requests the body owns the connection task, so dropping
/// the body closes the connection on every exit path.
pub struct ResponseBody {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    connection: Option<ConnectionGuard>,
}

impl ResponseBody {
    /// Wrap a reader that needs no connection bookkeeping.
    #[must_use]
    pub fn new(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            reader: Box::pin(reader),
            connection: None,
        }
    }

    /// Wrap an in-memory body.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }

    fn with_connection(reader: impl AsyncRead + Send + 'static, connection: ConnectionGuard) -> Self {
        Self {
            reader: Box::pin(reader),
            connection: Some(connection),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("owns_connection", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for ResponseBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().reader.as_mut().poll_read(cx, buf)
    }
}

/// Aborts a spawned connection task when dropped.
struct ConnectionGuard(JoinHandle<()>);

impl ConnectionGuard {
    fn spawn<F>(connection: F) -> Self
    where
        F: Future<Output = Result<(), hyper::Error>> + Send + 'static,
    {
        Self(tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::debug!(%error, "engine socket connection ended with error");
            }
        }))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Caller-supplied sink for request logging.
pub trait RequestLogger: Send + Sync {
    /// Record that a request is about to be sent.
    fn log_request(&self, method: &Method, path: &str);
}

/// Logger that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl RequestLogger for NoopLogger {
    fn log_request(&self, _method: &Method, _path: &str) {}
}

/// Logger that forwards records to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn log_request(&self, method: &Method, path: &str) {
        tracing::debug!(%method, path, "engine request");
    }
}
