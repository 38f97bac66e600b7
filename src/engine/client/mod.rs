//! Engine client: endpoint, transport and request logger bound together.
//!
//! [`EngineClient`] is the dispatcher every higher-level operation goes
//! through. It fixes the request target, applies default headers, rejects
//! unsuccessful responses, and hands successful bodies to the stream decoder.

use std::sync::Arc;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use tokio::io::{AsyncReadExt, AsyncWrite};

use super::endpoint::{Endpoint, SocketResolver};
use super::stream::{self, StreamOptions};
use super::transport::{
    EngineRequest, EngineResponse, EngineTransport, NoopLogger, RequestBody, RequestLogger,
    TlsMaterial, Transport,
};
use crate::error::{EngineError, FilesystemError, Result, StevedoreError};

/// Value sent in the `User-Agent` header of every request.
pub const CLIENT_USER_AGENT: &str = concat!("stevedore/", env!("CARGO_PKG_VERSION"));

/// Content type applied to write requests unless the caller overrides it.
const DEFAULT_WRITE_CONTENT_TYPE: &str = "text/plain";

/// Paths to the PEM files used for a TLS engine connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// Client certificate.
    pub cert_path: Utf8PathBuf,
    /// Private key for the client certificate.
    pub key_path: Utf8PathBuf,
    /// Trust root for the engine certificate. Verification is disabled when
    /// absent.
    pub ca_path: Option<Utf8PathBuf>,
}

impl TlsFiles {
    /// Read every configured PEM file.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when a file cannot be opened or read.
    pub fn load(&self) -> Result<TlsMaterial> {
        let ca_pem = self.ca_path.as_deref().map(read_pem_file).transpose()?;
        Ok(TlsMaterial {
            cert_pem: read_pem_file(&self.cert_path)?,
            key_pem: read_pem_file(&self.key_path)?,
            ca_pem,
        })
    }
}

fn read_pem_file(path: &Utf8Path) -> Result<Vec<u8>> {
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| FilesystemError::IoError {
        path: path.as_std_path().to_path_buf(),
        message: String::from("path does not contain a filename"),
    })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|error| FilesystemError::from_io(parent, &error))?;
    let contents = dir
        .read(file_name)
        .map_err(|error| FilesystemError::from_io(path, &error))?;
    Ok(contents)
}

/// Parameters for a streamed request.
///
/// Groups the request parts and decode switches accepted by
/// [`EngineClient::stream`].
#[derive(Debug, Default)]
pub struct StreamParams {
    /// HTTP method.
    pub method: Method,
    /// Request path including any query string.
    pub path: String,
    /// Caller headers, applied over the client defaults.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Response decoding switches.
    pub options: StreamOptions,
}

/// Client for one container engine endpoint.
///
/// The transport is selected when the client is constructed and never
/// changes afterwards. The client holds no mutable state and may be shared
/// between concurrent callers.
pub struct EngineClient<T: Transport = EngineTransport> {
    endpoint: Endpoint,
    transport: T,
    logger: Arc<dyn RequestLogger>,
}

impl EngineClient {
    /// Connect to the engine at `endpoint`.
    ///
    /// No I/O happens here: Unix sockets are dialled per request and the
    /// pooled HTTP client connects lazily.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidEndpoint` for a malformed endpoint and
    /// `EngineError::ConnectionFailed` when the HTTP client cannot be built.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let parsed = Endpoint::parse(endpoint)?;
        let transport = EngineTransport::for_endpoint(&parsed, None)?;
        Ok(Self::with_transport(parsed, transport))
    }

    /// Connect to a TLS-protected engine using client certificate files.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidEndpoint` for a malformed endpoint,
    /// `FilesystemError` when a PEM file cannot be read, and
    /// `EngineError::TlsSetupFailed` when the endpoint is a Unix socket or the
    /// PEM material is rejected.
    pub fn connect_tls(endpoint: &str, files: &TlsFiles) -> Result<Self> {
        let parsed = Endpoint::parse(endpoint)?;
        let material = files.load()?;
        let transport = EngineTransport::for_endpoint(&parsed, Some(&material))?;
        Ok(Self::with_transport(parsed, transport))
    }

    /// Connect using fallback resolution.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `STEVEDORE_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Self> {
        Self::connect(&resolver.resolve(config_socket))
    }
}

impl<T: Transport> EngineClient<T> {
    /// Build a client over an explicit transport.
    #[must_use]
    pub fn with_transport(endpoint: Endpoint, transport: T) -> Self {
        Self {
            endpoint,
            transport,
            logger: Arc::new(NoopLogger),
        }
    }

    /// Replace the request logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Returns the resolved endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and return the response if its status is in
    /// `[200, 400)`.
    ///
    /// A `User-Agent` header is always set. `POST` and `PUT` requests default
    /// to `Content-Type: text/plain` and an empty body. Caller headers
    /// replace defaults of the same name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionRefused` when the engine refuses the
    /// connection, other `EngineError` transport variants for dial or
    /// exchange failures, and `EngineError::Api` with the drained body for
    /// unsuccessful status codes.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: RequestBody,
    ) -> Result<EngineResponse> {
        self.logger.log_request(&method, path);
        let request = self.prepare(method, path, headers, body);
        let response = self.transport.send(request).await?;

        if response.is_success() {
            return Ok(response);
        }
        Err(api_error(response).await)
    }

    /// Send a request and decode the response body into the given sinks.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::send`], plus the decode errors
    /// documented on [`stream::decode`].
    pub async fn stream<O, E>(
        &self,
        params: StreamParams,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let StreamParams {
            method,
            path,
            headers,
            body,
            options,
        } = params;

        let response = self.send(method, &path, headers, body).await?;
        let content_type = response.content_type().map(str::to_owned);
        let mut response_body = response.into_body();
        stream::decode(
            content_type.as_deref(),
            &mut response_body,
            stdout,
            stderr,
            options,
        )
        .await
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        caller_headers: HeaderMap,
        body: RequestBody,
    ) -> EngineRequest {
        let is_write = method == Method::POST || method == Method::PUT;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if is_write {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_WRITE_CONTENT_TYPE),
            );
        }
        headers.extend(caller_headers);

        let request_body = if is_write && body.is_empty() {
            RequestBody::Bytes(Bytes::new())
        } else {
            body
        };

        EngineRequest {
            method,
            url: self.endpoint.request_url(path),
            headers,
            body: request_body,
        }
    }
}

/// Drain an unsuccessful response into an `Api` error.
async fn api_error(response: EngineResponse) -> StevedoreError {
    let status = response.status();
    let mut body = response.into_body();
    let mut raw = Vec::new();
    if let Err(error) = body.read_to_end(&mut raw).await {
        return StevedoreError::from(EngineError::RequestFailed {
            message: format!("failed to read error response ({status}): {error}"),
        });
    }
    StevedoreError::from(EngineError::Api {
        status: status.as_u16(),
        message: String::from_utf8_lossy(&raw).into_owned(),
    })
}

impl<T: Transport> std::fmt::Debug for EngineClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("endpoint", &self.endpoint.to_string())
            .finish_non_exhaustive()
    }
}
