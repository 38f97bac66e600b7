//! Unix-domain socket transport.
//!
//! Every request dials a fresh connection and performs its own HTTP/1.1
//! handshake. The connection task is owned by the response body and aborted
//! when the body is dropped.

use std::convert::Infallible;
use std::future;
use std::io;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::TryStreamExt;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderValue, Request};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, BodyStream, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio_util::io::{ReaderStream, StreamReader};

use super::error_classification::classify_socket_error;
use super::{
    ConnectionGuard, EngineRequest, EngineResponse, RequestBody, ResponseBody, SendFuture,
    Transport,
};
use crate::error::EngineError;

type OutgoingBody = BoxBody<Bytes, io::Error>;

/// Transport that opens one Unix-socket connection per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixSocketTransport {
    socket_path: Utf8PathBuf,
}

impl UnixSocketTransport {
    /// Create a transport for the socket at `socket_path`.
    #[must_use]
    pub fn new(socket_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Returns the socket path dialled for each request.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    async fn send_async(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let http_request = into_hyper_request(request)?;

        let stream = UnixStream::connect(self.socket_path.as_std_path())
            .await
            .map_err(|error| classify_socket_error(&error, &self.socket_path))?;
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|error| EngineError::ConnectionFailed {
                message: error.to_string(),
            })?;
        let guard = ConnectionGuard::spawn(connection);

        let response = sender
            .send_request(http_request)
            .await
            .map_err(|error| EngineError::RequestFailed {
                message: error.to_string(),
            })?;

        let (parts, incoming) = response.into_parts();
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let chunks = BodyStream::new(incoming)
            .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())))
            .map_err(io::Error::other);

        Ok(EngineResponse::new(
            parts.status,
            content_type,
            ResponseBody::with_connection(StreamReader::new(chunks), guard),
        ))
    }
}

impl Transport for UnixSocketTransport {
    fn send(&self, request: EngineRequest) -> SendFuture<'_> {
        Box::pin(self.send_async(request))
    }
}

fn into_hyper_request(request: EngineRequest) -> Result<Request<OutgoingBody>, EngineError> {
    let EngineRequest {
        method,
        url,
        mut headers,
        body,
    } = request;

    headers
        .entry(HOST)
        .or_insert(HeaderValue::from_static("localhost"));

    let mut http_request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(outgoing_body(body))
        .map_err(|error| EngineError::RequestFailed {
            message: format!("invalid request target '{url}': {error}"),
        })?;
    *http_request.headers_mut() = headers;
    Ok(http_request)
}

fn outgoing_body(body: RequestBody) -> OutgoingBody {
    match body {
        RequestBody::Empty => Empty::new().map_err(never).boxed(),
        RequestBody::Bytes(bytes) => Full::new(bytes).map_err(never).boxed(),
        RequestBody::Reader(reader) => {
            StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed()
        }
    }
}

fn never(impossible: Infallible) -> io::Error {
    match impossible {}
}
